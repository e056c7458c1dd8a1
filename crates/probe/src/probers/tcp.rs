//! TCP query/response prober.
//!
//! Runs a small expect/send script over one connection, e.g. an SSH banner
//! check or an IRC registration handshake.

use super::Prober;
use crate::config::{Module, QueryResponseStep};
use crate::metric::MetricSink;
use async_trait::async_trait;
use regex::bytes::Regex;
use std::io::{self, ErrorKind};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, warn};

/// Longest line accepted while waiting for an `expect` match.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// TCP prober
pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, target: &str, module: &Module, _sink: &mut MetricSink) -> bool {
        // One absolute deadline for the connect and the whole script. It is
        // not extended per step, and lines read while waiting for a match are
        // not counted.
        let deadline = Instant::now() + module.timeout;

        let stream = match timeout_at(deadline, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(target = %target, error = %e, "TCP connection failed");
                return false;
            }
            Err(_) => {
                warn!(target = %target, "TCP connection timed out");
                return false;
            }
        };

        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        for (index, step) in module.tcp.steps.iter().enumerate() {
            debug!(target = %target, step = index, ?step, "Processing query response step");

            let send = match expect_pattern(step) {
                Some(pattern) => {
                    let re = match Regex::new(pattern) {
                        Ok(re) => re,
                        Err(e) => {
                            error!(regexp = %pattern, error = %e, "Could not compile regular expression");
                            return false;
                        }
                    };

                    let line = match timeout_at(deadline, read_matching_line(&mut reader, &re)).await {
                        Ok(Ok(Some(line))) => line,
                        Ok(Ok(None)) => {
                            warn!(target = %target, regexp = %pattern, "Connection closed before expected line");
                            return false;
                        }
                        Ok(Err(e)) => {
                            warn!(target = %target, error = %e, "Failed to read from connection");
                            return false;
                        }
                        Err(_) => {
                            warn!(target = %target, regexp = %pattern, "Timed out waiting for expected line");
                            return false;
                        }
                    };

                    expand_send(&re, &line, step.send.as_deref().unwrap_or_default())
                }
                None => step.send.clone().unwrap_or_default().into_bytes(),
            };

            if send.is_empty() {
                continue;
            }

            debug!(target = %target, send = %String::from_utf8_lossy(&send), "Sending");
            let mut payload = send;
            payload.push(b'\n');
            match timeout_at(deadline, write_half.write_all(&payload)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(target = %target, error = %e, "Failed to write to connection");
                    return false;
                }
                Err(_) => {
                    warn!(target = %target, "Timed out writing to connection");
                    return false;
                }
            }
        }

        true
    }
}

fn expect_pattern(step: &QueryResponseStep) -> Option<&str> {
    step.expect.as_deref().filter(|pattern| !pattern.is_empty())
}

/// Read lines until one matches `re`. `Ok(None)` means the peer closed the
/// connection first. Line endings (`\n`, `\r\n`) are stripped.
pub async fn read_matching_line<R>(reader: &mut R, re: &Regex) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = (&mut *reader)
            .take(MAX_LINE_LENGTH as u64)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            return Ok(None);
        }
        if read == MAX_LINE_LENGTH && line.last() != Some(&b'\n') {
            return Err(io::Error::new(ErrorKind::InvalidData, "line too long"));
        }

        trim_line_ending(&mut line);
        debug!(line = %String::from_utf8_lossy(&line), "Read line");
        if re.is_match(&line) {
            debug!(regexp = %re, "Expected line matched");
            return Ok(Some(line));
        }
    }
}

/// Expand `${N}` placeholders in `template` with the captures of `re` on `line`.
pub fn expand_send(re: &Regex, line: &[u8], template: &str) -> Vec<u8> {
    let mut expanded = Vec::new();
    if let Some(captures) = re.captures(line) {
        captures.expand(template.as_bytes(), &mut expanded);
    }
    expanded
}

fn trim_line_ending(line: &mut Vec<u8>) {
    if line.last() == Some(&b'\n') {
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
    }
}
