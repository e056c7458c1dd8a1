//! ICMPv4 echo prober.
//!
//! Sends one echo request over a raw socket and waits for the matching echo
//! reply. Raw sockets need elevated privileges (root or `CAP_NET_RAW`); use
//! [`check_privileges`] at startup to surface a missing privilege early.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |     Code      |          Checksum             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |           Identifier          |        Sequence Number        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Data ...
//! +-+-+-+-+-
//! ```

use super::Prober;
use crate::config::Module;
use crate::metric::MetricSink;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{self, ErrorKind, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

const ICMP_ECHO_REPLY: u8 = 0;
const ICMP_ECHO_REQUEST: u8 = 8;
const ICMP_HEADER_LEN: usize = 8;
const ECHO_PAYLOAD: &[u8] = b"blackbox-exporter";

/// Per-process sequence numbers keep concurrent probes apart.
static SEQUENCE: AtomicU16 = AtomicU16::new(0);

/// ICMP prober
pub struct IcmpProber;

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(&self, target: &str, module: &Module, _sink: &mut MetricSink) -> bool {
        let deadline = Instant::now() + module.timeout;

        let addr = match timeout(module.timeout, resolve_ipv4(target)).await {
            Ok(Ok(addr)) => addr,
            Ok(Err(e)) => {
                warn!(target = %target, error = %e, "Failed to resolve ICMP target");
                return false;
            }
            Err(_) => {
                warn!(target = %target, "Timed out resolving ICMP target");
                return false;
            }
        };

        let request = EchoPacket::request(identifier(), SEQUENCE.fetch_add(1, Ordering::Relaxed));
        let started = Instant::now();

        match tokio::task::spawn_blocking(move || echo(addr, &request, deadline)).await {
            Ok(Ok(())) => {
                debug!(target = %target, addr = %addr, rtt_ms = started.elapsed().as_millis(), "ICMP echo reply received");
                true
            }
            Ok(Err(e)) => {
                warn!(target = %target, addr = %addr, error = %e, "ICMP probe failed");
                false
            }
            Err(e) => {
                warn!(target = %target, error = %e, "ICMP probe task failed");
                false
            }
        }
    }
}

/// Verify that a raw ICMP socket can be opened by this process.
pub fn check_privileges() -> io::Result<()> {
    open_socket().map(drop)
}

fn open_socket() -> io::Result<Socket> {
    Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
}

fn identifier() -> u16 {
    (std::process::id() & 0xffff) as u16
}

async fn resolve_ipv4(target: &str) -> io::Result<Ipv4Addr> {
    if let Ok(addr) = target.parse::<Ipv4Addr>() {
        return Ok(addr);
    }

    tokio::net::lookup_host((target, 0))
        .await?
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| io::Error::new(ErrorKind::NotFound, format!("no IPv4 address for {}", target)))
}

/// Send `request` to `addr` and block until its reply arrives or `deadline`.
fn echo(addr: Ipv4Addr, request: &EchoPacket, deadline: Instant) -> io::Result<()> {
    let mut socket = open_socket()?;
    let dest = SocketAddr::new(IpAddr::V4(addr), 0);
    socket.send_to(&request.to_bytes(), &dest.into())?;

    let mut buf = [0u8; 1500];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(io::Error::new(ErrorKind::TimedOut, "no echo reply before deadline"));
        }
        // A zero read timeout would block forever.
        socket.set_read_timeout(Some(remaining.max(Duration::from_millis(1))))?;

        let len = match socket.read(&mut buf) {
            Ok(len) => len,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                return Err(io::Error::new(ErrorKind::TimedOut, "no echo reply before deadline"));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        // Our own request shows up here when probing a local address, as does
        // any other ICMP traffic the host receives.
        if let Some((source, reply)) = parse_ipv4_icmp(&buf[..len]) {
            if source == addr && reply.is_reply_to(request) {
                return Ok(());
            }
        }
    }
}

/// Split a raw IPv4 datagram into its source address and ICMP message.
fn parse_ipv4_icmp(datagram: &[u8]) -> Option<(Ipv4Addr, EchoPacket)> {
    if datagram.len() < 20 || datagram[0] >> 4 != 4 {
        return None;
    }
    let header_len = usize::from(datagram[0] & 0x0f) * 4;
    if header_len < 20 || datagram.len() < header_len {
        return None;
    }
    let source = Ipv4Addr::new(datagram[12], datagram[13], datagram[14], datagram[15]);
    let packet = EchoPacket::parse(&datagram[header_len..]).ok()?;
    Some((source, packet))
}

/// ICMP echo request or reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoPacket {
    pub icmp_type: u8,
    pub code: u8,
    pub identifier: u16,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl EchoPacket {
    /// Create an echo request.
    pub fn request(identifier: u16, sequence: u16) -> Self {
        Self {
            icmp_type: ICMP_ECHO_REQUEST,
            code: 0,
            identifier,
            sequence,
            payload: ECHO_PAYLOAD.to_vec(),
        }
    }

    /// Parse an ICMP message (without IP header).
    pub fn parse(data: &[u8]) -> Result<Self, &'static str> {
        if data.len() < ICMP_HEADER_LEN {
            return Err("Packet too short");
        }
        if checksum(data) != 0 {
            return Err("Invalid checksum");
        }

        Ok(Self {
            icmp_type: data[0],
            code: data[1],
            identifier: u16::from_be_bytes([data[4], data[5]]),
            sequence: u16::from_be_bytes([data[6], data[7]]),
            payload: data[ICMP_HEADER_LEN..].to_vec(),
        })
    }

    /// Serialize with the checksum filled in.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(ICMP_HEADER_LEN + self.payload.len());
        buf.put_u8(self.icmp_type);
        buf.put_u8(self.code);
        buf.put_u16(0);
        buf.put_u16(self.identifier);
        buf.put_u16(self.sequence);
        buf.put_slice(&self.payload);

        let sum = checksum(&buf);
        buf[2..4].copy_from_slice(&sum.to_be_bytes());
        buf.freeze()
    }

    /// Whether this is the echo reply answering `request`.
    pub fn is_reply_to(&self, request: &EchoPacket) -> bool {
        self.icmp_type == ICMP_ECHO_REPLY
            && self.code == 0
            && self.identifier == request.identifier
            && self.sequence == request.sequence
    }
}

/// RFC 1071 internet checksum.
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let request = EchoPacket::request(0x1234, 7);
        let bytes = request.to_bytes();

        assert_eq!(bytes[0], ICMP_ECHO_REQUEST);
        assert_eq!(checksum(&bytes), 0);

        let parsed = EchoPacket::parse(&bytes).unwrap();
        assert_eq!(parsed, request);
    }

    #[test]
    fn test_reply_matching() {
        let request = EchoPacket::request(42, 1);
        let mut reply = request.clone();
        reply.icmp_type = ICMP_ECHO_REPLY;
        assert!(reply.is_reply_to(&request));

        // Our own request echoed back by the local stack is not a reply.
        assert!(!request.is_reply_to(&request));

        let mut other = reply.clone();
        other.sequence = 2;
        assert!(!other.is_reply_to(&request));
    }

    #[test]
    fn test_parse_rejects_corruption() {
        let mut bytes = EchoPacket::request(1, 1).to_bytes().to_vec();
        bytes[ICMP_HEADER_LEN] ^= 0xff;
        assert_eq!(EchoPacket::parse(&bytes), Err("Invalid checksum"));
        assert_eq!(EchoPacket::parse(&bytes[..4]), Err("Packet too short"));
    }

    #[test]
    fn test_checksum_odd_length() {
        // 0x0100 + 0x0200 (padded) = 0x0300
        assert_eq!(checksum(&[0x01, 0x00, 0x02]), !0x0300);
    }

    #[test]
    fn test_parse_ipv4_icmp() {
        let reply = EchoPacket {
            icmp_type: ICMP_ECHO_REPLY,
            ..EchoPacket::request(9, 3)
        };
        let mut datagram = vec![0x45, 0, 0, 0, 0, 0, 0, 0, 64, 1, 0, 0, 10, 0, 0, 1, 10, 0, 0, 2];
        datagram.extend_from_slice(&reply.to_bytes());

        let (source, parsed) = parse_ipv4_icmp(&datagram).unwrap();
        assert_eq!(source, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(parsed, reply);

        assert!(parse_ipv4_icmp(&datagram[..10]).is_none());
    }

    #[tokio::test]
    async fn test_resolve_ipv4_literal() {
        assert_eq!(resolve_ipv4("127.0.0.1").await.unwrap(), Ipv4Addr::LOCALHOST);
    }

    #[test]
    fn test_check_privileges() {
        // Succeeds only with CAP_NET_RAW; must not panic either way.
        let _ = check_privileges();
    }
}
