//! Command-line flags.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Blackbox prober exposing probe results and aggregate metrics over HTTP.
#[derive(Debug, Clone, Parser)]
#[command(name = "blackbox-exporter", version, about)]
pub struct Args {
    /// Blackbox exporter configuration file.
    #[arg(long = "config.file", default_value = "blackbox.yml")]
    pub config_file: PathBuf,

    /// The address to listen on for HTTP requests.
    #[arg(long = "web.listen-address", default_value = ":9115")]
    pub listen_address: String,

    /// Log level used when RUST_LOG is not set.
    #[arg(long = "log.level", default_value = "info")]
    pub log_level: String,

    /// Log output format.
    #[arg(long = "log.format", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

impl Args {
    /// Socket address to bind. A bare `:port` listens on all interfaces.
    pub fn bind_address(&self) -> String {
        if self.listen_address.starts_with(':') {
            format!("0.0.0.0{}", self.listen_address)
        } else {
            self.listen_address.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["blackbox-exporter"]);
        assert_eq!(args.config_file, PathBuf::from("blackbox.yml"));
        assert_eq!(args.listen_address, ":9115");
        assert_eq!(args.log_format, LogFormat::Text);
        assert_eq!(args.bind_address(), "0.0.0.0:9115");
    }

    #[test]
    fn test_dotted_flags() {
        let args = Args::parse_from([
            "blackbox-exporter",
            "--config.file",
            "/etc/blackbox/blackbox.yml",
            "--web.listen-address",
            "127.0.0.1:9000",
            "--log.format",
            "json",
        ]);
        assert_eq!(args.config_file, PathBuf::from("/etc/blackbox/blackbox.yml"));
        assert_eq!(args.bind_address(), "127.0.0.1:9000");
        assert_eq!(args.log_format, LogFormat::Json);
    }
}
