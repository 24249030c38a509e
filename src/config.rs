//! Server configuration
//!
//! Plain values handed to the acceptor and sessions at startup; nothing
//! here is read from globals.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

/// Default listen address
pub const DEFAULT_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 8080));

/// Runtime settings for one server instance
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the listener binds to
    pub bind_addr: SocketAddr,
    /// Pending-connection queue length passed to `listen`
    pub backlog: u32,
    /// Credential file (`username:hex-digest` per line)
    pub credentials_path: PathBuf,
    /// Append-only chat log
    pub log_path: PathBuf,
    /// How long a peer may take to answer each handshake prompt
    pub handshake_timeout: Duration,
    /// Per-recipient deadline for queueing and writing a broadcast
    pub send_timeout: Duration,
    /// Longest accepted input line, in bytes
    pub max_line_length: usize,
    /// Outbound queue capacity per session
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR,
            backlog: 5,
            credentials_path: PathBuf::from("credentials.txt"),
            log_path: PathBuf::from("server_log.txt"),
            handshake_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_millis(250),
            max_line_length: 4096,
            outbound_buffer: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, DEFAULT_ADDR);
        assert_eq!(DEFAULT_ADDR.to_string(), "127.0.0.1:8080");
        assert!(config.outbound_buffer > 0);
    }
}
