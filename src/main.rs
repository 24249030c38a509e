//! Line chat server - Entry Point
//!
//! Loads credentials, opens the chat log and runs the accept loop.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use line_chat::config::DEFAULT_ADDR;
use line_chat::{ChatServer, ServerConfig};

/// Multi-client line chat server
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "LINE_CHAT_ADDR", default_value_t = DEFAULT_ADDR)]
    addr: SocketAddr,

    /// Listen backlog
    #[arg(long, env = "LINE_CHAT_BACKLOG", default_value_t = 5)]
    backlog: u32,

    /// Credential file (created with a default account if missing)
    #[arg(long, env = "LINE_CHAT_CREDENTIALS", default_value = "credentials.txt")]
    credentials: PathBuf,

    /// Chat log file (appended to)
    #[arg(long, env = "LINE_CHAT_LOG", default_value = "server_log.txt")]
    log: PathBuf,

    /// Seconds allowed for each handshake reply
    #[arg(long, env = "LINE_CHAT_HANDSHAKE_SECS", default_value_t = 30)]
    handshake_secs: u64,

    /// Per-recipient send deadline in milliseconds
    #[arg(long, env = "LINE_CHAT_SEND_TIMEOUT_MS", default_value_t = 250)]
    send_timeout_ms: u64,

    /// Maximum input line length in bytes
    #[arg(long, env = "LINE_CHAT_MAX_LINE", default_value_t = 4096)]
    max_line: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            bind_addr: args.addr,
            backlog: args.backlog,
            credentials_path: args.credentials,
            log_path: args.log,
            handshake_timeout: Duration::from_secs(args.handshake_secs),
            send_timeout: Duration::from_millis(args.send_timeout_ms),
            max_line_length: args.max_line,
            ..ServerConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=line_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("line_chat=info")),
        )
        .init();

    let config = ServerConfig::from(Args::parse());

    let server = match ChatServer::from_config(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match server.serve().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}
