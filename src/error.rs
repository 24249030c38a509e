//! Error types for the chat server
//!
//! Defines application-level errors and per-recipient delivery errors.
//! Uses thiserror for ergonomic error definitions.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use tokio_util::codec::LinesCodecError;

/// Application-level errors
///
/// Startup errors (`StoreUnreadable`, `BindFailed`) are fatal to the process.
/// Everything else only ever ends the one session that hit it.
#[derive(Debug, Error)]
pub enum AppError {
    /// Credential file exists but could not be read or parsed (fatal)
    #[error("credential store {path} is unreadable: {reason}")]
    StoreUnreadable { path: PathBuf, reason: String },

    /// Unknown username, wrong password or empty credentials
    #[error("authentication rejected")]
    AuthRejected,

    /// Peer closed the connection or reset it
    #[error("peer disconnected")]
    PeerDisconnected,

    /// Peer did not answer a handshake prompt in time
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Listener could not be bound (fatal)
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// IO error on a session socket or the log sink
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Line framing error (oversized line or IO error while reading)
    #[error("line framing error: {0}")]
    Lines(#[from] LinesCodecError),
}

/// Per-recipient delivery errors
///
/// Raised while fanning a broadcast out to one session. Always swallowed by
/// the broadcaster; never reaches the broadcasting session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The recipient's outbound queue has been closed
    #[error("delivery failed: channel closed")]
    ChannelClosed,

    /// The recipient's outbound queue stayed full past the send deadline
    #[error("delivery failed: send deadline exceeded")]
    TimedOut,
}
