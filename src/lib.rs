//! Multi-client line chat server library
//!
//! A TCP chat server where every client authenticates with a username and
//! password, then each line it sends is relayed to all connected clients
//! and appended to a timestamped log.
//!
//! # Features
//! - Username/password handshake against a SHA-256 credential file
//! - Broadcast of chat lines to every authenticated client (sender included)
//! - "joined" / "left" notices from the `Server` sender
//! - Append-only chat log: `[YYYY-MM-DD HH:MM:SS] sender: message`
//! - `/quit` to leave
//!
//! # Architecture
//! - `ChatServer` accepts connections and spawns one task per session
//! - Each Active session registers an outbound queue in the `SessionRegistry`
//!   and owns a writer task that drains it into the socket
//! - `Broadcaster` serialises log appends and fans messages out over a
//!   registry snapshot, skipping recipients that are closed or stalled
//!
//! # Example
//! ```ignore
//! use line_chat::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), line_chat::AppError> {
//!     let server = ChatServer::from_config(ServerConfig::default()).await?;
//!     server.serve().await
//! }
//! ```

pub mod broadcast;
pub mod chat_log;
pub mod config;
pub mod credentials;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use broadcast::{Broadcaster, DeliveryReport};
pub use chat_log::{ChatLog, LogEntry};
pub use config::ServerConfig;
pub use credentials::{password_digest, Credentials};
pub use error::{AppError, SendError};
pub use registry::{Outbound, Registration, SessionRegistry};
pub use server::{bind_listener, ChatServer, ServerContext};
pub use session::{handle_connection, Session};
pub use types::{SessionId, SessionState, SYSTEM_SENDER};
