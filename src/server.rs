//! Connection acceptor
//!
//! Binds the listening socket and spawns one session task per accepted
//! connection. The accept loop never waits on a session.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tracing::{error, info};

use crate::broadcast::Broadcaster;
use crate::chat_log::ChatLog;
use crate::config::ServerConfig;
use crate::credentials::Credentials;
use crate::error::AppError;
use crate::registry::SessionRegistry;
use crate::session::handle_connection;

/// State shared by every session task
///
/// Credentials are read-only; the registry and log are only reached
/// through the broadcaster.
#[derive(Debug)]
pub struct ServerContext {
    pub config: ServerConfig,
    pub credentials: Credentials,
    pub broadcaster: Broadcaster,
}

/// The chat server
pub struct ChatServer {
    ctx: Arc<ServerContext>,
}

impl ChatServer {
    /// Assemble a server from already-loaded credentials and an open log
    pub fn new(config: ServerConfig, credentials: Credentials, log: ChatLog) -> Self {
        let broadcaster = Broadcaster::new(SessionRegistry::new(), log, config.send_timeout);
        Self {
            ctx: Arc::new(ServerContext {
                config,
                credentials,
                broadcaster,
            }),
        }
    }

    /// Load credentials and open the log named in `config`
    pub async fn from_config(config: ServerConfig) -> Result<Self, AppError> {
        let credentials = Credentials::load(&config.credentials_path)?;
        let log = ChatLog::open(&config.log_path).await?;
        Ok(Self::new(config, credentials, log))
    }

    /// Bind the configured address and accept connections forever
    pub async fn serve(self) -> Result<(), AppError> {
        let listener = bind_listener(self.ctx.config.bind_addr, self.ctx.config.backlog)?;
        self.run(listener).await;
        Ok(())
    }

    /// Accept connections on an existing listener forever
    ///
    /// Per-connection accept errors are logged and the loop continues.
    pub async fn run(self, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!("Chat server listening on {}", addr);
        }

        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let ctx = Arc::clone(&self.ctx);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, ctx).await {
                            error!("Connection handler error for {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Bind a listener with an explicit backlog
pub fn bind_listener(addr: SocketAddr, backlog: u32) -> Result<TcpListener, AppError> {
    let bind_failed = |source: std::io::Error| AppError::BindFailed { addr, source };

    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(bind_failed)?;

    #[cfg(unix)]
    socket.set_reuseaddr(true).map_err(bind_failed)?;

    socket.bind(addr).map_err(bind_failed)?;
    socket.listen(backlog).map_err(bind_failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let listener = bind_listener(SocketAddr::from(([127, 0, 0, 1], 0)), 5).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_in_use_port_fails() {
        // SO_REUSEADDR does not allow sharing a port that is already listening
        let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = holder.local_addr().unwrap();

        let err = bind_listener(addr, 5).unwrap_err();
        assert!(matches!(err, AppError::BindFailed { addr: a, .. } if a == addr));
    }
}
