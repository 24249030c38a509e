//! Connection handler
//!
//! Runs one client's lifecycle: credential handshake, registration,
//! the read loop that feeds the broadcaster, and cleanup on disconnect.
//!
//! Output to an Active client goes through a bounded queue drained by a
//! dedicated writer task, so broadcasters never touch the socket directly.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::registry::Outbound;
use crate::server::ServerContext;
use crate::types::{SessionId, SessionState};

pub const USERNAME_PROMPT: &str = "Username: ";
pub const PASSWORD_PROMPT: &str = "Password: ";
pub const AUTH_FAILED: &str = "Authentication failed.\n";
pub const QUIT_COMMAND: &str = "/quit";

type LineReader = FramedRead<OwnedReadHalf, LinesCodec>;

/// Per-connection state
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: String,
    username: Option<String>,
    state: SessionState,
}

impl Session {
    pub fn new(peer: String) -> Self {
        Self {
            id: SessionId::new(),
            peer,
            username: None,
            state: SessionState::Connecting,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
    }

    pub fn begin_handshake(&mut self) {
        self.advance(SessionState::Authenticating);
    }

    pub fn activate(&mut self, username: String) {
        self.username = Some(username);
        self.advance(SessionState::Active);
    }

    /// Move to Closed
    ///
    /// Returns true only on the first call made while Active, i.e. when the
    /// caller still owes the registry cleanup and departure notice.
    pub fn close(&mut self) -> bool {
        match self.state {
            SessionState::Closed => false,
            SessionState::Active => {
                self.advance(SessionState::Closed);
                true
            }
            _ => {
                self.advance(SessionState::Closed);
                false
            }
        }
    }
}

/// Handle a new TCP connection
///
/// Authentication failures are handled here and return `Ok`; the error
/// returned (if any) is the I/O failure that ended an Active session,
/// reported after cleanup has already run.
pub async fn handle_connection(stream: TcpStream, ctx: Arc<ServerContext>) -> Result<(), AppError> {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut session = Session::new(peer);
    session.begin_handshake();
    debug!("Session {} connecting from {}", session.id, session.peer);

    let config = &ctx.config;
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(config.max_line_length));

    let username = match authenticate(&mut lines, &mut write_half, &ctx).await {
        Ok(username) => username,
        Err(e) => {
            warn!("Session {} from {} rejected: {}", session.id, session.peer, e);
            // Best effort: the peer may already be gone
            let _ = time::timeout(config.send_timeout, write_half.write_all(AUTH_FAILED.as_bytes())).await;
            let _ = time::timeout(config.send_timeout, write_half.shutdown()).await;
            session.close();
            return Ok(());
        }
    };

    let welcome = format!("Welcome, {username}!\n");
    if let Err(e) = write_half.write_all(welcome.as_bytes()).await {
        session.close();
        return Err(e.into());
    }

    let (tx, rx) = mpsc::channel::<String>(config.outbound_buffer);
    ctx.broadcaster
        .registry()
        .register(session.id, &username, Outbound::new(tx));
    session.activate(username.clone());
    info!("Session {} from {} authenticated as '{}'", session.id, session.peer, username);

    let mut writer = tokio::spawn(write_outbound(write_half, rx, config.send_timeout));
    ctx.broadcaster.announce_join(&username).await;

    let result = read_loop(&mut lines, &mut writer, &ctx, &username).await;

    if session.close() {
        ctx.broadcaster.depart(session.id).await;
    }

    // Unregistering dropped the queue's sender, so the writer ends once it
    // has flushed what was already delivered to this session
    if !writer.is_finished() && time::timeout(config.send_timeout, &mut writer).await.is_err() {
        debug!("Writer for '{}' did not drain in time", username);
        writer.abort();
    }
    info!("Session {} ('{}') disconnected", session.id, username);

    match result {
        Err(AppError::PeerDisconnected) => Ok(()),
        other => other,
    }
}

/// Prompt for username and password and check them against the store
async fn authenticate(
    lines: &mut LineReader,
    writer: &mut OwnedWriteHalf,
    ctx: &ServerContext,
) -> Result<String, AppError> {
    let deadline = ctx.config.handshake_timeout;

    let username = prompt(lines, writer, USERNAME_PROMPT, deadline).await?;
    if username.is_empty() {
        return Err(AppError::AuthRejected);
    }

    let password = prompt(lines, writer, PASSWORD_PROMPT, deadline).await?;
    if password.is_empty() || !ctx.credentials.verify(&username, &password) {
        return Err(AppError::AuthRejected);
    }

    Ok(username)
}

/// Send `text` and read one trimmed line back within `deadline`
async fn prompt(
    lines: &mut LineReader,
    writer: &mut OwnedWriteHalf,
    text: &str,
    deadline: Duration,
) -> Result<String, AppError> {
    writer.write_all(text.as_bytes()).await?;
    match time::timeout(deadline, lines.next()).await {
        Err(_) => Err(AppError::HandshakeTimeout),
        Ok(None) => Err(AppError::PeerDisconnected),
        Ok(Some(line)) => Ok(line?.trim().to_string()),
    }
}

/// Read chat lines until quit, disconnect, or the writer task dies
async fn read_loop(
    lines: &mut LineReader,
    writer: &mut tokio::task::JoinHandle<io::Result<()>>,
    ctx: &ServerContext,
    username: &str,
) -> Result<(), AppError> {
    loop {
        tokio::select! {
            next = lines.next() => {
                let line = match next {
                    None => return Err(AppError::PeerDisconnected),
                    Some(Err(LinesCodecError::Io(e))) if is_disconnect(&e) => {
                        return Err(AppError::PeerDisconnected);
                    }
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(line)) => line,
                };

                let text = line.trim();
                if text.eq_ignore_ascii_case(QUIT_COMMAND) {
                    debug!("'{}' sent {}", username, QUIT_COMMAND);
                    return Ok(());
                }
                if text.is_empty() {
                    continue;
                }

                ctx.broadcaster
                    .broadcast(&format!("[{username}]: {text}"), username)
                    .await;
            }
            finished = &mut *writer => {
                debug!("Writer task ended for '{}'", username);
                return match finished {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.into()),
                    Err(e) => Err(io::Error::other(e).into()),
                };
            }
        }
    }
}

/// Drain the outbound queue into the socket
///
/// Ends on the first write error or when a write exceeds `deadline`.
async fn write_outbound(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<String>,
    deadline: Duration,
) -> io::Result<()> {
    while let Some(message) = rx.recv().await {
        let line = format!("{message}\n");
        time::timeout(deadline, writer.write_all(line.as_bytes()))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "send deadline exceeded"))??;
    }
    writer.shutdown().await
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted | io::ErrorKind::BrokenPipe
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_starts_connecting() {
        let session = Session::new("127.0.0.1:5000".to_string());
        assert_eq!(session.state(), SessionState::Connecting);
        assert!(session.username().is_none());
    }

    #[test]
    fn test_close_after_active_owes_cleanup_once() {
        let mut session = Session::new("peer".to_string());
        session.begin_handshake();
        session.activate("aiba".to_string());
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.username(), Some("aiba"));

        assert!(session.close());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.close());
    }

    #[test]
    fn test_close_before_handshake_owes_nothing() {
        let mut session = Session::new("peer".to_string());
        assert!(!session.close());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_close_during_handshake_owes_nothing() {
        let mut session = Session::new("peer".to_string());
        session.begin_handshake();
        assert!(!session.close());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_quit_matching() {
        for input in ["/quit", "/QUIT", "  /Quit  "] {
            assert!(input.trim().eq_ignore_ascii_case(QUIT_COMMAND));
        }
        assert!(!"/quitnow".trim().eq_ignore_ascii_case(QUIT_COMMAND));
    }
}
