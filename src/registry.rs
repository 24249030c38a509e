//! Session registry
//!
//! The shared map of Active sessions. All access goes through one
//! `std::sync::Mutex`; the lock is never held across an `.await`, and
//! broadcasters iterate over a `snapshot()` rather than the live map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::SendError;
use crate::types::SessionId;

/// Handle through which the broadcaster reaches one session
///
/// Wraps the sending side of the session's outbound queue; the socket itself
/// stays with the session's writer task.
#[derive(Debug, Clone)]
pub struct Outbound {
    sender: mpsc::Sender<String>,
}

impl Outbound {
    pub fn new(sender: mpsc::Sender<String>) -> Self {
        Self { sender }
    }

    /// Queue one line for delivery, waiting at most `deadline` for room
    pub async fn send(&self, line: String, deadline: std::time::Duration) -> Result<(), SendError> {
        self.sender
            .send_timeout(line, deadline)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => SendError::TimedOut,
                mpsc::error::SendTimeoutError::Closed(_) => SendError::ChannelClosed,
            })
    }
}

/// One registry entry as seen by a snapshot
#[derive(Debug, Clone)]
pub struct Registration {
    pub session_id: SessionId,
    pub username: String,
    pub outbound: Outbound,
}

/// Shared session → username mapping
///
/// Cheap to clone; all clones refer to the same map.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<SessionId, (String, Outbound)>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, (String, Outbound)>> {
        // Every mutation is a single insert/remove, so a poisoned map is still consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an Active session
    pub fn register(&self, session_id: SessionId, username: &str, outbound: Outbound) {
        let mut sessions = self.lock();
        sessions.insert(session_id, (username.to_string(), outbound));
        debug!("Registered session {} as '{}' ({} active)", session_id, username, sessions.len());
    }

    /// Remove a session, returning its username if it was present
    ///
    /// Returns `None` on a second call for the same session.
    pub fn unregister(&self, session_id: SessionId) -> Option<String> {
        let mut sessions = self.lock();
        let removed = sessions.remove(&session_id).map(|(username, _)| username);
        if removed.is_some() {
            debug!("Unregistered session {} ({} active)", session_id, sessions.len());
        }
        removed
    }

    /// Copy of all current entries, taken under the lock
    pub fn snapshot(&self) -> Vec<Registration> {
        self.lock()
            .iter()
            .map(|(id, (username, outbound))| Registration {
                session_id: *id,
                username: username.clone(),
                outbound: outbound.clone(),
            })
            .collect()
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.lock().contains_key(&session_id)
    }

    /// Usernames of all Active sessions (duplicates kept, order unspecified)
    pub fn usernames(&self) -> Vec<String> {
        self.lock().values().map(|(username, _)| username.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
