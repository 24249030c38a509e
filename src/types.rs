//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers and small enums shared across modules:
//! - `SessionId`: UUID-based unique session identifier
//! - `SessionState`: lifecycle state of a single connection

use uuid::Uuid;

/// Sender label used for server-generated notices ("joined", "left").
pub const SYSTEM_SENDER: &str = "Server";

/// Unique session identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe session identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle state
///
/// Moves strictly forward: `Connecting → Authenticating → Active → Closed`.
/// A connection may also close straight from `Connecting` or `Authenticating`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authenticating,
    Active,
    Closed,
}

impl SessionState {
    /// Whether `next` is a legal successor of this state
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Connecting, Closed)
                | (Authenticating, Active)
                | (Authenticating, Closed)
                | (Active, Closed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_unique() {
        let id1 = SessionId::new();
        let id2 = SessionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_state_moves_forward_only() {
        use SessionState::*;
        assert!(Connecting.can_advance_to(Authenticating));
        assert!(Authenticating.can_advance_to(Active));
        assert!(Authenticating.can_advance_to(Closed));
        assert!(Active.can_advance_to(Closed));
        assert!(Connecting.can_advance_to(Closed));

        assert!(!Active.can_advance_to(Authenticating));
        assert!(!Closed.can_advance_to(Active));
        assert!(!Closed.can_advance_to(Closed));
        assert!(!Connecting.can_advance_to(Active));
    }
}
