//! The signed-in user's tokens and where they are kept.

use arc_swap::ArcSwapOption;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// The tokens of a signed-in user along with the identity derived from the ID token.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
    /// The `sub` claim of the ID token.
    pub user_id: String,
    pub username: String,
    /// Expiry of the ID token in seconds since the epoch.
    pub expires_at: i64,
}

impl Session {
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }
}

impl Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// The outcome of a session lookup.
///
/// Absence of a session is a regular state and never reported as an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    Authenticated(Session),
    Unauthenticated,
}

impl AuthState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            AuthState::Authenticated(session) => Some(session),
            AuthState::Unauthenticated => None,
        }
    }

    pub fn into_session(self) -> Option<Session> {
        match self {
            AuthState::Authenticated(session) => Some(session),
            AuthState::Unauthenticated => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }
}

/// Persistence for the current session.
pub trait SessionStore: Send + Sync {
    fn load(&self) -> Option<Arc<Session>>;

    fn store(&self, session: Session);

    /// Removes and returns the current session.
    fn clear(&self) -> Option<Arc<Session>>;
}

/// Keeps the session in memory only.
#[derive(Default)]
pub struct MemorySessionStore {
    session: ArcSwapOption<Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Option<Arc<Session>> {
        self.session.load_full()
    }

    fn store(&self, session: Session) {
        self.session.store(Some(Arc::new(session)));
    }

    fn clear(&self) -> Option<Arc<Session>> {
        self.session.swap(None)
    }
}
