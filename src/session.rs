// In-memory session storage for the web front-end
// Owns per-browser OAuth state and token sets; the auth core stays stateless

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::auth::{OAuthRequestContext, TokenSet};

/// Idle lifetime of a session when none is configured (seconds)
pub const DEFAULT_IDLE_TTL: u64 = 24 * 60 * 60;

/// Per-session data
#[derive(Debug, Clone)]
pub struct Session {
    /// Authorization request awaiting its callback
    pub pending_state: Option<OAuthRequestContext>,

    /// Current token set, replaced wholesale on refresh
    pub tokens: Option<TokenSet>,

    last_seen: Instant,

    /// Serializes check-then-refresh; refresh tokens are single use
    refresh_lock: Arc<Mutex<()>>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            pending_state: None,
            tokens: None,
            last_seen: Instant::now(),
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }
}

/// Session id carried in the session cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

/// Thread-safe session store with idle expiry
///
/// Sessions are only created by an explicit `create` (login). Updates never
/// resurrect a session that was cleared or expired in the meantime.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_IDLE_TTL))
    }
}

impl SessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            idle_ttl,
        }
    }

    /// Start an empty session and return its id
    pub fn create(&self) -> SessionId {
        self.prune_expired();

        let id = uuid::Uuid::new_v4().to_string();
        self.sessions.insert(id.clone(), Session::default());
        tracing::debug!(session = %&id[..8], "Session created");
        SessionId(id)
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(&id.0)
    }

    /// Mark the session as used; `false` if it is unknown or has idled out
    pub fn touch(&self, id: &SessionId) -> bool {
        let ttl = self.idle_ttl;
        if self
            .sessions
            .remove_if(&id.0, |_, session| session.last_seen.elapsed() > ttl)
            .is_some()
        {
            tracing::debug!(session = %short(&id.0), "Session expired");
            return false;
        }

        match self.sessions.get_mut(&id.0) {
            Some(mut session) => {
                session.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Drop every session idle for longer than the TTL
    pub fn prune_expired(&self) {
        let ttl = self.idle_ttl;
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.last_seen.elapsed() <= ttl);

        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::debug!(removed, "Pruned idle sessions");
        }
    }

    /// Remember the state issued with an authorization URL
    pub fn set_pending_state(&self, id: &SessionId, context: OAuthRequestContext) -> bool {
        match self.sessions.get_mut(&id.0) {
            Some(mut session) => {
                session.pending_state = Some(context);
                true
            }
            None => false,
        }
    }

    /// Remove and return the pending state (single use)
    pub fn take_pending_state(&self, id: &SessionId) -> Option<OAuthRequestContext> {
        self.sessions
            .get_mut(&id.0)
            .and_then(|mut session| session.pending_state.take())
    }

    /// Store a token set; `false` if the session no longer exists
    pub fn set_tokens(&self, id: &SessionId, tokens: TokenSet) -> bool {
        match self.sessions.get_mut(&id.0) {
            Some(mut session) => {
                session.tokens = Some(tokens);
                true
            }
            None => false,
        }
    }

    pub fn tokens(&self, id: &SessionId) -> Option<TokenSet> {
        self.sessions
            .get(&id.0)
            .and_then(|session| session.tokens.clone())
    }

    /// Lock guarding token refresh for one session
    pub fn refresh_lock(&self, id: &SessionId) -> Option<Arc<Mutex<()>>> {
        self.sessions
            .get(&id.0)
            .map(|session| Arc::clone(&session.refresh_lock))
    }

    /// Drop everything held for the session (logout)
    pub fn clear(&self, id: &SessionId) {
        self.sessions.remove(&id.0);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
