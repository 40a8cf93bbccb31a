//! Server-side sessions keyed by an opaque cookie value

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Default session lifetime (31 days)
pub const DEFAULT_SESSION_LIFETIME_SECS: i64 = 31 * 24 * 60 * 60;

/// Default number of live sessions one user may hold
pub const DEFAULT_MAX_SESSIONS_PER_USER: usize = 16;

/// State recorded for a client at login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub vault_path: String,
    /// Token last issued to this session
    pub token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A session created by a successful login, valid for `lifetime`
    pub fn login(username: String, vault_path: String, token: String, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            username,
            vault_path,
            token: Some(token),
            created_at: now,
            expires_at: now + lifetime,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// In-memory session store.
///
/// Holds at most `max_per_user` live sessions per username; a login beyond
/// that evicts the user's oldest sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    lifetime: Duration,
    max_per_user: usize,
}

impl SessionStore {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            lifetime,
            max_per_user: DEFAULT_MAX_SESSIONS_PER_USER,
        }
    }

    /// Set the per-user session cap (at least one)
    pub fn with_max_per_user(mut self, max_per_user: usize) -> Self {
        self.max_per_user = max_per_user.max(1);
        self
    }

    /// Lifetime given to new sessions
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn max_per_user(&self) -> usize {
        self.max_per_user
    }

    pub async fn create_session(&self, session: Session) -> String {
        let session_id = Uuid::new_v4().simple().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.insert(session_id.clone(), session);
        session_id
    }

    /// Store `session` under a fresh id, discarding `previous` if given.
    ///
    /// Expired sessions are dropped, and the user's oldest sessions are
    /// evicted so the new one stays within `max_per_user`.
    pub async fn establish(&self, previous: Option<&str>, session: Session) -> String {
        let session_id = Uuid::new_v4().simple().to_string();
        let mut sessions = self.sessions.write().await;

        if let Some(old) = previous {
            sessions.remove(old);
        }

        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        let pruned = before - sessions.len();
        if pruned > 0 {
            debug!("Pruned {} expired sessions", pruned);
        }

        let mut owned: Vec<(String, DateTime<Utc>)> = sessions
            .iter()
            .filter(|(_, s)| s.username == session.username)
            .map(|(id, s)| (id.clone(), s.created_at))
            .collect();
        if owned.len() >= self.max_per_user {
            owned.sort_by_key(|(_, created_at)| *created_at);
            let excess = owned.len() + 1 - self.max_per_user;
            for (id, _) in owned.into_iter().take(excess) {
                sessions.remove(&id);
            }
            debug!("Evicted {} oldest sessions for {}", excess, session.username);
        }

        sessions.insert(session_id.clone(), session);
        session_id
    }

    /// Look up a live session; expired sessions are removed and reported absent
    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(session) if !session.is_expired() => return Some(session.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        debug!("Session expired");
        self.delete_session(session_id).await;
        None
    }

    pub async fn delete_session(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
    }

    /// Drop every expired session, returning how many were removed
    pub async fn prune_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_SESSION_LIFETIME_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice(lifetime: Duration) -> Session {
        Session::login(
            "alice".to_string(),
            "/vaults/alice".to_string(),
            "T".to_string(),
            lifetime,
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = SessionStore::default();
        let id = store.create_session(alice(store.lifetime())).await;
        assert!(!id.is_empty());

        let session = store.get_session(&id).await.unwrap();
        assert_eq!(session.username, "alice");
        assert_eq!(session.token.as_deref(), Some("T"));
        assert!(session.expires_at > session.created_at);
    }

    #[tokio::test]
    async fn test_establish_replaces_previous() {
        let store = SessionStore::default();
        let first = store.create_session(alice(store.lifetime())).await;
        let second = store.establish(Some(&first), alice(store.lifetime())).await;

        assert_ne!(first, second);
        assert!(store.get_session(&first).await.is_none());
        assert!(store.get_session(&second).await.is_some());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_session_is_absent() {
        let store = SessionStore::default();
        let id = store.create_session(alice(Duration::seconds(-1))).await;

        assert!(store.get_session(&id).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_prune_expired() {
        let store = SessionStore::default();
        store.create_session(alice(Duration::seconds(-1))).await;
        store.create_session(alice(Duration::hours(1))).await;

        assert_eq!(store.prune_expired().await, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_establish_caps_sessions_per_user() {
        let store = SessionStore::default().with_max_per_user(2);
        let created_minutes_ago = |minutes: i64| {
            let mut session = alice(store.lifetime());
            session.created_at = Utc::now() - Duration::minutes(minutes);
            session
        };

        let first = store.establish(None, created_minutes_ago(3)).await;
        let second = store.establish(None, created_minutes_ago(2)).await;
        let third = store.establish(None, created_minutes_ago(1)).await;

        assert_eq!(store.len().await, 2);
        assert!(store.get_session(&first).await.is_none());
        assert!(store.get_session(&second).await.is_some());
        assert!(store.get_session(&third).await.is_some());

        let mut bob = alice(store.lifetime());
        bob.username = "bob".to_string();
        store.establish(None, bob).await;
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_establish_prunes_expired() {
        let store = SessionStore::default();
        store.create_session(alice(Duration::seconds(-1))).await;

        store.establish(None, alice(store.lifetime())).await;
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let store = SessionStore::default();
        assert!(store.get_session("nope").await.is_none());
    }
}
