//! Bounded in-memory session store.
//!
//! One `RwLock` guards the map structure. Inserts and removals (create,
//! delete, reap, clear) take the write side and are fully serialized; lookups
//! take the read side and hand out a cloned [`SessionHandle`], which stays
//! valid even if the entry is removed while the caller still holds it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AgentError, ErrorKind};
use crate::stats::{Stats, StatsAggregator};
use crate::types::Session;

/// Shared, individually locked session state.
///
/// The per-session mutex is only held for short synchronous sections and
/// never across an `.await`.
pub type SessionHandle = Arc<Mutex<Session>>;

/// Lock a session, recovering the data if a previous holder panicked.
pub fn lock_session(handle: &SessionHandle) -> MutexGuard<'_, Session> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bounded mapping of session id to session, with admission control.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    capacity: usize,
    idle_timeout: Duration,
    stats: Arc<StatsAggregator>,
}

impl SessionStore {
    /// Create an empty store admitting at most `capacity` sessions.
    pub fn new(capacity: usize, idle_timeout: Duration) -> Self {
        Self::with_stats(capacity, idle_timeout, Arc::new(StatsAggregator::new()))
    }

    /// Create a store that reports into an existing aggregator.
    pub fn with_stats(capacity: usize, idle_timeout: Duration, stats: Arc<StatsAggregator>) -> Self {
        SessionStore {
            sessions: RwLock::new(HashMap::new()),
            capacity,
            idle_timeout,
            stats,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// The aggregator this store and its pipelines report into.
    pub fn stats_aggregator(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    /// Admit a new session and return its id.
    ///
    /// When the store is full, one reap pass runs under the same lock before
    /// the request is refused with [`AgentError::CapacityExceeded`].
    pub async fn create(
        &self,
        owner_id: &str,
        system_prompt: Option<String>,
    ) -> Result<String, AgentError> {
        let mut sessions = self.sessions.write().await;

        if sessions.len() >= self.capacity {
            reap_locked(&mut sessions, Utc::now(), self.idle_timeout);

            if sessions.len() >= self.capacity {
                self.stats.record_error(ErrorKind::CapacityExceeded);
                return Err(AgentError::CapacityExceeded {
                    limit: self.capacity,
                });
            }
        }

        let session_id = Uuid::new_v4().to_string();
        let session = Session::new(session_id.clone(), owner_id, system_prompt);
        sessions.insert(session_id.clone(), Arc::new(Mutex::new(session)));
        let active = sessions.len();
        drop(sessions);

        self.stats.record_session_created();
        info!(
            session_id = %session_id,
            user_id = owner_id,
            active_sessions = active,
            "Session created"
        );

        Ok(session_id)
    }

    /// Look up a session by id.
    pub async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Remove a session. Absent ids are ignored; returns whether one was removed.
    pub async fn delete(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(session_id).is_some();
        if removed {
            info!(
                session_id,
                active_sessions = sessions.len(),
                "Session deleted"
            );
        }
        removed
    }

    /// Remove every session idle longer than the timeout at `now`.
    pub async fn reap(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        reap_locked(&mut sessions, now, self.idle_timeout)
    }

    /// Remove all sessions, returning how many were discarded.
    pub async fn clear(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Snapshot of lifetime counters plus the current store size.
    ///
    /// Uptime is measured from the oldest surviving session, so it drops to
    /// zero whenever the store is empty.
    pub async fn stats(&self, now: DateTime<Utc>) -> Stats {
        let sessions = self.sessions.read().await;
        let oldest = sessions
            .values()
            .map(|handle| lock_session(handle).created_at())
            .min()
            .unwrap_or(now);
        let uptime = (now - oldest).num_milliseconds().max(0) as f64 / 1000.0;
        self.stats.snapshot(sessions.len(), uptime)
    }
}

/// One reap pass over an already-locked map.
fn reap_locked(
    sessions: &mut HashMap<String, SessionHandle>,
    now: DateTime<Utc>,
    timeout: Duration,
) -> usize {
    let before = sessions.len();
    sessions.retain(|session_id, handle| {
        let expired = lock_session(handle).is_expired(now, timeout);
        if expired {
            debug!(session_id = %session_id, "Expired session cleaned up");
        }
        !expired
    });

    let removed = before - sessions.len();
    if removed > 0 {
        info!(
            expired_count = removed,
            active = sessions.len(),
            "Cleanup completed"
        );
    }
    removed
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, Usage};

    const TIMEOUT: Duration = Duration::from_secs(300);

    fn later(secs: i64) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(secs)
    }

    #[tokio::test]
    async fn test_create_session() {
        let store = SessionStore::new(10, TIMEOUT);
        let id = store
            .create("user-123", Some("Be helpful".into()))
            .await
            .unwrap();

        let handle = store.get(&id).await.unwrap();
        let session = lock_session(&handle);
        assert_eq!(session.id(), id);
        assert_eq!(session.owner_id(), "user-123");
        assert_eq!(session.system_prompt(), Some("Be helpful"));
        assert_eq!(store.stats_aggregator().total_sessions(), 1);
    }

    #[tokio::test]
    async fn test_ids_are_unique_uuids() {
        let store = SessionStore::new(10, TIMEOUT);
        let a = store.create("u", None).await.unwrap();
        let b = store.create("u", None).await.unwrap();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[tokio::test]
    async fn test_create_session_limit() {
        let store = SessionStore::new(10, TIMEOUT);
        for i in 0..10 {
            store.create(&format!("user-{i}"), None).await.unwrap();
        }

        let err = store.create("user-11", None).await.unwrap_err();
        assert_eq!(err, AgentError::CapacityExceeded { limit: 10 });
        assert_eq!(store.len().await, 10);
        assert_eq!(
            store.stats_aggregator().error_count(ErrorKind::CapacityExceeded),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_frees_slot() {
        let store = SessionStore::new(2, TIMEOUT);
        let a = store.create("a", None).await.unwrap();
        store.create("b", None).await.unwrap();
        assert_eq!(store.len().await, 2);

        assert!(store.create("c", None).await.is_err());

        assert!(store.delete(&a).await);
        assert!(store.create("c", None).await.is_ok());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_create_at_capacity_reaps_inline() {
        let store = SessionStore::new(1, Duration::ZERO);
        let stale = store.create("a", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let fresh = store.create("b", None).await.unwrap();
        assert!(store.get(&stale).await.is_none());
        assert!(store.get(&fresh).await.is_some());
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_noop() {
        let store = SessionStore::new(2, TIMEOUT);
        store.create("a", None).await.unwrap();
        let before = store.stats(Utc::now()).await;

        assert!(!store.delete("missing").await);

        let after = store.stats(Utc::now()).await;
        assert_eq!(before.total_sessions, after.total_sessions);
        assert_eq!(before.active_sessions, after.active_sessions);
        assert_eq!(before.errors, after.errors);
    }

    #[tokio::test]
    async fn test_reap_removes_only_idle_sessions() {
        let store = SessionStore::new(10, TIMEOUT);
        let idle = store.create("user-1", None).await.unwrap();
        let active = store.create("user-2", None).await.unwrap();

        // Keep one session fresh relative to the reap clock.
        tokio::time::sleep(Duration::from_millis(20)).await;
        lock_session(&store.get(&active).await.unwrap()).add_message(Message::user("hi"));

        let idle_created = lock_session(&store.get(&idle).await.unwrap()).last_activity();
        let now = idle_created + chrono::Duration::seconds(300) + chrono::Duration::milliseconds(10);

        assert_eq!(store.reap(now).await, 1);
        assert!(store.get(&idle).await.is_none());
        assert!(store.get(&active).await.is_some());
    }

    #[tokio::test]
    async fn test_reap_within_timeout_keeps_everything() {
        let store = SessionStore::new(10, TIMEOUT);
        store.create("a", None).await.unwrap();
        store.create("b", None).await.unwrap();

        assert_eq!(store.reap(later(299)).await, 0);
        assert_eq!(store.len().await, 2);
        assert_eq!(store.reap(later(301)).await, 2);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_handle_survives_removal() {
        let store = SessionStore::new(10, TIMEOUT);
        let id = store.create("a", None).await.unwrap();
        let handle = store.get(&id).await.unwrap();

        assert_eq!(store.clear().await, 1);
        lock_session(&handle).record_usage(&Usage::new(1, 1));
        assert_eq!(lock_session(&handle).usage().total(), 2);
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let store = SessionStore::new(10, TIMEOUT);
        store.create("user-1", None).await.unwrap();
        store.create("user-2", None).await.unwrap();

        let stats = store.stats(later(5)).await;
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.total_requests, 0);
        assert!(stats.uptime_seconds >= 4.0);
    }

    #[tokio::test]
    async fn test_uptime_is_zero_when_empty() {
        let store = SessionStore::new(10, TIMEOUT);
        let id = store.create("a", None).await.unwrap();
        store.delete(&id).await;

        let stats = store.stats(Utc::now()).await;
        assert_eq!(stats.active_sessions, 0);
        assert_eq!(stats.uptime_seconds, 0.0);
        assert_eq!(stats.total_sessions, 1);
    }
}
