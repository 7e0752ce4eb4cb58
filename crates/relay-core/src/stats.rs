//! Process-wide lifetime counters fed by the session store and pipelines.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use crate::error::ErrorKind;
use crate::types::Usage;

/// Monotonic counters shared by every pipeline.
///
/// The active-session count is not tracked here; it is read from the store
/// when a snapshot is taken so it always equals the store size.
#[derive(Debug, Default)]
pub struct StatsAggregator {
    total_requests: AtomicU64,
    total_tokens: AtomicU64,
    total_sessions: AtomicU64,
    errors: Mutex<BTreeMap<ErrorKind, u64>>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one successful completion and its tokens.
    pub fn record_request(&self, usage: &Usage) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_tokens
            .fetch_add(usage.total_tokens(), Ordering::Relaxed);
    }

    pub fn record_session_created(&self) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, kind: ErrorKind) {
        let mut errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        *errors.entry(kind).or_insert(0) += 1;
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens.load(Ordering::Relaxed)
    }

    pub fn total_sessions(&self) -> u64 {
        self.total_sessions.load(Ordering::Relaxed)
    }

    pub fn error_count(&self, kind: ErrorKind) -> u64 {
        let errors = self.errors.lock().unwrap_or_else(PoisonError::into_inner);
        errors.get(&kind).copied().unwrap_or(0)
    }

    /// Build a point-in-time snapshot.
    pub fn snapshot(&self, active_sessions: usize, uptime_seconds: f64) -> Stats {
        let errors = self
            .errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Stats {
            total_requests: self.total_requests(),
            total_tokens: self.total_tokens(),
            total_sessions: self.total_sessions(),
            active_sessions,
            errors,
            uptime_seconds,
        }
    }
}

/// Serializable stats snapshot.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Stats {
    pub total_requests: u64,
    pub total_tokens: u64,
    pub total_sessions: u64,
    pub active_sessions: usize,
    pub errors: BTreeMap<ErrorKind, u64>,
    /// Age of the oldest surviving session; zero when the store is empty.
    pub uptime_seconds: f64,
}
