//! Expiry reaper: periodic background sweep of idle sessions.
//!
//! Sleeps for a fixed interval, then runs one reap pass under the store's
//! structural lock. The loop is stopped cooperatively through a [`Notify`];
//! a stop request issued while a pass is running is picked up as soon as the
//! pass finishes, so shutdown latency is bounded by one interval.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::session::SessionStore;

/// Default interval between reap passes: 60 seconds.
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);

// ─────────────────────────────────────────────
// ExpiryReaper
// ─────────────────────────────────────────────

type PassFuture = Pin<Box<dyn Future<Output = usize> + Send>>;
type PassFn = dyn Fn(Arc<SessionStore>) -> PassFuture + Send + Sync;

/// Background task removing sessions idle beyond the store's timeout.
pub struct ExpiryReaper {
    store: Arc<SessionStore>,
    interval: Duration,
    shutdown: Arc<Notify>,
    pass: Box<PassFn>,
}

impl ExpiryReaper {
    pub fn new(store: Arc<SessionStore>, interval: Duration) -> Self {
        Self::with_pass(store, interval, |store| {
            Box::pin(async move { store.reap(Utc::now()).await })
        })
    }

    /// Build a reaper running `pass` on every tick in place of the default sweep.
    fn with_pass<F>(store: Arc<SessionStore>, interval: Duration, pass: F) -> Self
    where
        F: Fn(Arc<SessionStore>) -> PassFuture + Send + Sync + 'static,
    {
        Self {
            store,
            interval,
            shutdown: Arc::new(Notify::new()),
            pass: Box::new(pass),
        }
    }

    /// Run the sweep loop until [`stop`](Self::stop) is called.
    pub async fn run(&self) {
        info!(interval_s = self.interval.as_secs_f64(), "expiry reaper started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.tick().await;
                }
                _ = self.shutdown.notified() => {
                    info!("expiry reaper shutting down");
                    return;
                }
            }
        }
    }

    /// Request the loop to exit.
    ///
    /// The request is remembered if the loop is not currently waiting.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Spawn the loop onto the current Tokio runtime.
    pub fn spawn(self) -> ReaperHandle {
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(async move { self.run().await });
        ReaperHandle { shutdown, task }
    }

    /// Run one pass in its own task so a panic inside it cannot end the loop.
    async fn tick(&self) {
        let pass = (self.pass)(self.store.clone());
        match tokio::spawn(pass).await {
            Ok(removed) => debug!(removed, "reap pass finished"),
            Err(e) => error!(error = %e, "reap pass failed"),
        }
    }
}

// ─────────────────────────────────────────────
// ReaperHandle
// ─────────────────────────────────────────────

/// Owner of a spawned reaper loop.
pub struct ReaperHandle {
    shutdown: Arc<Notify>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the loop to stop and wait for it to exit.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.task.await {
            error!(error = %e, "expiry reaper task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
