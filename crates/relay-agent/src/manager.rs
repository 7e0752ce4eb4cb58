//! Agent manager: the public face of the session service.
//!
//! Owns the session store, the two pipelines and the expiry reaper, and
//! sequences shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;

use relay_core::config::Config;
use relay_core::error::{AgentError, ProviderError};
use relay_core::reaper::{ExpiryReaper, ReaperHandle};
use relay_core::session::{SessionHandle, SessionStore};
use relay_core::stats::Stats;
use relay_providers::anthropic::AnthropicProvider;
use relay_providers::traits::CompletionProvider;

use crate::pipeline::{RequestOptions, RequestOutcome, RequestPipeline};
use crate::retry::RetryPolicy;
use crate::stream::{EventStream, StreamPipeline};

pub struct AgentManager {
    store: Arc<SessionStore>,
    provider: Arc<dyn CompletionProvider>,
    requests: RequestPipeline,
    streams: StreamPipeline,
    shutting_down: AtomicBool,
    reaper: Mutex<Option<ReaperHandle>>,
}

impl AgentManager {
    /// Build a manager and start its expiry reaper.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &Config, provider: Arc<dyn CompletionProvider>) -> Self {
        let store = Arc::new(SessionStore::new(
            config.sessions.max_sessions,
            config.sessions.idle_timeout(),
        ));

        let requests = RequestPipeline::new(
            store.clone(),
            provider.clone(),
            RetryPolicy::from_config(&config.retry),
            config.defaults.clone(),
        );
        let streams = StreamPipeline::new(store.clone(), provider.clone(), config.defaults.clone());

        let reaper = ExpiryReaper::new(store.clone(), config.sessions.reap_interval()).spawn();

        info!(
            provider = provider.display_name(),
            model = provider.model(),
            max_sessions = config.sessions.max_sessions,
            idle_timeout_s = config.sessions.idle_timeout_secs,
            "AgentManager initialized"
        );

        Self {
            store,
            provider,
            requests,
            streams,
            shutting_down: AtomicBool::new(false),
            reaper: Mutex::new(Some(reaper)),
        }
    }

    /// Build a manager backed by the Anthropic provider from `config.provider`.
    pub fn from_config(config: &Config) -> Result<Self, ProviderError> {
        let provider = AnthropicProvider::new(&config.provider)?;
        Ok(Self::new(config, Arc::new(provider)))
    }

    pub fn provider(&self) -> &dyn CompletionProvider {
        self.provider.as_ref()
    }

    /// Open a new session for `user_id`.
    pub async fn create_session(
        &self,
        user_id: &str,
        system_prompt: Option<String>,
    ) -> Result<String, AgentError> {
        self.store.create(user_id, system_prompt).await
    }

    /// Drop a session. Unknown ids are ignored.
    pub async fn delete_session(&self, session_id: &str) -> bool {
        self.store.delete(session_id).await
    }

    /// Look up a live session.
    pub async fn session(&self, session_id: &str) -> Option<SessionHandle> {
        self.store.get(session_id).await
    }

    pub async fn process_request(
        &self,
        session_id: &str,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<RequestOutcome, AgentError> {
        self.requests.process(session_id, prompt, options).await
    }

    pub async fn stream_response(
        &self,
        session_id: &str,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<EventStream, AgentError> {
        self.streams.stream(session_id, prompt, options).await
    }

    pub async fn get_stats(&self) -> Stats {
        self.store.stats(Utc::now()).await
    }

    /// Whether new work should be routed here.
    pub fn is_ready(&self) -> bool {
        !self.shutting_down.load(Ordering::SeqCst)
    }

    /// Stop accepting work, stop the reaper, then discard all sessions.
    ///
    /// In-flight requests are not waited for. Calling this again is a no-op
    /// apart from logging.
    pub async fn shutdown(&self) {
        info!("Starting graceful shutdown...");
        self.shutting_down.store(true, Ordering::SeqCst);

        if let Some(reaper) = self.reaper.lock().await.take() {
            reaper.stop().await;
        }

        let count = self.store.clear().await;
        info!(count, "All sessions closed");
        info!("Shutdown complete");
    }

    /// Whether the background reaper is still running.
    pub async fn reaper_running(&self) -> bool {
        self.reaper
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
