//! Request pipeline: one synchronous exchange against a session, with retry.
//!
//! The user message is appended once, before the first attempt. If every
//! attempt fails it stays in the history without an assistant reply.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use relay_core::config::RequestDefaults;
use relay_core::error::AgentError;
use relay_core::session::{lock_session, SessionStore};
use relay_core::types::{Message, Session, TokenUsage, ToolDefinition};
use relay_providers::traits::{Completion, CompletionProvider, CompletionRequest};

use crate::retry::RetryPolicy;

/// Per-call overrides. Unset fields fall back to the configured defaults.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    /// Takes precedence over the session's own system prompt.
    pub system_prompt: Option<String>,
    pub tools: Vec<ToolDefinition>,
}

impl RequestOptions {
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Build the provider request from the session's full history.
    ///
    /// System prompt precedence: per-call override, then the session's
    /// prompt, then the configured default.
    pub(crate) fn build_request(
        &self,
        session: &Session,
        defaults: &RequestDefaults,
    ) -> CompletionRequest {
        let system = self
            .system_prompt
            .as_deref()
            .or_else(|| session.system_prompt())
            .unwrap_or(defaults.system_prompt.as_str())
            .to_string();

        CompletionRequest {
            messages: session.messages().to_vec(),
            system,
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            tools: self.tools.clone(),
        }
    }
}

/// Result of a successful [`RequestPipeline::process`] call.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestOutcome {
    pub content: String,
    pub usage: TokenUsage,
    /// Session history length after the reply was appended.
    pub message_count: usize,
}

// ─────────────────────────────────────────────
// RequestPipeline
// ─────────────────────────────────────────────

pub struct RequestPipeline {
    store: Arc<SessionStore>,
    provider: Arc<dyn CompletionProvider>,
    retry: RetryPolicy,
    defaults: RequestDefaults,
}

impl RequestPipeline {
    pub fn new(
        store: Arc<SessionStore>,
        provider: Arc<dyn CompletionProvider>,
        retry: RetryPolicy,
        defaults: RequestDefaults,
    ) -> Self {
        Self {
            store,
            provider,
            retry,
            defaults,
        }
    }

    /// Send `prompt` in the given session and wait for the full reply.
    ///
    /// Transient upstream failures are retried per the [`RetryPolicy`];
    /// the last error is returned verbatim once the budget is spent. Every
    /// returned error bumps the counter for its kind.
    pub async fn process(
        &self,
        session_id: &str,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<RequestOutcome, AgentError> {
        let result = self.run(session_id, prompt, options).await;
        if let Err(e) = &result {
            self.store.stats_aggregator().record_error(e.kind());
        }
        result
    }

    async fn run(
        &self,
        session_id: &str,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<RequestOutcome, AgentError> {
        let handle = self
            .store
            .get(session_id)
            .await
            .ok_or_else(|| AgentError::SessionNotFound(session_id.to_string()))?;

        let request = {
            let mut session = lock_session(&handle);
            session.add_message(Message::user(prompt));
            options.build_request(&session, &self.defaults)
        };

        debug!(
            session_id,
            model = self.provider.model(),
            messages = request.messages.len(),
            max_tokens = request.max_tokens,
            "Processing request"
        );

        let completion = self.complete_with_retry(session_id, &request).await?;
        let content = completion.text();

        let message_count = {
            let mut session = lock_session(&handle);
            session.add_message(Message::assistant(content.clone()));
            session.record_usage(&completion.usage);
            session.message_count()
        };
        self.store.stats_aggregator().record_request(&completion.usage);

        debug!(
            session_id,
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            "Request completed"
        );

        Ok(RequestOutcome {
            content,
            usage: completion.usage.into(),
            message_count,
        })
    }

    async fn complete_with_retry(
        &self,
        session_id: &str,
        request: &CompletionRequest,
    ) -> Result<Completion, AgentError> {
        let mut attempt = 1;
        loop {
            let err = match self.provider.complete(request).await {
                Ok(completion) => return Ok(completion),
                Err(e) => AgentError::from(e),
            };

            if !err.is_retryable() || attempt >= self.retry.max_attempts() {
                error!(session_id, attempt, error = %err, "Request failed");
                return Err(err);
            }

            let delay = self.retry.delay_for_attempt(attempt);
            warn!(
                session_id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Upstream call failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::ScriptedProvider;
    use relay_core::error::{ErrorKind, ProviderError};
    use relay_core::types::{Role, Usage};
    use relay_providers::traits::ContentBlock;

    fn setup(provider: Arc<ScriptedProvider>, attempts: u32) -> (Arc<SessionStore>, RequestPipeline) {
        setup_with_policy(provider, RetryPolicy::immediate(attempts))
    }

    fn setup_with_policy(
        provider: Arc<ScriptedProvider>,
        retry: RetryPolicy,
    ) -> (Arc<SessionStore>, RequestPipeline) {
        let store = Arc::new(SessionStore::new(10, Duration::from_secs(300)));
        let pipeline =
            RequestPipeline::new(store.clone(), provider, retry, RequestDefaults::default());
        (store, pipeline)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_wait_for_backoff() {
        let provider = Arc::new(ScriptedProvider::new());
        for _ in 0..3 {
            provider.push_error(ProviderError::transient("overloaded"));
        }
        let (store, pipeline) = setup_with_policy(provider.clone(), RetryPolicy::default());
        let id = store.create("user-1", None).await.unwrap();

        let started = tokio::time::Instant::now();
        let err = pipeline
            .process(&id, "hi", &RequestOptions::default())
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, AgentError::UpstreamTransient(_)));
        assert_eq!(provider.calls(), 3);
        // Two sleeps of the 2 s floor, none after the last attempt.
        assert!(elapsed >= Duration::from_secs(4), "waited only {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "waited {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_one_failure_waits_once() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_error(ProviderError::transient("overloaded"));
        provider.push_reply("ok", Usage::new(1, 1));
        let (store, pipeline) = setup_with_policy(provider.clone(), RetryPolicy::default());
        let id = store.create("user-1", None).await.unwrap();

        let started = tokio::time::Instant::now();
        let outcome = pipeline
            .process(&id, "hi", &RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.content, "ok");
        assert_eq!(provider.calls(), 2);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_three_exchanges_accumulate_usage() {
        let provider = Arc::new(ScriptedProvider::new());
        for _ in 0..3 {
            provider.push_reply("ok", Usage::new(10, 20));
        }
        let (store, pipeline) = setup(provider, 3);
        let id = store.create("user-1", None).await.unwrap();

        for i in 1..=3 {
            let outcome = pipeline
                .process(&id, "hi", &RequestOptions::default())
                .await
                .unwrap();
            assert_eq!(outcome.content, "ok");
            assert_eq!(outcome.usage.total(), 30);
            assert_eq!(outcome.message_count, i * 2);
        }

        let handle = store.get(&id).await.unwrap();
        let session = lock_session(&handle);
        assert_eq!(session.usage().total(), 90);
        assert_eq!(session.usage().total(), session.usage().input() + session.usage().output());
        assert_eq!(session.message_count(), 6);
        assert_eq!(session.messages()[4].role, Role::User);
        assert_eq!(session.messages()[5].role, Role::Assistant);
        drop(session);

        let stats = store.stats_aggregator();
        assert_eq!(stats.total_requests(), 3);
        assert_eq!(stats.total_tokens(), 90);
    }

    #[tokio::test]
    async fn test_exhausted_retries_leave_unanswered_turn() {
        let provider = Arc::new(ScriptedProvider::new());
        for i in 1..=3 {
            provider.push_error(ProviderError::transient(format!("overloaded {i}")));
        }
        let (store, pipeline) = setup(provider.clone(), 3);
        let id = store.create("user-1", None).await.unwrap();

        let err = pipeline
            .process(&id, "hi", &RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err, AgentError::UpstreamTransient("overloaded 3".into()));
        assert_eq!(provider.calls(), 3);

        let handle = store.get(&id).await.expect("session survives failures");
        let session = lock_session(&handle);
        assert_eq!(session.message_count() % 2, 1);
        assert_eq!(session.message_count(), 1);
        assert_eq!(session.usage().total(), 0);
        drop(session);

        let stats = store.stats_aggregator();
        assert_eq!(stats.error_count(ErrorKind::UpstreamTransient), 1);
        assert_eq!(stats.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_error(ProviderError::transient("rate limited"));
        provider.push_reply("recovered", Usage::new(1, 2));
        let (store, pipeline) = setup(provider.clone(), 3);
        let id = store.create("user-1", None).await.unwrap();

        let outcome = pipeline
            .process(&id, "hi", &RequestOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.content, "recovered");
        assert_eq!(outcome.message_count, 2);
        assert_eq!(provider.calls(), 2);
        // The user turn is sent once, not once per attempt.
        assert_eq!(provider.requests()[1].messages.len(), 1);
        assert_eq!(store.stats_aggregator().error_count(ErrorKind::UpstreamTransient), 0);
    }

    #[tokio::test]
    async fn test_fatal_error_not_retried() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_error(ProviderError::fatal("invalid x-api-key"));
        provider.push_reply("never", Usage::default());
        let (store, pipeline) = setup(provider.clone(), 3);
        let id = store.create("user-1", None).await.unwrap();

        let err = pipeline
            .process(&id, "hi", &RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err, AgentError::UpstreamFatal("invalid x-api-key".into()));
        assert_eq!(provider.calls(), 1);
        assert_eq!(store.stats_aggregator().error_count(ErrorKind::UpstreamFatal), 1);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let provider = Arc::new(ScriptedProvider::new());
        let (store, pipeline) = setup(provider.clone(), 3);

        let err = pipeline
            .process("missing", "hi", &RequestOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err, AgentError::SessionNotFound("missing".into()));
        assert_eq!(provider.calls(), 0);
        assert_eq!(store.stats_aggregator().error_count(ErrorKind::SessionNotFound), 1);
    }

    #[tokio::test]
    async fn test_system_prompt_precedence() {
        let provider = Arc::new(ScriptedProvider::new());
        for _ in 0..3 {
            provider.push_reply("ok", Usage::default());
        }
        let (store, pipeline) = setup(provider.clone(), 1);
        let plain = store.create("user-1", None).await.unwrap();
        let custom = store.create("user-2", Some("Be terse.".into())).await.unwrap();

        pipeline.process(&plain, "a", &RequestOptions::default()).await.unwrap();
        pipeline.process(&custom, "b", &RequestOptions::default()).await.unwrap();
        pipeline
            .process(
                &custom,
                "c",
                &RequestOptions::default()
                    .with_system_prompt("Answer in French.")
                    .with_max_tokens(64)
                    .with_temperature(0.2),
            )
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests[0].system, "You are a helpful AI assistant.");
        assert_eq!(requests[0].max_tokens, 4096);
        assert_eq!(requests[1].system, "Be terse.");
        assert_eq!(requests[2].system, "Answer in French.");
        assert_eq!(requests[2].max_tokens, 64);
        assert_eq!(requests[2].temperature, 0.2);
        // Full history is sent: two turns before plus the new prompt.
        assert_eq!(requests[2].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_only_text_blocks_are_kept() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_completion(Completion {
            blocks: vec![
                ContentBlock::Text("Let me check. ".into()),
                ContentBlock::ToolUse {
                    id: "toolu_1".into(),
                    name: "lookup".into(),
                    input: serde_json::json!({"q": "weather"}),
                },
                ContentBlock::Text("Done.".into()),
            ],
            usage: Usage::new(5, 5),
        });
        let (store, pipeline) = setup(provider.clone(), 1);
        let id = store.create("user-1", None).await.unwrap();

        let tool = ToolDefinition::new("lookup", "Look things up", serde_json::json!({"type": "object"}));
        let outcome = pipeline
            .process(&id, "weather?", &RequestOptions::default().with_tools(vec![tool]))
            .await
            .unwrap();

        assert_eq!(outcome.content, "Let me check. Done.");
        assert_eq!(provider.requests()[0].tools.len(), 1);
    }

    #[test]
    fn test_outcome_serializes_usage_totals() {
        let outcome = RequestOutcome {
            content: "hi".into(),
            usage: Usage::new(10, 20).into(),
            message_count: 2,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["usage"]["total"], 30);
        assert_eq!(json["message_count"], 2);
    }
}
