//! Stream pipeline: forwards provider fragments to the caller as they arrive.
//!
//! Streams are never retried. A failure at any point ends the sequence with a
//! single [`StreamEvent::Error`] in place of [`StreamEvent::Done`].

use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::{debug, error};

use relay_core::config::RequestDefaults;
use relay_core::error::{AgentError, ErrorKind};
use relay_core::session::{lock_session, SessionStore};
use relay_core::stats::StatsAggregator;
use relay_core::types::{Message, TokenUsage};
use relay_providers::traits::{CompletionProvider, StreamChunk};

use crate::pipeline::RequestOptions;

/// One item of a response stream.
///
/// Every stream ends with exactly one `Done` or `Error`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token { text: String },
    Done { usage: TokenUsage },
    Error { kind: ErrorKind, message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Token { .. })
    }
}

/// A lazily polled, single-use stream of events.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

pub struct StreamPipeline {
    store: Arc<SessionStore>,
    provider: Arc<dyn CompletionProvider>,
    defaults: RequestDefaults,
}

impl StreamPipeline {
    pub fn new(
        store: Arc<SessionStore>,
        provider: Arc<dyn CompletionProvider>,
        defaults: RequestDefaults,
    ) -> Self {
        Self {
            store,
            provider,
            defaults,
        }
    }

    /// Append `prompt` to the session and return the reply as a stream.
    ///
    /// An unknown session fails here, before any stream exists. The provider
    /// is not contacted until the returned stream is first polled.
    pub async fn stream(
        &self,
        session_id: &str,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<EventStream, AgentError> {
        let stats = self.store.stats_aggregator().clone();

        let Some(handle) = self.store.get(session_id).await else {
            let err = AgentError::SessionNotFound(session_id.to_string());
            stats.record_error(err.kind());
            return Err(err);
        };

        let request = {
            let mut session = lock_session(&handle);
            session.add_message(Message::user(prompt));
            options.build_request(&session, &self.defaults)
        };

        let provider = self.provider.clone();
        let session_id = session_id.to_string();

        debug!(
            session_id = %session_id,
            model = provider.model(),
            messages = request.messages.len(),
            "Opening response stream"
        );

        let events = async_stream::stream! {
            let mut upstream = match provider.complete_streaming(&request).await {
                Ok(upstream) => upstream,
                Err(e) => {
                    yield failure(&stats, &session_id, e.into());
                    return;
                }
            };

            let mut text = String::new();
            let mut final_usage = None;

            while let Some(chunk) = upstream.next().await {
                match chunk {
                    Ok(StreamChunk::Text(fragment)) => {
                        text.push_str(&fragment);
                        yield StreamEvent::Token { text: fragment };
                    }
                    Ok(StreamChunk::Usage(usage)) => final_usage = Some(usage),
                    Err(e) => {
                        yield failure(&stats, &session_id, e.into());
                        return;
                    }
                }
            }

            let Some(usage) = final_usage else {
                let err = AgentError::UpstreamTransient("stream ended without final usage".into());
                yield failure(&stats, &session_id, err);
                return;
            };

            {
                let mut session = lock_session(&handle);
                session.add_message(Message::assistant(text));
                session.record_usage(&usage);
            }
            stats.record_request(&usage);

            debug!(
                session_id = %session_id,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Stream completed"
            );
            yield StreamEvent::Done { usage: usage.into() };
        };

        Ok(Box::pin(events))
    }
}

fn failure(stats: &StatsAggregator, session_id: &str, err: AgentError) -> StreamEvent {
    error!(session_id, error = %err, "Stream failed");
    stats.record_error(err.kind());
    StreamEvent::Error {
        kind: err.kind(),
        message: err.to_string(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
