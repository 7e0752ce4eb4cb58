//! Anthropic Messages API provider.
//!
//! Talks directly to `POST {api_base}/v1/messages` via `reqwest`, both for
//! whole responses and for server-sent-event streams.
//!
//! Failure classification:
//! - transport errors (connect, timeout, broken body), HTTP 408, 429 and 5xx
//!   are [`ProviderError::Transient`]
//! - every other non-success status and any undecodable body is
//!   [`ProviderError::Fatal`]

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use relay_core::config::ProviderConfig;
use relay_core::error::ProviderError;
use relay_core::types::{Message, ToolDefinition, Usage};

use crate::sse::{SseDecoder, SseEvent};
use crate::traits::{
    Completion, CompletionProvider, CompletionRequest, CompletionStream, ContentBlock, StreamChunk,
};

// ─────────────────────────────────────────────
// AnthropicProvider
// ─────────────────────────────────────────────

/// Completion provider backed by the Anthropic Messages API.
pub struct AnthropicProvider {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    /// API base URL (e.g. `"https://api.anthropic.com"`).
    api_base: String,
    api_key: String,
    model: String,
    api_version: String,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicProvider {
    pub const DEFAULT_API_BASE: &'static str = "https://api.anthropic.com";
    pub const DEFAULT_API_VERSION: &'static str = "2023-06-01";

    /// Create a provider from config.
    ///
    /// The transport timeout comes from `config.timeout_secs`.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_API_BASE.to_string());

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProviderError::fatal(format!("failed to build HTTP client: {e}")))?;

        Ok(AnthropicProvider {
            client,
            api_base,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_version: Self::DEFAULT_API_VERSION.to_string(),
        })
    }

    /// Build the full messages endpoint URL.
    fn messages_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        format!("{}/v1/messages", base)
    }

    async fn send(&self, body: &MessagesRequest<'_>) -> Result<reqwest::Response, ProviderError> {
        debug!(
            model = %self.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            stream = body.stream,
            "Calling Anthropic"
        );

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP request failed");
                classify_transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(status = %status, body = %body, "API error");
            return Err(classify_status(status, &body));
        }

        Ok(response)
    }

    fn request_body<'a>(&'a self, request: &'a CompletionRequest, stream: bool) -> MessagesRequest<'a> {
        MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages: &request.messages,
            tools: &request.tools,
            stream,
        }
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let response = self.send(&self.request_body(request, false)).await?;

        let body: MessagesResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to parse Anthropic response");
            ProviderError::fatal(format!("error parsing response: {e}"))
        })?;

        let completion = body.into_completion();
        debug!(
            blocks = completion.blocks.len(),
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            "Anthropic response received"
        );
        Ok(completion)
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, ProviderError> {
        let response = self.send(&self.request_body(request, true)).await?;
        let mut bytes = Box::pin(response.bytes_stream());

        let stream = async_stream::try_stream! {
            let mut decoder = SseDecoder::new();
            let mut usage = Usage::default();

            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(classify_transport)?;
                for event in decoder.push(&chunk) {
                    match decode_event(&event)? {
                        StreamPayload::MessageStart { message } => {
                            usage.input_tokens = message.usage.input_tokens;
                            usage.output_tokens = message.usage.output_tokens;
                        }
                        StreamPayload::ContentBlockDelta { delta: Delta::TextDelta { text } } => {
                            yield StreamChunk::Text(text);
                        }
                        StreamPayload::MessageDelta { usage: delta } => {
                            usage.output_tokens = delta.output_tokens;
                        }
                        StreamPayload::MessageStop => {
                            yield StreamChunk::Usage(usage);
                            break 'read;
                        }
                        StreamPayload::Error { error } => {
                            Err::<(), _>(ProviderError::transient(format!(
                                "{}: {}",
                                error.kind, error.message
                            )))?;
                        }
                        _ => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn display_name(&self) -> &str {
        "Anthropic"
    }
}

// ─────────────────────────────────────────────
// Error classification
// ─────────────────────────────────────────────

fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let msg = format!("{}: {}", status, body);
    let code = status.as_u16();
    if code == 408 || code == 429 || status.is_server_error() {
        ProviderError::Transient(msg)
    } else {
        ProviderError::Fatal(msg)
    }
}

fn classify_transport(err: reqwest::Error) -> ProviderError {
    if err.is_decode() || err.is_builder() {
        ProviderError::fatal(err.to_string())
    } else {
        ProviderError::transient(err.to_string())
    }
}

fn decode_event(event: &SseEvent) -> Result<StreamPayload, ProviderError> {
    serde_json::from_str(&event.data)
        .map_err(|e| ProviderError::fatal(format!("malformed stream event: {e}")))
}

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    system: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDefinition],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    usage: WireUsage,
}

impl MessagesResponse {
    fn into_completion(self) -> Completion {
        let blocks = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(ContentBlock::Text(text)),
                ResponseBlock::ToolUse { id, name, input } => {
                    Some(ContentBlock::ToolUse { id, name, input })
                }
                ResponseBlock::Other => None,
            })
            .collect();
        Completion {
            blocks,
            usage: Usage::new(self.usage.input_tokens, self.usage.output_tokens),
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamPayload {
    MessageStart { message: StartMessage },
    ContentBlockDelta { delta: Delta },
    MessageDelta { usage: WireUsage },
    MessageStop,
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct StartMessage {
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
