//! Completion provider trait: the seam between the session manager and any
//! upstream conversational-completion service.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use relay_core::error::ProviderError;
use relay_core::types::{Message, ToolDefinition, Usage};

/// Everything a provider needs for one completion call.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    /// Full conversation history, oldest first.
    pub messages: Vec<Message>,
    /// Resolved system directive.
    pub system: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Tools the model may call; empty for none.
    pub tools: Vec<ToolDefinition>,
}

/// One block of a completion response.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

/// A finished, non-streamed completion.
#[derive(Clone, Debug, PartialEq)]
pub struct Completion {
    pub blocks: Vec<ContentBlock>,
    pub usage: Usage,
}

impl Completion {
    /// All text blocks concatenated in order; other blocks are skipped.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text(text) => Some(text.as_str()),
                ContentBlock::ToolUse { .. } => None,
            })
            .collect()
    }
}

/// One item of a streamed completion.
///
/// A well-formed stream is zero or more `Text` chunks followed by a single
/// `Usage` chunk carrying the final totals.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamChunk {
    Text(String),
    Usage(Usage),
}

/// A boxed stream of completion chunks.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// Trait that all completion providers implement.
///
/// Failures are classified as [`ProviderError::Transient`] (worth retrying)
/// or [`ProviderError::Fatal`].
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Run a completion and wait for the whole response.
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError>;

    /// Start a streamed completion.
    ///
    /// Errors returned here happen before any chunk was produced; later
    /// failures arrive as `Err` items on the stream.
    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, ProviderError>;

    /// Model identifier used for requests.
    fn model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
