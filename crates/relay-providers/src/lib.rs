//! Completion provider layer for Relay.
//!
//! # Architecture
//!
//! - [`traits::CompletionProvider`]: trait that all providers implement
//! - [`anthropic::AnthropicProvider`]: Anthropic Messages API client, plain and streamed
//! - [`sse`]: incremental server-sent-events decoder used by streamed calls

pub mod anthropic;
pub mod sse;
pub mod traits;

// Re-export main types for convenience
pub use anthropic::AnthropicProvider;
pub use traits::{
    Completion, CompletionProvider, CompletionRequest, CompletionStream, ContentBlock, StreamChunk,
};
