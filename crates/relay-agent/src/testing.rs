//! Scripted in-memory provider for pipeline tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use relay_core::error::ProviderError;
use relay_core::types::Usage;
use relay_providers::traits::{
    Completion, CompletionProvider, CompletionRequest, CompletionStream, ContentBlock, StreamChunk,
};

type StreamScript = Result<Vec<Result<StreamChunk, ProviderError>>, ProviderError>;

/// Replays queued replies in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<Completion, ProviderError>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, text: &str, usage: Usage) {
        self.push_completion(Completion {
            blocks: vec![ContentBlock::Text(text.to_string())],
            usage,
        });
    }

    pub fn push_completion(&self, completion: Completion) {
        self.replies.lock().unwrap().push_back(Ok(completion));
    }

    pub fn push_error(&self, err: ProviderError) {
        self.replies.lock().unwrap().push_back(Err(err));
    }

    /// Queue a stream made of the given fragments, optionally closed with a usage chunk.
    pub fn push_stream(&self, fragments: &[&str], usage: Option<Usage>) {
        let mut chunks: Vec<_> = fragments
            .iter()
            .map(|f| Ok(StreamChunk::Text(f.to_string())))
            .collect();
        if let Some(usage) = usage {
            chunks.push(Ok(StreamChunk::Usage(usage)));
        }
        self.streams.lock().unwrap().push_back(Ok(chunks));
    }

    pub fn push_stream_chunks(&self, chunks: Vec<Result<StreamChunk, ProviderError>>) {
        self.streams.lock().unwrap().push_back(Ok(chunks));
    }

    pub fn push_stream_open_error(&self, err: ProviderError) {
        self.streams.lock().unwrap().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of provider calls made so far, streamed or not.
    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::fatal("no scripted reply")))
    }

    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionStream, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::fatal("no scripted stream")))?;
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn display_name(&self) -> &str {
        "Scripted"
    }
}
