//! Relay agent: session-scoped request and stream pipelines.
//!
//! This crate contains:
//! - **manager**: [`AgentManager`], the entry point owning store, pipelines and reaper
//! - **pipeline**: synchronous request pipeline with retry
//! - **stream**: streamed response pipeline
//! - **retry**: backoff policy

pub mod manager;
pub mod pipeline;
pub mod retry;
pub mod stream;

#[cfg(test)]
mod testing;

pub use manager::AgentManager;
pub use pipeline::{RequestOptions, RequestOutcome, RequestPipeline};
pub use retry::RetryPolicy;
pub use stream::{EventStream, StreamEvent, StreamPipeline};
