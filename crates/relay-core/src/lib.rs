//! Core types, configuration, session store, stats, and the expiry reaper
//! for Relay.

pub mod config;
pub mod error;
pub mod reaper;
pub mod session;
pub mod stats;
pub mod types;
pub mod utils;

pub use error::{AgentError, ErrorKind, ProviderError};
pub use stats::{Stats, StatsAggregator};
