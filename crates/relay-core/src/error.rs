//! Error taxonomy shared by the session store, the pipelines and providers.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Failure reported by a completion provider.
///
/// Providers only distinguish two classes: retry may help, or it won't.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Network, rate-limit or server-class failure.
    #[error("transient upstream error: {0}")]
    Transient(String),

    /// Malformed request, auth failure or undecodable response.
    #[error("fatal upstream error: {0}")]
    Fatal(String),
}

impl ProviderError {
    pub fn transient(msg: impl Into<String>) -> Self {
        ProviderError::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        ProviderError::Fatal(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Errors surfaced by the session manager.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    /// Admission refused; the store stayed full after a reap pass.
    #[error("maximum concurrent sessions reached: {limit}")]
    CapacityExceeded { limit: usize },

    /// Unknown or expired session id.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("upstream transient error: {0}")]
    UpstreamTransient(String),

    #[error("upstream fatal error: {0}")]
    UpstreamFatal(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// The counter key this error is recorded under.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            AgentError::SessionNotFound(_) => ErrorKind::SessionNotFound,
            AgentError::UpstreamTransient(_) => ErrorKind::UpstreamTransient,
            AgentError::UpstreamFatal(_) => ErrorKind::UpstreamFatal,
            AgentError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the request pipeline may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::UpstreamTransient(_))
    }
}

impl From<ProviderError> for AgentError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Transient(msg) => AgentError::UpstreamTransient(msg),
            ProviderError::Fatal(msg) => AgentError::UpstreamFatal(msg),
        }
    }
}

/// Classification of an [`AgentError`], used to key error counters.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CapacityExceeded,
    SessionNotFound,
    UpstreamTransient,
    UpstreamFatal,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::CapacityExceeded => "capacity_exceeded",
            ErrorKind::SessionNotFound => "session_not_found",
            ErrorKind::UpstreamTransient => "upstream_transient",
            ErrorKind::UpstreamFatal => "upstream_fatal",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_converts_by_class() {
        let err: AgentError = ProviderError::transient("503 overloaded").into();
        assert_eq!(err, AgentError::UpstreamTransient("503 overloaded".into()));
        assert!(err.is_retryable());

        let err: AgentError = ProviderError::fatal("401 invalid x-api-key").into();
        assert_eq!(err.kind(), ErrorKind::UpstreamFatal);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_capacity_message() {
        let err = AgentError::CapacityExceeded { limit: 10 };
        assert_eq!(err.to_string(), "maximum concurrent sessions reached: 10");
        assert_eq!(err.kind().as_str(), "capacity_exceeded");
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_value(ErrorKind::SessionNotFound).unwrap();
        assert_eq!(json, "session_not_found");
        assert_eq!(ErrorKind::SessionNotFound.to_string(), "session_not_found");
    }
}
