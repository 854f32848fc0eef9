//! Unified error types for kaiten.
//!
//! The hierarchy follows the failure taxonomy of the loop:
//! - [`ConfigError`]: raised before any provider call (duplicate capability
//!   registration, streaming with tools against a transport that cannot
//!   multiplex them)
//! - [`ToolError`]: invocation-level failures, always captured into a failed
//!   [`InvocationResult`](crate::engine::InvocationResult)
//! - [`LlmError`]: what a provider client reports; the loop wraps it into
//!   [`Error::Provider`] with provider and model context
//! - [`Error::EmptyResponse`]: the call succeeded but produced nothing usable

use std::fmt;

/// Result type alias for kaiten operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for provider client operations.
pub type LlmResult<T> = std::result::Result<T, LlmError>;

/// The main error type for kaiten.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration error, raised before any provider call.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The provider transport failed; the turn was aborted.
    #[error("Provider '{provider}' failed for model '{model}': {source}")]
    Provider {
        /// Provider name as reported by the client.
        provider: String,
        /// Model the request was addressed to.
        model: String,
        /// The underlying client error.
        #[source]
        source: LlmError,
    },

    /// The provider answered without tool calls and without any text.
    #[error("Provider '{provider}' returned empty response for model '{model}'")]
    EmptyResponse {
        /// Provider name as reported by the client.
        provider: String,
        /// Model the request was addressed to.
        model: String,
    },

    /// The loop hit its iteration cap without a final answer.
    #[error("Maximum iterations ({max_iterations}) reached without final answer")]
    MaxIterations {
        /// The configured cap.
        max_iterations: usize,
    },

    /// A conversation message violated the non-empty content rule.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Tool error surfaced outside of the execution engine.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a provider client error with provider and model context.
    #[must_use]
    pub fn provider(
        provider: impl Into<String>,
        model: impl Into<String>,
        source: LlmError,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            model: model.into(),
            source,
        }
    }

    /// Create an empty response error.
    #[must_use]
    pub fn empty_response(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self::EmptyResponse {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// Create a max iterations error.
    #[must_use]
    pub const fn max_iterations(max_iterations: usize) -> Self {
        Self::MaxIterations { max_iterations }
    }

    /// Returns `true` for configuration errors.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns `true` for transport/provider errors.
    #[must_use]
    pub const fn is_provider(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }
}

/// Errors detected while assembling a loop, before any provider call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A capability name was registered twice through a rejecting entry point.
    #[error("Capability '{0}' is already registered")]
    DuplicateCapability(String),

    /// A capability definition is malformed (empty name, duplicate parameter).
    #[error("Invalid capability: {0}")]
    InvalidCapability(String),

    /// Streaming was requested from a provider that cannot stream.
    #[error("Provider '{provider}' does not support streaming")]
    StreamingUnsupported {
        /// Provider name.
        provider: String,
    },

    /// Streaming with capabilities was requested from a provider that cannot
    /// deliver tool calls through a stream.
    #[error("Provider '{provider}' cannot stream tool calls; remove capabilities or use run_turn")]
    StreamingToolsUnsupported {
        /// Provider name.
        provider: String,
    },
}

/// Error type for provider client operations.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LlmError {
    /// The error kind.
    pub kind: LlmErrorKind,
    /// The provider name (e.g., "openai", "ollama").
    pub provider: Option<String>,
    /// Additional error message.
    pub message: String,
    /// Optional error code from the provider.
    pub code: Option<String>,
}

/// Categories of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum LlmErrorKind {
    /// Authentication or authorization failure.
    Auth,
    /// Rate limit exceeded.
    RateLimited,
    /// Response format error.
    ResponseFormat,
    /// Network or connection error.
    Network,
    /// Streaming error.
    Stream,
    /// HTTP status error.
    HttpStatus,
    /// Provider-specific error.
    Provider,
    /// Internal error.
    Internal,
    /// Feature not supported.
    NotSupported,
}

impl LlmError {
    const fn with_kind(kind: LlmErrorKind, message: String) -> Self {
        Self {
            kind,
            provider: None,
            message,
            code: None,
        }
    }

    /// Create an authentication error.
    #[must_use]
    pub fn auth(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(LlmErrorKind::Auth, message.into()).with_provider(provider)
    }

    /// Create a rate limit error.
    #[must_use]
    pub fn rate_limited(provider: impl Into<String>) -> Self {
        Self::with_kind(
            LlmErrorKind::RateLimited,
            "Rate limit exceeded. Please retry after some time.".into(),
        )
        .with_provider(provider)
    }

    /// Create a response format error.
    #[must_use]
    pub fn response_format(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::with_kind(
            LlmErrorKind::ResponseFormat,
            format!("Expected {}, got {}", expected.into(), got.into()),
        )
    }

    /// Create a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::with_kind(LlmErrorKind::Network, message.into())
    }

    /// Create a streaming error.
    #[must_use]
    pub fn stream(message: impl Into<String>) -> Self {
        Self::with_kind(LlmErrorKind::Stream, message.into())
    }

    /// Create an HTTP status error.
    #[must_use]
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        let mut err = Self::with_kind(
            LlmErrorKind::HttpStatus,
            format!("HTTP {status}: {}", body.into()),
        );
        err.code = Some(status.to_string());
        err
    }

    /// Create a provider-specific error.
    #[must_use]
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_kind(LlmErrorKind::Provider, message.into()).with_provider(provider)
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_kind(LlmErrorKind::Internal, message.into())
    }

    /// Create a not supported error.
    #[must_use]
    pub fn not_supported(feature: impl Into<String>) -> Self {
        Self::with_kind(
            LlmErrorKind::NotSupported,
            format!("Feature not supported: {}", feature.into()),
        )
    }

    /// Attach the provider name.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attach a provider error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Check if this is a retryable error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, LlmErrorKind::RateLimited | LlmErrorKind::Network)
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{provider}] ")?;
        }
        write!(f, "{}", self.message)?;
        if let Some(code) = &self.code {
            write!(f, " (code: {code})")?;
        }
        Ok(())
    }
}

impl std::error::Error for LlmError {}

/// Error type for capability invocation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ToolError {
    /// No capability is registered under the requested name.
    #[error("Capability '{0}' not found")]
    NotFound(String),

    /// Serialized arguments could not be parsed as JSON.
    #[error("Invalid JSON arguments: {0}")]
    InvalidJson(String),

    /// Arguments do not match the capability's parameter schema.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// The capability raised an error while running.
    #[error("Execution error: {0}")]
    Execution(String),

    /// The capability panicked while running.
    #[error("Capability panicked: {0}")]
    Panicked(String),

    /// Generic error.
    #[error("Tool error: {0}")]
    Other(String),
}

impl ToolError {
    /// Create an execution error.
    #[must_use]
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create an invalid arguments error.
    #[must_use]
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::InvalidArguments(msg.into())
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }
}

impl From<String> for ToolError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

impl From<&str> for ToolError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_owned())
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    mod error {
        use super::*;

        #[test]
        fn provider_wraps_source_with_context() {
            let err = Error::provider("openai", "gpt-4o", LlmError::network("timeout"));
            assert!(err.is_provider());
            let text = err.to_string();
            assert!(text.contains("openai"));
            assert!(text.contains("gpt-4o"));
            assert!(text.contains("timeout"));
            assert!(std::error::Error::source(&err).is_some());
        }

        #[test]
        fn empty_response_is_distinct_from_provider() {
            let err = Error::empty_response("mock", "m");
            assert!(!err.is_provider());
            assert!(err.to_string().contains("empty response"));
        }

        #[test]
        fn max_iterations_mentions_cap() {
            let err = Error::max_iterations(7);
            assert!(matches!(err, Error::MaxIterations { max_iterations: 7 }));
            assert!(err.to_string().contains('7'));
        }

        #[test]
        fn from_config_error() {
            let err: Error = ConfigError::DuplicateCapability("calc".into()).into();
            assert!(err.is_config());
            assert!(err.to_string().contains("calc"));
        }

        #[test]
        fn from_tool_error() {
            let err: Error = ToolError::not_found("ghost").into();
            assert!(matches!(err, Error::Tool(ToolError::NotFound(_))));
        }

        #[test]
        fn from_json_error() {
            let json_err = serde_json::from_str::<i32>("invalid").unwrap_err();
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    mod llm_error {
        use super::*;

        #[test]
        fn display_includes_provider_and_code() {
            let err = LlmError::provider("anthropic", "overloaded").with_code("529");
            assert_eq!(err.to_string(), "[anthropic] overloaded (code: 529)");
        }

        #[test]
        fn http_status_sets_code() {
            let err = LlmError::http_status(503, "unavailable");
            assert_eq!(err.kind, LlmErrorKind::HttpStatus);
            assert_eq!(err.code.as_deref(), Some("503"));
        }

        #[test]
        fn retryable_kinds() {
            assert!(LlmError::network("reset").is_retryable());
            assert!(LlmError::rate_limited("openai").is_retryable());
            assert!(!LlmError::auth("openai", "bad key").is_retryable());
            assert!(!LlmError::not_supported("streaming").is_retryable());
        }
    }

    mod tool_error {
        use super::*;

        #[test]
        fn not_found_message() {
            let err = ToolError::not_found("ghost");
            assert!(err.to_string().contains("not found"));
            assert!(err.to_string().contains("ghost"));
        }

        #[test]
        fn from_string_is_other() {
            let err: ToolError = String::from("boom").into();
            assert_eq!(err, ToolError::Other("boom".into()));
        }

        #[test]
        fn from_serde_error_is_invalid_arguments() {
            let json_err = serde_json::from_str::<i32>("\"x\"").unwrap_err();
            let err: ToolError = json_err.into();
            assert!(matches!(err, ToolError::InvalidArguments(_)));
        }
    }
}
