use thiserror::Error;
use tributary_core::{ClassifiedError, ErrorCategory};

use crate::types::{ContentError, StreamError};

/// Errors that can occur during LLM operations
#[derive(Debug, Error)]
pub enum LlmError {
    /// Named provider is not registered
    #[error("provider not found: {provider}")]
    ProviderNotFound { provider: String },

    /// Model reference could not be resolved
    #[error("model not found: {model}")]
    ModelNotFound { model: String },

    /// Upstream provider returned an error
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Error during streaming response
    #[error("streaming error: {0}")]
    Streaming(String),

    /// Caller sent a malformed or invalid request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Provider or registry is misconfigured
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Provider rejected the credentials
    #[error("authentication required")]
    Unauthorized,

    /// Provider throttled the request
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until the rate limit resets
        retry_after: u64,
    },

    /// Transport failure reaching the provider
    #[error("network error: {0}")]
    Network(String),

    /// Request deadline elapsed
    #[error("request timed out")]
    Timeout,

    /// Caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// Content part rejected before transmission
    #[error(transparent)]
    Content(#[from] ContentError),

    /// A tool executor failed
    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// Terminal error event observed on a stream
    #[error("stream failed: {0}")]
    Stream(#[from] StreamError),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether retrying the same request may succeed
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Upstream(_)
                | Self::Streaming(_)
                | Self::RateLimited { .. }
                | Self::Network(_)
                | Self::Timeout
                | Self::Internal(_)
        )
    }
}

impl ClassifiedError for LlmError {
    fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized => ErrorCategory::Authentication,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::ProviderNotFound { .. }
            | Self::ModelNotFound { .. }
            | Self::InvalidRequest(_)
            | Self::Content(_) => ErrorCategory::Validation,
            Self::Network(_) => ErrorCategory::Network,
            Self::Timeout => ErrorCategory::Timeout,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::Stream(inner) => inner.category,
            Self::Upstream(_)
            | Self::Streaming(_)
            | Self::Configuration(_)
            | Self::ToolExecution { .. }
            | Self::Internal(_) => ErrorCategory::Api,
        }
    }

    fn code(&self) -> &str {
        match self {
            Self::ProviderNotFound { .. } | Self::ModelNotFound { .. } => "not_found_error",
            Self::Upstream(_) => "upstream_error",
            Self::Streaming(_) => "streaming_error",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::Configuration(_) => "configuration_error",
            Self::Unauthorized => "authentication_error",
            Self::RateLimited { .. } => "rate_limit_error",
            Self::Network(_) => "network_error",
            Self::Timeout => StreamError::DEADLINE_EXCEEDED,
            Self::Cancelled => StreamError::CANCELLED,
            Self::Content(_) => "invalid_content",
            Self::ToolExecution { .. } => "tool_execution_error",
            Self::Stream(inner) => &inner.code,
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            Self::Stream(inner) => inner.message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContentKind;

    #[test]
    fn categories() {
        assert_eq!(LlmError::Unauthorized.category(), ErrorCategory::Authentication);
        assert_eq!(LlmError::Network("reset".to_owned()).category(), ErrorCategory::Network);
        assert_eq!(LlmError::Cancelled.category(), ErrorCategory::Cancellation);

        let content = LlmError::from(ContentError::MissingSource { kind: ContentKind::Image });
        assert_eq!(content.category(), ErrorCategory::Validation);
        assert_eq!(content.code(), "invalid_content");
    }

    #[test]
    fn stream_errors_keep_their_classification() {
        let err = LlmError::from(StreamError::simulated("boom"));
        assert_eq!(err.category(), ErrorCategory::Simulation);
        assert_eq!(err.code(), StreamError::SIMULATED);
        assert_eq!(err.client_message(), "boom");
    }

    #[test]
    fn internal_errors_are_masked() {
        let err = LlmError::from(anyhow::anyhow!("secret detail"));
        assert_eq!(err.client_message(), "an internal error occurred");
        assert!(err.is_retryable());
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        assert!(!LlmError::InvalidRequest("bad".to_owned()).is_retryable());
        assert!(!LlmError::Cancelled.is_retryable());
    }
}
