use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse classification of a failure, stable across providers
///
/// Callers branch on the category instead of matching on messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Credentials were missing or rejected
    #[serde(rename = "authentication_error")]
    Authentication,
    /// Provider throttled the request
    #[serde(rename = "rate_limit_error")]
    RateLimit,
    /// Request or content failed local or remote validation
    #[serde(rename = "validation_error")]
    Validation,
    /// Transport-level failure reaching the provider
    #[serde(rename = "network_error")]
    Network,
    /// A deadline elapsed before the operation finished
    #[serde(rename = "timeout_error")]
    Timeout,
    /// Provider returned an error or misbehaved
    #[serde(rename = "api_error")]
    Api,
    /// The caller cancelled the operation
    #[serde(rename = "cancellation_error")]
    Cancellation,
    /// Failure injected by a scripted test source
    #[serde(rename = "simulation_error")]
    Simulation,
}

impl ErrorCategory {
    /// Wire name of the category (e.g. `rate_limit_error`)
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication_error",
            Self::RateLimit => "rate_limit_error",
            Self::Validation => "validation_error",
            Self::Network => "network_error",
            Self::Timeout => "timeout_error",
            Self::Api => "api_error",
            Self::Cancellation => "cancellation_error",
            Self::Simulation => "simulation_error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for domain errors that can be surfaced inside an event stream
///
/// Implemented by each crate's error type. The stream layer converts these
/// into structured error events, keeping transport errors out of the event
/// vocabulary.
pub trait ClassifiedError: std::error::Error {
    /// Category used for caller branching
    fn category(&self) -> ErrorCategory;

    /// Short machine-readable code (e.g. `upstream_error`)
    fn code(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;
}
