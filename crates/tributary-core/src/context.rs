use std::collections::HashMap;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cancel::CancelSignal;

/// Runtime context for provider and tool requests
///
/// Shared across completion, streaming and tool execution flows
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Identifier used to correlate logs for one request
    pub request_id: String,
    /// Cancellation bound to this request
    pub signal: CancelSignal,
    /// Free-form caller metadata forwarded to providers
    pub metadata: HashMap<String, String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(CancelSignal::default())
    }
}

impl RequestContext {
    /// Create a context bound to the given signal with a fresh request id
    pub fn new(signal: CancelSignal) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            signal,
            metadata: HashMap::new(),
        }
    }

    /// Create a context whose signal fires after `timeout`
    pub fn with_timeout(token: CancellationToken, timeout: Duration) -> Self {
        Self::new(CancelSignal::new(token).with_timeout(timeout))
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let a = RequestContext::default();
        let b = RequestContext::default();
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn metadata_is_attached() {
        let context = RequestContext::default().with_metadata("tenant", "acme");
        assert_eq!(context.metadata.get("tenant").map(String::as_str), Some("acme"));
    }

    #[tokio::test]
    async fn timeout_sets_deadline() {
        let context = RequestContext::with_timeout(CancellationToken::new(), Duration::from_secs(5));
        assert!(context.signal.deadline().is_some());
        assert!(!context.signal.is_cancelled());
    }
}
