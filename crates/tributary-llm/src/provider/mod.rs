//! Provider trait and the explicit provider registry

mod registry;

use async_trait::async_trait;
use tributary_core::RequestContext;

pub use registry::{ProviderRegistry, ProviderRegistryBuilder, ResolvedModel};

use crate::error::LlmError;
use crate::stream::EventStream;
use crate::types::{CompletionRequest, CompletionResponse, ContentLimits};

/// Capabilities advertised by a provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// Whether the provider supports streaming responses
    pub streaming: bool,
    /// Whether the provider supports tool/function calling
    pub tool_calling: bool,
    /// Whether the provider accepts image content
    pub vision: bool,
}

/// Trait implemented by each LLM provider adapter
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// Advertised capabilities
    fn capabilities(&self) -> ProviderCapabilities;

    /// Limits applied to request content before transmission
    fn content_limits(&self) -> ContentLimits {
        ContentLimits::default()
    }

    /// Send a non-streaming completion request
    async fn complete(
        &self,
        request: &CompletionRequest,
        context: &RequestContext,
    ) -> Result<CompletionResponse, LlmError>;

    /// Send a streaming completion request
    ///
    /// The returned stream speaks the unified event vocabulary and honors
    /// `context.signal`.
    async fn complete_stream(
        &self,
        request: &CompletionRequest,
        context: &RequestContext,
    ) -> Result<EventStream, LlmError>;
}

/// Check `request` against what `provider` accepts
///
/// # Errors
///
/// Returns `LlmError::InvalidRequest` when the request needs a capability the
/// provider lacks, or the error from [`CompletionRequest::validate`]
pub fn check_request(provider: &dyn Provider, request: &CompletionRequest) -> Result<(), LlmError> {
    let capabilities = provider.capabilities();

    if request.stream && !capabilities.streaming {
        return Err(LlmError::InvalidRequest(format!(
            "provider '{}' does not support streaming",
            provider.name()
        )));
    }

    if !request.tools.is_empty() && !capabilities.tool_calling {
        return Err(LlmError::InvalidRequest(format!(
            "provider '{}' does not support tool calling",
            provider.name()
        )));
    }

    let has_images = request
        .messages
        .iter()
        .flat_map(|message| &message.content)
        .any(|part| part.kind() == crate::types::ContentKind::Image);
    if has_images && !capabilities.vision {
        return Err(LlmError::InvalidRequest(format!(
            "provider '{}' does not accept image content",
            provider.name()
        )));
    }

    request.validate(&provider.content_limits())
}
