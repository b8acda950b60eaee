//! Provider-agnostic chat completion client core
//!
//! Defines the unified request, response and streaming event model shared by
//! every provider adapter, and the merger that combines a model's event
//! stream with concurrently running tool executions into one ordered,
//! cancel-aware stream.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod error;
pub mod provider;
pub mod stream;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tool;
pub mod types;

pub use error::LlmError;
pub use provider::{Provider, ProviderCapabilities, ProviderRegistry, ResolvedModel};
pub use stream::{EventStream, MergeSettings, StreamMerger, WorkerGauge, collect_response, merge};
pub use tool::{ToolExecutor, tool_source, tool_sources};
pub use types::{CompletionRequest, CompletionResponse, Content, Message, StreamError, StreamEvent};
