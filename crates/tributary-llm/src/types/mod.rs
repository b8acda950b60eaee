//! Provider-agnostic request, response and stream types
//!
//! Adapters convert their wire formats to and from these shapes.

pub mod content;
pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use content::{Content, ContentError, ContentKind, ContentLimits, FileContent, ImageContent, MediaSource};
pub use message::{FunctionCall, Message, Role, ToolCall};
pub use request::{CompletionParams, CompletionRequest, ResponseFormat};
pub use response::{Choice, CompletionResponse, FinishReason, Usage};
pub use stream::{
    PRIMARY_SOURCE, StreamDelta, StreamDone, StreamError, StreamEvent, StreamFunctionCall, StreamToolCall,
};
pub use tool::{ToolChoice, ToolDefinition};
