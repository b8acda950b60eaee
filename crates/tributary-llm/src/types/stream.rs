//! Unified streaming event vocabulary
//!
//! Every adapter maps its transport chunks into [`StreamEvent`] and every
//! consumer handles exactly these three payloads. The payload is private so
//! a Done can never carry delta content.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tributary_core::{ClassifiedError, ErrorCategory};

use super::content::Content;
use super::message::{FunctionCall, Role};
use super::response::{FinishReason, Usage};
use crate::error::LlmError;

/// Source tag of the primary stream inside a merged stream
pub const PRIMARY_SOURCE: usize = 0;

/// One event of a streaming completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    source: usize,
    #[serde(flatten)]
    payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum EventPayload {
    Delta(StreamDelta),
    Done(StreamDone),
    Error(StreamError),
}

/// Incremental message fragment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDelta {
    /// Role, usually present on the first fragment only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Content fragments, concatenated in arrival order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Content>,
    /// Partial tool calls, reassembled by their `index`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<StreamToolCall>,
    /// Tool call this fragment answers (tool result streams)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl StreamDelta {
    /// Concatenated text of this fragment
    pub fn text(&self) -> String {
        self.content.iter().filter_map(Content::as_text).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.role.is_none() && self.content.is_empty() && self.tool_calls.is_empty()
    }
}

/// Partial tool call data within a stream delta
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamToolCall {
    /// Position of this tool call in the final `tool_calls` list
    pub index: u32,
    /// Tool call ID (present on first chunk only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Partial function call data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<StreamFunctionCall>,
}

impl StreamToolCall {
    /// Opening fragment carrying the id and function name
    pub fn start(index: u32, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index,
            id: Some(id.into()),
            function: Some(StreamFunctionCall {
                name: Some(name.into()),
                arguments: None,
            }),
        }
    }

    /// Continuation fragment carrying part of the JSON arguments
    pub fn arguments(index: u32, fragment: impl Into<String>) -> Self {
        Self {
            index,
            id: None,
            function: Some(StreamFunctionCall {
                name: None,
                arguments: Some(fragment.into()),
            }),
        }
    }
}

/// Partial function call data within a streaming tool call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFunctionCall {
    /// Function name (present on first chunk only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Incremental arguments JSON fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl StreamFunctionCall {
    /// Convert to a complete `FunctionCall` if both name and arguments are present
    pub fn into_function_call(self) -> Option<FunctionCall> {
        match (self.name, self.arguments) {
            (Some(name), Some(arguments)) => Some(FunctionCall { name, arguments }),
            _ => None,
        }
    }
}

/// Completion marker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDone {
    /// Why generation stopped; absent when the source ended without saying
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Final usage counters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Structured failure carried inside a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct StreamError {
    /// Short machine-readable code
    pub code: String,
    /// Human-readable description
    pub message: String,
    /// Category callers branch on
    pub category: ErrorCategory,
}

impl StreamError {
    pub const CANCELLED: &'static str = "cancelled";
    pub const DEADLINE_EXCEEDED: &'static str = "deadline_exceeded";
    pub const DRAIN_TIMEOUT: &'static str = "drain_timeout";
    pub const WORKER_PANICKED: &'static str = "worker_panicked";
    pub const SIMULATED: &'static str = "simulated_failure";

    pub fn new(code: impl Into<String>, message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            category,
        }
    }

    /// The caller cancelled the merge
    pub fn cancelled() -> Self {
        Self::new(Self::CANCELLED, "stream cancelled by caller", ErrorCategory::Cancellation)
    }

    /// The caller's deadline elapsed
    pub fn deadline_exceeded() -> Self {
        Self::new(Self::DEADLINE_EXCEEDED, "stream deadline exceeded", ErrorCategory::Timeout)
    }

    /// An auxiliary source was still running when the drain window closed
    pub fn drain_timeout(source: usize) -> Self {
        Self::new(
            Self::DRAIN_TIMEOUT,
            format!("source {source} did not finish before the drain timeout"),
            ErrorCategory::Timeout,
        )
    }

    /// The task forwarding a source panicked
    pub fn worker_panicked(source: usize) -> Self {
        Self::new(
            Self::WORKER_PANICKED,
            format!("worker for source {source} panicked"),
            ErrorCategory::Api,
        )
    }

    /// Failure injected by a scripted source
    pub fn simulated(message: impl Into<String>) -> Self {
        Self::new(Self::SIMULATED, message, ErrorCategory::Simulation)
    }

    /// Whether this error reports cancellation or a deadline rather than a
    /// provider failure
    pub fn is_cancellation(&self) -> bool {
        self.code == Self::CANCELLED || self.code == Self::DEADLINE_EXCEEDED
    }
}

impl From<&LlmError> for StreamError {
    fn from(err: &LlmError) -> Self {
        if let LlmError::Stream(inner) = err {
            return inner.clone();
        }
        Self::new(err.code(), err.client_message(), err.category())
    }
}

impl From<LlmError> for StreamError {
    fn from(err: LlmError) -> Self {
        Self::from(&err)
    }
}

impl StreamEvent {
    const fn new(payload: EventPayload) -> Self {
        Self {
            index: 0,
            source: PRIMARY_SOURCE,
            payload,
        }
    }

    /// Delta event
    pub const fn delta(delta: StreamDelta) -> Self {
        Self::new(EventPayload::Delta(delta))
    }

    /// Delta carrying a single text fragment
    pub fn text(text: impl Into<String>) -> Self {
        Self::delta(StreamDelta {
            content: vec![Content::text(text)],
            ..StreamDelta::default()
        })
    }

    /// Delta carrying a single tool call fragment
    pub fn tool_call(call: StreamToolCall) -> Self {
        Self::delta(StreamDelta {
            tool_calls: vec![call],
            ..StreamDelta::default()
        })
    }

    /// Done with a finish reason
    pub const fn done(reason: FinishReason) -> Self {
        Self::new(EventPayload::Done(StreamDone {
            finish_reason: Some(reason),
            usage: None,
        }))
    }

    /// Done with a finish reason and usage counters
    pub const fn done_with_usage(reason: FinishReason, usage: Usage) -> Self {
        Self::new(EventPayload::Done(StreamDone {
            finish_reason: Some(reason),
            usage: Some(usage),
        }))
    }

    /// Done synthesized for a source that ended without a terminal event
    pub const fn implicit_done() -> Self {
        Self::new(EventPayload::Done(StreamDone {
            finish_reason: None,
            usage: None,
        }))
    }

    /// Error event
    pub const fn error(error: StreamError) -> Self {
        Self::new(EventPayload::Error(error))
    }

    /// Set the choice index
    #[must_use]
    pub const fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    #[must_use]
    pub(crate) const fn with_source(mut self, source: usize) -> Self {
        self.source = source;
        self
    }

    /// Choice index
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Originating source tag (0 for the primary)
    pub const fn source(&self) -> usize {
        self.source
    }

    pub const fn is_delta(&self) -> bool {
        matches!(self.payload, EventPayload::Delta(_))
    }

    pub const fn is_done(&self) -> bool {
        matches!(self.payload, EventPayload::Done(_))
    }

    pub const fn is_error(&self) -> bool {
        matches!(self.payload, EventPayload::Error(_))
    }

    /// Whether this event ends the stream it appears in
    ///
    /// Done and Error re-tagged to an auxiliary source are informational.
    pub const fn is_terminal(&self) -> bool {
        self.source == PRIMARY_SOURCE && (self.is_done() || self.is_error())
    }

    pub const fn as_delta(&self) -> Option<&StreamDelta> {
        match &self.payload {
            EventPayload::Delta(delta) => Some(delta),
            _ => None,
        }
    }

    pub const fn as_done(&self) -> Option<&StreamDone> {
        match &self.payload {
            EventPayload::Done(done) => Some(done),
            _ => None,
        }
    }

    pub const fn as_error(&self) -> Option<&StreamError> {
        match &self.payload {
            EventPayload::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Finish reason of a Done event
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.as_done().and_then(|done| done.finish_reason.as_ref())
    }

    /// Take the delta out of a Delta event
    pub fn into_delta(self) -> Option<StreamDelta> {
        match self.payload {
            EventPayload::Delta(delta) => Some(delta),
            _ => None,
        }
    }

    /// Payload kind as a metric label
    pub const fn kind_str(&self) -> &'static str {
        match self.payload {
            EventPayload::Delta(_) => "delta",
            EventPayload::Done(_) => "done",
            EventPayload::Error(_) => "error",
        }
    }
}
