//! Fold a stream of events into a complete response

use std::collections::BTreeMap;

use futures_util::StreamExt;

use super::source::EventStream;
use crate::error::LlmError;
use crate::types::{
    Choice, CompletionResponse, Content, FinishReason, Message, PRIMARY_SOURCE, Role, StreamDelta, StreamError,
    StreamEvent, ToolCall, Usage,
};

#[derive(Debug, Default)]
struct ChoiceState {
    role: Option<Role>,
    content: Vec<Content>,
    tool_calls: BTreeMap<u32, PartialToolCall>,
    finish_reason: Option<FinishReason>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

#[derive(Debug, Default)]
struct ToolResultState {
    tool_call_id: Option<String>,
    content: Vec<Content>,
}

/// Incrementally rebuilds a completion from stream events
///
/// Primary deltas are folded per choice index: text fragments are
/// concatenated and tool call fragments are joined by their index.
/// Auxiliary deltas become one tool message per source.
///
/// A stream has a single terminal event, so a multi-choice stream ends with
/// one Done. Its finish reason applies to every choice that has none of its
/// own.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    model: String,
    choices: BTreeMap<u32, ChoiceState>,
    tool_results: BTreeMap<usize, ToolResultState>,
    auxiliary_errors: Vec<(usize, StreamError)>,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
    error: Option<StreamError>,
    finished: bool,
}

impl StreamAccumulator {
    /// Accumulator for a response from `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Whether a terminal event has been seen
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Errors reported by auxiliary sources, in arrival order
    pub fn auxiliary_errors(&self) -> &[(usize, StreamError)] {
        &self.auxiliary_errors
    }

    /// Fold one event; events after the terminal one are ignored
    pub fn push(&mut self, event: StreamEvent) {
        if self.finished {
            tracing::debug!(source = event.source(), "ignoring event after terminal");
            return;
        }

        let source = event.source();
        if source != PRIMARY_SOURCE {
            self.push_auxiliary(source, event);
            return;
        }

        let index = event.index();
        if let Some(error) = event.as_error() {
            self.error = Some(error.clone());
            self.finished = true;
        } else if let Some(done) = event.as_done() {
            let choice = self.choices.entry(index).or_default();
            choice.finish_reason.clone_from(&done.finish_reason);
            self.finish_reason.clone_from(&done.finish_reason);
            if done.usage.is_some() {
                self.usage = done.usage;
            }
            self.finished = true;
        } else if let Some(delta) = event.into_delta() {
            self.choices.entry(index).or_default().apply(delta);
        }
    }

    fn push_auxiliary(&mut self, source: usize, event: StreamEvent) {
        if let Some(error) = event.as_error() {
            self.auxiliary_errors.push((source, error.clone()));
        } else if let Some(delta) = event.into_delta() {
            let result = self.tool_results.entry(source).or_default();
            if result.tool_call_id.is_none() {
                result.tool_call_id = delta.tool_call_id;
            }
            append_content(&mut result.content, delta.content);
        }
    }

    /// Build the response
    ///
    /// A stream that ended without a terminal event is treated as an
    /// implicit Done.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Stream` carrying the primary's terminal error
    pub fn finish(self) -> Result<CompletionResponse, LlmError> {
        if let Some(error) = self.error {
            return Err(LlmError::Stream(error));
        }

        let finish_reason = self.finish_reason;
        let choices = self
            .choices
            .into_iter()
            .map(|(index, mut state)| {
                if state.finish_reason.is_none() {
                    state.finish_reason.clone_from(&finish_reason);
                }
                state.into_choice(index)
            })
            .collect();

        let tool_results = self
            .tool_results
            .into_iter()
            .map(|(source, result)| {
                let id = result.tool_call_id.unwrap_or_else(|| format!("source_{source}"));
                Message::tool(id, result.content)
            })
            .collect();

        Ok(CompletionResponse {
            id: format!("cmpl-{}", uuid::Uuid::new_v4()),
            model: self.model,
            choices,
            usage: self.usage,
            tool_results,
        })
    }
}

impl ChoiceState {
    fn apply(&mut self, delta: StreamDelta) {
        if self.role.is_none() {
            self.role = delta.role;
        }
        append_content(&mut self.content, delta.content);

        for fragment in delta.tool_calls {
            let call = self.tool_calls.entry(fragment.index).or_default();
            if call.id.is_none() {
                call.id = fragment.id;
            }
            if let Some(function) = fragment.function {
                if call.name.is_none() {
                    call.name = function.name;
                }
                if let Some(arguments) = function.arguments {
                    call.arguments.push_str(&arguments);
                }
            }
        }
    }

    fn into_choice(self, index: u32) -> Choice {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .map(|(position, call)| {
                ToolCall::new(
                    call.id.unwrap_or_else(|| format!("call_{position}")),
                    call.name.unwrap_or_default(),
                    call.arguments,
                )
            })
            .collect();

        let message = Message {
            role: self.role.unwrap_or(Role::Assistant),
            content: self.content,
            name: None,
            tool_calls,
            tool_call_id: None,
        };

        Choice {
            index,
            message,
            finish_reason: self.finish_reason,
        }
    }
}

/// Append fragments, merging adjacent text parts
fn append_content(parts: &mut Vec<Content>, fragments: Vec<Content>) {
    for fragment in fragments {
        if let Content::Text { text: more } = &fragment
            && let Some(Content::Text { text }) = parts.last_mut()
        {
            text.push_str(more);
            continue;
        }
        parts.push(fragment);
    }
}

/// Drive `events` to completion and build the response
///
/// # Errors
///
/// Returns `LlmError::Stream` if the stream ended with a primary error
pub async fn collect_response(model: impl Into<String>, mut events: EventStream) -> Result<CompletionResponse, LlmError> {
    let mut accumulator = StreamAccumulator::new(model);
    while let Some(event) = events.next().await {
        accumulator.push(event);
        if accumulator.is_finished() {
            break;
        }
    }

    if !accumulator.auxiliary_errors().is_empty() {
        tracing::debug!(count = accumulator.auxiliary_errors().len(), "auxiliary sources reported errors");
    }

    accumulator.finish()
}
