//! Tool execution as auxiliary stream sources

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::Instrument;
use tributary_core::RequestContext;

use crate::error::LlmError;
use crate::stream::EventStream;
use crate::types::{Content, FinishReason, Role, StreamDelta, StreamError, StreamEvent, ToolCall};

/// Executes tool calls requested by a model
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run `call` and return its result content
    async fn execute(&self, call: &ToolCall, context: &RequestContext) -> Result<Vec<Content>, LlmError>;
}

/// Auxiliary source that runs one tool call
///
/// Yields a tool-role delta carrying the result followed by Done(`stop`),
/// or a single Error if execution fails. Dropping the stream abandons the
/// execution.
pub fn tool_source(executor: Arc<dyn ToolExecutor>, call: ToolCall, context: RequestContext) -> EventStream {
    let span = tracing::debug_span!("tool", name = %call.function.name, id = %call.id);
    let run = async move {
        match executor.execute(&call, &context).await {
            Ok(content) => {
                let delta = StreamDelta {
                    role: Some(Role::Tool),
                    content,
                    tool_calls: Vec::new(),
                    tool_call_id: Some(call.id),
                };
                vec![StreamEvent::delta(delta), StreamEvent::done(FinishReason::Stop)]
            }
            Err(e) => {
                tracing::warn!(tool = %call.function.name, error = %e, "tool execution failed");
                vec![StreamEvent::error(StreamError::from(&e))]
            }
        }
    };

    Box::pin(stream::once(run.instrument(span)).flat_map(stream::iter))
}

/// One auxiliary source per tool call, in call order
pub fn tool_sources(executor: &Arc<dyn ToolExecutor>, calls: &[ToolCall], context: &RequestContext) -> Vec<EventStream> {
    calls
        .iter()
        .map(|call| tool_source(Arc::clone(executor), call.clone(), context.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;
    use crate::testing::ScriptedExecutor;

    #[tokio::test]
    async fn successful_call_yields_result_then_done() {
        let executor: Arc<dyn ToolExecutor> = Arc::new(ScriptedExecutor::new().respond("weather", "sunny"));
        let call = ToolCall::new("call_1", "weather", "{}");

        let events: Vec<_> = tool_source(executor, call, RequestContext::default()).collect().await;

        assert_eq!(events.len(), 2);
        let delta = events[0].as_delta().unwrap();
        assert_eq!(delta.role, Some(Role::Tool));
        assert_eq!(delta.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(delta.text(), "sunny");
        assert_eq!(events[1].finish_reason(), Some(&FinishReason::Stop));
    }

    #[tokio::test]
    async fn failing_call_yields_single_error() {
        let executor: Arc<dyn ToolExecutor> = Arc::new(ScriptedExecutor::new());
        let call = ToolCall::new("call_2", "missing", "{}");

        let events: Vec<_> = tool_source(executor, call, RequestContext::default()).collect().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_error().map(|e| e.code.as_str()), Some("tool_execution_error"));
    }

    #[tokio::test]
    async fn one_source_per_call() {
        let executor: Arc<dyn ToolExecutor> = Arc::new(ScriptedExecutor::new().respond("a", "1").respond("b", "2"));
        let calls = [ToolCall::new("c1", "a", "{}"), ToolCall::new("c2", "b", "{}")];

        let sources = tool_sources(&executor, &calls, &RequestContext::default());
        assert_eq!(sources.len(), 2);
    }
}
