//! Scripted sources, providers and tool executors for tests
//!
//! Available to this crate's unit tests and, with the `testing` feature, to
//! downstream test suites.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use tributary_core::RequestContext;

use crate::error::LlmError;
use crate::provider::{Provider, ProviderCapabilities};
use crate::stream::{EventStream, collect_response, with_cancellation};
use crate::tool::ToolExecutor;
use crate::types::{
    CompletionRequest, CompletionResponse, Content, FinishReason, StreamError, StreamEvent, StreamToolCall, ToolCall,
};

#[derive(Debug, Clone)]
enum Step {
    Emit(StreamEvent),
    Delay(Duration),
    Panic(String),
}

/// Observes whether a scripted stream has been dropped
#[derive(Debug, Clone, Default)]
pub struct DropProbe(Arc<AtomicBool>);

impl DropProbe {
    pub fn dropped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct ProbeGuard(DropProbe);

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.0.0.store(true, Ordering::Release);
    }
}

/// A stream source that replays a fixed script
///
/// Steps run in order: events are yielded, delays sleep on the Tokio clock
/// (so paused-time tests stay deterministic). After the last step the
/// source either ends or, with [`ScriptedSource::hang`], never yields again.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    steps: Vec<Step>,
    hang: bool,
    probe: Option<DropProbe>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn emit(mut self, event: StreamEvent) -> Self {
        self.steps.push(Step::Emit(event));
        self
    }

    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        self.emit(StreamEvent::text(text))
    }

    /// Emit a complete tool call as an opening and an arguments fragment
    #[must_use]
    pub fn tool_call(self, index: u32, id: &str, name: &str, arguments: &str) -> Self {
        self.emit(StreamEvent::tool_call(StreamToolCall::start(index, id, name)))
            .emit(StreamEvent::tool_call(StreamToolCall::arguments(index, arguments)))
    }

    #[must_use]
    pub fn delay(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Delay(duration));
        self
    }

    #[must_use]
    pub fn done(self, reason: FinishReason) -> Self {
        self.emit(StreamEvent::done(reason))
    }

    #[must_use]
    pub fn fail(self, error: StreamError) -> Self {
        self.emit(StreamEvent::error(error))
    }

    /// Panic the task polling this source
    #[must_use]
    pub fn panic(mut self, message: impl Into<String>) -> Self {
        self.steps.push(Step::Panic(message.into()));
        self
    }

    /// Never end once the script is exhausted
    #[must_use]
    pub const fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Attach a probe that flips once the stream is dropped
    #[must_use]
    pub fn with_drop_probe(mut self) -> (Self, DropProbe) {
        let probe = DropProbe::default();
        self.probe = Some(probe.clone());
        (self, probe)
    }

    /// Turn the script into a stream
    ///
    /// # Panics
    ///
    /// The stream panics when it reaches a [`ScriptedSource::panic`] step.
    pub fn into_stream(self) -> EventStream {
        let state = ScriptState {
            steps: self.steps.into(),
            hang: self.hang,
            _probe: self.probe.map(ProbeGuard),
        };

        Box::pin(stream::unfold(state, |mut state| async move {
            loop {
                match state.steps.pop_front() {
                    Some(Step::Emit(event)) => return Some((event, state)),
                    Some(Step::Delay(duration)) => tokio::time::sleep(duration).await,
                    Some(Step::Panic(message)) => panic!("{message}"),
                    None if state.hang => std::future::pending::<()>().await,
                    None => return None,
                }
            }
        }))
    }
}

struct ScriptState {
    steps: VecDeque<Step>,
    hang: bool,
    _probe: Option<ProbeGuard>,
}

/// Provider that answers every request with the same script
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    script: ScriptedSource,
    capabilities: ProviderCapabilities,
    failure: Option<fn() -> LlmError>,
    requests: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>, script: ScriptedSource) -> Self {
        Self {
            name: name.into(),
            script,
            capabilities: ProviderCapabilities {
                streaming: true,
                tool_calling: true,
                vision: true,
            },
            failure: None,
            requests: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub const fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Reject every request with the error built by `failure`
    #[must_use]
    pub fn failing(mut self, failure: fn() -> LlmError) -> Self {
        self.failure = Some(failure);
        self
    }

    /// Number of requests received so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::Acquire)
    }

    fn start(&self) -> Result<EventStream, LlmError> {
        self.requests.fetch_add(1, Ordering::AcqRel);
        if let Some(failure) = self.failure {
            return Err(failure());
        }
        Ok(self.script.clone().into_stream())
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        context: &RequestContext,
    ) -> Result<CompletionResponse, LlmError> {
        let events = with_cancellation(self.start()?, context.signal.clone());
        collect_response(request.model.clone(), events).await
    }

    async fn complete_stream(
        &self,
        _request: &CompletionRequest,
        context: &RequestContext,
    ) -> Result<EventStream, LlmError> {
        Ok(with_cancellation(self.start()?, context.signal.clone()))
    }
}

/// Tool executor answering by tool name
#[derive(Debug, Clone, Default)]
pub struct ScriptedExecutor {
    responses: HashMap<String, Vec<Content>>,
    delay: Option<Duration>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer calls to `tool` with `text`
    #[must_use]
    pub fn respond(mut self, tool: &str, text: &str) -> Self {
        self.responses.insert(tool.to_owned(), vec![Content::text(text)]);
        self
    }

    /// Sleep before answering
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ToolExecutor for ScriptedExecutor {
    async fn execute(&self, call: &ToolCall, _context: &RequestContext) -> Result<Vec<Content>, LlmError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.responses
            .get(&call.function.name)
            .cloned()
            .ok_or_else(|| LlmError::ToolExecution {
                tool: call.function.name.clone(),
                message: "no scripted response".to_owned(),
            })
    }
}
