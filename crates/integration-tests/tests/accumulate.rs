//! Folding merged streams back into complete responses

mod harness;

use std::sync::Arc;
use std::time::Duration;

use harness::scenarios;
use tributary_core::{CancelSignal, ClassifiedError, ErrorCategory, RequestContext};
use tributary_llm::testing::{ScriptedExecutor, ScriptedSource};
use tributary_llm::types::{FinishReason, Role, StreamError, Usage};
use tributary_llm::{LlmError, StreamEvent, ToolExecutor, collect_response, merge, tool_sources};

#[tokio::test]
async fn tool_round_trip_collects_calls_and_results() {
    let executor: Arc<dyn ToolExecutor> = Arc::new(
        ScriptedExecutor::new()
            .respond("get_weather", "rain")
            .respond("get_time", "09:00"),
    );
    let context = RequestContext::default();

    let primary = ScriptedSource::new()
        .tool_call(0, "call_weather", "get_weather", r#"{"city":"Oslo"}"#)
        .tool_call(1, "call_time", "get_time", "{}")
        .delay(Duration::from_millis(20))
        .emit(StreamEvent::done_with_usage(FinishReason::ToolCalls, Usage::new(12, 8)));

    let first_pass = collect_response("agent", primary.clone().into_stream()).await.unwrap();
    let calls = first_pass.first().unwrap().message.tool_calls.clone();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].function.arguments, r#"{"city":"Oslo"}"#);

    let merged = merge(
        primary.into_stream(),
        tool_sources(&executor, &calls, &context),
        context.signal.clone(),
    );
    let response = collect_response("agent", merged).await.unwrap();

    let choice = response.first().unwrap();
    assert_eq!(choice.message.role, Role::Assistant);
    assert_eq!(choice.finish_reason, Some(FinishReason::ToolCalls));
    assert_eq!(response.usage.map(|u| u.total_tokens), Some(20));

    let mut results: Vec<_> = response
        .tool_results
        .iter()
        .map(|m| (m.tool_call_id.clone().unwrap_or_default(), m.text()))
        .collect();
    results.sort();
    assert_eq!(
        results,
        vec![
            ("call_time".to_owned(), "09:00".to_owned()),
            ("call_weather".to_owned(), "rain".to_owned()),
        ]
    );
}

#[tokio::test]
async fn failed_tool_does_not_fail_the_response() {
    let executor: Arc<dyn ToolExecutor> = Arc::new(ScriptedExecutor::new());
    let context = RequestContext::default();
    let calls = vec![tributary_llm::types::ToolCall::new("call_x", "unknown_tool", "{}")];

    let primary = ScriptedSource::new()
        .delay(Duration::from_millis(10))
        .text("done thinking")
        .done(FinishReason::Stop);
    let merged = merge(
        primary.into_stream(),
        tool_sources(&executor, &calls, &context),
        context.signal.clone(),
    );

    let response = collect_response("m", merged).await.unwrap();
    assert_eq!(response.text(), "done thinking");
    assert!(response.tool_results.is_empty());
}

#[tokio::test]
async fn primary_error_surfaces_with_category() {
    let primary = scenarios::counting(3, Duration::from_millis(1)).fail(StreamError::simulated("provider hung up"));
    let merged = merge(primary.into_stream(), Vec::new(), CancelSignal::default());

    let err = collect_response("m", merged).await.unwrap_err();
    assert!(matches!(err, LlmError::Stream(_)));
    assert_eq!(err.category(), ErrorCategory::Simulation);
    assert_eq!(err.code(), StreamError::SIMULATED);
}

#[tokio::test(start_paused = true)]
async fn cancelled_collection_reports_cancellation() {
    let signal = CancelSignal::default().with_timeout(Duration::from_millis(50));
    let merged = merge(
        scenarios::counting(2, Duration::from_millis(5)).hang().into_stream(),
        Vec::new(),
        signal,
    );

    let err = collect_response("m", merged).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Timeout);
}
