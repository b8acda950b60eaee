//! Scripted sources for the reference merge scenarios

use std::time::Duration;

use tributary_llm::testing::ScriptedSource;
use tributary_llm::types::FinishReason;

/// Primary that says hello and stops
pub fn hello_world() -> ScriptedSource {
    ScriptedSource::new()
        .text("Hello ")
        .text("world")
        .done(FinishReason::Stop)
}

/// Primary that requests one tool call and finishes with `tool_calls`
pub fn weather_tool_call() -> ScriptedSource {
    ScriptedSource::new()
        .tool_call(0, "call_weather", "get_weather", r#"{"city":"Oslo"}"#)
        .done(FinishReason::ToolCalls)
}

/// Auxiliary that reports a tool result after `delay`
pub fn tool_result(text: &str, delay: Duration) -> ScriptedSource {
    ScriptedSource::new()
        .delay(delay)
        .text(text)
        .done(FinishReason::Stop)
}

/// Primary that streams `n` numbered deltas with a pause between each
pub fn counting(n: usize, pause: Duration) -> ScriptedSource {
    (0..n).fold(ScriptedSource::new(), |script, i| script.delay(pause).text(i.to_string()))
}
