//! End-to-end behavior of the stream merger

mod harness;

use std::sync::Arc;
use std::time::Duration;

use harness::observe::{assert_idle, assert_single_terminal, observe};
use harness::scenarios;
use indoc::indoc;
use tokio_util::sync::CancellationToken;
use tributary_config::Config;
use tributary_core::{CancelSignal, ErrorCategory, RequestContext};
use tributary_llm::stream::{MergeSettings, StreamMerger, from_events};
use tributary_llm::testing::{ScriptedExecutor, ScriptedSource};
use tributary_llm::types::{FinishReason, StreamError, StreamEvent};
use tributary_llm::{ToolExecutor, merge, tool_source};

const LIMIT: Duration = Duration::from_secs(5);

fn merger(drain_timeout: Duration) -> StreamMerger {
    StreamMerger::new(MergeSettings {
        channel_capacity: 2,
        drain_timeout,
        ..MergeSettings::default()
    })
}

#[tokio::test]
async fn scenario_a_hello_world_passes_through() {
    let observed = observe(
        merge(scenarios::hello_world().into_stream(), Vec::new(), CancelSignal::default()),
        LIMIT,
    )
    .await;

    let expected = vec![
        StreamEvent::text("Hello "),
        StreamEvent::text("world"),
        StreamEvent::done(FinishReason::Stop),
    ];
    assert_eq!(observed.events, expected);
}

#[tokio::test]
async fn scenario_b_tool_result_is_merged_and_primary_governs_termination() {
    let executor: Arc<dyn ToolExecutor> = Arc::new(ScriptedExecutor::new().respond("get_weather", "12C and raining"));
    let call = tributary_llm::types::ToolCall::new("call_weather", "get_weather", r#"{"city":"Oslo"}"#);
    let primary = ScriptedSource::new()
        .emit(StreamEvent::tool_call(tributary_llm::types::StreamToolCall::start(
            0,
            "call_weather",
            "get_weather",
        )))
        .delay(Duration::from_millis(20))
        .done(FinishReason::ToolCalls);
    let auxiliary = tool_source(executor, call, RequestContext::default());

    let observed = observe(
        merge(primary.into_stream(), vec![auxiliary], CancelSignal::default()),
        LIMIT,
    )
    .await;

    assert_eq!(observed.events.len(), 4);
    assert_single_terminal(&observed.events);
    assert_eq!(observed.last().finish_reason(), Some(&FinishReason::ToolCalls));

    let tool_events = observed.from_source(1);
    assert_eq!(tool_events.len(), 2);
    assert_eq!(
        tool_events[0].as_delta().and_then(|d| d.tool_call_id.as_deref()),
        Some("call_weather")
    );
    assert!(tool_events[1].is_done());
    assert!(!tool_events[1].is_terminal());
}

#[tokio::test]
async fn scenario_b_with_scripted_auxiliary() {
    let observed = observe(
        merge(
            scenarios::weather_tool_call().into_stream(),
            vec![scenarios::tool_result("12C", Duration::from_millis(30)).into_stream()],
            CancelSignal::default(),
        ),
        LIMIT,
    )
    .await;

    assert_single_terminal(&observed.events);
    assert_eq!(observed.texts_from(1), vec!["12C".to_owned()]);
    assert_eq!(observed.last().source(), 0);
}

#[tokio::test(start_paused = true)]
async fn scenario_c_cancellation_after_100ms() {
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let merger = merger(Duration::from_secs(1));
    let observed = observe(
        merger.merge(
            ScriptedSource::new().hang().into_stream(),
            Vec::new(),
            CancelSignal::new(token),
        ),
        LIMIT,
    )
    .await;

    assert_eq!(observed.events.len(), 1);
    let error = observed.last().as_error().unwrap();
    assert_eq!(error.code, StreamError::CANCELLED);
    assert_eq!(error.category, ErrorCategory::Cancellation);
    assert!(observed.elapsed >= Duration::from_millis(100));
    assert!(observed.elapsed < Duration::from_millis(150));
    assert_idle(&merger.gauge()).await;
}

#[tokio::test]
async fn primary_error_after_n_deltas_ends_stream_with_auxiliaries_running() {
    const N: usize = 5;

    let primary = scenarios::counting(N, Duration::from_millis(2)).fail(StreamError::simulated("upstream reset"));
    let auxiliaries = (0..3).map(|_| ScriptedSource::new().hang().into_stream()).collect();

    let merger = merger(Duration::from_secs(1));
    let observed = observe(merger.merge(primary.into_stream(), auxiliaries, CancelSignal::default()), LIMIT).await;

    assert_eq!(observed.events.len(), N + 1);
    assert!(observed.events[..N].iter().all(StreamEvent::is_delta));
    assert_single_terminal(&observed.events);
    assert_eq!(
        observed.last().as_error().map(|e| e.code.as_str()),
        Some(StreamError::SIMULATED)
    );
    assert_idle(&merger.gauge()).await;
}

#[tokio::test]
async fn auxiliary_error_while_primary_runs_is_tagged() {
    let primary = scenarios::counting(4, Duration::from_millis(10)).done(FinishReason::Stop);
    let failing = ScriptedSource::new()
        .delay(Duration::from_millis(5))
        .fail(StreamError::simulated("tool crashed"));
    let healthy = scenarios::tool_result("ok", Duration::from_millis(1));

    let observed = observe(
        merge(
            primary.into_stream(),
            vec![healthy.into_stream(), failing.into_stream()],
            CancelSignal::default(),
        ),
        LIMIT,
    )
    .await;

    let error = observed.events.iter().find(|e| e.is_error()).unwrap();
    assert_eq!(error.source(), 2);
    assert!(!error.is_terminal());

    let error_position = observed.events.iter().position(StreamEvent::is_error).unwrap();
    assert!(observed.events[error_position + 1..].iter().any(|e| e.source() == 0));
    assert_eq!(observed.texts_from(0).len(), 4);
    assert_single_terminal(&observed.events);
}

#[tokio::test]
async fn exactly_one_terminal_across_shapes() {
    let shapes: Vec<(ScriptedSource, Vec<ScriptedSource>)> = vec![
        (scenarios::hello_world(), Vec::new()),
        (scenarios::hello_world(), vec![scenarios::tool_result("a", Duration::ZERO)]),
        (
            ScriptedSource::new().done(FinishReason::Stop),
            vec![
                ScriptedSource::new().done(FinishReason::Stop),
                ScriptedSource::new().fail(StreamError::simulated("x")),
            ],
        ),
        (ScriptedSource::new().text("no terminal"), vec![ScriptedSource::new().text("aux")]),
        (
            ScriptedSource::new().fail(StreamError::simulated("early")),
            vec![scenarios::tool_result("late", Duration::from_millis(20))],
        ),
        (
            ScriptedSource::new().done(FinishReason::Length).text("after done"),
            Vec::new(),
        ),
    ];

    for (primary, auxiliaries) in shapes {
        let auxiliaries = auxiliaries.into_iter().map(ScriptedSource::into_stream).collect();
        let observed = observe(merge(primary.into_stream(), auxiliaries, CancelSignal::default()), LIMIT).await;
        assert_single_terminal(&observed.events);
    }
}

#[tokio::test]
async fn zero_auxiliaries_equivalent_to_primary() {
    let events = vec![
        StreamEvent::text("a").with_index(1),
        StreamEvent::text("b"),
        StreamEvent::done(FinishReason::Other("end_turn".to_owned())),
    ];

    let observed = observe(merge(from_events(events.clone()), Vec::new(), CancelSignal::default()), LIMIT).await;
    assert_eq!(observed.events, events);
}

#[tokio::test]
async fn cancelling_at_any_point_leaves_no_workers() {
    for delay_ms in [0, 1, 3, 7, 15] {
        let token = CancellationToken::new();
        let merger = merger(Duration::from_secs(1));

        let primary = scenarios::counting(50, Duration::from_millis(1)).hang();
        let auxiliaries = vec![
            scenarios::counting(10, Duration::from_millis(2)).hang().into_stream(),
            ScriptedSource::new().hang().into_stream(),
        ];
        let stream = merger.merge(primary.into_stream(), auxiliaries, CancelSignal::new(token.clone()));

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            canceller.cancel();
        });

        let observed = observe(stream, LIMIT).await;
        assert_single_terminal(&observed.events);
        assert!(observed.last().as_error().is_some_and(StreamError::is_cancellation));
        assert_idle(&merger.gauge()).await;
    }
}

#[tokio::test(start_paused = true)]
async fn deadline_surfaces_as_timeout() {
    let signal = CancelSignal::default().with_timeout(Duration::from_millis(250));

    let observed = observe(
        merge(
            scenarios::counting(3, Duration::from_millis(10)).hang().into_stream(),
            Vec::new(),
            signal,
        ),
        LIMIT,
    )
    .await;

    assert_eq!(observed.texts_from(0).len(), 3);
    let error = observed.last().as_error().unwrap();
    assert_eq!(error.code, StreamError::DEADLINE_EXCEEDED);
    assert_eq!(error.category, ErrorCategory::Timeout);
}

#[tokio::test(start_paused = true)]
async fn merger_from_config_applies_drain_timeout() {
    let config = Config::from_toml_str(indoc! {r#"
        [stream]
        channel_capacity = 4
        drain_timeout = "50ms"
        request_timeout = "2s"
    "#})
    .unwrap();
    let merger = StreamMerger::from_config(&config.stream).unwrap();
    assert_eq!(merger.settings().drain_timeout, Duration::from_millis(50));

    let observed = observe(
        merger.merge(
            ScriptedSource::new().done(FinishReason::Stop).into_stream(),
            vec![ScriptedSource::new().hang().into_stream()],
            CancelSignal::default(),
        ),
        LIMIT,
    )
    .await;

    assert_eq!(observed.events.len(), 2);
    assert_eq!(
        observed.events[0].as_error().map(|e| e.code.as_str()),
        Some(StreamError::DRAIN_TIMEOUT)
    );
    assert_eq!(observed.events[0].source(), 1);
    assert!(observed.last().is_done());
    assert!(observed.elapsed >= Duration::from_millis(50));
    assert_idle(&merger.gauge()).await;
}

#[tokio::test(start_paused = true)]
async fn configured_request_timeout_bounds_the_merge() {
    let config = Config::from_toml_str(indoc! {r#"
        [stream]
        request_timeout = "300ms"
    "#})
    .unwrap();
    let merger = StreamMerger::from_config(&config.stream).unwrap();
    let context = merger.request_context(CancellationToken::new());

    let observed = observe(
        merger.merge(
            scenarios::counting(2, Duration::from_millis(10)).hang().into_stream(),
            vec![ScriptedSource::new().hang().into_stream()],
            context.signal.clone(),
        ),
        LIMIT,
    )
    .await;

    assert_eq!(observed.texts_from(0).len(), 2);
    assert_eq!(
        observed.last().as_error().map(|e| e.code.as_str()),
        Some(StreamError::DEADLINE_EXCEEDED)
    );
    assert!(observed.elapsed >= Duration::from_millis(300));
    assert_idle(&merger.gauge()).await;
}

#[tokio::test]
async fn merged_events_serialize_as_json_lines() -> anyhow::Result<()> {
    let observed = observe(
        merge(
            scenarios::weather_tool_call().into_stream(),
            vec![scenarios::tool_result("12C", Duration::from_millis(5)).into_stream()],
            CancelSignal::default(),
        ),
        LIMIT,
    )
    .await;

    let lines = observed
        .events
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;

    let last: serde_json::Value = serde_json::from_str(lines.last().map_or("", String::as_str))?;
    assert_eq!(last["type"], "done");
    assert_eq!(last["source"], 0);
    assert_eq!(last["finish_reason"], "tool_calls");

    let tool_result = lines
        .iter()
        .map(|line| serde_json::from_str::<serde_json::Value>(line))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .find(|value| value["source"] == 1 && value["type"] == "delta")
        .ok_or_else(|| anyhow::anyhow!("no tool result delta in {lines:?}"))?;
    assert_eq!(tool_result["content"][0]["text"], "12C");

    let decoded = lines
        .iter()
        .map(|line| serde_json::from_str::<StreamEvent>(line))
        .collect::<Result<Vec<_>, _>>()?;
    assert_eq!(decoded, observed.events);

    Ok(())
}
