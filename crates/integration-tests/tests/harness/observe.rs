//! Drive merged streams and check the invariants every run must hold

use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::Instant;
use tributary_llm::stream::WorkerGauge;
use tributary_llm::{EventStream, StreamEvent};

/// Events received from a stream plus how long it stayed open
pub struct Observed {
    pub events: Vec<StreamEvent>,
    pub elapsed: Duration,
}

impl Observed {
    pub fn last(&self) -> &StreamEvent {
        self.events.last().expect("stream yielded no events")
    }

    pub fn from_source(&self, source: usize) -> Vec<&StreamEvent> {
        self.events.iter().filter(|e| e.source() == source).collect()
    }

    pub fn texts_from(&self, source: usize) -> Vec<String> {
        self.from_source(source)
            .into_iter()
            .filter_map(|e| e.as_delta().map(tributary_llm::types::StreamDelta::text))
            .collect()
    }
}

/// Read `stream` until it closes, failing if that takes longer than `limit`
pub async fn observe(mut stream: EventStream, limit: Duration) -> Observed {
    let started = Instant::now();
    let mut events = Vec::new();

    let drained = tokio::time::timeout(limit, async {
        while let Some(event) = stream.next().await {
            events.push(event);
        }
    })
    .await;

    assert!(drained.is_ok(), "stream still open after {limit:?}: {events:?}");

    Observed {
        events,
        elapsed: started.elapsed(),
    }
}

/// Exactly one terminal event, and it is the last one
pub fn assert_single_terminal(events: &[StreamEvent]) {
    let terminals: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_terminal())
        .map(|(i, _)| i)
        .collect();

    assert_eq!(terminals.len(), 1, "expected one terminal event in {events:?}");
    assert_eq!(terminals[0], events.len() - 1, "terminal event is not last in {events:?}");
}

/// Wait for every merge task to exit
pub async fn assert_idle(gauge: &WorkerGauge) {
    for _ in 0..200 {
        if gauge.active() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} merge tasks still running", gauge.active());
}
