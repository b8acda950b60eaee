//! Metric names and the stream merge instrument set

use std::time::Instant;

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram};

pub const MERGE_COUNT: &str = "tributary.merge.count";
pub const MERGE_EVENTS: &str = "tributary.merge.events";
pub const MERGE_CANCELLED: &str = "tributary.merge.cancelled";
pub const MERGE_DURATION: &str = "tributary.merge.duration";

/// Instruments recorded by the stream merger
///
/// Built from the global meter, so recording is a no-op until a meter
/// provider is installed by [`crate::init`].
#[derive(Clone)]
pub struct MergeMetrics {
    merges: Counter<u64>,
    events: Counter<u64>,
    cancelled: Counter<u64>,
    duration: Histogram<f64>,
}

impl Default for MergeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MergeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergeMetrics").finish_non_exhaustive()
    }
}

impl MergeMetrics {
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("tributary");

        Self {
            merges: meter
                .u64_counter(MERGE_COUNT)
                .with_description("Merge operations started")
                .build(),
            events: meter
                .u64_counter(MERGE_EVENTS)
                .with_description("Events delivered to merged stream consumers")
                .build(),
            cancelled: meter
                .u64_counter(MERGE_CANCELLED)
                .with_description("Merge operations ended by cancellation or deadline")
                .build(),
            duration: meter
                .f64_histogram(MERGE_DURATION)
                .with_description("Wall time from merge start to output close")
                .with_unit("s")
                .build(),
        }
    }

    /// Record the start of a merge over `sources` inputs
    pub fn merge_started(&self, sources: usize) {
        self.merges
            .add(1, &[KeyValue::new("sources", i64::try_from(sources).unwrap_or(i64::MAX))]);
    }

    /// Record one event delivered to the consumer
    pub fn event_delivered(&self, kind: &'static str) {
        self.events.add(1, &[KeyValue::new("kind", kind)]);
    }

    /// Record a merge ended by its cancel signal
    pub fn merge_cancelled(&self) {
        self.cancelled.add(1, &[]);
    }

    /// Record how a merge finished and how long it ran
    pub fn merge_finished(&self, start: Instant, outcome: &'static str) {
        self.duration
            .record(start.elapsed().as_secs_f64(), &[KeyValue::new("outcome", outcome)]);
    }
}
