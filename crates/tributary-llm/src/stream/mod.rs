//! Stream sources, the multi-source merger and response accumulation

pub mod accumulate;
pub mod merge;
pub mod source;

pub use accumulate::{StreamAccumulator, collect_response};
pub use merge::{MergeSettings, StreamMerger, WorkerGauge, merge};
pub use source::{EventStream, cancellation_event, from_events, from_results, until_terminal, with_cancellation};
