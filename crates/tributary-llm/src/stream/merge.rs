//! Multi-source stream merger
//!
//! Combines one primary source with any number of auxiliary sources into a
//! single event stream. Each source is forwarded by its own worker task. One
//! coordinator task owns the output sender, decides when the merged stream
//! ends, and joins every worker before the output closes.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use tributary_config::{DEFAULT_CHANNEL_CAPACITY, StreamConfig};
use tributary_core::{CancelReason, CancelSignal, RequestContext};
use tributary_telemetry::MergeMetrics;

use super::source::{EventStream, cancellation_event};
use crate::types::{PRIMARY_SOURCE, StreamError, StreamEvent};

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunables for a merge operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeSettings {
    /// Bound of the output channel and of the internal forwarding channel
    pub channel_capacity: usize,
    /// How long auxiliaries may keep running once the primary has finished
    pub drain_timeout: Duration,
    /// Deadline applied to contexts built by [`StreamMerger::request_context`]
    pub request_timeout: Option<Duration>,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            request_timeout: None,
        }
    }
}

impl TryFrom<&StreamConfig> for MergeSettings {
    type Error = anyhow::Error;

    fn try_from(config: &StreamConfig) -> anyhow::Result<Self> {
        Ok(Self {
            channel_capacity: config.channel_capacity,
            drain_timeout: config.drain_timeout_duration()?,
            request_timeout: config.request_timeout_duration()?,
        })
    }
}

/// Live count of tasks spawned by a [`StreamMerger`]
///
/// Covers the coordinator and every source worker. Drops to zero once all
/// merges started by the owning merger have closed their output.
#[derive(Debug, Clone, Default)]
pub struct WorkerGauge(Arc<AtomicUsize>);

impl WorkerGauge {
    /// Number of merge tasks currently alive
    pub fn active(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    fn enter(&self) -> TaskGuard {
        self.0.fetch_add(1, Ordering::AcqRel);
        TaskGuard(Arc::clone(&self.0))
    }
}

struct TaskGuard(Arc<AtomicUsize>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Merges a primary event stream with auxiliary tool streams
#[derive(Debug, Clone, Default)]
pub struct StreamMerger {
    settings: MergeSettings,
    gauge: WorkerGauge,
    metrics: MergeMetrics,
}

impl StreamMerger {
    pub fn new(settings: MergeSettings) -> Self {
        Self {
            settings,
            gauge: WorkerGauge::default(),
            metrics: MergeMetrics::new(),
        }
    }

    /// Build a merger from the `[stream]` configuration section
    ///
    /// # Errors
    ///
    /// Returns an error if the drain timeout is not a valid duration
    pub fn from_config(config: &StreamConfig) -> anyhow::Result<Self> {
        Ok(Self::new(MergeSettings::try_from(config)?))
    }

    pub const fn settings(&self) -> &MergeSettings {
        &self.settings
    }

    /// Handle observing the tasks this merger has spawned
    pub fn gauge(&self) -> WorkerGauge {
        self.gauge.clone()
    }

    pub fn active_workers(&self) -> usize {
        self.gauge.active()
    }

    /// Context for one request, bounded by the configured request timeout
    pub fn request_context(&self, token: CancellationToken) -> RequestContext {
        let signal = CancelSignal::new(token);
        match self.settings.request_timeout {
            Some(timeout) => RequestContext::new(signal.with_timeout(timeout)),
            None => RequestContext::new(signal),
        }
    }

    /// Merge `primary` with `auxiliaries` under `signal`
    ///
    /// Primary events pass through untouched; auxiliary events are re-tagged
    /// with source `1..=n` in argument order. The returned stream always ends
    /// with exactly one terminal event:
    ///
    /// - the primary's Done, held back until every auxiliary has finished or
    ///   the drain timeout has elapsed
    /// - the primary's Error, delivered immediately
    /// - a cancellation Error once `signal` fires
    ///
    /// Must be called from within a Tokio runtime.
    pub fn merge(&self, primary: EventStream, auxiliaries: Vec<EventStream>, signal: CancelSignal) -> EventStream {
        let capacity = self.settings.channel_capacity.max(1);
        let (out_tx, out_rx) = mpsc::channel(capacity);
        let (fwd_tx, fwd_rx) = mpsc::channel(capacity);
        let stop = signal.child_token();
        let span = tracing::debug_span!("merge", auxiliaries = auxiliaries.len());

        let mut workers = JoinSet::new();
        let mut sources = HashMap::new();
        let mut live_auxiliaries = BTreeSet::new();

        for (source, events) in std::iter::once(primary).chain(auxiliaries).enumerate() {
            let worker = forward(source, events, fwd_tx.clone(), stop.clone(), self.gauge.enter())
                .instrument(tracing::debug_span!(parent: &span, "merge_source", source));
            let handle = workers.spawn(worker);
            sources.insert(handle.id(), source);

            if source != PRIMARY_SOURCE {
                live_auxiliaries.insert(source);
            }
        }
        drop(fwd_tx);

        self.metrics.merge_started(sources.len());

        let coordinator = Coordinator {
            out: out_tx,
            rx: fwd_rx,
            rx_open: true,
            workers,
            sources,
            live_auxiliaries,
            held_done: None,
            drain_deadline: None,
            stop,
            drain_timeout: self.settings.drain_timeout,
            metrics: self.metrics.clone(),
            guard: self.gauge.enter(),
        };
        tokio::spawn(coordinator.run(signal).instrument(span));

        Box::pin(stream::unfold(out_rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        }))
    }
}

/// Merge with default settings
///
/// See [`StreamMerger::merge`].
pub fn merge(primary: EventStream, auxiliaries: Vec<EventStream>, signal: CancelSignal) -> EventStream {
    StreamMerger::default().merge(primary, auxiliaries, signal)
}

enum Forwarded {
    Event(usize, StreamEvent),
    Exhausted(usize),
}

/// Forward one source into the coordinator channel
///
/// Stops after the source's own terminal event, when the source ends, or
/// as soon as `stop` fires.
async fn forward(
    source: usize,
    mut events: EventStream,
    tx: mpsc::Sender<Forwarded>,
    stop: CancellationToken,
    _guard: TaskGuard,
) {
    loop {
        let next = tokio::select! {
            biased;
            () = stop.cancelled() => return,
            next = events.next() => next,
        };
        let Some(event) = next else {
            break;
        };

        let terminal = event.is_terminal();
        let event = if source == PRIMARY_SOURCE {
            event
        } else {
            event.with_source(source)
        };

        if !send_or_stop(&tx, &stop, Forwarded::Event(source, event)).await {
            return;
        }
        if terminal {
            break;
        }
    }

    tracing::trace!("source exhausted");
    send_or_stop(&tx, &stop, Forwarded::Exhausted(source)).await;
}

async fn send_or_stop(tx: &mpsc::Sender<Forwarded>, stop: &CancellationToken, message: Forwarded) -> bool {
    tokio::select! {
        biased;
        () = stop.cancelled() => false,
        sent = tx.send(message) => sent.is_ok(),
    }
}

enum Step {
    Cancelled(CancelReason),
    ConsumerGone,
    DrainExpired,
    Message(Option<Forwarded>),
    Joined(Result<(Id, ()), JoinError>),
}

enum Outcome {
    Completed { done: StreamEvent, unfinished: Vec<usize> },
    PrimaryFailed(StreamEvent),
    Cancelled(CancelReason),
    ConsumerGone,
}

impl Outcome {
    const fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::PrimaryFailed(_) => "failed",
            Self::Cancelled(_) => "cancelled",
            Self::ConsumerGone => "abandoned",
        }
    }
}

struct Coordinator {
    out: mpsc::Sender<StreamEvent>,
    rx: mpsc::Receiver<Forwarded>,
    rx_open: bool,
    workers: JoinSet<()>,
    sources: HashMap<Id, usize>,
    live_auxiliaries: BTreeSet<usize>,
    held_done: Option<StreamEvent>,
    drain_deadline: Option<Instant>,
    stop: CancellationToken,
    drain_timeout: Duration,
    metrics: MergeMetrics,
    guard: TaskGuard,
}

impl Coordinator {
    async fn run(mut self, signal: CancelSignal) {
        let started = std::time::Instant::now();
        let cancelled = signal.cancelled();
        tokio::pin!(cancelled);

        let outcome = self.pump(cancelled.as_mut()).await;
        self.shutdown().await;

        let mut label = outcome.label();
        let finals = match outcome {
            Outcome::Completed { done, unfinished } => {
                let mut finals = Vec::with_capacity(unfinished.len() + 1);
                for source in unfinished {
                    tracing::warn!(source, "auxiliary source still running at drain timeout");
                    finals.push(StreamEvent::error(StreamError::drain_timeout(source)).with_source(source));
                }
                finals.push(done);
                finals
            }
            Outcome::PrimaryFailed(error) => {
                tracing::debug!("primary source failed");
                vec![error]
            }
            Outcome::Cancelled(reason) => {
                self.emit_cancellation(reason).await;
                Vec::new()
            }
            Outcome::ConsumerGone => {
                tracing::debug!("consumer dropped the merged stream");
                Vec::new()
            }
        };

        if self.emit_final(finals, cancelled.as_mut()).await {
            label = "cancelled";
        }

        self.metrics.merge_finished(started, label);
        drop(self.guard);
    }

    /// Forward events until the merged stream's outcome is known
    async fn pump<F>(&mut self, mut cancelled: Pin<&mut F>) -> Outcome
    where
        F: Future<Output = CancelReason>,
    {
        loop {
            if let Some(done) = self.held_done.take_if(|_| self.live_auxiliaries.is_empty()) {
                return Outcome::Completed {
                    done,
                    unfinished: Vec::new(),
                };
            }

            // every worker is gone and every forwarded message consumed
            if !self.rx_open && self.workers.is_empty() {
                return self.drain_expired();
            }

            let step = tokio::select! {
                biased;
                reason = cancelled.as_mut() => Step::Cancelled(reason),
                () = self.out.closed() => Step::ConsumerGone,
                () = sleep_until_some(self.drain_deadline) => Step::DrainExpired,
                message = self.rx.recv(), if self.rx_open => Step::Message(message),
                Some(joined) = self.workers.join_next_with_id() => Step::Joined(joined),
            };

            let handled = match step {
                Step::Cancelled(reason) => Err(Outcome::Cancelled(reason)),
                Step::ConsumerGone => Err(Outcome::ConsumerGone),
                Step::DrainExpired => match self.flush_queued(cancelled.as_mut()).await {
                    Ok(()) => Err(self.drain_expired()),
                    Err(outcome) => Err(outcome),
                },
                Step::Message(None) => {
                    self.rx_open = false;
                    Ok(())
                }
                Step::Message(Some(Forwarded::Exhausted(source))) => {
                    self.source_exhausted(source);
                    Ok(())
                }
                Step::Message(Some(Forwarded::Event(source, event))) => {
                    self.handle_event(source, event, cancelled.as_mut()).await
                }
                Step::Joined(Ok(_)) => Ok(()),
                Step::Joined(Err(e)) => self.worker_failed(&e, cancelled.as_mut()).await,
            };

            if let Err(outcome) = handled {
                return outcome;
            }
        }
    }

    fn start_draining(&mut self, done: StreamEvent) {
        tracing::debug!(auxiliaries = self.live_auxiliaries.len(), "primary done, draining auxiliaries");
        self.held_done = Some(done);
        self.drain_deadline = Some(Instant::now() + self.drain_timeout);
    }

    /// Deliver messages workers had already queued when the drain window closed
    async fn flush_queued<F>(&mut self, mut cancelled: Pin<&mut F>) -> Result<(), Outcome>
    where
        F: Future<Output = CancelReason>,
    {
        while self.rx_open
            && let Ok(message) = self.rx.try_recv()
        {
            match message {
                Forwarded::Exhausted(source) => self.source_exhausted(source),
                Forwarded::Event(source, event) => self.handle_event(source, event, cancelled.as_mut()).await?,
            }
        }
        Ok(())
    }

    fn drain_expired(&mut self) -> Outcome {
        Outcome::Completed {
            done: self.held_done.take().unwrap_or_else(StreamEvent::implicit_done),
            unfinished: std::mem::take(&mut self.live_auxiliaries).into_iter().collect(),
        }
    }

    fn source_exhausted(&mut self, source: usize) {
        if source != PRIMARY_SOURCE {
            self.live_auxiliaries.remove(&source);
            tracing::debug!(source, remaining = self.live_auxiliaries.len(), "auxiliary source finished");
        } else if self.held_done.is_none() {
            tracing::debug!("primary ended without a terminal event");
            self.start_draining(StreamEvent::implicit_done());
        }
    }

    async fn handle_event<F>(&mut self, source: usize, event: StreamEvent, cancelled: Pin<&mut F>) -> Result<(), Outcome>
    where
        F: Future<Output = CancelReason>,
    {
        // a primary may carry events already tagged by an earlier merge;
        // only its own source 0 Done or Error ends it
        if source == PRIMARY_SOURCE && event.is_terminal() {
            if event.is_done() {
                self.start_draining(event);
                return Ok(());
            }
            return Err(Outcome::PrimaryFailed(event));
        }
        if let Some(error) = event.as_error() {
            tracing::debug!(source, code = %error.code, "auxiliary source reported an error");
        }

        self.deliver(event, cancelled).await
    }

    async fn worker_failed<F>(&mut self, error: &JoinError, cancelled: Pin<&mut F>) -> Result<(), Outcome>
    where
        F: Future<Output = CancelReason>,
    {
        let Some(source) = self.sources.get(&error.id()).copied() else {
            return Ok(());
        };
        tracing::warn!(source, error = %error, "merge worker failed");

        let event = StreamEvent::error(StreamError::worker_panicked(source));
        if source == PRIMARY_SOURCE {
            if self.held_done.is_none() {
                return Err(Outcome::PrimaryFailed(event));
            }
            return Ok(());
        }

        if self.live_auxiliaries.remove(&source) {
            return self.deliver(event.with_source(source), cancelled).await;
        }
        Ok(())
    }

    /// Send one event, yielding to cancellation while the consumer is slow
    async fn deliver<F>(&self, event: StreamEvent, cancelled: Pin<&mut F>) -> Result<(), Outcome>
    where
        F: Future<Output = CancelReason>,
    {
        let kind = event.kind_str();
        let sent = tokio::select! {
            biased;
            reason = cancelled => return Err(Outcome::Cancelled(reason)),
            sent = self.out.send(event) => sent,
        };

        match sent {
            Ok(()) => {
                self.metrics.event_delivered(kind);
                Ok(())
            }
            Err(_) => Err(Outcome::ConsumerGone),
        }
    }

    /// Deliver the closing events in order
    ///
    /// Switches to a cancellation error if the signal fires first and
    /// reports whether it did.
    async fn emit_final<F>(&self, events: Vec<StreamEvent>, mut cancelled: Pin<&mut F>) -> bool
    where
        F: Future<Output = CancelReason>,
    {
        for event in events {
            match self.deliver(event, cancelled.as_mut()).await {
                Ok(()) => {}
                Err(Outcome::Cancelled(reason)) => {
                    self.emit_cancellation(reason).await;
                    return true;
                }
                Err(_) => return false,
            }
        }
        false
    }

    async fn emit_cancellation(&self, reason: CancelReason) {
        tracing::info!(?reason, "merge cancelled");
        self.metrics.merge_cancelled();

        let event = cancellation_event(reason);
        let kind = event.kind_str();
        if self.out.send(event).await.is_ok() {
            self.metrics.event_delivered(kind);
        }
    }

    /// Stop every worker and wait for all of them to exit
    async fn shutdown(&mut self) {
        self.stop.cancel();
        self.rx.close();

        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined
                && e.is_panic()
            {
                tracing::warn!(error = %e, "merge worker panicked during shutdown");
            }
        }
    }
}

async fn sleep_until_some(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
