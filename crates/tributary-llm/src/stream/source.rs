//! Stream sources and adapters for building them

use std::pin::Pin;

use futures_util::stream::{self, Stream, StreamExt};
use tributary_core::{CancelReason, CancelSignal};

use crate::error::LlmError;
use crate::types::{StreamError, StreamEvent};

/// A finite, non-restartable sequence of stream events
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Source that yields a fixed list of events
pub fn from_events<I>(events: I) -> EventStream
where
    I: IntoIterator<Item = StreamEvent>,
    I::IntoIter: Send + 'static,
{
    Box::pin(stream::iter(events))
}

/// Source over fallible adapter output
///
/// The first `Err` becomes a terminal Error event and ends the source.
pub fn from_results<S>(results: S) -> EventStream
where
    S: Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static,
{
    until_terminal(results.map(|result| result.unwrap_or_else(|e| StreamEvent::error(StreamError::from(&e)))))
}

/// End a source right after its first terminal event
pub fn until_terminal<S>(events: S) -> EventStream
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let events: EventStream = Box::pin(events);
    Box::pin(stream::unfold(Some(events), |state| async move {
        let mut events = state?;
        let event = events.next().await?;
        let next = if event.is_terminal() { None } else { Some(events) };
        Some((event, next))
    }))
}

/// Bind a source to a cancel signal
///
/// When the signal fires before the source finishes, one cancellation Error
/// is yielded and the source is dropped.
pub fn with_cancellation<S>(events: S, signal: CancelSignal) -> EventStream
where
    S: Stream<Item = StreamEvent> + Send + 'static,
{
    let events: EventStream = Box::pin(events);
    Box::pin(stream::unfold(Some((events, signal)), |state| async move {
        let (mut events, signal) = state?;

        let polled = tokio::select! {
            biased;
            reason = signal.cancelled() => Err(reason),
            event = events.next() => Ok(event),
        };

        match polled {
            Err(reason) => Some((cancellation_event(reason), None)),
            Ok(event) => {
                let event = event?;
                let next = if event.is_terminal() { None } else { Some((events, signal)) };
                Some((event, next))
            }
        }
    }))
}

/// Error event describing why a signal fired
pub fn cancellation_event(reason: CancelReason) -> StreamEvent {
    let error = match reason {
        CancelReason::Requested => StreamError::cancelled(),
        CancelReason::DeadlineExceeded => StreamError::deadline_exceeded(),
    };
    StreamEvent::error(error)
}
