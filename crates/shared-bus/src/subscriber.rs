//! # Event Subscriber
//!
//! Receiving side of the notification bus. A subscription sees only events
//! published after it was created.

use crate::events::{EventFilter, PipelineEvent};
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("Event bus closed")]
    Closed,
}

/// Filtered view over the bus.
pub struct Subscription {
    receiver: broadcast::Receiver<PipelineEvent>,
    filter: EventFilter,
    lagged: u64,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<PipelineEvent>, filter: EventFilter) -> Self {
        Self {
            receiver,
            filter,
            lagged: 0,
        }
    }

    /// Next event the filter accepts, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<PipelineEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `Ok(None)` when
    /// nothing matching is buffered.
    pub fn try_recv(&mut self) -> Result<Option<PipelineEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => self.record_lag(skipped),
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Closed) => return Err(SubscriptionError::Closed),
            }
        }
    }

    /// Events this subscriber missed because it fell behind.
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    fn record_lag(&mut self, skipped: u64) {
        self.lagged += skipped;
        warn!(skipped, total = self.lagged, "Bus subscriber lagged, events dropped");
    }
}

/// `Stream` adapter over a filtered broadcast receiver.
///
/// Lagged gaps are skipped silently.
pub struct EventStream {
    inner: Pin<Box<dyn Stream<Item = PipelineEvent> + Send>>,
}

impl EventStream {
    pub(crate) fn new(receiver: broadcast::Receiver<PipelineEvent>, filter: EventFilter) -> Self {
        let inner = BroadcastStream::new(receiver)
            .filter_map(move |item| item.ok().filter(|event| filter.matches(event)));
        Self {
            inner: Box::pin(inner),
        }
    }
}

impl Stream for EventStream {
    type Item = PipelineEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
