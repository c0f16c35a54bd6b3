//! # Event Publisher
//!
//! Publishing side of the notification bus.

use crate::events::{EventFilter, EventTopic, PipelineEvent};
use crate::subscriber::{EventStream, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Sink for pipeline notifications.
///
/// Subsystems hold an `Arc<dyn EventPublisher>` so tests can swap in the
/// in-memory bus and read back what was announced.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Announce `event`. Returns how many live subscribers saw it.
    async fn publish(&self, event: PipelineEvent) -> usize;
}

/// Broadcast-backed bus with per-topic publish counters.
///
/// Slow subscribers lag and skip events rather than stall publishers.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<PipelineEvent>,
    published: [AtomicU64; 4],
    capacity: usize,
}

fn topic_slot(topic: EventTopic) -> usize {
    match topic {
        EventTopic::Envelopes => 0,
        EventTopic::FilterHealth => 1,
        EventTopic::Delivery => 2,
        EventTopic::Store | EventTopic::All => 3,
    }
}

impl InMemoryEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Bus whose subscribers buffer at most `capacity` events each.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: Default::default(),
            capacity: capacity.max(1),
        }
    }

    /// Receive every event published from now on that `filter` accepts.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        trace!(topics = ?filter.topics, "Bus subscriber attached");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Same as [`subscribe`](Self::subscribe), as a `Stream`.
    #[must_use]
    pub fn stream(&self, filter: EventFilter) -> EventStream {
        EventStream::new(self.sender.subscribe(), filter)
    }

    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Events published on `topic` so far, delivered or not.
    #[must_use]
    pub fn published(&self, topic: EventTopic) -> u64 {
        match topic {
            EventTopic::All => self.total_published(),
            topic => self.published[topic_slot(topic)].load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn total_published(&self) -> u64 {
        self.published
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .sum()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: PipelineEvent) -> usize {
        let topic = event.topic();
        self.published[topic_slot(topic)].fetch_add(1, Ordering::Relaxed);

        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(topic = ?topic, receivers, "Event published");
                receivers
            }
            // No subscriber is attached; notifications are best effort.
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{FilterId, MessageHash};

    fn expired() -> PipelineEvent {
        PipelineEvent::EnvelopeExpired {
            hash: MessageHash([1u8; 32]),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_still_counts() {
        let bus = InMemoryEventBus::new();
        assert_eq!(bus.publish(expired()).await, 0);
        assert_eq!(bus.published(EventTopic::Envelopes), 1);
        assert_eq!(bus.total_published(), 1);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_regardless_of_filter() {
        let bus = InMemoryEventBus::new();
        let _all = bus.subscribe(EventFilter::all());
        let _delivery = bus.subscribe(EventFilter::topics(vec![EventTopic::Delivery]));

        // Topic filtering happens on the receiving side
        assert_eq!(bus.publish(expired()).await, 2);
        assert_eq!(bus.receiver_count(), 2);
    }

    #[tokio::test]
    async fn test_counters_are_per_topic() {
        let bus = InMemoryEventBus::new();
        bus.publish(expired()).await;
        bus.publish(PipelineEvent::FilterHealthChanged {
            filter_id: FilterId::from("F1"),
            active_subscriptions: 2,
            required: 2,
            healthy: true,
        })
        .await;

        assert_eq!(bus.published(EventTopic::Envelopes), 1);
        assert_eq!(bus.published(EventTopic::FilterHealth), 1);
        assert_eq!(bus.published(EventTopic::Delivery), 0);
        assert_eq!(bus.published(EventTopic::All), 2);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        assert_eq!(InMemoryEventBus::with_capacity(0).capacity(), 1);
        assert_eq!(InMemoryEventBus::default().capacity(), DEFAULT_CHANNEL_CAPACITY);
    }
}
