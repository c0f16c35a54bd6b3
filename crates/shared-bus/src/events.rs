//! # Pipeline Events
//!
//! Defines all notification types that flow through the shared bus.
//! These are observability hooks, not a delivery guarantee: matched
//! messages are delivered through filter stores, the bus only announces them.

use serde::{Deserialize, Serialize};
use shared_types::{FilterId, MessageHash, MessageSource, PeerId};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineEvent {
    // =========================================================================
    // SUBSYSTEM 2: ENVELOPE PIPELINE
    // =========================================================================
    /// An envelope finished processing, whether or not a filter matched.
    EnvelopeAvailable {
        hash: MessageHash,
        pubsub_topic: String,
        content_topic: String,
        source: MessageSource,
        /// True when at least one installed filter stored it.
        matched: bool,
    },

    /// A cached envelope aged out without ever being dispatched to a filter.
    EnvelopeExpired { hash: MessageHash },

    // =========================================================================
    // SUBSYSTEM 3: FILTER HEALTH MANAGER
    // =========================================================================
    /// A filter's live subscription count crossed the healthy threshold.
    FilterHealthChanged {
        filter_id: FilterId,
        active_subscriptions: usize,
        required: usize,
        healthy: bool,
    },

    // =========================================================================
    // SUBSYSTEM 4: MESSAGE SENDER
    // =========================================================================
    /// A locally originated envelope was accepted by relay or lightpush.
    EnvelopeSent {
        hash: MessageHash,
        pubsub_topic: String,
    },

    /// Publishing a locally originated envelope failed.
    EnvelopeSendFailed { hash: MessageHash, reason: String },

    // =========================================================================
    // SUBSYSTEM 5: STORE QUERY
    // =========================================================================
    /// A historical query against a store peer failed.
    StoreQueryFailed {
        request_id: String,
        peer_id: PeerId,
        error: String,
    },
}

impl PipelineEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::EnvelopeAvailable { .. } | Self::EnvelopeExpired { .. } => EventTopic::Envelopes,
            Self::FilterHealthChanged { .. } => EventTopic::FilterHealth,
            Self::EnvelopeSent { .. } | Self::EnvelopeSendFailed { .. } => EventTopic::Delivery,
            Self::StoreQueryFailed { .. } => EventTopic::Store,
        }
    }

    /// Get the originating subsystem ID.
    #[must_use]
    pub fn source_subsystem(&self) -> u8 {
        match self {
            Self::EnvelopeAvailable { .. } | Self::EnvelopeExpired { .. } => 2,
            Self::FilterHealthChanged { .. } => 3,
            Self::EnvelopeSent { .. } | Self::EnvelopeSendFailed { .. } => 4,
            Self::StoreQueryFailed { .. } => 5,
        }
    }

    /// Hash of the envelope this event refers to, if any.
    #[must_use]
    pub fn envelope_hash(&self) -> Option<MessageHash> {
        match self {
            Self::EnvelopeAvailable { hash, .. }
            | Self::EnvelopeExpired { hash }
            | Self::EnvelopeSent { hash, .. }
            | Self::EnvelopeSendFailed { hash, .. } => Some(*hash),
            Self::FilterHealthChanged { .. } | Self::StoreQueryFailed { .. } => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Envelope processing and cache expiry.
    Envelopes,
    /// Filter subscription health transitions.
    FilterHealth,
    /// Outbound send results.
    Delivery,
    /// Historical query failures.
    Store,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Source subsystems to include. Empty means all sources.
    pub source_subsystems: Vec<u8>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            source_subsystems: Vec::new(),
        }
    }

    /// Create a filter for events from specific subsystems.
    #[must_use]
    pub fn from_subsystems(subsystems: Vec<u8>) -> Self {
        Self {
            topics: Vec::new(),
            source_subsystems: subsystems,
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &PipelineEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let source_match = self.source_subsystems.is_empty()
            || self.source_subsystems.contains(&event.source_subsystem());

        topic_match && source_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available() -> PipelineEvent {
        PipelineEvent::EnvelopeAvailable {
            hash: MessageHash::default(),
            pubsub_topic: "/waku/2/rs/16/32".into(),
            content_topic: "/app/1/chat/proto".into(),
            source: MessageSource::Relay,
            matched: true,
        }
    }

    #[test]
    fn test_event_topic_mapping() {
        let event = available();
        assert_eq!(event.topic(), EventTopic::Envelopes);
        assert_eq!(event.source_subsystem(), 2);
    }

    #[test]
    fn test_filter_all() {
        assert!(EventFilter::all().matches(&available()));
    }

    #[test]
    fn test_filter_by_topic() {
        let filter = EventFilter::topics(vec![EventTopic::Delivery]);
        assert!(!filter.matches(&available()));

        let sent = PipelineEvent::EnvelopeSent {
            hash: MessageHash::default(),
            pubsub_topic: "/waku/2/rs/16/32".into(),
        };
        assert!(filter.matches(&sent));
    }

    #[test]
    fn test_filter_by_subsystem() {
        let filter = EventFilter::from_subsystems(vec![5]);
        let failed = PipelineEvent::StoreQueryFailed {
            request_id: "r1".into(),
            peer_id: PeerId::from("store-1"),
            error: "timeout".into(),
        };
        assert!(filter.matches(&failed));
        assert!(!filter.matches(&available()));
    }

    #[test]
    fn test_envelope_hash_accessor() {
        let hash = MessageHash([7u8; 32]);
        let expired = PipelineEvent::EnvelopeExpired { hash };
        assert_eq!(expired.envelope_hash(), Some(hash));

        let health = PipelineEvent::FilterHealthChanged {
            filter_id: FilterId::from("f1"),
            active_subscriptions: 2,
            required: 2,
            healthy: true,
        };
        assert_eq!(health.envelope_hash(), None);
    }
}
