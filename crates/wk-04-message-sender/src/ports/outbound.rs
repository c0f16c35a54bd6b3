//! Outbound ports for the message sender.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{Envelope, MessageHash};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::PublishError;

/// Gossip relay, used when the node runs as a full relay peer.
#[async_trait]
pub trait RelayPublisher: Send + Sync {
    /// Publish on the envelope's pubsub topic.
    async fn publish(&self, envelope: &Envelope) -> Result<MessageHash, PublishError>;

    /// Relay peers currently meshed on `pubsub_topic`.
    fn peer_count(&self, pubsub_topic: &str) -> usize;
}

/// Lightpush client, used by light nodes.
#[async_trait]
pub trait LightpushPublisher: Send + Sync {
    async fn publish(&self, envelope: &Envelope) -> Result<MessageHash, PublishError>;
}

/// The transport a sender publishes through.
#[derive(Clone)]
pub enum PublishTransport {
    Relay(Arc<dyn RelayPublisher>),
    Lightpush(Arc<dyn LightpushPublisher>),
}

impl PublishTransport {
    pub fn name(&self) -> &'static str {
        match self {
            PublishTransport::Relay(_) => "relay",
            PublishTransport::Lightpush(_) => "lightpush",
        }
    }
}

// =============================================================================
// Mock Implementations for Testing
// =============================================================================

#[derive(Default)]
struct MockPublisherState {
    published: Vec<Envelope>,
    failure: Option<PublishError>,
}

impl MockPublisherState {
    fn publish(&mut self, envelope: &Envelope) -> Result<MessageHash, PublishError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        self.published.push(envelope.clone());
        Ok(envelope.hash())
    }
}

/// Relay that records what it publishes.
#[derive(Default)]
pub struct MockRelay {
    state: Mutex<MockPublisherState>,
    peers: Mutex<HashMap<String, usize>>,
}

impl MockRelay {
    pub fn with_peers(pubsub_topic: &str, count: usize) -> Self {
        let relay = Self::default();
        relay.set_peer_count(pubsub_topic, count);
        relay
    }

    pub fn set_peer_count(&self, pubsub_topic: &str, count: usize) {
        self.peers.lock().insert(pubsub_topic.to_string(), count);
    }

    pub fn fail_with(&self, failure: Option<PublishError>) {
        self.state.lock().failure = failure;
    }

    pub fn published(&self) -> Vec<Envelope> {
        self.state.lock().published.clone()
    }
}

#[async_trait]
impl RelayPublisher for MockRelay {
    async fn publish(&self, envelope: &Envelope) -> Result<MessageHash, PublishError> {
        self.state.lock().publish(envelope)
    }

    fn peer_count(&self, pubsub_topic: &str) -> usize {
        self.peers.lock().get(pubsub_topic).copied().unwrap_or(0)
    }
}

/// Lightpush client that records what it publishes.
#[derive(Default)]
pub struct MockLightpush {
    state: Mutex<MockPublisherState>,
}

impl MockLightpush {
    pub fn fail_with(&self, failure: Option<PublishError>) {
        self.state.lock().failure = failure;
    }

    pub fn published(&self) -> Vec<Envelope> {
        self.state.lock().published.clone()
    }
}

#[async_trait]
impl LightpushPublisher for MockLightpush {
    async fn publish(&self, envelope: &Envelope) -> Result<MessageHash, PublishError> {
        self.state.lock().publish(envelope)
    }
}
