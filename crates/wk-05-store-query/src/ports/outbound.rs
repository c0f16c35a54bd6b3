//! Outbound port: the store protocol client.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{compute_message_hash, PeerId, WakuMessage};
use std::collections::HashSet;
use std::time::Duration;

use crate::domain::{StoreRequest, StoreResponse, StoredMessage};
use crate::error::StoreQueryError;

#[async_trait]
pub trait StoreProtocol: Send + Sync {
    /// Fetch one page from `peer`.
    async fn query(
        &self,
        peer: &PeerId,
        request: &StoreRequest,
    ) -> Result<StoreResponse, StoreQueryError>;
}

// =============================================================================
// Mock Implementation for Testing
// =============================================================================

#[derive(Default)]
struct MockStoreState {
    messages: Vec<StoredMessage>,
    unreachable: HashSet<PeerId>,
    requests: Vec<(PeerId, StoreRequest)>,
}

/// Store peer backed by an ordered message list. The cursor is the hash
/// of the last message returned.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<MockStoreState>,
    delay: Duration,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn insert(&self, pubsub_topic: &str, message: WakuMessage) {
        self.state.lock().messages.push(StoredMessage {
            pubsub_topic: pubsub_topic.to_string(),
            message,
        });
    }

    pub fn set_unreachable(&self, peer: &str) {
        self.state.lock().unreachable.insert(PeerId::from(peer));
    }

    pub fn requests(&self) -> Vec<(PeerId, StoreRequest)> {
        self.state.lock().requests.clone()
    }
}

fn matches(request: &StoreRequest, stored: &StoredMessage) -> bool {
    if let Some(topic) = &request.pubsub_topic {
        if &stored.pubsub_topic != topic {
            return false;
        }
    }
    if !request.content_topics.is_empty()
        && !request
            .content_topics
            .iter()
            .any(|t| t == &stored.message.content_topic)
    {
        return false;
    }
    stored
        .message
        .timestamp
        .map_or(true, |ts| request.time_range.contains(ts))
}

#[async_trait]
impl StoreProtocol for MockStore {
    async fn query(
        &self,
        peer: &PeerId,
        request: &StoreRequest,
    ) -> Result<StoreResponse, StoreQueryError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let mut state = self.state.lock();
        state.requests.push((peer.clone(), request.clone()));
        if state.unreachable.contains(peer) {
            return Err(StoreQueryError::Connection(format!("{peer} unreachable")));
        }

        let matching: Vec<&StoredMessage> =
            state.messages.iter().filter(|m| matches(request, m)).collect();
        let start = match request.cursor {
            Some(cursor) => matching
                .iter()
                .position(|m| compute_message_hash(&m.pubsub_topic, &m.message) == cursor)
                .map(|i| i + 1)
                .ok_or_else(|| StoreQueryError::Rejected("unknown cursor".to_string()))?,
            None => 0,
        };
        let end = (start + request.page_size.max(1)).min(matching.len());
        let page: Vec<StoredMessage> = matching[start..end].iter().map(|m| (*m).clone()).collect();
        let next_cursor = if end < matching.len() {
            page.last()
                .map(|m| compute_message_hash(&m.pubsub_topic, &m.message))
        } else {
            None
        };

        Ok(StoreResponse {
            messages: page,
            next_cursor,
        })
    }
}
