//! Bounded per-filter message store.

use lru::LruCache;
use shared_types::{Envelope, MessageHash};
use std::num::NonZeroUsize;

use crate::error::FilterError;

/// Messages matched by one filter, waiting to be drained by the application.
///
/// When full, the least recently added message is evicted.
pub struct MessageStore {
    messages: LruCache<MessageHash, Envelope>,
}

impl MessageStore {
    pub fn new(capacity: usize) -> Result<Self, FilterError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(FilterError::ZeroCapacity)?;
        Ok(Self {
            messages: LruCache::new(capacity),
        })
    }

    /// Store an envelope. Returns false if the hash is already present.
    pub fn add(&mut self, envelope: Envelope) -> bool {
        let hash = envelope.hash();
        if self.messages.contains(&hash) {
            return false;
        }
        self.messages.push(hash, envelope);
        true
    }

    /// Remove and return every stored message, oldest timestamp first.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut drained: Vec<Envelope> = std::iter::from_fn(|| self.messages.pop_lru())
            .map(|(_, envelope)| envelope)
            .collect();
        drained.sort_by_key(|e| (e.timestamp(), e.hash()));
        drained
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.messages.cap().get()
    }
}
