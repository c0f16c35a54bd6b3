//! Node-wide envelope cache keyed by message hash.
//!
//! The cache is the single source of truth for "have we seen this before".
//! It holds no locks itself; the service wraps it in one.
//!
//! ## Invariants
//!
//! - At most one record per hash.
//! - A record is handed to at most one worker at a time (`claim`), and never
//!   again once it has been dispatched.

use shared_types::{Envelope, MessageHash, MessageSource};
use std::collections::{HashMap, HashSet};

use super::record::{CachedRecord, ProcessingState, Timestamp};

/// Result of offering an envelope to the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Observation {
    /// First sighting; a record was inserted.
    New,
    /// Already cached. `requeue` is set when the prior record never matched
    /// a filter and nobody is working on it.
    Duplicate { requeue: bool },
}

#[derive(Default)]
pub struct EnvelopeCache {
    records: HashMap<MessageHash, CachedRecord>,
    /// Store-sourced hashes still awaiting application processing.
    store_in_flight: HashSet<MessageHash>,
}

impl EnvelopeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(
        &mut self,
        envelope: Envelope,
        source: MessageSource,
        now: Timestamp,
    ) -> Observation {
        let hash = envelope.hash();
        if let Some(existing) = self.records.get(&hash) {
            return Observation::Duplicate {
                requeue: existing.is_dispatchable(),
            };
        }
        if source == MessageSource::Store {
            self.store_in_flight.insert(hash);
        }
        self.records
            .insert(hash, CachedRecord::new(envelope, source, now));
        Observation::New
    }

    /// Take exclusive dispatch rights on a record.
    ///
    /// Returns `None` if the record is gone, already dispatched, expired or
    /// claimed by another worker.
    pub fn claim(&mut self, hash: &MessageHash) -> Option<(Envelope, MessageSource)> {
        let record = self.records.get_mut(hash)?;
        if !record.is_dispatchable() {
            return None;
        }
        record.claimed = true;
        Some((record.envelope.clone(), record.source))
    }

    /// Release a claim after dispatch.
    pub fn complete(&mut self, hash: &MessageHash, matched: bool) {
        let Some(record) = self.records.get_mut(hash) else {
            return;
        };
        record.claimed = false;
        if matched {
            record.state = ProcessingState::Dispatched;
        } else if record.source == MessageSource::Store {
            self.store_in_flight.remove(hash);
        }
    }

    /// Age out records older than `ttl_ms`.
    ///
    /// Undispatched records are first marked `ExpiredUnmatched` (and their
    /// hashes returned) so late duplicates are still recognised; they are
    /// dropped on the following sweep. Dispatched records are dropped
    /// directly. Claimed records are left alone.
    pub fn sweep(&mut self, now: Timestamp, ttl_ms: u64) -> Vec<MessageHash> {
        let mut expired = Vec::new();
        let store_in_flight = &mut self.store_in_flight;

        self.records.retain(|hash, record| {
            if record.claimed || !record.is_older_than(now, ttl_ms) {
                return true;
            }
            match record.state {
                ProcessingState::Unprocessed => {
                    record.state = ProcessingState::ExpiredUnmatched;
                    expired.push(*hash);
                    true
                }
                ProcessingState::Dispatched | ProcessingState::ExpiredUnmatched => {
                    store_in_flight.remove(hash);
                    false
                }
            }
        });

        expired
    }

    /// Returns true if the hash was awaiting processing.
    pub fn mark_store_message_processed(&mut self, hash: &MessageHash) -> bool {
        self.store_in_flight.remove(hash)
    }

    pub fn processing_store_messages(&self) -> bool {
        !self.store_in_flight.is_empty()
    }

    pub fn state(&self, hash: &MessageHash) -> Option<ProcessingState> {
        self.records.get(hash).map(|r| r.state)
    }

    pub fn contains(&self, hash: &MessageHash) -> bool {
        self.records.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.store_in_flight.clear();
    }
}
