//! Cached message record and its processing state.

use shared_types::{Envelope, MessageSource};

/// Timestamp in milliseconds since UNIX epoch.
pub type Timestamp = u64;

/// Processing state of a cached envelope.
///
/// ```text
/// [UNPROCESSED] ──match──→ [DISPATCHED]
///       │
///       └── ttl elapsed ──→ [EXPIRED_UNMATCHED]
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ProcessingState {
    /// Seen but not yet delivered to any filter.
    #[default]
    Unprocessed,
    /// At least one filter stored it.
    Dispatched,
    /// Aged out without ever matching a filter.
    ExpiredUnmatched,
}

/// One record per message hash.
#[derive(Clone, Debug)]
pub struct CachedRecord {
    pub envelope: Envelope,
    pub source: MessageSource,
    pub state: ProcessingState,
    /// Set while a worker is dispatching the record.
    pub claimed: bool,
    pub first_seen: Timestamp,
}

impl CachedRecord {
    pub fn new(envelope: Envelope, source: MessageSource, now: Timestamp) -> Self {
        Self {
            envelope,
            source,
            state: ProcessingState::Unprocessed,
            claimed: false,
            first_seen: now,
        }
    }

    /// Whether a worker may pick this record up.
    pub fn is_dispatchable(&self) -> bool {
        self.state == ProcessingState::Unprocessed && !self.claimed
    }

    pub fn is_older_than(&self, now: Timestamp, ttl_ms: u64) -> bool {
        now.saturating_sub(self.first_seen) > ttl_ms
    }
}
