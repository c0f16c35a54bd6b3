//! Per-filter subscription slots.

use shared_types::{ContentFilter, PeerId};
use std::collections::HashMap;
use std::time::Instant;

use super::value_objects::{SlotId, SubscriptionHandle};

/// One entry in a filter's subscription set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionSlot {
    /// Held while a subscribe attempt is outstanding.
    Reserved,
    Active(SubscriptionHandle),
}

impl SubscriptionSlot {
    pub fn is_reserved(&self) -> bool {
        matches!(self, SubscriptionSlot::Reserved)
    }

    pub fn handle(&self) -> Option<&SubscriptionHandle> {
        match self {
            SubscriptionSlot::Active(handle) => Some(handle),
            SubscriptionSlot::Reserved => None,
        }
    }
}

/// Subscription set of one installed filter.
#[derive(Debug, Clone)]
pub struct FilterSlots {
    pub criteria: ContentFilter,
    pub slots: HashMap<SlotId, SubscriptionSlot>,
    /// Consecutive failed subscribe attempts.
    pub consecutive_failures: u32,
    /// Ping-driven resubscribes wait until this instant.
    pub retry_after: Option<Instant>,
    /// Health as last reported.
    pub healthy: bool,
}

impl FilterSlots {
    pub fn new(criteria: ContentFilter) -> Self {
        Self {
            criteria,
            slots: HashMap::new(),
            consecutive_failures: 0,
            retry_after: None,
            healthy: false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.slots.values().filter(|s| !s.is_reserved()).count()
    }

    pub fn reserved_count(&self) -> usize {
        self.slots.values().filter(|s| s.is_reserved()).count()
    }

    pub fn active_handles(&self) -> impl Iterator<Item = &SubscriptionHandle> {
        self.slots.values().filter_map(SubscriptionSlot::handle)
    }

    pub fn active_peers(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.active_handles().map(|h| h.peer_id.clone()).collect();
        peers.sort();
        peers.dedup();
        peers
    }

    pub fn is_backing_off(&self, now: Instant) -> bool {
        self.retry_after.is_some_and(|at| now < at)
    }
}
