//! Value objects for the filter health manager.

use serde::{Deserialize, Serialize};
use shared_types::{ContentFilter, FilterId, PeerId};
use std::collections::BTreeMap;
use std::fmt;

/// Protocol-assigned subscription identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

/// Key of a slot in a filter's subscription set.
///
/// A fresh random id while the slot is reserved, the protocol's
/// subscription id once active.
pub type SlotId = String;

/// A live link between a filter and one remote peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    pub peer_id: PeerId,
    pub content_filter: ContentFilter,
}

/// Peer selection hints for a subscribe attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSelection {
    /// Peers that already serve this filter.
    pub exclude: Vec<PeerId>,
    /// How many peers to subscribe to in this attempt.
    pub max_peers: usize,
}

/// Health of a single filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterHealth {
    pub active: usize,
    pub reserved: usize,
    pub required: usize,
    pub peers: Vec<PeerId>,
}

impl FilterHealth {
    pub fn is_healthy(&self) -> bool {
        self.active >= self.required
    }
}

/// Snapshot of every filter's subscription health.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub filters: BTreeMap<FilterId, FilterHealth>,
}

impl FilterStats {
    pub fn get(&self, id: &FilterId) -> Option<&FilterHealth> {
        self.filters.get(id)
    }

    pub fn total_active(&self) -> usize {
        self.filters.values().map(|h| h.active).sum()
    }
}
