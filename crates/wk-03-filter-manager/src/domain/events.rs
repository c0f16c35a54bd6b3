//! Inputs and outputs of the subscription state machine.

use shared_types::{ContentFilter, FilterId, PeerId};

use super::value_objects::{SlotId, SubscriptionHandle, SubscriptionId};

/// What a failed liveness ping points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingTarget {
    /// A specific peer stopped answering.
    Peer(PeerId),
    /// The filter is short of subscriptions; no single peer is to blame.
    Filter(FilterId),
}

/// A state transition request for the subscription map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEvent {
    FilterAdded {
        filter_id: FilterId,
        criteria: ContentFilter,
    },
    FilterRemoved {
        filter_id: FilterId,
    },
    SubscribeSucceeded {
        filter_id: FilterId,
        slot_id: SlotId,
        handles: Vec<SubscriptionHandle>,
    },
    SubscribeFailed {
        filter_id: FilterId,
        slot_id: SlotId,
        reason: String,
    },
    UnsubscribeCompleted {
        filter_id: FilterId,
        subscription_id: SubscriptionId,
        error: Option<String>,
    },
    PingSucceeded {
        peer_id: PeerId,
    },
    PingFailed(PingTarget),
    /// Periodic health check.
    Tick,
}

/// Side effects requested by the state machine. Executed by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Attempt one subscription for a reserved slot.
    Subscribe {
        filter_id: FilterId,
        slot_id: SlotId,
        criteria: ContentFilter,
        exclude: Vec<PeerId>,
    },
    /// Best-effort teardown of a subscription.
    Unsubscribe {
        filter_id: FilterId,
        handle: SubscriptionHandle,
    },
    /// Start forwarding a new subscription's envelopes into the pipeline.
    StartConsumer {
        filter_id: FilterId,
        handle: SubscriptionHandle,
    },
    /// Ping one peer; `handle` is any live subscription on it.
    Ping { handle: SubscriptionHandle },
    /// A filter crossed the healthy threshold.
    HealthChanged {
        filter_id: FilterId,
        active: usize,
        required: usize,
        healthy: bool,
    },
    /// The filter's entry was deleted.
    FilterDropped { filter_id: FilterId },
}
