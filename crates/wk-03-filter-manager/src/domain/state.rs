//! Subscription state machine.
//!
//! Owns the mapping from filter id to its subscription slots. Every input is
//! a [`FilterEvent`]; every side effect is returned as a [`Command`]. Nothing
//! here awaits, so the owning event loop can never block on a peer.
//!
//! ## Invariants
//!
//! - A filter's slot count (reserved + active) never exceeds `min_peers`.
//! - Every subscribe result removes exactly one reservation.
//! - A subscription that arrives for a removed filter is torn down at once.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared_types::{ContentFilter, FilterId, PeerId};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use super::backoff::BackoffPolicy;
use super::events::{Command, FilterEvent, PingTarget};
use super::slots::{FilterSlots, SubscriptionSlot};
use super::value_objects::{FilterHealth, FilterStats, SlotId, SubscriptionHandle};

const SUBSYSTEM: &str = "filter-manager";

pub struct FilterSubscriptions {
    min_peers: usize,
    backoff: BackoffPolicy,
    filters: HashMap<FilterId, FilterSlots>,
    rng: StdRng,
}

impl FilterSubscriptions {
    pub fn new(min_peers: usize, backoff: BackoffPolicy) -> Self {
        Self {
            min_peers,
            backoff,
            filters: HashMap::new(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic jitter, for tests.
    pub fn with_seed(min_peers: usize, backoff: BackoffPolicy, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            ..Self::new(min_peers, backoff)
        }
    }

    pub fn min_peers(&self) -> usize {
        self.min_peers
    }

    pub fn slots(&self, filter_id: &FilterId) -> Option<&FilterSlots> {
        self.filters.get(filter_id)
    }

    pub fn contains(&self, filter_id: &FilterId) -> bool {
        self.filters.contains_key(filter_id)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn stats(&self) -> FilterStats {
        FilterStats {
            filters: self
                .filters
                .iter()
                .map(|(id, entry)| {
                    (
                        id.clone(),
                        FilterHealth {
                            active: entry.active_count(),
                            reserved: entry.reserved_count(),
                            required: self.min_peers,
                            peers: entry.active_peers(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Apply one event and return the side effects it requires.
    pub fn apply(&mut self, event: FilterEvent, now: Instant) -> Vec<Command> {
        let mut commands = Vec::new();
        match event {
            FilterEvent::FilterAdded {
                filter_id,
                criteria,
            } => self.add_filter(filter_id, criteria, &mut commands),
            FilterEvent::FilterRemoved { filter_id } => {
                self.remove_filter(&filter_id, &mut commands)
            }
            FilterEvent::SubscribeSucceeded {
                filter_id,
                slot_id,
                handles,
            } => self.on_subscribed(&filter_id, &slot_id, handles, now, &mut commands),
            FilterEvent::SubscribeFailed {
                filter_id,
                slot_id,
                reason,
            } => self.on_subscribe_failed(&filter_id, &slot_id, &reason, now, &mut commands),
            FilterEvent::UnsubscribeCompleted {
                filter_id,
                subscription_id,
                error,
            } => match error {
                None => trace!(
                    subsystem = SUBSYSTEM,
                    filter_id = %filter_id,
                    subscription_id = %subscription_id,
                    "Unsubscribed"
                ),
                Some(error) => debug!(
                    subsystem = SUBSYSTEM,
                    filter_id = %filter_id,
                    subscription_id = %subscription_id,
                    error = %error,
                    "Unsubscribe failed"
                ),
            },
            FilterEvent::PingSucceeded { peer_id } => {
                trace!(subsystem = SUBSYSTEM, peer_id = %peer_id, "Peer alive");
            }
            FilterEvent::PingFailed(PingTarget::Peer(peer_id)) => {
                self.evict_peer(&peer_id, now, &mut commands)
            }
            FilterEvent::PingFailed(PingTarget::Filter(filter_id)) => {
                self.on_filter_short(&filter_id, now, &mut commands)
            }
            FilterEvent::Tick => self.ping_peers(now, &mut commands),
        }
        commands
    }

    fn add_filter(&mut self, filter_id: FilterId, criteria: ContentFilter, out: &mut Vec<Command>) {
        if self.filters.contains_key(&filter_id) {
            warn!(subsystem = SUBSYSTEM, filter_id = %filter_id, "Filter already tracked");
            return;
        }
        debug!(
            subsystem = SUBSYSTEM,
            filter_id = %filter_id,
            pubsub_topic = %criteria.pubsub_topic,
            required = self.min_peers,
            "Tracking filter"
        );
        self.filters
            .insert(filter_id.clone(), FilterSlots::new(criteria));
        self.resubscribe(&filter_id, out);
    }

    fn remove_filter(&mut self, filter_id: &FilterId, out: &mut Vec<Command>) {
        let Some(entry) = self.filters.remove(filter_id) else {
            warn!(subsystem = SUBSYSTEM, filter_id = %filter_id, "Remove for unknown filter");
            return;
        };
        let outstanding = entry.reserved_count();
        for handle in entry.active_handles() {
            out.push(Command::Unsubscribe {
                filter_id: filter_id.clone(),
                handle: handle.clone(),
            });
        }
        debug!(
            subsystem = SUBSYSTEM,
            filter_id = %filter_id,
            outstanding,
            "Filter dropped"
        );
        out.push(Command::FilterDropped {
            filter_id: filter_id.clone(),
        });
    }

    fn on_subscribed(
        &mut self,
        filter_id: &FilterId,
        slot_id: &SlotId,
        handles: Vec<SubscriptionHandle>,
        now: Instant,
        out: &mut Vec<Command>,
    ) {
        let Some(entry) = self.filters.get_mut(filter_id) else {
            debug!(
                subsystem = SUBSYSTEM,
                filter_id = %filter_id,
                count = handles.len(),
                "Filter removed while subscribing, tearing down"
            );
            out.extend(handles.into_iter().map(|handle| Command::Unsubscribe {
                filter_id: filter_id.clone(),
                handle,
            }));
            return;
        };

        release_reservation(entry, filter_id, slot_id);

        let mut accepted = false;
        for handle in handles {
            let duplicate_peer = entry.active_handles().any(|h| h.peer_id == handle.peer_id);
            if accepted || duplicate_peer || entry.slots.len() >= self.min_peers {
                warn!(
                    subsystem = SUBSYSTEM,
                    filter_id = %filter_id,
                    peer_id = %handle.peer_id,
                    subscription_id = %handle.id,
                    "Dropping surplus subscription"
                );
                out.push(Command::Unsubscribe {
                    filter_id: filter_id.clone(),
                    handle,
                });
                continue;
            }
            debug!(
                subsystem = SUBSYSTEM,
                filter_id = %filter_id,
                peer_id = %handle.peer_id,
                subscription_id = %handle.id,
                "Subscribed"
            );
            entry
                .slots
                .insert(handle.id.to_string(), SubscriptionSlot::Active(handle.clone()));
            out.push(Command::StartConsumer {
                filter_id: filter_id.clone(),
                handle,
            });
            accepted = true;
        }

        if accepted {
            entry.consecutive_failures = 0;
            entry.retry_after = None;
        } else {
            self.record_failure(filter_id, now);
        }
        self.check_health(filter_id, out);
    }

    fn on_subscribe_failed(
        &mut self,
        filter_id: &FilterId,
        slot_id: &SlotId,
        reason: &str,
        now: Instant,
        out: &mut Vec<Command>,
    ) {
        let Some(entry) = self.filters.get_mut(filter_id) else {
            trace!(subsystem = SUBSYSTEM, filter_id = %filter_id, "Subscribe failed for removed filter");
            return;
        };
        release_reservation(entry, filter_id, slot_id);
        warn!(
            subsystem = SUBSYSTEM,
            filter_id = %filter_id,
            reason,
            "Subscribe attempt failed"
        );
        self.record_failure(filter_id, now);
        self.check_health(filter_id, out);
    }

    fn record_failure(&mut self, filter_id: &FilterId, now: Instant) {
        let jitter: f64 = self.rng.gen();
        let backoff = self.backoff;
        if let Some(entry) = self.filters.get_mut(filter_id) {
            entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
            if backoff.is_enabled() {
                entry.retry_after = Some(now + backoff.delay(entry.consecutive_failures, jitter));
            }
        }
    }

    /// Drop every subscription bound to `peer_id`, then refill each
    /// affected filter once.
    fn evict_peer(&mut self, peer_id: &PeerId, now: Instant, out: &mut Vec<Command>) {
        let mut affected = Vec::new();
        for (filter_id, entry) in self.filters.iter_mut() {
            let dead: Vec<SlotId> = entry
                .slots
                .iter()
                .filter(|(_, slot)| slot.handle().is_some_and(|h| &h.peer_id == peer_id))
                .map(|(slot_id, _)| slot_id.clone())
                .collect();
            if dead.is_empty() {
                continue;
            }
            for slot_id in dead {
                if let Some(SubscriptionSlot::Active(handle)) = entry.slots.remove(&slot_id) {
                    out.push(Command::Unsubscribe {
                        filter_id: filter_id.clone(),
                        handle,
                    });
                }
            }
            affected.push(filter_id.clone());
        }

        if affected.is_empty() {
            trace!(subsystem = SUBSYSTEM, peer_id = %peer_id, "Ping failure for peer serving no filter");
            return;
        }
        warn!(
            subsystem = SUBSYSTEM,
            peer_id = %peer_id,
            filters = affected.len(),
            "Peer failed ping, evicted"
        );

        for filter_id in affected {
            if self.is_backing_off(&filter_id, now) {
                debug!(subsystem = SUBSYSTEM, filter_id = %filter_id, "Resubscribe deferred by backoff");
            } else {
                self.resubscribe(&filter_id, out);
            }
            self.check_health(&filter_id, out);
        }
    }

    fn on_filter_short(&mut self, filter_id: &FilterId, now: Instant, out: &mut Vec<Command>) {
        if !self.filters.contains_key(filter_id) {
            debug!(subsystem = SUBSYSTEM, filter_id = %filter_id, "Ping failure for unknown filter");
            return;
        }
        if self.is_backing_off(filter_id, now) {
            trace!(subsystem = SUBSYSTEM, filter_id = %filter_id, "Resubscribe deferred by backoff");
            return;
        }
        self.resubscribe(filter_id, out);
    }

    /// Periodic health check.
    ///
    /// Filters short of their quorum are refilled. Every distinct peer
    /// serving any filter gets exactly one ping, including peers of
    /// filters that are short, so a dead peer is always identified.
    fn ping_peers(&mut self, now: Instant, out: &mut Vec<Command>) {
        let short: Vec<FilterId> = self
            .filters
            .iter()
            .filter(|(_, entry)| entry.slots.len() < self.min_peers)
            .map(|(id, _)| id.clone())
            .collect();
        for filter_id in short {
            self.on_filter_short(&filter_id, now, out);
        }

        let mut pinged: HashSet<&PeerId> = HashSet::new();
        for entry in self.filters.values() {
            for handle in entry.active_handles() {
                if pinged.insert(&handle.peer_id) {
                    out.push(Command::Ping {
                        handle: handle.clone(),
                    });
                }
            }
        }
    }

    /// Reserve and request one subscription per missing slot.
    fn resubscribe(&mut self, filter_id: &FilterId, out: &mut Vec<Command>) {
        let Some(entry) = self.filters.get_mut(filter_id) else {
            return;
        };
        let current = entry.slots.len();
        if current > self.min_peers {
            error!(
                subsystem = SUBSYSTEM,
                filter_id = %filter_id,
                current,
                required = self.min_peers,
                "Filter has more subscriptions than required"
            );
            return;
        }
        let missing = self.min_peers - current;
        if missing == 0 {
            trace!(subsystem = SUBSYSTEM, filter_id = %filter_id, "No missing slots");
            return;
        }

        let exclude = entry.active_peers();
        debug!(
            subsystem = SUBSYSTEM,
            filter_id = %filter_id,
            missing,
            excluded = exclude.len(),
            "Resubscribing"
        );
        for _ in 0..missing {
            let slot_id = Uuid::new_v4().to_string();
            entry
                .slots
                .insert(slot_id.clone(), SubscriptionSlot::Reserved);
            out.push(Command::Subscribe {
                filter_id: filter_id.clone(),
                slot_id,
                criteria: entry.criteria.clone(),
                exclude: exclude.clone(),
            });
        }
    }

    fn is_backing_off(&self, filter_id: &FilterId, now: Instant) -> bool {
        self.filters
            .get(filter_id)
            .is_some_and(|entry| entry.is_backing_off(now))
    }

    fn check_health(&mut self, filter_id: &FilterId, out: &mut Vec<Command>) {
        let Some(entry) = self.filters.get_mut(filter_id) else {
            return;
        };
        let active = entry.active_count();
        let healthy = active >= self.min_peers;
        if healthy != entry.healthy {
            entry.healthy = healthy;
            out.push(Command::HealthChanged {
                filter_id: filter_id.clone(),
                active,
                required: self.min_peers,
                healthy,
            });
        }
    }
}

fn release_reservation(entry: &mut FilterSlots, filter_id: &FilterId, slot_id: &SlotId) {
    match entry.slots.get(slot_id) {
        Some(SubscriptionSlot::Reserved) => {
            entry.slots.remove(slot_id);
        }
        Some(SubscriptionSlot::Active(_)) => error!(
            subsystem = SUBSYSTEM,
            filter_id = %filter_id,
            slot_id = %slot_id,
            "Subscribe result for an active slot"
        ),
        None => error!(
            subsystem = SUBSYSTEM,
            filter_id = %filter_id,
            slot_id = %slot_id,
            "Subscribe result for unknown slot"
        ),
    }
}
