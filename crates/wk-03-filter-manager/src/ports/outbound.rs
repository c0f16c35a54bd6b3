//! # Outbound Ports
//!
//! The filter protocol the manager drives. Implemented by the transport
//! layer; the in-memory mock below is used by tests across the workspace.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{ContentFilter, Envelope, PeerId};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::domain::{PeerSelection, SubscriptionHandle, SubscriptionId};
use crate::error::ProtocolError;

/// A freshly established subscription.
///
/// The protocol layer owns the sending side of `envelopes`.
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriptionHandle,
    pub envelopes: mpsc::Receiver<Envelope>,
}

/// Light-client filter protocol - outbound port.
#[async_trait]
pub trait FilterProtocol: Send + Sync {
    /// Subscribe to `filter` on up to `selection.max_peers` peers.
    async fn subscribe(
        &self,
        filter: &ContentFilter,
        selection: &PeerSelection,
    ) -> Result<Vec<Subscription>, ProtocolError>;

    /// Cancel a subscription on its peer.
    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), ProtocolError>;

    /// Liveness ping to the peer behind `handle`.
    async fn is_subscription_alive(&self, handle: &SubscriptionHandle)
        -> Result<(), ProtocolError>;
}

// =============================================================================
// Mock Implementation for Testing
// =============================================================================

#[derive(Default)]
struct MockState {
    peers: Vec<PeerId>,
    next_peer: usize,
    next_subscription: u64,
    unreachable: HashSet<PeerId>,
    fail_subscribes: bool,
    active: HashMap<SubscriptionId, SubscriptionHandle>,
    senders: HashMap<SubscriptionId, mpsc::Sender<Envelope>>,
    unsubscribed: Vec<SubscriptionId>,
    subscribe_calls: usize,
    ping_calls: usize,
}

/// In-memory filter network.
///
/// Peers are picked round-robin, skipping excluded and unreachable ones.
/// Subscription ids are `sub1`, `sub2`, ... in creation order.
#[derive(Default)]
pub struct MockFilterProtocol {
    state: Mutex<MockState>,
    subscribe_delay: Duration,
}

impl MockFilterProtocol {
    pub fn with_peers(peers: &[&str]) -> Self {
        Self {
            state: Mutex::new(MockState {
                peers: peers.iter().map(|p| PeerId::from(*p)).collect(),
                ..Default::default()
            }),
            subscribe_delay: Duration::ZERO,
        }
    }

    /// Make every subscribe attempt take `delay`.
    pub fn with_subscribe_delay(mut self, delay: Duration) -> Self {
        self.subscribe_delay = delay;
        self
    }

    /// Peer stops answering: pings fail, it is never selected, and its
    /// subscriptions stop delivering.
    pub fn kill_peer(&self, peer: &str) {
        let mut state = self.state.lock();
        let peer = PeerId::from(peer);
        let dead: Vec<SubscriptionId> = state
            .active
            .values()
            .filter(|h| h.peer_id == peer)
            .map(|h| h.id.clone())
            .collect();
        for id in dead {
            state.senders.remove(&id);
        }
        state.unreachable.insert(peer);
    }

    pub fn revive_peer(&self, peer: &str) {
        self.state.lock().unreachable.remove(&PeerId::from(peer));
    }

    pub fn add_peer(&self, peer: &str) {
        self.state.lock().peers.push(PeerId::from(peer));
    }

    pub fn set_fail_subscribes(&self, fail: bool) {
        self.state.lock().fail_subscribes = fail;
    }

    /// Subscriptions the network still considers open.
    pub fn active_subscriptions(&self) -> Vec<SubscriptionHandle> {
        let mut handles: Vec<SubscriptionHandle> =
            self.state.lock().active.values().cloned().collect();
        handles.sort_by(|a, b| a.id.cmp(&b.id));
        handles
    }

    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        self.state.lock().unsubscribed.clone()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state.lock().subscribe_calls
    }

    pub fn ping_calls(&self) -> usize {
        self.state.lock().ping_calls
    }

    /// Push an envelope from `peer` to every subscription it serves whose
    /// filter covers it. Returns how many subscriptions received it.
    pub async fn deliver(&self, peer: &str, envelope: Envelope) -> usize {
        let peer = PeerId::from(peer);
        let targets: Vec<mpsc::Sender<Envelope>> = {
            let state = self.state.lock();
            state
                .active
                .values()
                .filter(|h| {
                    h.peer_id == peer
                        && h.content_filter
                            .covers(envelope.pubsub_topic(), envelope.content_topic())
                })
                .filter_map(|h| state.senders.get(&h.id).cloned())
                .collect()
        };
        let mut delivered = 0;
        for sender in targets {
            if sender.send(envelope.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

#[async_trait]
impl FilterProtocol for MockFilterProtocol {
    async fn subscribe(
        &self,
        filter: &ContentFilter,
        selection: &PeerSelection,
    ) -> Result<Vec<Subscription>, ProtocolError> {
        if !self.subscribe_delay.is_zero() {
            tokio::time::sleep(self.subscribe_delay).await;
        }

        let mut state = self.state.lock();
        state.subscribe_calls += 1;
        if state.fail_subscribes {
            return Err(ProtocolError::Rejected("mock failure".to_string()));
        }

        let count = state.peers.len();
        let mut chosen = None;
        for offset in 0..count {
            let index = (state.next_peer + offset) % count;
            let peer = &state.peers[index];
            if !selection.exclude.contains(peer) && !state.unreachable.contains(peer) {
                chosen = Some((index, peer.clone()));
                break;
            }
        }
        let (index, peer_id) = chosen.ok_or(ProtocolError::NoPeers)?;
        state.next_peer = (index + 1) % count;
        state.next_subscription += 1;

        let handle = SubscriptionHandle {
            id: SubscriptionId::new(format!("sub{}", state.next_subscription)),
            peer_id,
            content_filter: filter.clone(),
        };
        let (tx, rx) = mpsc::channel(64);
        state.active.insert(handle.id.clone(), handle.clone());
        state.senders.insert(handle.id.clone(), tx);

        Ok(vec![Subscription {
            handle,
            envelopes: rx,
        }])
    }

    async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<(), ProtocolError> {
        let mut state = self.state.lock();
        state.active.remove(&handle.id);
        state.senders.remove(&handle.id);
        state.unsubscribed.push(handle.id.clone());
        if state.unreachable.contains(&handle.peer_id) {
            return Err(ProtocolError::Connection("peer unreachable".to_string()));
        }
        Ok(())
    }

    async fn is_subscription_alive(
        &self,
        handle: &SubscriptionHandle,
    ) -> Result<(), ProtocolError> {
        let mut state = self.state.lock();
        state.ping_calls += 1;
        if state.unreachable.contains(&handle.peer_id) {
            return Err(ProtocolError::Connection("peer unreachable".to_string()));
        }
        if !state.active.contains_key(&handle.id) {
            return Err(ProtocolError::Rejected("unknown subscription".to_string()));
        }
        Ok(())
    }
}
