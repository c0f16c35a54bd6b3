//! # Node Flows
//!
//! Whole-node scenarios over mock transports, in both light client and
//! full relay mode.

#[cfg(test)]
mod tests {
    use node_runtime::{NodeConfig, NodeTransports, WakuNode};
    use shared_bus::{EventFilter, EventTopic, PipelineEvent, Subscription};
    use shared_types::{Envelope, FilterId, PeerId, WakuMessage};
    use std::sync::Arc;
    use std::time::Duration;
    use wk_01_filter_registry::Filter;
    use wk_03_filter_manager::MockFilterProtocol;
    use wk_04_message_sender::{MockLightpush, MockRelay, PublishError};
    use wk_05_store_query::{MockStore, StoreRequest};

    const TOPIC: &str = "/waku/2/rs/16/32";
    const CHAT: &str = "/app/1/chat/proto";

    struct LightNode {
        node: WakuNode,
        filter: Arc<MockFilterProtocol>,
        lightpush: Arc<MockLightpush>,
        store: Arc<MockStore>,
    }

    fn light_node() -> LightNode {
        let filter = Arc::new(MockFilterProtocol::with_peers(&["P1", "P2", "P3"]));
        let lightpush = Arc::new(MockLightpush::default());
        let store = Arc::new(MockStore::new());
        let config = NodeConfig {
            light_client: true,
            ..NodeConfig::for_testing()
        };
        let node = WakuNode::new(
            config,
            NodeTransports::light(filter.clone(), lightpush.clone(), store.clone()),
        )
        .unwrap();
        node.start().unwrap();
        LightNode {
            node,
            filter,
            lightpush,
            store,
        }
    }

    async fn wait_healthy(node: &WakuNode, id: &FilterId) {
        for _ in 0..200 {
            let stats = node.filter_stats().await.unwrap();
            if stats.get(id).is_some_and(|h| h.is_healthy()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("filter {id} never became healthy");
    }

    async fn next_event(events: &mut Subscription) -> PipelineEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap()
    }

    async fn drain(node: &WakuNode, id: &FilterId, expected: usize) -> Vec<Envelope> {
        let mut collected = Vec::new();
        for _ in 0..100 {
            collected.extend(node.get_filter_messages(id).unwrap());
            if collected.len() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        collected
    }

    // =========================================================================
    // LIGHT CLIENT
    // =========================================================================

    #[tokio::test]
    async fn test_light_client_end_to_end() {
        let h = light_node();
        let id = h.node.subscribe(Filter::new(TOPIC, [CHAT])).await.unwrap();
        wait_healthy(&h.node, &id).await;

        // Both serving peers push the same message
        let incoming = Envelope::new(WakuMessage::new(CHAT, b"hello".to_vec(), 1), 1, TOPIC);
        assert_eq!(h.filter.deliver("P1", incoming.clone()).await, 1);
        assert_eq!(h.filter.deliver("P2", incoming.clone()).await, 1);

        let received = drain(&h.node, &id, 1).await;
        assert_eq!(received, vec![incoming.clone()]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.node.get_filter_messages(&id).unwrap().is_empty());

        // History that includes the live message adds only the new one
        h.store.insert(TOPIC, incoming.message().clone());
        h.store.insert(TOPIC, WakuMessage::new(CHAT, b"older".to_vec(), 0));
        h.node
            .query(&PeerId::from("S1"), StoreRequest::new(TOPIC, [CHAT]), true)
            .await
            .unwrap();
        let replayed = h.node.get_filter_messages(&id).unwrap();
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].payload(), b"older");

        h.node.shutdown().await;
    }

    #[tokio::test]
    async fn test_light_client_send_goes_through_lightpush() {
        let h = light_node();
        let id = h.node.subscribe(Filter::new(TOPIC, [CHAT])).await.unwrap();
        let mut events = h.node.events(EventFilter::topics(vec![EventTopic::Delivery]));

        let hash = h
            .node
            .send(Some(TOPIC.to_string()), WakuMessage::new(CHAT, b"mine".to_vec(), 3))
            .await
            .unwrap();

        // Local sends reach our own filters without a network round trip
        let own = h.node.get_filter_messages(&id).unwrap();
        assert_eq!(own.len(), 1);
        assert_eq!(own[0].hash(), hash);

        assert_eq!(
            next_event(&mut events).await,
            PipelineEvent::EnvelopeSent {
                hash,
                pubsub_topic: TOPIC.to_string(),
            }
        );
        assert_eq!(h.lightpush.published()[0].hash(), hash);

        // The echo from a filter peer is a duplicate
        let echo = h.lightpush.published()[0].clone();
        h.filter.deliver("P1", echo).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.node.get_filter_messages(&id).unwrap().is_empty());

        h.node.shutdown().await;
    }

    #[tokio::test]
    async fn test_light_client_recovers_from_dead_peer() {
        let h = light_node();
        let id = h.node.subscribe(Filter::new(TOPIC, [CHAT])).await.unwrap();
        wait_healthy(&h.node, &id).await;
        let mut health = h.node.events(EventFilter::topics(vec![EventTopic::FilterHealth]));

        h.filter.kill_peer("P1");
        let mut recovered = false;
        for _ in 0..200 {
            let stats = h.node.filter_stats().await.unwrap();
            let filter = stats.get(&id).unwrap();
            if filter.is_healthy() && !filter.peers.contains(&PeerId::from("P1")) {
                recovered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(recovered);

        // Unhealthy then healthy again
        let first = next_event(&mut health).await;
        assert!(matches!(first, PipelineEvent::FilterHealthChanged { healthy: false, .. }));
        let second = next_event(&mut health).await;
        assert!(matches!(second, PipelineEvent::FilterHealthChanged { healthy: true, .. }));

        // The replacement peer delivers
        let envelope = Envelope::new(WakuMessage::new(CHAT, b"after".to_vec(), 9), 9, TOPIC);
        assert_eq!(h.filter.deliver("P3", envelope.clone()).await, 1);
        assert_eq!(drain(&h.node, &id, 1).await, vec![envelope]);

        h.node.shutdown().await;
    }

    // =========================================================================
    // FULL NODE
    // =========================================================================

    #[tokio::test]
    async fn test_relay_node_flow() {
        let relay = Arc::new(MockRelay::with_peers(TOPIC, 3));
        let store = Arc::new(MockStore::new());
        let node = WakuNode::new(
            NodeConfig::for_testing(),
            NodeTransports::relay(relay.clone(), store.clone()),
        )
        .unwrap();
        node.start().unwrap();

        let id = node.subscribe(Filter::new(TOPIC, [CHAT])).await.unwrap();
        let other = node.subscribe(Filter::new(TOPIC, ["/app/1/other/proto"])).await.unwrap();
        let mut envelopes = node.events(EventFilter::topics(vec![EventTopic::Envelopes]));

        let incoming = Envelope::new(WakuMessage::new(CHAT, b"gossip".to_vec(), 4), 4, TOPIC);
        for _ in 0..3 {
            node.on_relay_envelope(incoming.clone()).await.unwrap();
        }
        assert_eq!(drain(&node, &id, 1).await, vec![incoming.clone()]);
        assert!(node.get_filter_messages(&other).unwrap().is_empty());
        assert!(matches!(
            next_event(&mut envelopes).await,
            PipelineEvent::EnvelopeAvailable { matched: true, .. }
        ));

        let hash = node
            .send(Some(TOPIC.to_string()), WakuMessage::new(CHAT, b"reply".to_vec(), 5))
            .await
            .unwrap();
        for _ in 0..100 {
            if !relay.published().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(relay.published().len(), 1);
        assert_eq!(relay.published()[0].hash(), hash);
        assert!(node.filter_stats().await.unwrap().filters.is_empty());

        node.shutdown().await;
    }

    #[tokio::test]
    async fn test_relay_send_failures_are_reported() {
        let relay = Arc::new(MockRelay::with_peers(TOPIC, 0));
        let node = WakuNode::new(
            NodeConfig::for_testing(),
            NodeTransports::relay(relay.clone(), Arc::new(MockStore::new())),
        )
        .unwrap();
        node.start().unwrap();
        let mut delivery = node.events(EventFilter::topics(vec![EventTopic::Delivery]));

        // Not enough relay peers
        let first = node
            .send(Some(TOPIC.to_string()), WakuMessage::new(CHAT, b"a".to_vec(), 1))
            .await
            .unwrap();
        match next_event(&mut delivery).await {
            PipelineEvent::EnvelopeSendFailed { hash, .. } => assert_eq!(hash, first),
            other => panic!("unexpected event {other:?}"),
        }

        // Peers present but the publish is rejected
        relay.set_peer_count(TOPIC, 2);
        relay.fail_with(Some(PublishError::Rejected("too large".to_string())));
        let second = node
            .send(Some(TOPIC.to_string()), WakuMessage::new(CHAT, b"b".to_vec(), 2))
            .await
            .unwrap();
        match next_event(&mut delivery).await {
            PipelineEvent::EnvelopeSendFailed { hash, reason } => {
                assert_eq!(hash, second);
                assert!(reason.contains("too large"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(relay.published().is_empty());

        node.shutdown().await;
    }
}
