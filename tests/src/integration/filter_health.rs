//! # Filter Health Flows
//!
//! The filter manager driving a mock filter network, with the real
//! pipeline and registry behind it.

#[cfg(test)]
mod tests {
    use shared_bus::InMemoryEventBus;
    use shared_types::{ContentFilter, FilterId, PeerId};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;
    use wk_01_filter_registry::{FilterRegistry, RegistryConfig};
    use wk_02_envelope_pipeline::{EnvelopePipeline, PipelineConfig};
    use wk_03_filter_manager::{
        FilterManagerApi, FilterManagerHandle, FilterManagerService, FilterStats,
        ManagerConfig, MockFilterProtocol, SubscriptionId,
    };

    const TOPIC: &str = "/waku/2/rs/16/32";

    // =========================================================================
    // FIXTURES
    // =========================================================================

    fn spawn_manager(
        mock: Arc<MockFilterProtocol>,
        config: ManagerConfig,
    ) -> (FilterManagerHandle, watch::Sender<bool>) {
        let registry = Arc::new(FilterRegistry::new(RegistryConfig::for_testing()));
        let bus = Arc::new(InMemoryEventBus::new());
        let pipeline = Arc::new(EnvelopePipeline::new(
            PipelineConfig::for_testing(),
            registry,
            bus.clone(),
        ));
        let (shutdown, rx) = watch::channel(false);
        pipeline.start(rx.clone()).unwrap();
        let (service, handle) = FilterManagerService::new(config, mock, pipeline, bus).unwrap();
        tokio::spawn(service.run(rx));
        (handle, shutdown)
    }

    async fn eventually<F>(handle: &FilterManagerHandle, check: F) -> FilterStats
    where
        F: Fn(&FilterStats) -> bool,
    {
        for _ in 0..200 {
            let stats = handle.stats().await.unwrap();
            if check(&stats) {
                return stats;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("filter manager did not converge");
    }

    fn criteria() -> ContentFilter {
        ContentFilter::new(TOPIC, ["topicA"])
    }

    fn peers(names: &[&str]) -> Vec<PeerId> {
        names.iter().map(|p| PeerId::from(*p)).collect()
    }

    // =========================================================================
    // SCENARIOS
    // =========================================================================

    /// F1 is served by P1 and P2; P1 dies and P3 takes its place.
    #[tokio::test]
    async fn test_dead_peer_is_replaced_by_fresh_peer() {
        let mock = Arc::new(MockFilterProtocol::with_peers(&["P1", "P2", "P3"]));
        let (handle, shutdown) = spawn_manager(mock.clone(), ManagerConfig::for_testing());
        let f1 = FilterId::from("F1");

        handle.add_filter(f1.clone(), criteria()).await.unwrap();
        let stats = eventually(&handle, |s| s.get(&f1).is_some_and(|h| h.active == 2)).await;
        assert_eq!(stats.get(&f1).unwrap().peers, peers(&["P1", "P2"]));
        let ids: Vec<SubscriptionId> = mock.active_subscriptions().into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![SubscriptionId::from("sub1"), SubscriptionId::from("sub2")]);

        mock.kill_peer("P1");
        let stats = eventually(&handle, |s| {
            s.get(&f1)
                .is_some_and(|h| h.active == 2 && h.peers == peers(&["P2", "P3"]))
        })
        .await;
        assert!(stats.get(&f1).unwrap().is_healthy());
        assert_eq!(stats.get(&f1).unwrap().reserved, 0);

        for _ in 0..100 {
            if mock.unsubscribed().contains(&SubscriptionId::from("sub1")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(mock.unsubscribed().contains(&SubscriptionId::from("sub1")));

        let ids: Vec<SubscriptionId> = mock.active_subscriptions().into_iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![SubscriptionId::from("sub2"), SubscriptionId::from("sub3")]);
        let _ = shutdown.send(true);
    }

    /// One dead peer shared by two filters costs each filter one resubscribe.
    #[tokio::test]
    async fn test_shared_peer_failure_affects_every_filter() {
        let mock = Arc::new(MockFilterProtocol::with_peers(&["P1", "P2", "P3", "P4"]));
        let config = ManagerConfig {
            min_peers_for_filter: 3,
            ..ManagerConfig::for_testing()
        };
        let (handle, shutdown) = spawn_manager(mock.clone(), config);
        let f1 = FilterId::from("F1");
        let f2 = FilterId::from("F2");

        handle.add_filter(f1.clone(), criteria()).await.unwrap();
        eventually(&handle, |s| s.get(&f1).is_some_and(|h| h.active == 3)).await;
        handle.add_filter(f2.clone(), criteria()).await.unwrap();
        eventually(&handle, |s| s.get(&f2).is_some_and(|h| h.active == 3)).await;

        // Each filter uses three of the four peers, so at least one peer
        // is shared; kill one both use.
        let stats = handle.stats().await.unwrap();
        let shared = stats.get(&f1).unwrap().peers.iter()
            .find(|p| stats.get(&f2).unwrap().peers.contains(*p))
            .cloned()
            .unwrap();
        mock.kill_peer(shared.as_str());

        eventually(&handle, |s| {
            [&f1, &f2].iter().all(|id| {
                s.get(id)
                    .is_some_and(|h| h.active == 3 && !h.peers.contains(&shared))
            })
        })
        .await;
        let _ = shutdown.send(true);
    }

    /// A subscription that completes after its filter was removed is torn
    /// down and never counted.
    #[tokio::test]
    async fn test_removal_during_subscribe_leaves_nothing_behind() {
        let mock = Arc::new(
            MockFilterProtocol::with_peers(&["P1", "P2"])
                .with_subscribe_delay(Duration::from_millis(50)),
        );
        let (handle, shutdown) = spawn_manager(mock.clone(), ManagerConfig::for_testing());
        let f1 = FilterId::from("F1");

        handle.add_filter(f1.clone(), criteria()).await.unwrap();
        handle.remove_filter(f1.clone()).await.unwrap();
        eventually(&handle, |s| s.get(&f1).is_none()).await;

        for _ in 0..100 {
            if mock.subscribe_calls() >= 2 && mock.active_subscriptions().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(mock.active_subscriptions().is_empty());
        assert_eq!(mock.unsubscribed().len(), 2);
        let _ = shutdown.send(true);
    }

    /// Failing subscribes never leak reservations; once peers recover the
    /// filter converges to exactly the required count.
    #[tokio::test]
    async fn test_converges_after_failures() {
        let mock = Arc::new(MockFilterProtocol::with_peers(&["P1", "P2", "P3"]));
        mock.set_fail_subscribes(true);
        let (handle, shutdown) = spawn_manager(mock.clone(), ManagerConfig::for_testing());
        let f1 = FilterId::from("F1");
        handle.add_filter(f1.clone(), criteria()).await.unwrap();

        for _ in 0..10 {
            let stats = handle.stats().await.unwrap();
            let health = stats.get(&f1).unwrap();
            assert_eq!(health.active, 0);
            assert!(health.reserved <= 2);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        mock.set_fail_subscribes(false);
        let stats = eventually(&handle, |s| s.get(&f1).is_some_and(|h| h.active == 2)).await;
        assert_eq!(stats.get(&f1).unwrap().reserved, 0);

        // Stays at the quorum over further ticks
        tokio::time::sleep(Duration::from_millis(150)).await;
        let health = handle.stats().await.unwrap().get(&f1).cloned().unwrap();
        assert_eq!(health.active + health.reserved, 2);
        let _ = shutdown.send(true);
    }
}
