//! # Deduplication Under Concurrency
//!
//! The same envelope arriving from several sources at once must land in
//! each matching filter exactly once.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use shared_bus::{EventFilter, EventTopic, InMemoryEventBus, PipelineEvent};
    use shared_types::{Envelope, MessageSource, PeerId, WakuMessage};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::watch;
    use wk_01_filter_registry::{Filter, FilterRegistry, FilterRegistryApi, RegistryConfig};
    use wk_02_envelope_pipeline::{EnvelopePipeline, EnvelopeSink, PipelineConfig};
    use wk_05_store_query::{MockStore, StoreQueryApi, StoreQueryClient, StoreRequest};

    const TOPIC: &str = "/waku/2/rs/16/32";
    const CHAT: &str = "/app/1/chat/proto";

    struct Fixture {
        registry: Arc<FilterRegistry>,
        bus: Arc<InMemoryEventBus>,
        pipeline: Arc<EnvelopePipeline>,
        _shutdown: watch::Sender<bool>,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(FilterRegistry::new(RegistryConfig::for_testing()));
        let bus = Arc::new(InMemoryEventBus::new());
        let pipeline = Arc::new(EnvelopePipeline::new(
            PipelineConfig::for_testing(),
            registry.clone(),
            bus.clone(),
        ));
        let (shutdown, rx) = watch::channel(false);
        pipeline.start(rx).unwrap();
        Fixture {
            registry,
            bus,
            pipeline,
            _shutdown: shutdown,
        }
    }

    fn chat(payload: &[u8]) -> Envelope {
        Envelope::new(WakuMessage::new(CHAT, payload.to_vec(), 7), 7, TOPIC)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_stored_once() {
        let fx = fixture();
        let id = fx.registry.install(Filter::new(TOPIC, [CHAT])).unwrap();
        let mut events = fx.bus.subscribe(EventFilter::topics(vec![EventTopic::Envelopes]));
        let envelope = chat(b"H");

        let sources = [MessageSource::Filter, MessageSource::Relay, MessageSource::Store];
        let mut tasks = Vec::new();
        for i in 0..32 {
            let pipeline = fx.pipeline.clone();
            let envelope = envelope.clone();
            let source = sources[i % sources.len()];
            tasks.push(tokio::spawn(async move {
                pipeline.on_new_envelope(envelope, source, i % 2 == 0).await
            }));
        }
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            PipelineEvent::EnvelopeAvailable { hash, matched: true, .. } if hash == envelope.hash()
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(events.try_recv().unwrap().is_none());
        assert_eq!(fx.registry.pop_messages(&id).unwrap(), vec![envelope]);
        assert_eq!(fx.pipeline.cached_len(), 1);
    }

    /// Store history that overlaps live traffic adds nothing new.
    #[tokio::test]
    async fn test_store_replay_of_live_message_stored_once() {
        let fx = fixture();
        let id = fx.registry.install(Filter::new(TOPIC, [CHAT])).unwrap();
        let live = chat(b"live");

        fx.pipeline
            .on_new_envelope(live.clone(), MessageSource::Filter, true)
            .await
            .unwrap();

        let store = Arc::new(MockStore::new());
        store.insert(TOPIC, live.message().clone());
        store.insert(TOPIC, WakuMessage::new(CHAT, b"history".to_vec(), 3));
        let client = StoreQueryClient::new(
            wk_05_store_query::StoreConfig::for_testing(),
            store,
            fx.pipeline.clone(),
            fx.bus.clone(),
        );
        let page = client
            .query(&PeerId::from("S1"), StoreRequest::new(TOPIC, [CHAT]), true)
            .await
            .unwrap();
        assert_eq!(page.count, 2);

        let mut payloads: Vec<Vec<u8>> = fx
            .registry
            .pop_messages(&id)
            .unwrap()
            .into_iter()
            .map(|e| e.payload().to_vec())
            .collect();
        payloads.sort();
        assert_eq!(payloads, vec![b"history".to_vec(), b"live".to_vec()]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Any mix of repeats across any sources yields one copy per
        /// distinct payload.
        #[test]
        fn prop_each_distinct_envelope_stored_once(
            payloads in prop::collection::vec(0u8..6, 1..40),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let stored = runtime.block_on(async {
                let fx = fixture();
                let id = fx.registry.install(Filter::new(TOPIC, [CHAT])).unwrap();
                for (i, p) in payloads.iter().enumerate() {
                    let source = if i % 2 == 0 { MessageSource::Relay } else { MessageSource::Store };
                    fx.pipeline
                        .on_new_envelope(chat(&[*p]), source, true)
                        .await
                        .unwrap();
                }
                fx.registry.pop_messages(&id).unwrap()
            });

            let mut distinct = payloads.clone();
            distinct.sort();
            distinct.dedup();
            prop_assert_eq!(stored.len(), distinct.len());
        }
    }
}
