//! Envelope pipeline service
//!
//! Orchestrates the dedup cache, the bounded dispatch queue and its worker
//! pool, and the TTL sweep. Matching is delegated to the filter registry;
//! every processed envelope is announced on the notification bus.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_bus::{EventPublisher, PipelineEvent};
use shared_types::{now_nanos, Envelope, EnvelopeError, MessageHash, MessageSource};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use waku_telemetry::{
    log_envelope_event, metric_inc, DISPATCH_QUEUE_DEPTH, ENVELOPES_DISPATCHED,
    ENVELOPES_EXPIRED, ENVELOPES_RECEIVED, ENVELOPE_CACHE, ENVELOPE_SIZE_BYTES,
    ENVELOPE_VALIDATION_FAILURES,
};
use wk_01_filter_registry::FilterRegistryApi;

use crate::config::PipelineConfig;
use crate::domain::{EnvelopeCache, Observation, ProcessingState, Timestamp};
use crate::error::PipelineError;
use crate::ports::{EnvelopeSink, StoreProcessingTracker};

const SUBSYSTEM: &str = "envelope-pipeline";

fn now_millis() -> Timestamp {
    (now_nanos() / 1_000_000).max(0) as Timestamp
}

fn rejection_reason(err: &EnvelopeError) -> &'static str {
    match err {
        EnvelopeError::EmptyPubsubTopic => "empty_pubsub_topic",
        EnvelopeError::EmptyContentTopic => "empty_content_topic",
        EnvelopeError::PayloadTooLarge { .. } => "too_large",
        EnvelopeError::HashMismatch { .. } => "hash_mismatch",
        EnvelopeError::InvalidHash(_) => "invalid_hash",
    }
}

/// Queue entry. Only the hash travels; the record lives in the cache.
#[derive(Debug, Clone, Copy)]
struct QueuedEnvelope {
    hash: MessageHash,
    generation: u64,
}

/// Node-wide envelope cache and dispatch queue.
pub struct EnvelopePipeline {
    config: PipelineConfig,
    registry: Arc<dyn FilterRegistryApi>,
    bus: Arc<dyn EventPublisher>,
    cache: RwLock<EnvelopeCache>,
    /// Bumped by `clear`; queue entries from an older generation are skipped.
    generation: AtomicU64,
    queue_tx: mpsc::Sender<QueuedEnvelope>,
    queue_rx: Arc<Mutex<mpsc::Receiver<QueuedEnvelope>>>,
    started: AtomicBool,
}

impl EnvelopePipeline {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<dyn FilterRegistryApi>,
        bus: Arc<dyn EventPublisher>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            config,
            registry,
            bus,
            cache: RwLock::new(EnvelopeCache::new()),
            generation: AtomicU64::new(0),
            queue_tx,
            queue_rx: Arc::new(Mutex::new(queue_rx)),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Spawn the dispatch workers and the expiry sweep.
    ///
    /// All tasks exit when `shutdown` flips.
    pub fn start(
        self: &Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>, PipelineError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(PipelineError::AlreadyStarted);
        }

        let mut handles = Vec::with_capacity(self.config.worker_count + 1);
        for worker_id in 0..self.config.worker_count {
            let pipeline = Arc::clone(self);
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(pipeline.run_worker(worker_id, shutdown)));
        }
        handles.push(tokio::spawn(Arc::clone(self).run_expiry(shutdown)));

        info!(
            subsystem = SUBSYSTEM,
            workers = self.config.worker_count,
            queue_capacity = self.config.queue_capacity,
            "Envelope pipeline started"
        );
        Ok(handles)
    }

    async fn run_worker(self: Arc<Self>, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        loop {
            let next = tokio::select! {
                _ = shutdown.changed() => break,
                next = async { self.queue_rx.lock().await.recv().await } => next,
            };
            let Some(item) = next else { break };
            self.update_queue_depth();

            if item.generation != self.generation.load(Ordering::Acquire) {
                trace!(subsystem = SUBSYSTEM, hash = %item.hash, "Skipping envelope queued before clear");
                continue;
            }
            self.process(item.hash).await;
        }
        debug!(subsystem = SUBSYSTEM, worker_id, "Dispatch worker stopped");
    }

    async fn run_expiry(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.expiry_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    self.sweep_expired().await;
                }
            }
        }
        debug!(subsystem = SUBSYSTEM, "Expiry sweep stopped");
    }

    /// Dispatch one cached record to the filter registry.
    async fn process(&self, hash: MessageHash) {
        let claimed = self.cache.write().claim(&hash);
        let Some((envelope, source)) = claimed else {
            trace!(subsystem = SUBSYSTEM, hash = %hash, "Record not dispatchable, skipping");
            return;
        };

        let matched = self.registry.notify_watchers(&envelope);
        self.cache.write().complete(&hash, matched);
        metric_inc!(ENVELOPES_DISPATCHED, &[if matched { "true" } else { "false" }]);

        log_envelope_event!(
            trace,
            SUBSYSTEM,
            "Envelope dispatched",
            hash,
            source = %source,
            matched
        );

        self.bus
            .publish(PipelineEvent::EnvelopeAvailable {
                hash,
                pubsub_topic: envelope.pubsub_topic().to_string(),
                content_topic: envelope.content_topic().to_string(),
                source,
                matched,
            })
            .await;
    }

    async fn enqueue(&self, hash: MessageHash) -> Result<(), PipelineError> {
        let item = QueuedEnvelope {
            hash,
            generation: self.generation.load(Ordering::Acquire),
        };
        self.queue_tx
            .send(item)
            .await
            .map_err(|_| PipelineError::QueueClosed)?;
        self.update_queue_depth();
        Ok(())
    }

    fn update_queue_depth(&self) {
        let queued = self
            .config
            .queue_capacity
            .saturating_sub(self.queue_tx.capacity());
        DISPATCH_QUEUE_DEPTH.set(queued as f64);
    }

    /// Age out records older than the configured ttl.
    ///
    /// Returns the hashes that expired without ever matching a filter.
    pub async fn sweep_expired(&self) -> Vec<MessageHash> {
        self.sweep_expired_at(now_millis()).await
    }

    pub(crate) async fn sweep_expired_at(&self, now: Timestamp) -> Vec<MessageHash> {
        let ttl_ms = self.config.cache_ttl.as_millis() as u64;
        let expired = self.cache.write().sweep(now, ttl_ms);

        for hash in &expired {
            ENVELOPES_EXPIRED.inc();
            self.bus
                .publish(PipelineEvent::EnvelopeExpired { hash: *hash })
                .await;
        }
        if !expired.is_empty() {
            debug!(
                subsystem = SUBSYSTEM,
                expired = expired.len(),
                cached = self.cache.read().len(),
                "Expired unmatched envelopes"
            );
        }
        expired
    }

    /// Drop pending queue items, every filter store and the dedup cache.
    ///
    /// Producers must be stopped first.
    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.write().clear();
        self.registry.clear_messages();
        info!(subsystem = SUBSYSTEM, "Envelope pipeline cleared");
    }

    pub fn state(&self, hash: &MessageHash) -> Option<ProcessingState> {
        self.cache.read().state(hash)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}

#[async_trait]
impl EnvelopeSink for EnvelopePipeline {
    async fn on_new_envelope(
        &self,
        envelope: Envelope,
        source: MessageSource,
        process_immediately: bool,
    ) -> Result<(), PipelineError> {
        if let Err(err) = envelope.validate(self.config.max_message_size) {
            metric_inc!(ENVELOPE_VALIDATION_FAILURES, &[rejection_reason(&err)]);
            warn!(
                subsystem = SUBSYSTEM,
                source = %source,
                hash = %envelope.hash(),
                error = %err,
                "Dropping invalid envelope"
            );
            return Err(err.into());
        }

        metric_inc!(ENVELOPES_RECEIVED, &[source.as_str()]);
        ENVELOPE_SIZE_BYTES.observe(envelope.payload().len() as f64);

        let hash = envelope.hash();
        let observation = self.cache.write().observe(envelope, source, now_millis());
        match observation {
            Observation::New => metric_inc!(ENVELOPE_CACHE, &["new"]),
            Observation::Duplicate { requeue: true } => {
                metric_inc!(ENVELOPE_CACHE, &["redispatch"]);
            }
            Observation::Duplicate { requeue: false } => {
                metric_inc!(ENVELOPE_CACHE, &["duplicate"]);
                trace!(subsystem = SUBSYSTEM, hash = %hash, source = %source, "Duplicate envelope");
                return Ok(());
            }
        }

        if process_immediately {
            self.process(hash).await;
            Ok(())
        } else {
            self.enqueue(hash).await
        }
    }
}

impl StoreProcessingTracker for EnvelopePipeline {
    fn mark_store_message_processed(&self, hash: &MessageHash) -> bool {
        self.cache.write().mark_store_message_processed(hash)
    }

    fn processing_store_messages(&self) -> bool {
        self.cache.read().processing_store_messages()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_bus::{EventFilter, InMemoryEventBus};
    use shared_types::{FilterId, WakuMessage};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use wk_01_filter_registry::{
        Filter, FilterError, FilterRegistry, FilterSnapshot, RegistryConfig,
    };

    const TOPIC: &str = "/waku/2/rs/16/32";
    const CHAT: &str = "/app/1/chat/proto";

    /// Registry wrapper counting `notify_watchers` calls.
    #[derive(Default)]
    struct CountingRegistry {
        inner: FilterRegistry,
        notify_calls: AtomicUsize,
    }

    impl FilterRegistryApi for CountingRegistry {
        fn install(&self, filter: Filter) -> Result<FilterId, FilterError> {
            self.inner.install(filter)
        }
        fn uninstall(&self, id: &FilterId) -> bool {
            self.inner.uninstall(id)
        }
        fn get(&self, id: &FilterId) -> Option<FilterSnapshot> {
            self.inner.get(id)
        }
        fn notify_watchers(&self, envelope: &Envelope) -> bool {
            self.notify_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.notify_watchers(envelope)
        }
        fn pop_messages(&self, id: &FilterId) -> Result<Vec<Envelope>, FilterError> {
            self.inner.pop_messages(id)
        }
        fn clear_messages(&self) {
            self.inner.clear_messages()
        }
    }

    fn envelope(payload: &[u8]) -> Envelope {
        Envelope::new(WakuMessage::new(CHAT, payload.to_vec(), 10), 10, TOPIC)
    }

    fn setup() -> (Arc<EnvelopePipeline>, Arc<CountingRegistry>, Arc<InMemoryEventBus>) {
        let registry = Arc::new(CountingRegistry {
            inner: FilterRegistry::new(RegistryConfig::for_testing()),
            ..Default::default()
        });
        let bus = Arc::new(InMemoryEventBus::new());
        let pipeline = Arc::new(EnvelopePipeline::new(
            PipelineConfig::for_testing(),
            registry.clone(),
            bus.clone(),
        ));
        (pipeline, registry, bus)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_process_immediately_dispatches_inline() {
        let (pipeline, registry, _bus) = setup();
        let id = registry.install(Filter::new(TOPIC, [CHAT])).unwrap();

        let e = envelope(b"local");
        pipeline
            .on_new_envelope(e.clone(), MessageSource::LocalSend, true)
            .await
            .unwrap();

        assert_eq!(pipeline.state(&e.hash()), Some(ProcessingState::Dispatched));
        assert_eq!(registry.pop_messages(&id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_queued_envelope_processed_by_worker() {
        let (pipeline, registry, _bus) = setup();
        let id = registry.install(Filter::new(TOPIC, [CHAT])).unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        pipeline.start(shutdown_rx).unwrap();

        let e = envelope(b"relayed");
        pipeline
            .on_new_envelope(e.clone(), MessageSource::Relay, false)
            .await
            .unwrap();

        wait_for(|| pipeline.state(&e.hash()) == Some(ProcessingState::Dispatched)).await;
        assert_eq!(registry.get(&id).unwrap().stored_messages, 1);
    }

    #[tokio::test]
    async fn test_duplicates_dispatch_once() {
        let (pipeline, registry, _bus) = setup();
        let id = registry.install(Filter::new(TOPIC, [CHAT])).unwrap();

        let e = envelope(b"dup");
        for _ in 0..5 {
            pipeline
                .on_new_envelope(e.clone(), MessageSource::Filter, true)
                .await
                .unwrap();
        }

        assert_eq!(pipeline.cached_len(), 1);
        assert_eq!(registry.notify_calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.pop_messages(&id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_duplicate_is_redispatched() {
        let (pipeline, registry, _bus) = setup();
        let e = envelope(b"early");

        pipeline
            .on_new_envelope(e.clone(), MessageSource::Relay, true)
            .await
            .unwrap();
        assert_eq!(pipeline.state(&e.hash()), Some(ProcessingState::Unprocessed));

        // A filter installed later picks up the re-delivered copy
        let id = registry.install(Filter::new(TOPIC, [CHAT])).unwrap();
        pipeline
            .on_new_envelope(e.clone(), MessageSource::Relay, true)
            .await
            .unwrap();
        assert_eq!(pipeline.state(&e.hash()), Some(ProcessingState::Dispatched));
        assert_eq!(registry.pop_messages(&id).unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_notify_once() {
        let (pipeline, registry, _bus) = setup();
        let id = registry.install(Filter::new(TOPIC, [CHAT])).unwrap();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        pipeline.start(shutdown_rx).unwrap();

        let e = envelope(b"H");
        let a = {
            let pipeline = Arc::clone(&pipeline);
            let e = e.clone();
            tokio::spawn(async move { pipeline.on_new_envelope(e, MessageSource::Filter, false).await })
        };
        let b = {
            let pipeline = Arc::clone(&pipeline);
            let e = e.clone();
            tokio::spawn(async move { pipeline.on_new_envelope(e, MessageSource::Filter, false).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        wait_for(|| pipeline.state(&e.hash()) == Some(ProcessingState::Dispatched)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(registry.notify_calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.pop_messages(&id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_envelopes_rejected() {
        let (pipeline, _registry, _bus) = setup();

        let oversized = Envelope::new(WakuMessage::new(CHAT, vec![0u8; 4096], 1), 1, TOPIC);
        let result = pipeline
            .on_new_envelope(oversized, MessageSource::Relay, true)
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::InvalidEnvelope(EnvelopeError::PayloadTooLarge { .. }))
        ));

        let no_topic = Envelope::new(WakuMessage::new("", b"x".to_vec(), 1), 1, TOPIC);
        let result = pipeline
            .on_new_envelope(no_topic, MessageSource::Relay, true)
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::InvalidEnvelope(EnvelopeError::EmptyContentTopic))
        ));
        assert_eq!(pipeline.cached_len(), 0);
    }

    #[tokio::test]
    async fn test_envelope_available_published_even_without_match() {
        let (pipeline, _registry, bus) = setup();
        let mut sub = bus.subscribe(EventFilter::all());

        let e = envelope(b"nobody-listens");
        pipeline
            .on_new_envelope(e.clone(), MessageSource::Relay, true)
            .await
            .unwrap();

        match sub.recv().await {
            Some(PipelineEvent::EnvelopeAvailable { hash, matched, source, .. }) => {
                assert_eq!(hash, e.hash());
                assert!(!matched);
                assert_eq!(source, MessageSource::Relay);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_sweep_publishes_expired() {
        let (pipeline, _registry, bus) = setup();
        let mut sub = bus.subscribe(EventFilter::all());

        let e = envelope(b"stale");
        pipeline
            .on_new_envelope(e.clone(), MessageSource::Relay, true)
            .await
            .unwrap();
        // Drain EnvelopeAvailable
        sub.recv().await;

        let later = now_millis() + 10_000;
        let expired = pipeline.sweep_expired_at(later).await;
        assert_eq!(expired, vec![e.hash()]);
        assert_eq!(
            pipeline.state(&e.hash()),
            Some(ProcessingState::ExpiredUnmatched)
        );
        assert!(matches!(
            sub.recv().await,
            Some(PipelineEvent::EnvelopeExpired { hash }) if hash == e.hash()
        ));
    }

    #[tokio::test]
    async fn test_clear_drops_cache_and_stores() {
        let (pipeline, registry, _bus) = setup();
        let id = registry.install(Filter::new(TOPIC, [CHAT])).unwrap();

        // Queued before clear, never processed after
        let queued = envelope(b"queued");
        pipeline
            .on_new_envelope(queued.clone(), MessageSource::Relay, false)
            .await
            .unwrap();
        let stored = envelope(b"stored");
        pipeline
            .on_new_envelope(stored, MessageSource::Relay, true)
            .await
            .unwrap();

        pipeline.clear();
        assert_eq!(pipeline.cached_len(), 0);
        assert_eq!(registry.get(&id).unwrap().stored_messages, 0);

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        pipeline.start(shutdown_rx).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(registry.get(&id).unwrap().stored_messages, 0);
        assert_eq!(pipeline.state(&queued.hash()), None);
    }

    #[tokio::test]
    async fn test_store_messages_tracked() {
        let (pipeline, registry, _bus) = setup();
        registry.install(Filter::new(TOPIC, [CHAT])).unwrap();

        let e = envelope(b"history");
        pipeline
            .on_new_envelope(e.clone(), MessageSource::Store, true)
            .await
            .unwrap();
        assert!(pipeline.processing_store_messages());
        assert!(pipeline.mark_store_message_processed(&e.hash()));
        assert!(!pipeline.processing_store_messages());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let (pipeline, _registry, _bus) = setup();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        pipeline.start(shutdown_rx.clone()).unwrap();
        assert!(matches!(
            pipeline.start(shutdown_rx),
            Err(PipelineError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_workers_stop_on_shutdown() {
        let (pipeline, _registry, _bus) = setup();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handles = pipeline.start(shutdown_rx).unwrap();

        shutdown_tx.send(true).unwrap();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .expect("task did not stop")
                .unwrap();
        }
    }

    #[test]
    fn test_blocking_enqueue_applies_backpressure() {
        let registry = Arc::new(FilterRegistry::new(RegistryConfig::for_testing()));
        let pipeline = EnvelopePipeline::new(
            PipelineConfig {
                queue_capacity: 1,
                ..PipelineConfig::for_testing()
            },
            registry,
            Arc::new(InMemoryEventBus::new()),
        );

        tokio_test::block_on(async {
            pipeline
                .on_new_envelope(envelope(b"1"), MessageSource::Relay, false)
                .await
                .unwrap();
        });
        // Queue is full and no worker runs: the next enqueue must wait
        let mut second = tokio_test::task::spawn(pipeline.on_new_envelope(
            envelope(b"2"),
            MessageSource::Relay,
            false,
        ));
        assert!(second.poll().is_pending());
    }
}
