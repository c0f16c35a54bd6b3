//! # Waku Node
//!
//! Owns one instance of every subsystem and exposes the application
//! contract. All background tasks share a single shutdown channel.
//!
//! ## Startup Sequence
//!
//! 1. Validate configuration, register metrics
//! 2. Build registry → pipeline → sender / store client / filter manager
//! 3. `start()`: spawn dispatch workers, expiry sweep, broadcast loop and
//!    (light mode) the filter manager event loop
//! 4. `shutdown()`: flip the watch channel, wait briefly for tasks

use anyhow::{Context, Result};
use parking_lot::Mutex;
use shared_bus::{EventFilter, InMemoryEventBus, Subscription};
use shared_types::{Envelope, FilterId, MessageHash, MessageSource, PeerId, WakuMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use waku_telemetry::{encode_metrics, init_telemetry, register_metrics, TelemetryGuard};
use wk_01_filter_registry::{Filter, FilterRegistry, FilterRegistryApi};
use wk_02_envelope_pipeline::{EnvelopePipeline, EnvelopeSink};
use wk_03_filter_manager::{
    FilterManagerApi, FilterManagerHandle, FilterManagerService, FilterStats,
};
use wk_04_message_sender::{MessageSender, MessageSenderApi, PublishTransport};
use wk_05_store_query::{
    QueryFailureCallback, QueryPage, StoreQueryApi, StoreQueryClient, StoreRequest,
};

use crate::container::{NodeConfig, NodeTransports};

/// How long `shutdown` waits for each background task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub struct WakuNode {
    config: NodeConfig,
    registry: Arc<FilterRegistry>,
    bus: Arc<InMemoryEventBus>,
    pipeline: Arc<EnvelopePipeline>,
    sender: Arc<MessageSender>,
    store: StoreQueryClient,
    /// Present in light mode only.
    manager: Option<FilterManagerHandle>,
    /// Moved into its task by `start`.
    manager_service: Mutex<Option<FilterManagerService>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl WakuNode {
    pub fn new(config: NodeConfig, transports: NodeTransports) -> Result<Self> {
        config.validate().context("Invalid node configuration")?;
        register_metrics().context("Failed to register metrics")?;

        let registry = Arc::new(FilterRegistry::new(config.registry.clone()));
        let bus = Arc::new(InMemoryEventBus::new());
        let pipeline = Arc::new(EnvelopePipeline::new(
            config.pipeline.clone(),
            registry.clone(),
            bus.clone(),
        ));

        let transport = if config.light_client {
            PublishTransport::Lightpush(
                transports
                    .lightpush
                    .clone()
                    .context("Light client requires a lightpush transport")?,
            )
        } else {
            PublishTransport::Relay(
                transports
                    .relay
                    .clone()
                    .context("Full node requires a relay transport")?,
            )
        };
        let sender = Arc::new(MessageSender::new(
            config.sender.clone(),
            transport,
            pipeline.clone(),
            bus.clone(),
        ));

        let store = StoreQueryClient::new(
            config.store.clone(),
            transports.store.clone(),
            pipeline.clone(),
            bus.clone(),
        );

        let (manager, manager_service) = if config.light_client {
            let protocol = transports
                .filter
                .clone()
                .context("Light client requires a filter transport")?;
            let (service, handle) = FilterManagerService::new(
                config.manager.clone(),
                protocol,
                pipeline.clone(),
                bus.clone(),
            )?;
            (Some(handle), Some(service))
        } else {
            (None, None)
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!(
            light_client = config.light_client,
            min_peers_for_filter = config.manager.min_peers_for_filter,
            min_peers_for_relay = config.sender.min_peers_for_relay,
            "Waku node created"
        );

        Ok(Self {
            config,
            registry,
            bus,
            pipeline,
            sender,
            store,
            manager,
            manager_service: Mutex::new(manager_service),
            tasks: Mutex::new(Vec::new()),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Invoke `callback` with the request id, peer and error whenever a
    /// store query fails. Install before sharing the node.
    pub fn with_store_failure_callback(mut self, callback: QueryFailureCallback) -> Self {
        self.store = self.store.with_failure_callback(callback);
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn is_light_client(&self) -> bool {
        self.config.light_client
    }

    /// Install the global log subscriber from the node's telemetry
    /// settings. Keep the guard alive for the life of the process.
    pub fn init_telemetry(&self) -> Result<TelemetryGuard> {
        init_telemetry(self.config.telemetry.clone()).context("Failed to initialise telemetry")
    }

    /// Prometheus text exposition of every pipeline metric.
    pub fn metrics_text(&self) -> Result<String> {
        Ok(encode_metrics()?)
    }

    /// Spawn every background task.
    pub fn start(&self) -> Result<()> {
        let mut tasks = self.pipeline.start(self.shutdown_rx.clone())?;
        tasks.push(self.sender.start(self.shutdown_rx.clone())?);
        if let Some(service) = self.manager_service.lock().take() {
            tasks.push(tokio::spawn(service.run(self.shutdown_rx.clone())));
        }

        info!(tasks = tasks.len(), "Waku node started");
        self.tasks.lock().extend(tasks);
        Ok(())
    }

    /// Stop every background task. In-flight unsubscribes may not finish.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");
        if self.shutdown_tx.send(true).is_err() {
            warn!("No task was listening for shutdown");
        }

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("Background task did not stop in time");
            }
        }
        info!("Shutdown complete");
    }

    /// Install a filter. In light mode the filter manager starts
    /// subscribing to remote peers for it.
    pub async fn subscribe(&self, filter: Filter) -> Result<FilterId> {
        let id = self.registry.install(filter)?;
        if let Some(manager) = &self.manager {
            let criteria = self
                .registry
                .criteria(&id)
                .context("Filter vanished during subscribe")?;
            if let Err(e) = manager.add_filter(id.clone(), criteria).await {
                self.registry.uninstall(&id);
                return Err(e).context("Filter manager unavailable");
            }
        }
        Ok(id)
    }

    /// Uninstall a filter. Returns false if it was unknown.
    pub async fn unsubscribe(&self, id: &FilterId) -> Result<bool> {
        let removed = self.registry.uninstall(id);
        if removed {
            if let Some(manager) = &self.manager {
                manager.remove_filter(id.clone()).await?;
            }
        }
        Ok(removed)
    }

    /// Drain a filter's matched envelopes, oldest first.
    pub fn get_filter_messages(&self, id: &FilterId) -> Result<Vec<Envelope>> {
        Ok(self.registry.pop_messages(id)?)
    }

    pub async fn send(
        &self,
        pubsub_topic: Option<String>,
        message: WakuMessage,
    ) -> Result<MessageHash> {
        Ok(self.sender.send(pubsub_topic, message).await?)
    }

    pub async fn query(
        &self,
        peer: &PeerId,
        request: StoreRequest,
        process_envelopes: bool,
    ) -> Result<QueryPage> {
        Ok(self.store.query(peer, request, process_envelopes).await?)
    }

    pub async fn query_all(
        &self,
        peer: &PeerId,
        request: StoreRequest,
        process_envelopes: bool,
    ) -> Result<Vec<QueryPage>> {
        Ok(self.store.query_all(peer, request, process_envelopes).await?)
    }

    /// Subscription health per filter. Empty on full nodes.
    pub async fn filter_stats(&self) -> Result<FilterStats> {
        match &self.manager {
            Some(manager) => Ok(manager.stats().await?),
            None => Ok(FilterStats::default()),
        }
    }

    /// Entry point for envelopes received over relay.
    pub async fn on_relay_envelope(&self, envelope: Envelope) -> Result<()> {
        Ok(self
            .pipeline
            .on_new_envelope(envelope, MessageSource::Relay, false)
            .await?)
    }

    /// Drop cached envelopes and every filter's stored messages.
    pub fn clear(&self) {
        self.pipeline.clear();
    }

    pub fn events(&self, filter: EventFilter) -> Subscription {
        self.bus.subscribe(filter)
    }

    pub fn pipeline(&self) -> &Arc<EnvelopePipeline> {
        &self.pipeline
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }
}
