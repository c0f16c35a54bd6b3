//! # Filter Manager Service
//!
//! Single-owner event loop around [`FilterSubscriptions`]. The loop reacts to
//! the shutdown signal, the health-check ticker, worker results and
//! application commands. It never awaits the network itself: every
//! subscribe, unsubscribe and ping runs in its own task and reports back on
//! an unbounded channel so no result (and no reservation) is ever lost.

use async_trait::async_trait;
use shared_bus::{EventPublisher, PipelineEvent};
use shared_types::{ContentFilter, Envelope, FilterId, MessageSource, PeerId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use waku_telemetry::{
    log_event, log_peer_event, metric_inc, FILTER_PEER_OPERATIONS,
    FILTER_SUBSCRIPTIONS_ACTIVE,
};
use wk_02_envelope_pipeline::EnvelopeSink;

use crate::config::ManagerConfig;
use crate::domain::{
    Command, FilterEvent, FilterStats, FilterSubscriptions, PeerSelection, PingTarget,
    SubscriptionHandle, SubscriptionId,
};
use crate::error::{ManagerError, ProtocolError};
use crate::ports::{FilterManagerApi, FilterProtocol, Subscription};

const SUBSYSTEM: &str = "filter-manager";

/// Requests from the application side.
#[derive(Debug)]
enum ManagerCommand {
    AddFilter {
        filter_id: FilterId,
        criteria: ContentFilter,
    },
    RemoveFilter {
        filter_id: FilterId,
    },
    GetStats(oneshot::Sender<FilterStats>),
}

/// Results reported by worker tasks.
#[derive(Debug)]
enum WorkerResult {
    /// Subscriptions arrive with their envelope receivers attached.
    Subscribed {
        filter_id: FilterId,
        slot_id: String,
        subscriptions: Vec<Subscription>,
    },
    Event(FilterEvent),
}

fn outcome<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "success"
    } else {
        "failure"
    }
}

/// Cloneable handle used by the application to drive the manager.
#[derive(Clone)]
pub struct FilterManagerHandle {
    commands: mpsc::Sender<ManagerCommand>,
}

impl FilterManagerHandle {
    async fn send(&self, command: ManagerCommand) -> Result<(), ManagerError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| ManagerError::NotRunning)
    }
}

#[async_trait]
impl FilterManagerApi for FilterManagerHandle {
    async fn add_filter(
        &self,
        filter_id: FilterId,
        criteria: ContentFilter,
    ) -> Result<(), ManagerError> {
        self.send(ManagerCommand::AddFilter {
            filter_id,
            criteria,
        })
        .await
    }

    async fn remove_filter(&self, filter_id: FilterId) -> Result<(), ManagerError> {
        self.send(ManagerCommand::RemoveFilter { filter_id }).await
    }

    async fn stats(&self) -> Result<FilterStats, ManagerError> {
        let (tx, rx) = oneshot::channel();
        self.send(ManagerCommand::GetStats(tx)).await?;
        rx.await.map_err(|_| ManagerError::NotRunning)
    }
}

/// Keeps every filter subscribed to `min_peers_for_filter` distinct peers.
pub struct FilterManagerService {
    config: ManagerConfig,
    protocol: Arc<dyn FilterProtocol>,
    sink: Arc<dyn EnvelopeSink>,
    bus: Arc<dyn EventPublisher>,
    state: FilterSubscriptions,
    commands: mpsc::Receiver<ManagerCommand>,
    results_tx: mpsc::UnboundedSender<WorkerResult>,
    results_rx: mpsc::UnboundedReceiver<WorkerResult>,
    /// Receivers of accepted subscriptions waiting for their consumer.
    pending: HashMap<SubscriptionId, mpsc::Receiver<Envelope>>,
    consumers: HashMap<SubscriptionId, JoinHandle<()>>,
}

impl FilterManagerService {
    pub fn new(
        config: ManagerConfig,
        protocol: Arc<dyn FilterProtocol>,
        sink: Arc<dyn EnvelopeSink>,
        bus: Arc<dyn EventPublisher>,
    ) -> Result<(Self, FilterManagerHandle), ManagerError> {
        config.validate().map_err(ManagerError::Config)?;

        let (commands_tx, commands) = mpsc::channel(config.command_capacity);
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let state = FilterSubscriptions::new(config.min_peers_for_filter, config.resubscribe_backoff);
        let service = Self {
            config,
            protocol,
            sink,
            bus,
            state,
            commands,
            results_tx,
            results_rx,
            pending: HashMap::new(),
            consumers: HashMap::new(),
        };
        Ok((
            service,
            FilterManagerHandle {
                commands: commands_tx,
            },
        ))
    }

    /// Run until `shutdown` flips or every handle is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let signal = shutdown.clone();
        let mut ticker = tokio::time::interval(self.config.ping_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        info!(
            subsystem = SUBSYSTEM,
            min_peers = self.config.min_peers_for_filter,
            ping_interval_ms = self.config.ping_interval.as_millis() as u64,
            "Filter manager started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    self.apply(FilterEvent::Tick, &signal).await;
                    self.update_gauges();
                }
                Some(result) = self.results_rx.recv() => {
                    self.on_worker_result(result, &signal).await;
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.on_command(command, &signal).await,
                    None => break,
                },
            }
        }

        for (_, consumer) in self.consumers.drain() {
            consumer.abort();
        }
        info!(subsystem = SUBSYSTEM, filters = self.state.len(), "Filter manager stopped");
    }

    async fn on_command(&mut self, command: ManagerCommand, signal: &watch::Receiver<bool>) {
        match command {
            ManagerCommand::AddFilter {
                filter_id,
                criteria,
            } => {
                self.apply(
                    FilterEvent::FilterAdded {
                        filter_id,
                        criteria,
                    },
                    signal,
                )
                .await
            }
            ManagerCommand::RemoveFilter { filter_id } => {
                self.apply(FilterEvent::FilterRemoved { filter_id }, signal)
                    .await
            }
            ManagerCommand::GetStats(reply) => {
                // Caller may have gone away
                let _ = reply.send(self.state.stats());
            }
        }
    }

    async fn on_worker_result(&mut self, result: WorkerResult, signal: &watch::Receiver<bool>) {
        let event = match result {
            WorkerResult::Subscribed {
                filter_id,
                slot_id,
                subscriptions,
            } => {
                let mut handles = Vec::with_capacity(subscriptions.len());
                for subscription in subscriptions {
                    self.pending
                        .insert(subscription.handle.id.clone(), subscription.envelopes);
                    handles.push(subscription.handle);
                }
                FilterEvent::SubscribeSucceeded {
                    filter_id,
                    slot_id,
                    handles,
                }
            }
            WorkerResult::Event(event) => event,
        };
        self.apply(event, signal).await;
    }

    async fn apply(&mut self, event: FilterEvent, signal: &watch::Receiver<bool>) {
        let commands = self.state.apply(event, Instant::now());
        for command in commands {
            self.execute(command, signal).await;
        }
    }

    async fn execute(&mut self, command: Command, signal: &watch::Receiver<bool>) {
        match command {
            Command::Subscribe {
                filter_id,
                slot_id,
                criteria,
                exclude,
            } => self.spawn_subscribe(filter_id, slot_id, criteria, exclude, signal),
            Command::Unsubscribe { filter_id, handle } => {
                self.pending.remove(&handle.id);
                if let Some(consumer) = self.consumers.remove(&handle.id) {
                    consumer.abort();
                }
                self.spawn_unsubscribe(filter_id, handle, signal);
            }
            Command::StartConsumer { filter_id, handle } => {
                self.start_consumer(filter_id, handle, signal)
            }
            Command::Ping { handle } => self.spawn_ping(handle, signal),
            Command::HealthChanged {
                filter_id,
                active,
                required,
                healthy,
            } => {
                FILTER_SUBSCRIPTIONS_ACTIVE
                    .with_label_values(&[filter_id.as_str()])
                    .set(active as f64);
                if healthy {
                    log_event!(info, SUBSYSTEM, "Filter healthy", filter_id = %filter_id, active, required);
                } else {
                    log_event!(warn, SUBSYSTEM, "Filter degraded", filter_id = %filter_id, active, required);
                }
                self.bus
                    .publish(PipelineEvent::FilterHealthChanged {
                        filter_id,
                        active_subscriptions: active,
                        required,
                        healthy,
                    })
                    .await;
            }
            Command::FilterDropped { filter_id } => {
                // Label may never have been set
                let _ = FILTER_SUBSCRIPTIONS_ACTIVE.remove_label_values(&[filter_id.as_str()]);
            }
        }
    }

    fn spawn_subscribe(
        &self,
        filter_id: FilterId,
        slot_id: String,
        criteria: ContentFilter,
        exclude: Vec<PeerId>,
        signal: &watch::Receiver<bool>,
    ) {
        let protocol = Arc::clone(&self.protocol);
        let results = self.results_tx.clone();
        let timeout = self.config.subscribe_timeout;
        let mut shutdown = signal.clone();

        tokio::spawn(async move {
            let selection = PeerSelection {
                exclude,
                max_peers: 1,
            };
            let result = tokio::select! {
                _ = shutdown.changed() => Err(ProtocolError::Cancelled),
                result = tokio::time::timeout(timeout, protocol.subscribe(&criteria, &selection)) => {
                    result.unwrap_or(Err(ProtocolError::Timeout))
                }
            };
            metric_inc!(FILTER_PEER_OPERATIONS, &["subscribe", outcome(&result)]);

            let report = match result {
                Ok(subscriptions) => WorkerResult::Subscribed {
                    filter_id,
                    slot_id,
                    subscriptions,
                },
                Err(e) => WorkerResult::Event(FilterEvent::SubscribeFailed {
                    filter_id,
                    slot_id,
                    reason: e.to_string(),
                }),
            };
            // Loop already gone on shutdown
            let _ = results.send(report);
        });
    }

    fn spawn_unsubscribe(
        &self,
        filter_id: FilterId,
        handle: SubscriptionHandle,
        signal: &watch::Receiver<bool>,
    ) {
        let protocol = Arc::clone(&self.protocol);
        let results = self.results_tx.clone();
        let timeout = self.config.unsubscribe_timeout;
        let mut shutdown = signal.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = shutdown.changed() => Err(ProtocolError::Cancelled),
                result = tokio::time::timeout(timeout, protocol.unsubscribe(&handle)) => {
                    result.unwrap_or(Err(ProtocolError::Timeout))
                }
            };
            metric_inc!(FILTER_PEER_OPERATIONS, &["unsubscribe", outcome(&result)]);

            let _ = results.send(WorkerResult::Event(FilterEvent::UnsubscribeCompleted {
                filter_id,
                subscription_id: handle.id,
                error: result.err().map(|e| e.to_string()),
            }));
        });
    }

    fn spawn_ping(&self, handle: SubscriptionHandle, signal: &watch::Receiver<bool>) {
        let protocol = Arc::clone(&self.protocol);
        let results = self.results_tx.clone();
        let timeout = self.config.ping_timeout;
        let mut shutdown = signal.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = shutdown.changed() => return,
                result = tokio::time::timeout(timeout, protocol.is_subscription_alive(&handle)) => {
                    result.unwrap_or(Err(ProtocolError::Timeout))
                }
            };
            metric_inc!(FILTER_PEER_OPERATIONS, &["ping", outcome(&result)]);

            let event = match result {
                Ok(()) => FilterEvent::PingSucceeded {
                    peer_id: handle.peer_id,
                },
                Err(e) => {
                    log_peer_event!(debug, SUBSYSTEM, "Ping failed", handle.peer_id, error = %e);
                    FilterEvent::PingFailed(PingTarget::Peer(handle.peer_id))
                }
            };
            let _ = results.send(WorkerResult::Event(event));
        });
    }

    fn start_consumer(
        &mut self,
        filter_id: FilterId,
        handle: SubscriptionHandle,
        signal: &watch::Receiver<bool>,
    ) {
        let Some(mut envelopes) = self.pending.remove(&handle.id) else {
            warn!(
                subsystem = SUBSYSTEM,
                filter_id = %filter_id,
                subscription_id = %handle.id,
                "No receiver for accepted subscription"
            );
            return;
        };
        let sink = Arc::clone(&self.sink);
        let mut shutdown = signal.clone();
        let subscription_id = handle.id.clone();

        let consumer = tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    _ = shutdown.changed() => break,
                    next = envelopes.recv() => next,
                };
                let Some(envelope) = next else { break };
                let hash = envelope.hash();
                if let Err(e) = sink
                    .on_new_envelope(envelope, MessageSource::Filter, false)
                    .await
                {
                    debug!(
                        subsystem = SUBSYSTEM,
                        subscription_id = %handle.id,
                        hash = %hash,
                        error = %e,
                        "Envelope rejected by pipeline"
                    );
                }
            }
            trace!(subsystem = SUBSYSTEM, subscription_id = %handle.id, "Consumer stopped");
        });
        self.consumers.insert(subscription_id, consumer);
    }

    fn update_gauges(&self) {
        for (filter_id, health) in self.state.stats().filters {
            FILTER_SUBSCRIPTIONS_ACTIVE
                .with_label_values(&[filter_id.as_str()])
                .set(health.active as f64);
        }
    }
}
