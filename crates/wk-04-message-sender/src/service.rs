//! Message sender service
//!
//! `send` hands the envelope to the local pipeline first so the node's own
//! filters see it at once, then queues it. The broadcast loop drains the
//! queue and publishes each envelope in its own task.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::{EventPublisher, PipelineEvent};
use shared_types::{now_nanos, Envelope, MessageHash, MessageSource, WakuMessage};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use waku_telemetry::{log_envelope_event, metric_inc, MESSAGES_SENT};
use wk_02_envelope_pipeline::EnvelopeSink;

use crate::config::SenderConfig;
use crate::error::{PublishError, SendError};
use crate::ports::{MessageSenderApi, PublishTransport};

const SUBSYSTEM: &str = "message-sender";

pub struct MessageSender {
    config: SenderConfig,
    transport: PublishTransport,
    pipeline: Arc<dyn EnvelopeSink>,
    bus: Arc<dyn EventPublisher>,
    queue_tx: mpsc::Sender<Envelope>,
    /// Taken by `start`.
    queue_rx: Mutex<Option<mpsc::Receiver<Envelope>>>,
}

impl MessageSender {
    pub fn new(
        config: SenderConfig,
        transport: PublishTransport,
        pipeline: Arc<dyn EnvelopeSink>,
        bus: Arc<dyn EventPublisher>,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        Self {
            config,
            transport,
            pipeline,
            bus,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
        }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Spawn the broadcast loop.
    pub fn start(
        self: &Arc<Self>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, SendError> {
        let queue = self.queue_rx.lock().take().ok_or(SendError::AlreadyStarted)?;
        info!(
            subsystem = SUBSYSTEM,
            transport = self.transport.name(),
            skip_publish = self.config.skip_publish,
            "Message sender started"
        );
        Ok(tokio::spawn(Arc::clone(self).run_broadcast(queue, shutdown)))
    }

    async fn run_broadcast(
        self: Arc<Self>,
        mut queue: mpsc::Receiver<Envelope>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let next = tokio::select! {
                _ = shutdown.changed() => break,
                next = queue.recv() => next,
            };
            let Some(envelope) = next else { break };

            let sender = Arc::clone(&self);
            let mut task_shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = task_shutdown.changed() => {}
                    _ = sender.broadcast(envelope) => {}
                }
            });
        }
        debug!(subsystem = SUBSYSTEM, "Broadcast loop stopped");
    }

    /// Publish one envelope and report the outcome on the bus.
    pub async fn broadcast(&self, envelope: Envelope) -> Result<MessageHash, SendError> {
        let hash = envelope.hash();
        let result = self.publish(&envelope).await;

        let outcome = if result.is_ok() { "success" } else { "failure" };
        metric_inc!(MESSAGES_SENT, &[self.transport.name(), outcome]);

        match &result {
            Ok(_) => {
                log_envelope_event!(
                    debug,
                    SUBSYSTEM,
                    "Envelope published",
                    hash,
                    pubsub_topic = envelope.pubsub_topic(),
                    transport = self.transport.name()
                );
                self.bus
                    .publish(PipelineEvent::EnvelopeSent {
                        hash,
                        pubsub_topic: envelope.pubsub_topic().to_string(),
                    })
                    .await;
            }
            Err(e) => {
                log_envelope_event!(
                    warn,
                    SUBSYSTEM,
                    "Envelope publish failed",
                    hash,
                    transport = self.transport.name(),
                    error = %e
                );
                self.bus
                    .publish(PipelineEvent::EnvelopeSendFailed {
                        hash,
                        reason: e.to_string(),
                    })
                    .await;
            }
        }
        result
    }

    async fn publish(&self, envelope: &Envelope) -> Result<MessageHash, SendError> {
        if self.config.skip_publish {
            return Ok(envelope.hash());
        }

        let timeout = self.config.publish_timeout;
        let published = match &self.transport {
            PublishTransport::Relay(relay) => {
                let topic = envelope.pubsub_topic();
                let have = relay.peer_count(topic);
                if have < self.config.min_peers_for_relay {
                    return Err(SendError::NotEnoughRelayPeers {
                        topic: topic.to_string(),
                        have,
                        need: self.config.min_peers_for_relay,
                    });
                }
                tokio::time::timeout(timeout, relay.publish(envelope)).await
            }
            PublishTransport::Lightpush(lightpush) => {
                tokio::time::timeout(timeout, lightpush.publish(envelope)).await
            }
        };
        published
            .unwrap_or(Err(PublishError::Timeout))
            .map_err(SendError::from)
    }
}

#[async_trait]
impl MessageSenderApi for MessageSender {
    async fn send(
        &self,
        pubsub_topic: Option<String>,
        message: WakuMessage,
    ) -> Result<MessageHash, SendError> {
        let pubsub_topic = pubsub_topic
            .filter(|topic| !topic.is_empty())
            .unwrap_or_else(|| self.config.default_pubsub_topic.clone());
        let envelope = Envelope::new(message, now_nanos(), pubsub_topic);
        let hash = envelope.hash();

        self.pipeline
            .on_new_envelope(envelope.clone(), MessageSource::LocalSend, true)
            .await?;
        self.queue_tx
            .send(envelope)
            .await
            .map_err(|_| SendError::QueueClosed)?;

        log_envelope_event!(trace, SUBSYSTEM, "Envelope queued for broadcast", hash);
        Ok(hash)
    }
}
