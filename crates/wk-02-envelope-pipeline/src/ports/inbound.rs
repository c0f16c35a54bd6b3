//! Inbound Ports (Driving Ports)

use async_trait::async_trait;
use shared_types::{Envelope, MessageHash, MessageSource};

use crate::error::PipelineError;

/// Entry point for every envelope entering the node.
///
/// Producers (filter subscriptions, store queries, the send path, relay)
/// depend on this trait rather than on the concrete pipeline.
#[async_trait]
pub trait EnvelopeSink: Send + Sync {
    /// Offer an envelope to the pipeline.
    ///
    /// Unseen envelopes are processed inline when `process_immediately` is
    /// set, otherwise queued for a dispatch worker. Waits while the queue
    /// is full.
    async fn on_new_envelope(
        &self,
        envelope: Envelope,
        source: MessageSource,
        process_immediately: bool,
    ) -> Result<(), PipelineError>;
}

/// Store-query bookkeeping exposed to the application.
pub trait StoreProcessingTracker: Send + Sync {
    /// Mark a store-sourced message as handled. Returns false if unknown.
    fn mark_store_message_processed(&self, hash: &MessageHash) -> bool;

    /// Whether any store-sourced message is still awaiting processing.
    fn processing_store_messages(&self) -> bool;
}
