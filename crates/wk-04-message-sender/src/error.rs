//! Error types for the message sender

use thiserror::Error;
use wk_02_envelope_pipeline::PipelineError;

/// Failures reported by a publishing transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("No peers to publish to")]
    NoPeers,

    #[error("Publish timed out")]
    Timeout,

    #[error("Publish rejected: {0}")]
    Rejected(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

#[derive(Debug, Error)]
pub enum SendError {
    /// The envelope never made it into the pipeline.
    #[error("Pipeline rejected envelope: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Send queue closed")]
    QueueClosed,

    #[error("Not enough relay peers on {topic}: have {have}, need {need}")]
    NotEnoughRelayPeers {
        topic: String,
        have: usize,
        need: usize,
    },

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Sender already started")]
    AlreadyStarted,
}
