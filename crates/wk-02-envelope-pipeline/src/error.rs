//! Error types for the envelope pipeline

use shared_types::EnvelopeError;
use thiserror::Error;

/// Errors returned to the immediate caller of `on_new_envelope`.
///
/// A failed envelope is dropped; other in-flight envelopes are unaffected.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid envelope: {0}")]
    InvalidEnvelope(#[from] EnvelopeError),

    #[error("Dispatch queue closed")]
    QueueClosed,

    #[error("Pipeline already started")]
    AlreadyStarted,
}
