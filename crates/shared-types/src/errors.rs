//! # Error Types
//!
//! Errors shared by every stage that handles envelopes.

use thiserror::Error;

use crate::entities::MessageHash;

/// Protocol/encoding errors for a single envelope.
///
/// The offending envelope is dropped; other in-flight envelopes are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Envelope carries no pubsub topic.
    #[error("Envelope has an empty pubsub topic")]
    EmptyPubsubTopic,

    /// Message carries no content topic.
    #[error("Message has an empty content topic")]
    EmptyContentTopic,

    /// Payload exceeds the configured maximum.
    #[error("Payload too large: {size} > {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// The stored hash does not match the envelope contents.
    #[error("Hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch {
        stored: MessageHash,
        computed: MessageHash,
    },

    /// A hash string could not be parsed.
    #[error("Invalid hash: {0}")]
    InvalidHash(String),
}
