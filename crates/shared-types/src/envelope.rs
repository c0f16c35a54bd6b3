//! # Waku Envelope
//!
//! The wire message plus routing metadata that flows through every stage of
//! the pipeline.
//!
//! ## Identity
//!
//! The envelope hash is the deterministic message hash:
//!
//! ```text
//! sha256(pubsub_topic || payload || content_topic || meta || timestamp_be)
//! ```
//!
//! It is computed once in [`Envelope::new`] and never recomputed; a
//! deserialized envelope can be checked with [`Envelope::verify_hash`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::entities::{MessageHash, PubsubTopic};
use crate::errors::EnvelopeError;

/// A message as carried by relay, filter, lightpush and store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WakuMessage {
    /// Opaque payload. Encryption is handled above this layer.
    pub payload: Vec<u8>,
    /// Application content topic.
    pub content_topic: String,
    /// Sender timestamp in nanoseconds since the Unix epoch.
    pub timestamp: Option<i64>,
    /// Optional application metadata, included in the hash.
    pub meta: Option<Vec<u8>>,
    /// Ephemeral messages are not persisted by store nodes.
    pub ephemeral: bool,
    /// Payload encoding version.
    pub version: u32,
}

impl WakuMessage {
    pub fn new(content_topic: impl Into<String>, payload: Vec<u8>, timestamp: i64) -> Self {
        Self {
            payload,
            content_topic: content_topic.into(),
            timestamp: Some(timestamp),
            ..Default::default()
        }
    }
}

/// A message bound to the pubsub topic it travelled on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    message: WakuMessage,
    pubsub_topic: PubsubTopic,
    /// Local receive time in nanoseconds.
    received_at: i64,
    hash: MessageHash,
}

impl Envelope {
    /// Wrap a message, computing its hash.
    pub fn new(message: WakuMessage, received_at: i64, pubsub_topic: impl Into<String>) -> Self {
        let pubsub_topic = pubsub_topic.into();
        let hash = compute_message_hash(&pubsub_topic, &message);
        Self {
            message,
            pubsub_topic,
            received_at,
            hash,
        }
    }

    #[must_use]
    pub fn message(&self) -> &WakuMessage {
        &self.message
    }

    #[must_use]
    pub fn pubsub_topic(&self) -> &str {
        &self.pubsub_topic
    }

    #[must_use]
    pub fn content_topic(&self) -> &str {
        &self.message.content_topic
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    #[must_use]
    pub fn hash(&self) -> MessageHash {
        self.hash
    }

    #[must_use]
    pub fn received_at(&self) -> i64 {
        self.received_at
    }

    /// Sender timestamp, falling back to the local receive time.
    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.message.timestamp.unwrap_or(self.received_at)
    }

    /// Check the stored hash against the envelope contents.
    pub fn verify_hash(&self) -> Result<(), EnvelopeError> {
        let computed = compute_message_hash(&self.pubsub_topic, &self.message);
        if computed != self.hash {
            return Err(EnvelopeError::HashMismatch {
                stored: self.hash,
                computed,
            });
        }
        Ok(())
    }

    /// Structural validation applied before an envelope is cached.
    pub fn validate(&self, max_message_size: usize) -> Result<(), EnvelopeError> {
        if self.pubsub_topic.is_empty() {
            return Err(EnvelopeError::EmptyPubsubTopic);
        }
        if self.message.content_topic.is_empty() {
            return Err(EnvelopeError::EmptyContentTopic);
        }
        if self.message.payload.len() > max_message_size {
            return Err(EnvelopeError::PayloadTooLarge {
                size: self.message.payload.len(),
                max: max_message_size,
            });
        }
        self.verify_hash()
    }
}

/// Deterministic message hash.
#[must_use]
pub fn compute_message_hash(pubsub_topic: &str, message: &WakuMessage) -> MessageHash {
    let mut hasher = Sha256::new();
    hasher.update(pubsub_topic.as_bytes());
    hasher.update(&message.payload);
    hasher.update(message.content_topic.as_bytes());
    if let Some(meta) = &message.meta {
        hasher.update(meta);
    }
    if let Some(ts) = message.timestamp {
        hasher.update(ts.to_be_bytes());
    }
    MessageHash(hasher.finalize().into())
}

/// Current time in nanoseconds since the Unix epoch.
#[must_use]
pub fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TOPIC: &str = "/waku/2/rs/16/32";

    fn message(payload: &[u8]) -> WakuMessage {
        WakuMessage::new("/app/1/chat/proto", payload.to_vec(), 1_700_000_000_000_000_000)
    }

    #[test]
    fn test_hash_depends_on_pubsub_topic() {
        let a = Envelope::new(message(b"hi"), 0, TOPIC);
        let b = Envelope::new(message(b"hi"), 0, "/waku/2/rs/16/64");
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_hash_ignores_receive_time() {
        let a = Envelope::new(message(b"hi"), 1, TOPIC);
        let b = Envelope::new(message(b"hi"), 2, TOPIC);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_meta_changes_hash() {
        let mut with_meta = message(b"hi");
        with_meta.meta = Some(vec![1, 2, 3]);
        let a = Envelope::new(message(b"hi"), 0, TOPIC);
        let b = Envelope::new(with_meta, 0, TOPIC);
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_validate_rejects_empty_content_topic() {
        let env = Envelope::new(WakuMessage::new("", b"x".to_vec(), 1), 0, TOPIC);
        assert!(matches!(
            env.validate(1024),
            Err(EnvelopeError::EmptyContentTopic)
        ));
    }

    #[test]
    fn test_validate_rejects_oversized_payload() {
        let env = Envelope::new(message(&[0u8; 64]), 0, TOPIC);
        assert!(matches!(
            env.validate(32),
            Err(EnvelopeError::PayloadTooLarge { size: 64, max: 32 })
        ));
    }

    #[test]
    fn test_tampered_envelope_fails_hash_check() {
        let env = Envelope::new(message(b"original"), 0, TOPIC);
        let mut json = serde_json::to_value(&env).unwrap();
        json["message"]["payload"] = serde_json::json!([1, 2, 3]);
        let tampered: Envelope = serde_json::from_value(json).unwrap();
        assert!(matches!(
            tampered.verify_hash(),
            Err(EnvelopeError::HashMismatch { .. })
        ));
    }

    #[test]
    fn test_timestamp_falls_back_to_receive_time() {
        let mut msg = message(b"x");
        msg.timestamp = None;
        let env = Envelope::new(msg, 42, TOPIC);
        assert_eq!(env.timestamp(), 42);
    }

    proptest! {
        #[test]
        fn prop_hash_is_stable(payload in proptest::collection::vec(any::<u8>(), 0..256)) {
            let a = Envelope::new(message(&payload), 0, TOPIC);
            let b = Envelope::new(message(&payload), 99, TOPIC);
            prop_assert_eq!(a.hash(), b.hash());
            prop_assert!(a.verify_hash().is_ok());
        }
    }
}
