//! # Core Networking Entities
//!
//! Identifiers shared by every subsystem of the pipeline.
//!
//! ## Clusters
//!
//! - **Identity**: `MessageHash`, `PeerId`, `FilterId`
//! - **Routing**: `PubsubTopic`, `ContentTopic`, `ContentFilter`
//! - **Provenance**: `MessageSource`

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use std::collections::BTreeSet;
use std::fmt;

use crate::errors::EnvelopeError;

/// Pubsub topic used when a caller leaves the topic empty.
pub const DEFAULT_PUBSUB_TOPIC: &str = "/waku/2/default-waku/proto";

/// A gossipsub topic name (e.g. `/waku/2/rs/16/32`).
pub type PubsubTopic = String;

/// An application-level content topic (e.g. `/toy-chat/2/huilong/proto`).
pub type ContentTopic = String;

// =============================================================================
// IDENTITY
// =============================================================================

/// A 32-byte content-derived message hash.
///
/// This is the sole identity of an envelope for deduplication.
#[serde_as]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct MessageHash(#[serde_as(as = "Hex")] pub [u8; 32]);

impl MessageHash {
    /// Raw hash bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex encoding with a `0x` prefix.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse a hash from hex, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, EnvelopeError> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(trimmed).map_err(|e| EnvelopeError::InvalidHash(e.to_string()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| EnvelopeError::InvalidHash(format!("length {}", v.len())))?;
        Ok(Self(array))
    }
}

impl fmt::Display for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for MessageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageHash({})", self)
    }
}

/// Identifier of a remote libp2p peer.
///
/// The pipeline never inspects the contents; it is an opaque routing key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerId({})", self.0)
    }
}

/// Identifier of a locally installed message filter.
///
/// Assigned by the filter registry at install time; never reused.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct FilterId(pub String);

impl FilterId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FilterId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilterId({})", self.0)
    }
}

// =============================================================================
// ROUTING
// =============================================================================

/// The subscription criteria sent to a remote filter peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFilter {
    /// Pubsub topic the content topics live on.
    pub pubsub_topic: PubsubTopic,
    /// Content topics of interest. Ordered for deterministic wire encoding.
    pub content_topics: BTreeSet<ContentTopic>,
}

impl ContentFilter {
    pub fn new<I, S>(pubsub_topic: impl Into<String>, content_topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pubsub_topic: pubsub_topic.into(),
            content_topics: content_topics.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a message on `pubsub_topic`/`content_topic` is covered.
    ///
    /// An empty content topic set covers every content topic.
    #[must_use]
    pub fn covers(&self, pubsub_topic: &str, content_topic: &str) -> bool {
        self.pubsub_topic == pubsub_topic
            && (self.content_topics.is_empty() || self.content_topics.contains(content_topic))
    }
}

// =============================================================================
// PROVENANCE
// =============================================================================

/// Where an envelope entered the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageSource {
    /// Received through gossipsub relay.
    Relay,
    /// Pushed by a remote filter peer (light mode).
    Filter,
    /// Returned by a historical store query.
    Store,
    /// Originated locally through the send path.
    LocalSend,
}

impl MessageSource {
    /// Stable label used for metrics and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageSource::Relay => "relay",
            MessageSource::Filter => "filter",
            MessageSource::Store => "store",
            MessageSource::LocalSend => "send",
        }
    }
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
