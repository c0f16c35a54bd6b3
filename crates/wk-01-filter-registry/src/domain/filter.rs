//! Filter criteria and installation-time validation.

use serde::{Deserialize, Serialize};
use shared_types::{ContentFilter, ContentTopic, FilterId, PubsubTopic};
use std::collections::BTreeSet;

use crate::error::FilterError;

/// Criteria supplied by the application when installing a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Pubsub topic; empty means "use the registry default".
    pub pubsub_topic: PubsubTopic,
    /// Content topics of interest; empty matches every content topic.
    pub content_topics: BTreeSet<ContentTopic>,
    /// Store capacity override.
    pub store_capacity: Option<usize>,
}

impl Filter {
    pub fn new<I, S>(pubsub_topic: impl Into<String>, content_topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pubsub_topic: pubsub_topic.into(),
            content_topics: content_topics.into_iter().map(Into::into).collect(),
            store_capacity: None,
        }
    }

    /// Override the number of messages retained for this filter.
    #[must_use]
    pub fn with_store_capacity(mut self, capacity: usize) -> Self {
        self.store_capacity = Some(capacity);
        self
    }

    /// Resolve defaults and reject malformed criteria.
    pub(crate) fn normalize(
        self,
        default_topic: &str,
        default_capacity: usize,
    ) -> Result<(ContentFilter, usize), FilterError> {
        let pubsub_topic = if self.pubsub_topic.is_empty() {
            default_topic.to_string()
        } else {
            self.pubsub_topic
        };

        if !is_valid_pubsub_topic(&pubsub_topic) {
            return Err(FilterError::InvalidPubsubTopic(pubsub_topic));
        }
        if self.content_topics.iter().any(|t| t.trim().is_empty()) {
            return Err(FilterError::EmptyContentTopic);
        }

        let capacity = self.store_capacity.unwrap_or(default_capacity);
        if capacity == 0 {
            return Err(FilterError::ZeroCapacity);
        }

        Ok((
            ContentFilter {
                pubsub_topic,
                content_topics: self.content_topics,
            },
            capacity,
        ))
    }
}

/// Topic names are absolute paths (`/waku/2/rs/16/32`) with no whitespace.
pub fn is_valid_pubsub_topic(topic: &str) -> bool {
    topic.starts_with('/')
        && topic.len() > 1
        && !topic.chars().any(char::is_whitespace)
        && topic.split('/').skip(1).any(|segment| !segment.is_empty())
}

/// Read-only view of an installed filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSnapshot {
    pub id: FilterId,
    pub criteria: ContentFilter,
    pub stored_messages: usize,
    pub store_capacity: usize,
}
