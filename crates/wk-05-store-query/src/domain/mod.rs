//! Store query value objects.

use serde::{Deserialize, Serialize};
use shared_types::{MessageHash, WakuMessage};

/// Inclusive time bounds in nanoseconds since the epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl TimeRange {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.start.map_or(true, |start| timestamp >= start)
            && self.end.map_or(true, |end| timestamp <= end)
    }

    pub fn is_valid(&self) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }
}

/// One page request against a store peer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRequest {
    pub pubsub_topic: Option<String>,
    pub content_topics: Vec<String>,
    pub time_range: TimeRange,
    /// Resume after this message; `None` starts from the beginning.
    pub cursor: Option<MessageHash>,
    /// Zero selects the configured default.
    pub page_size: usize,
}

impl StoreRequest {
    pub fn new<I, S>(pubsub_topic: impl Into<String>, content_topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            pubsub_topic: Some(pubsub_topic.into()),
            content_topics: content_topics.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_cursor(mut self, cursor: Option<MessageHash>) -> Self {
        self.cursor = cursor;
        self
    }
}

/// A historical message and the topic it was published on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub pubsub_topic: String,
    pub message: WakuMessage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreResponse {
    pub messages: Vec<StoredMessage>,
    pub next_cursor: Option<MessageHash>,
}

/// Result of one page, as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPage {
    pub request_id: String,
    pub next_cursor: Option<MessageHash>,
    /// Messages handed to the pipeline.
    pub count: usize,
}

impl QueryPage {
    /// The peer has nothing after this page.
    pub fn is_complete(&self) -> bool {
        self.next_cursor.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_bounds() {
        let range = TimeRange::new(Some(10), Some(20));
        assert!(range.contains(10));
        assert!(range.contains(20));
        assert!(!range.contains(21));
        assert!(TimeRange::default().contains(i64::MIN));
        assert!(!TimeRange::new(Some(5), Some(1)).is_valid());
    }
}
