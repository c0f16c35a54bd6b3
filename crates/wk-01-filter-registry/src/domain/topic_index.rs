//! Topic index: pubsub topic -> content topic -> filter ids.
//!
//! Filters with an empty content topic set live in a per-pubsub wildcard set
//! so that matching only touches filters that can possibly match.

use shared_types::{ContentFilter, FilterId};
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct PubsubEntry {
    by_content: HashMap<String, HashSet<FilterId>>,
    wildcard: HashSet<FilterId>,
}

impl PubsubEntry {
    fn is_empty(&self) -> bool {
        self.by_content.is_empty() && self.wildcard.is_empty()
    }
}

#[derive(Default)]
pub struct TopicIndex {
    topics: HashMap<String, PubsubEntry>,
}

impl TopicIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &FilterId, criteria: &ContentFilter) {
        let entry = self.topics.entry(criteria.pubsub_topic.clone()).or_default();
        if criteria.content_topics.is_empty() {
            entry.wildcard.insert(id.clone());
            return;
        }
        for content_topic in &criteria.content_topics {
            entry
                .by_content
                .entry(content_topic.clone())
                .or_default()
                .insert(id.clone());
        }
    }

    pub fn remove(&mut self, id: &FilterId, criteria: &ContentFilter) {
        let Some(entry) = self.topics.get_mut(&criteria.pubsub_topic) else {
            return;
        };
        entry.wildcard.remove(id);
        for content_topic in &criteria.content_topics {
            if let Some(ids) = entry.by_content.get_mut(content_topic) {
                ids.remove(id);
                if ids.is_empty() {
                    entry.by_content.remove(content_topic);
                }
            }
        }
        if entry.is_empty() {
            self.topics.remove(&criteria.pubsub_topic);
        }
    }

    /// Filters interested in a message on `pubsub_topic` / `content_topic`.
    pub fn matching(&self, pubsub_topic: &str, content_topic: &str) -> Vec<FilterId> {
        let Some(entry) = self.topics.get(pubsub_topic) else {
            return Vec::new();
        };
        let mut ids: Vec<FilterId> = entry.wildcard.iter().cloned().collect();
        if let Some(exact) = entry.by_content.get(content_topic) {
            ids.extend(exact.iter().cloned());
        }
        ids
    }
}
