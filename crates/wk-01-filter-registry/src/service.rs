//! Filter Registry service
//!
//! Implements [`FilterRegistryApi`] over a read-preferring lock. Installs
//! and removals take the write lock; dispatch only ever takes the read lock
//! and then the per-filter store mutex, so concurrent dispatch to different
//! filters does not serialize.

use parking_lot::{Mutex, RwLock};
use shared_types::{ContentFilter, Envelope, FilterId};
use std::collections::HashMap;
use uuid::Uuid;
use waku_telemetry::{log_envelope_event, log_event, FILTERS_INSTALLED};

use crate::config::RegistryConfig;
use crate::domain::{Filter, FilterSnapshot, MessageStore, TopicIndex};
use crate::error::FilterError;
use crate::ports::FilterRegistryApi;

const SUBSYSTEM: &str = "filter-registry";

struct InstalledFilter {
    criteria: ContentFilter,
    store: Mutex<MessageStore>,
}

#[derive(Default)]
struct RegistryState {
    filters: HashMap<FilterId, InstalledFilter>,
    index: TopicIndex,
}

/// Node-wide table of installed filters.
pub struct FilterRegistry {
    config: RegistryConfig,
    state: RwLock<RegistryState>,
}

impl FilterRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Ids of every installed filter.
    pub fn filter_ids(&self) -> Vec<FilterId> {
        self.state.read().filters.keys().cloned().collect()
    }

    /// Criteria of an installed filter, as sent to remote filter peers.
    pub fn criteria(&self, id: &FilterId) -> Option<ContentFilter> {
        self.state.read().filters.get(id).map(|f| f.criteria.clone())
    }

    pub fn len(&self) -> usize {
        self.state.read().filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl FilterRegistryApi for FilterRegistry {
    fn install(&self, filter: Filter) -> Result<FilterId, FilterError> {
        let (criteria, capacity) = filter.normalize(
            &self.config.default_pubsub_topic,
            self.config.default_store_capacity,
        )?;
        let store = MessageStore::new(capacity)?;
        let id = FilterId::new(Uuid::new_v4().to_string());

        let mut state = self.state.write();
        if state.filters.len() >= self.config.max_filters {
            return Err(FilterError::TooManyFilters {
                count: state.filters.len(),
                max: self.config.max_filters,
            });
        }
        state.index.insert(&id, &criteria);
        log_event!(
            debug,
            SUBSYSTEM,
            "Filter installed",
            filter_id = %id,
            pubsub_topic = %criteria.pubsub_topic,
            content_topics = criteria.content_topics.len()
        );
        state.filters.insert(
            id.clone(),
            InstalledFilter {
                criteria,
                store: Mutex::new(store),
            },
        );
        FILTERS_INSTALLED.set(state.filters.len() as f64);

        Ok(id)
    }

    fn uninstall(&self, id: &FilterId) -> bool {
        let mut state = self.state.write();
        let Some(removed) = state.filters.remove(id) else {
            return false;
        };
        state.index.remove(id, &removed.criteria);
        FILTERS_INSTALLED.set(state.filters.len() as f64);
        log_event!(debug, SUBSYSTEM, "Filter uninstalled", filter_id = %id);
        true
    }

    fn get(&self, id: &FilterId) -> Option<FilterSnapshot> {
        let state = self.state.read();
        state.filters.get(id).map(|f| {
            let store = f.store.lock();
            FilterSnapshot {
                id: id.clone(),
                criteria: f.criteria.clone(),
                stored_messages: store.len(),
                store_capacity: store.capacity(),
            }
        })
    }

    fn notify_watchers(&self, envelope: &Envelope) -> bool {
        let state = self.state.read();
        let ids = state
            .index
            .matching(envelope.pubsub_topic(), envelope.content_topic());

        let mut matched = false;
        for id in &ids {
            if let Some(filter) = state.filters.get(id) {
                matched = true;
                if !filter.store.lock().add(envelope.clone()) {
                    log_envelope_event!(
                        trace,
                        SUBSYSTEM,
                        "Envelope already in filter store",
                        envelope.hash(),
                        filter_id = %id
                    );
                }
            }
        }
        matched
    }

    fn pop_messages(&self, id: &FilterId) -> Result<Vec<Envelope>, FilterError> {
        let state = self.state.read();
        let filter = state
            .filters
            .get(id)
            .ok_or_else(|| FilterError::FilterNotFound(id.to_string()))?;
        let drained = filter.store.lock().drain();
        Ok(drained)
    }

    fn clear_messages(&self) {
        let state = self.state.read();
        for filter in state.filters.values() {
            filter.store.lock().clear();
        }
    }
}
