//! Domain layer: filter criteria, per-filter stores and the topic index.

pub mod filter;
pub mod message_store;
pub mod topic_index;

pub use filter::{is_valid_pubsub_topic, Filter, FilterSnapshot};
pub use message_store::MessageStore;
pub use topic_index::TopicIndex;
