//! # Node Runtime Library
//!
//! Assembles the pipeline subsystems into a [`WakuNode`].
//!
//! ```text
//!   relay traffic ──┐      filter subscriptions (light)     store pages
//!                   │               │                            │
//!                   ▼               ▼                            ▼
//!              ┌──────────────── EnvelopePipeline ──────────────────┐
//!              │  dedup cache ─→ dispatch queue ─→ workers          │
//!              └────────────────────────┬───────────────────────────┘
//!                                       ▼
//!                               FilterRegistry ──→ get_filter_messages
//!
//!   send ─→ pipeline (local) ─→ MessageSender ─→ relay | lightpush
//! ```
//!
//! ## Modes
//!
//! - **Full node**: receives through relay, publishes through relay once
//!   `min_peers_for_relay` peers are meshed on the topic.
//! - **Light client**: every installed filter is kept subscribed to
//!   `min_peers_for_filter` filter peers by the filter manager; publishes
//!   through lightpush.

pub mod container;
pub mod node;

pub use container::{ConfigError, NodeConfig, NodeTransports};
pub use node::WakuNode;
