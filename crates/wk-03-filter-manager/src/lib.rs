//! # WK-03 Filter Manager
//!
//! Light-client filter health manager. Every installed filter is kept
//! subscribed to `min_peers_for_filter` distinct remote peers; dead peers
//! are detected by periodic liveness pings and replaced.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Module Structure
//!
//! ```text
//! wk-03-filter-manager/
//! ├── domain/          # Slots, backoff, the pure subscription state machine
//! ├── ports/           # FilterManagerApi (inbound), FilterProtocol + mock (outbound)
//! ├── application/     # FilterManagerService event loop and its handle
//! ├── config.rs        # ManagerConfig
//! └── error.rs         # ProtocolError, ManagerError
//! ```
//!
//! ## Filter lifecycle
//!
//! | State | Meaning |
//! |-------|---------|
//! | absent | Not tracked |
//! | converging | Fewer than the required active subscriptions |
//! | healthy | Quorum reached |

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

pub use application::{FilterManagerHandle, FilterManagerService};
pub use config::{ManagerConfig, DEFAULT_COMMAND_CAPACITY};
pub use domain::{
    BackoffPolicy, Command, FilterEvent, FilterHealth, FilterStats, FilterSubscriptions,
    PeerSelection, PingTarget, SubscriptionHandle, SubscriptionId,
};
pub use error::{ManagerError, ProtocolError};
pub use ports::{FilterManagerApi, FilterProtocol, MockFilterProtocol, Subscription};
