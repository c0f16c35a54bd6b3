//! # Node Container
//!
//! Configuration and the transport bundle a node is assembled from.

pub mod config;
pub mod transports;

pub use config::{ConfigError, NodeConfig};
pub use transports::NodeTransports;
