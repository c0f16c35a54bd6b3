//! Integration flows

pub mod dedup;
pub mod filter_health;
pub mod node_flows;
