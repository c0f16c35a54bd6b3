//! # Waku Pipeline Test Suite
//!
//! Cross-crate flows that no single subsystem can exercise alone.
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── filter_health.rs   # Manager + mock filter network
//!     ├── dedup.rs           # Concurrent duplicates across sources
//!     └── node_flows.rs      # WakuNode end to end, both modes
//! ```
//!
//! ```bash
//! cargo test -p wk-tests
//! ```

pub mod integration;
