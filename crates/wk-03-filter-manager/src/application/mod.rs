//! # Application Module
//!
//! The event loop that executes the subscription state machine's commands.

pub mod service;

pub use service::{FilterManagerHandle, FilterManagerService};
