//! # WK-05 Store Query
//!
//! Pages through a store peer's message history and feeds every message
//! into the envelope pipeline with source `Store`.
//!
//! - One page per `query`; `next_cursor == None` means the history is done.
//! - Page sizes are clamped to `max_page_size`.
//! - A failure is reported once (callback + `StoreQueryFailed` bus event)
//!   and never retried.

pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use config::{StoreConfig, MAX_PAGE_SIZE};
pub use domain::{QueryPage, StoreRequest, StoreResponse, StoredMessage, TimeRange};
pub use error::StoreQueryError;
pub use ports::{MockStore, StoreProtocol, StoreQueryApi};
pub use service::{QueryFailureCallback, StoreQueryClient};
