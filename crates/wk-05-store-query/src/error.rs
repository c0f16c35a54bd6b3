//! Error types for store queries

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreQueryError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Query timed out")]
    Timeout,

    #[error("Store peer rejected query: {0}")]
    Rejected(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Page limit of {0} reached before completion")]
    PageLimit(usize),
}
