//! Error types for the filter health manager

use thiserror::Error;

/// Failures reported by the filter protocol layer.
///
/// All of these are transient from the manager's point of view: they drive
/// the next resubscribe, never an error to the application.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("No suitable peers available")]
    NoPeers,

    #[error("Operation timed out")]
    Timeout,

    #[error("Peer rejected request: {0}")]
    Rejected(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Cancelled by shutdown")]
    Cancelled,
}

/// Errors surfaced to callers of the manager handle.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Filter manager is not running")]
    NotRunning,

    #[error("Invalid configuration: {0}")]
    Config(String),
}
