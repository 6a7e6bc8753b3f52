//! Daemon error types.

use loyalty_connectors::AccrualClientError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Accrual client could not be built
    #[error("Accrual client error: {0}")]
    AccrualClient(#[from] AccrualClientError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ops API failed to bind or serve
    #[error("API server error: {0}")]
    Api(String),

    /// Background task panicked or was aborted
    #[error("Task error: {0}")]
    Task(String),
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
