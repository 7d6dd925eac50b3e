//! Connector and transaction-coordinator error types.

use thiserror::Error;

/// Errors reported by a connector or one of its physical connections.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectorError {
    /// The data source could not be reached or refused the connection.
    #[error("data source unavailable: {0}")]
    Unavailable(String),

    /// IO error while talking to the data source.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The connector has not been started, or has been stopped.
    #[error("connector '{name}' is not running")]
    NotRunning {
        /// Connector name.
        name: String,
    },

    /// Closing a physical connection failed.
    #[error("failed to close connection: {0}")]
    Close(String),

    /// The requested capability is not provided by this connector.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// Invalid connector configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ConnectorError {
    /// Check if this error is transient and the operation may be retried.
    ///
    /// The pooling layer never retries on its own; this is a hint for the
    /// query engine that sits above it.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

/// Errors reported by the external transaction coordinator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransactionError {
    /// The transaction is marked for rollback and accepts no new work.
    #[error("transaction {txn_id} is marked for rollback")]
    RollbackOnly {
        /// Global transaction identifier.
        txn_id: String,
    },

    /// The transaction is already in its completion phase.
    #[error("transaction {txn_id} is already completing")]
    AlreadyCompleting {
        /// Global transaction identifier.
        txn_id: String,
    },

    /// The coordinator itself failed or is unavailable.
    #[error("transaction coordinator error: {0}")]
    System(String),
}
