//! Pool error types.

use std::time::Duration;

use thiserror::Error;
use vdb_connector::{ConnectorError, TransactionError, TransactionId};

use crate::pool::PoolId;

/// Errors that can occur while pooling connector connections.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Invalid pool configuration.
    #[error("invalid pool configuration: {0}")]
    Configuration(String),

    /// No connection became available within the wait bound.
    #[error("pool {pool} exhausted: no connection available after {waited:?} (max {max})")]
    Exhausted {
        /// Pool identity.
        pool: PoolId,
        /// Configured maximum size.
        max: u32,
        /// How long the borrower waited.
        waited: Duration,
    },

    /// Borrow attempted on a pool that has been shut down.
    #[error("pool {pool} is closed")]
    PoolClosed {
        /// Pool identity.
        pool: PoolId,
    },

    /// The wrapped connector failed to create a connection.
    #[error("pool {pool} failed to create a connection: {source}")]
    ConnectionCreation {
        /// Pool identity.
        pool: PoolId,
        /// Underlying connector error.
        #[source]
        source: ConnectorError,
    },

    /// The transaction coordinator rejected the completion callback.
    #[error("failed to enlist connection in transaction {txn_id}: {source}")]
    TransactionRegistration {
        /// Global transaction identifier.
        txn_id: TransactionId,
        /// Underlying coordinator error.
        #[source]
        source: TransactionError,
    },

    /// A completion callback fired for a transaction with no bound connection.
    ///
    /// Logged by the callback; never returned from a borrow.
    #[error("no connection bound to transaction {txn_id}")]
    TransactionState {
        /// Global transaction identifier.
        txn_id: TransactionId,
    },

    /// A borrow was attempted before `start` or after `stop`.
    #[error("pooled connector is not started")]
    NotStarted,

    /// An XA connection was requested from a connector without XA support.
    #[error("connector does not support XA connections")]
    XaNotSupported,

    /// The wrapped connector failed to start.
    #[error("connector error: {0}")]
    Connector(#[from] ConnectorError),
}

impl PoolError {
    /// Check if the borrow may succeed if retried later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Exhausted { .. } => true,
            Self::ConnectionCreation { source, .. } => source.is_transient(),
            Self::Connector(source) => source.is_transient(),
            _ => false,
        }
    }
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolKind;

    #[test]
    fn test_error_carries_pool_identity() {
        let err = PoolError::Exhausted {
            pool: PoolId::new("xml", PoolKind::Xa),
            max: 2,
            waited: Duration::from_millis(200),
        };
        let msg = err.to_string();
        assert!(msg.contains("xml[xa]"));
        assert!(msg.contains("max 2"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_registration_error_carries_txn_id() {
        let err = PoolError::TransactionRegistration {
            txn_id: TransactionId::new("T1"),
            source: TransactionError::System("down".into()),
        };
        assert!(err.to_string().contains("T1"));
        assert!(!err.is_transient());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_creation_transience_follows_source() {
        let pool = PoolId::new("xml", PoolKind::Plain);
        let transient = PoolError::ConnectionCreation {
            pool: pool.clone(),
            source: ConnectorError::Unavailable("refused".into()),
        };
        let permanent = PoolError::ConnectionCreation {
            pool,
            source: ConnectorError::Config("bad url".into()),
        };
        assert!(transient.is_transient());
        assert!(!permanent.is_transient());
    }
}
