//! Distributed transaction support.
//!
//! These are the pieces of the external transaction coordinator that the
//! pooling layer touches: the global transaction identifier, and the ability
//! to register a completion callback.

use std::fmt;
use std::sync::Arc;

use crate::error::TransactionError;

/// Global transaction identifier.
///
/// Unique per in-flight distributed transaction across all participants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(String);

impl TransactionId {
    /// Create an identifier from its string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TransactionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Final outcome reported to a [`Synchronization`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// The transaction committed.
    Committed,
    /// The transaction rolled back.
    RolledBack,
    /// The coordinator could not determine the outcome (heuristic completion).
    Unknown,
}

impl TransactionOutcome {
    /// Short lowercase name, for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion callback registered with the coordinator.
///
/// The coordinator calls `after_completion` once the outcome is final.
/// Implementations must tolerate being called more than once.
pub trait Synchronization: Send + Sync {
    /// Called before the two-phase-commit process starts.
    fn before_completion(&self);

    /// Called after the transaction committed or rolled back.
    fn after_completion(&self, outcome: TransactionOutcome);
}

/// The coordinator's view of one distributed transaction.
pub trait Transaction: Send + Sync {
    /// Register a completion callback.
    ///
    /// Fails when the transaction is marked rollback-only, already completing,
    /// or the coordinator is unavailable.
    fn register_synchronization(
        &self,
        sync: Arc<dyn Synchronization>,
    ) -> Result<(), TransactionError>;
}

/// Transaction a connection request runs under.
#[derive(Clone)]
pub struct TransactionContext {
    txn_id: TransactionId,
    transaction: Arc<dyn Transaction>,
}

impl TransactionContext {
    /// Create a context for the given transaction.
    pub fn new(txn_id: impl Into<TransactionId>, transaction: Arc<dyn Transaction>) -> Self {
        Self {
            txn_id: txn_id.into(),
            transaction,
        }
    }

    /// The global transaction identifier.
    #[must_use]
    pub fn txn_id(&self) -> &TransactionId {
        &self.txn_id
    }

    /// The coordinator handle for this transaction.
    #[must_use]
    pub fn transaction(&self) -> &Arc<dyn Transaction> {
        &self.transaction
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txn_id", &self.txn_id)
            .finish_non_exhaustive()
    }
}
