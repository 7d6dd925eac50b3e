//! Physical connection contract.

use async_trait::async_trait;

use crate::error::{ConnectorError, TransactionError};
use crate::transaction::TransactionId;

/// A physical connection to a data source.
///
/// All methods take `&self`: a connection bound to a distributed transaction
/// may be shared by several call sites, and serializing operations on it is
/// the callers' responsibility.
pub trait Connection: Send + Sync {
    /// Physically close the connection.
    ///
    /// The pooling layer guarantees this is called at most once.
    fn close(&self) -> Result<(), ConnectorError>;

    /// Tests whether the connection is still usable.
    ///
    /// Consulted before an idle connection is handed out again.
    fn is_alive(&self) -> bool {
        true
    }

    /// Reset per-use state before the connection goes back to the idle set.
    fn clean_up(&self) {}

    /// The two-phase-commit resource, for connections from an XA-capable
    /// connector.
    fn xa_resource(&self) -> Option<&dyn XaResource> {
        None
    }
}

/// Outcome of the prepare phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XaVote {
    /// The branch is prepared and can be committed.
    Ok,
    /// The branch did no writes and has already been committed.
    ReadOnly,
}

/// Two-phase-commit resource exposed by XA connections.
///
/// The coordinator drives these calls; the pooling layer never does.
#[async_trait]
pub trait XaResource: Send + Sync {
    /// Start work on behalf of a transaction branch.
    async fn start(&self, txn_id: &TransactionId) -> Result<(), TransactionError>;

    /// End work on behalf of a transaction branch.
    async fn end(&self, txn_id: &TransactionId, success: bool) -> Result<(), TransactionError>;

    /// Prepare the branch for commit.
    async fn prepare(&self, txn_id: &TransactionId) -> Result<XaVote, TransactionError>;

    /// Commit the branch.
    async fn commit(&self, txn_id: &TransactionId, one_phase: bool)
    -> Result<(), TransactionError>;

    /// Roll back the branch.
    async fn rollback(&self, txn_id: &TransactionId) -> Result<(), TransactionError>;
}
