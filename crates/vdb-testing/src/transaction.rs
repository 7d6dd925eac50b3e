//! Mock transaction coordinator.

use std::sync::Arc;

use parking_lot::Mutex;
use vdb_connector::{
    Synchronization, Transaction, TransactionContext, TransactionError, TransactionId,
    TransactionOutcome,
};

/// How a [`MockTransaction`] answers callback registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationMode {
    /// Accept and hold the callback until [`MockTransaction::complete`].
    #[default]
    Accept,
    /// Reject as a rollback-only transaction.
    RollbackOnly,
    /// Reject with a coordinator failure.
    SystemFailure,
    /// Accept, then report completion before returning.
    CompleteImmediately(TransactionOutcome),
}

/// A single distributed transaction driven by the test.
pub struct MockTransaction {
    txn_id: TransactionId,
    mode: Mutex<RegistrationMode>,
    synchronizations: Mutex<Vec<Arc<dyn Synchronization>>>,
    attempts: Mutex<usize>,
}

impl MockTransaction {
    /// Transaction with the given global identifier.
    #[must_use]
    pub fn new(txn_id: impl Into<TransactionId>) -> Arc<Self> {
        Arc::new(Self {
            txn_id: txn_id.into(),
            mode: Mutex::new(RegistrationMode::Accept),
            synchronizations: Mutex::new(Vec::new()),
            attempts: Mutex::new(0),
        })
    }

    /// Transaction with a fresh random identifier.
    #[must_use]
    pub fn begin() -> Arc<Self> {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    /// The global identifier.
    #[must_use]
    pub fn txn_id(&self) -> &TransactionId {
        &self.txn_id
    }

    /// Context to pass with a connection request.
    #[must_use]
    pub fn context(self: &Arc<Self>) -> TransactionContext {
        TransactionContext::new(self.txn_id.clone(), self.clone() as Arc<dyn Transaction>)
    }

    /// Change how later registrations are answered.
    pub fn set_mode(&self, mode: RegistrationMode) {
        *self.mode.lock() = mode;
    }

    /// Callbacks currently held.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.synchronizations.lock().len()
    }

    /// Registration calls made, accepted or not.
    #[must_use]
    pub fn registration_attempts(&self) -> usize {
        *self.attempts.lock()
    }

    /// Finish the transaction: run every held callback and forget them.
    pub fn complete(&self, outcome: TransactionOutcome) {
        let synchronizations = std::mem::take(&mut *self.synchronizations.lock());
        tracing::debug!(
            txn_id = %self.txn_id,
            %outcome,
            callbacks = synchronizations.len(),
            "mock transaction completing"
        );
        for sync in &synchronizations {
            sync.before_completion();
        }
        for sync in &synchronizations {
            sync.after_completion(outcome);
        }
    }

    /// Run every held callback's `after_completion` without forgetting them,
    /// as a coordinator that delivers completion twice would.
    pub fn fire_again(&self, outcome: TransactionOutcome) {
        let synchronizations = self.synchronizations.lock().clone();
        for sync in &synchronizations {
            sync.after_completion(outcome);
        }
    }
}

impl Transaction for MockTransaction {
    fn register_synchronization(
        &self,
        sync: Arc<dyn Synchronization>,
    ) -> Result<(), TransactionError> {
        *self.attempts.lock() += 1;
        let mode = *self.mode.lock();
        match mode {
            RegistrationMode::Accept => {
                self.synchronizations.lock().push(sync);
                Ok(())
            }
            RegistrationMode::RollbackOnly => Err(TransactionError::RollbackOnly {
                txn_id: self.txn_id.to_string(),
            }),
            RegistrationMode::SystemFailure => Err(TransactionError::System(
                "mock coordinator unavailable".into(),
            )),
            RegistrationMode::CompleteImmediately(outcome) => {
                sync.before_completion();
                sync.after_completion(outcome);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for MockTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransaction")
            .field("txn_id", &self.txn_id)
            .field("mode", &*self.mode.lock())
            .field("registered", &self.registered())
            .finish()
    }
}
