//! Transaction registry and completion callback.
//!
//! The registry maps a global transaction identifier to the connection
//! bound to it, so that every borrow within one transaction reuses one
//! physical connection.
//!
//! ## Lock discipline
//!
//! All map mutations happen under one `parking_lot` mutex, held only for
//! bookkeeping. The first borrower of an identifier inserts a pending entry
//! under that lock before doing any I/O and holds a [`Reservation`] until the
//! connection is bound. Later borrowers of the same identifier find the
//! pending entry and wait on its gate, then look again. Exactly one
//! connection is therefore created per transaction, even for concurrent
//! first borrows.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use vdb_connector::{Synchronization, TransactionId, TransactionOutcome};

use crate::error::PoolError;
use crate::handle::ConnectionHandle;

/// Map from global transaction identifier to its bound connection.
#[derive(Default)]
pub struct TransactionRegistry {
    entries: Mutex<HashMap<TransactionId, Entry>>,
}

struct Entry {
    /// Closed once the reservation ends; never has permits.
    gate: Arc<Semaphore>,
    handle: Option<ConnectionHandle>,
    bound: bool,
}

/// Result of looking up a transaction.
pub(crate) enum Lookup {
    /// A connection is bound; a lease has been taken on it.
    Bound(ConnectionHandle),
    /// Another borrower is enlisting a connection. Wait on the gate, then
    /// look up again.
    Pending(Arc<Semaphore>),
    /// The caller is the first borrower and must enlist a connection.
    Vacant(Reservation),
}

impl TransactionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transactions with a bound or pending connection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no transaction is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// The connection bound to a transaction, without taking a lease.
    #[must_use]
    pub fn bound_handle(&self, txn_id: &TransactionId) -> Option<ConnectionHandle> {
        self.entries
            .lock()
            .get(txn_id)
            .filter(|entry| entry.bound)
            .and_then(|entry| entry.handle.clone())
    }

    pub(crate) fn lookup_or_reserve(self: &Arc<Self>, txn_id: &TransactionId) -> Lookup {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(txn_id) {
            return match (&entry.handle, entry.bound) {
                (Some(handle), true) => {
                    handle.lease();
                    Lookup::Bound(handle.clone())
                }
                _ => Lookup::Pending(entry.gate.clone()),
            };
        }

        let gate = Arc::new(Semaphore::new(0));
        entries.insert(
            txn_id.clone(),
            Entry {
                gate: gate.clone(),
                handle: None,
                bound: false,
            },
        );
        Lookup::Vacant(Reservation {
            registry: Arc::clone(self),
            txn_id: txn_id.clone(),
            gate,
            bound: false,
        })
    }

    /// Remove the entry for `txn_id` if it refers to `handle`.
    ///
    /// Returns `false` if there was no such entry.
    pub(crate) fn remove(&self, txn_id: &TransactionId, handle: &ConnectionHandle) -> bool {
        let mut entries = self.entries.lock();
        let matches = entries
            .get(txn_id)
            .and_then(|entry| entry.handle.as_ref())
            .is_some_and(|bound| bound.ptr_eq(handle));
        if matches {
            entries.remove(txn_id);
        }
        matches
    }

    /// Remove every entry, returning the connections that were registered.
    pub(crate) fn drain(&self) -> Vec<(TransactionId, ConnectionHandle)> {
        let drained: Vec<_> = self.entries.lock().drain().collect();
        drained
            .into_iter()
            .filter_map(|(txn_id, entry)| {
                entry.gate.close();
                entry.handle.map(|handle| (txn_id, handle))
            })
            .collect()
    }

    fn with_reserved<R>(
        &self,
        reservation: &Reservation,
        f: impl FnOnce(&mut Entry) -> R,
    ) -> Option<R> {
        let mut entries = self.entries.lock();
        entries
            .get_mut(&reservation.txn_id)
            .filter(|entry| Arc::ptr_eq(&entry.gate, &reservation.gate))
            .map(f)
    }
}

impl fmt::Debug for TransactionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRegistry")
            .field("transactions", &self.len())
            .finish()
    }
}

/// First-borrower claim on a transaction's registry entry.
///
/// Dropping an unbound reservation removes the pending entry, so waiters
/// retry and no entry is left behind for a failed enlistment.
pub(crate) struct Reservation {
    registry: Arc<TransactionRegistry>,
    txn_id: TransactionId,
    gate: Arc<Semaphore>,
    bound: bool,
}

impl Reservation {
    /// Record the connection being enlisted, before the completion callback
    /// is registered.
    pub(crate) fn stage(&self, handle: &ConnectionHandle) {
        self.registry.with_reserved(self, |entry| {
            entry.handle = Some(handle.clone());
        });
    }

    /// Publish the enlisted connection to later borrowers.
    ///
    /// Returns `false` if the entry disappeared meanwhile (transaction already
    /// completed, or forced shutdown).
    pub(crate) fn bind(mut self) -> bool {
        let bound = self
            .registry
            .with_reserved(&self, |entry| {
                entry.bound = true;
            })
            .is_some();
        self.bound = bound;
        bound
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.bound {
            let mut entries = self.registry.entries.lock();
            let ours = entries
                .get(&self.txn_id)
                .is_some_and(|entry| Arc::ptr_eq(&entry.gate, &self.gate));
            if ours {
                entries.remove(&self.txn_id);
            }
        }
        self.gate.close();
    }
}

/// Completion callback registered with the transaction coordinator.
///
/// Carries only the transaction identifier, the bound connection and the
/// registry to remove it from.
pub struct RemovalCallback {
    txn_id: TransactionId,
    handle: ConnectionHandle,
    registry: Arc<TransactionRegistry>,
}

impl RemovalCallback {
    pub(crate) fn new(
        txn_id: TransactionId,
        handle: ConnectionHandle,
        registry: Arc<TransactionRegistry>,
    ) -> Self {
        Self {
            txn_id,
            handle,
            registry,
        }
    }
}

impl Synchronization for RemovalCallback {
    fn before_completion(&self) {}

    fn after_completion(&self, outcome: TransactionOutcome) {
        if !self.registry.remove(&self.txn_id, &self.handle) {
            let err = PoolError::TransactionState {
                txn_id: self.txn_id.clone(),
            };
            tracing::warn!(error = %err, %outcome, "ignoring completion callback");
            return;
        }

        self.handle.mark_transaction_complete();
        tracing::trace!(
            txn_id = %self.txn_id,
            connection_id = self.handle.id(),
            %outcome,
            "released connection for transaction"
        );
    }
}

impl fmt::Debug for RemovalCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemovalCallback")
            .field("txn_id", &self.txn_id)
            .field("connection_id", &self.handle.id())
            .finish()
    }
}
