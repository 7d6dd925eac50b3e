//! Lease-counted connection handles.
//!
//! A [`ConnectionHandle`] owns one physical connection. Its lease counter
//! models several call sites of one distributed transaction sharing that
//! connection. The handle decides by itself what happens when the last lease
//! is dropped: go back to the idle set, stay bound to a running transaction,
//! or close.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::OwnedSemaphorePermit;
use vdb_connector::Connection;

use crate::pool::PoolShared;

/// Shared handle to one pooled physical connection.
///
/// Cloning the handle does not take a lease.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    id: u64,
    connection: Arc<dyn Connection>,
    pool: Weak<PoolShared>,
    state: Mutex<HandleState>,
}

struct HandleState {
    leases: u32,
    in_transaction: bool,
    transaction_completed: bool,
    closed: bool,
    /// Pool capacity held while checked out. `None` while idle.
    permit: Option<OwnedSemaphorePermit>,
}

enum Settle {
    Keep,
    Close(Option<OwnedSemaphorePermit>),
    CheckIn(OwnedSemaphorePermit),
}

impl ConnectionHandle {
    pub(crate) fn new(
        id: u64,
        connection: Arc<dyn Connection>,
        pool: Weak<PoolShared>,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                connection,
                pool,
                state: Mutex::new(HandleState {
                    leases: 0,
                    in_transaction: false,
                    transaction_completed: false,
                    closed: false,
                    permit: Some(permit),
                }),
            }),
        }
    }

    /// Pool-unique connection id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The physical connection.
    #[must_use]
    pub fn connection(&self) -> &Arc<dyn Connection> {
        &self.inner.connection
    }

    /// Number of outstanding leases.
    #[must_use]
    pub fn lease_count(&self) -> u32 {
        self.inner.state.lock().leases
    }

    /// Whether the handle is bound to a transaction that has not completed.
    #[must_use]
    pub fn is_transaction_bound(&self) -> bool {
        self.inner.state.lock().in_transaction
    }

    /// Whether the physical connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Whether two handles refer to the same physical connection.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Take a lease.
    pub fn lease(&self) {
        let leases = {
            let mut state = self.inner.state.lock();
            state.leases += 1;
            state.leases
        };
        tracing::trace!(connection_id = self.inner.id, leases, "connection leased");
    }

    /// Drop a lease.
    ///
    /// When the last lease goes away the connection returns to its pool,
    /// unless it is bound to a running transaction (deferred until the
    /// transaction completes) or its transaction already completed (closed).
    pub fn release(&self) {
        let leases = {
            let mut state = self.inner.state.lock();
            if state.leases == 0 {
                drop(state);
                tracing::warn!(
                    connection_id = self.inner.id,
                    "release without an outstanding lease"
                );
                return;
            }
            state.leases -= 1;
            state.leases
        };
        tracing::trace!(connection_id = self.inner.id, leases, "connection lease released");

        if leases == 0 {
            self.settle();
        }
    }

    /// Re-attach pool capacity when an idle handle is checked out again.
    pub(crate) fn attach(&self, permit: OwnedSemaphorePermit) {
        self.inner.state.lock().permit = Some(permit);
    }

    pub(crate) fn mark_transaction_bound(&self) {
        self.inner.state.lock().in_transaction = true;
    }

    /// The bound transaction finished. Closes now if unleased, otherwise the
    /// last [`release`](Self::release) closes.
    pub(crate) fn mark_transaction_complete(&self) {
        let permit = {
            let mut state = self.inner.state.lock();
            state.in_transaction = false;
            state.transaction_completed = true;
            if state.leases > 0 || state.closed {
                None
            } else {
                state.closed = true;
                Some(state.permit.take())
            }
        };

        match permit {
            Some(permit) => self.close_now(permit),
            None => tracing::trace!(
                connection_id = self.inner.id,
                "transaction complete, close deferred to last release"
            ),
        }
    }

    /// Physically close the connection regardless of leases.
    ///
    /// `permit` is capacity the caller took from the handle before deciding
    /// to close it. No-op if already closed.
    pub(crate) fn close(&self, permit: Option<OwnedSemaphorePermit>) {
        let held = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.leases = 0;
            state.in_transaction = false;
            state.permit.take()
        };
        self.close_now(held.or(permit));
    }

    /// Route an unleased handle to its next state.
    pub(crate) fn settle(&self) {
        let next = {
            let mut state = self.inner.state.lock();
            if state.closed || state.leases > 0 || state.in_transaction {
                Settle::Keep
            } else if state.transaction_completed {
                state.closed = true;
                Settle::Close(state.permit.take())
            } else {
                match state.permit.take() {
                    Some(permit) => Settle::CheckIn(permit),
                    // already idle
                    None => Settle::Keep,
                }
            }
        };

        match next {
            Settle::Keep => {}
            Settle::Close(permit) => self.close_now(permit),
            Settle::CheckIn(permit) => match self.inner.pool.upgrade() {
                Some(pool) => pool.check_in(self, permit),
                None => self.close(Some(permit)),
            },
        }
    }

    fn close_now(&self, permit: Option<OwnedSemaphorePermit>) {
        tracing::debug!(connection_id = self.inner.id, "closing connection");
        if let Err(e) = self.inner.connection.close() {
            tracing::warn!(
                connection_id = self.inner.id,
                error = %e,
                "failed to close connection"
            );
        }
        if let Some(pool) = self.inner.pool.upgrade() {
            pool.on_closed();
        }
        // Capacity is handed back only after the outstanding count dropped.
        drop(permit);
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("leases", &state.leases)
            .field("in_transaction", &state.in_transaction)
            .field("closed", &state.closed)
            .finish()
    }
}

/// A leased connection.
///
/// Dereferences to the physical connection. Dropping it releases the lease.
pub struct PooledConnection {
    handle: ConnectionHandle,
}

impl PooledConnection {
    /// Wrap a handle on which a lease has already been taken.
    pub(crate) fn new(handle: ConnectionHandle) -> Self {
        Self { handle }
    }

    /// The underlying handle.
    #[must_use]
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Pool-unique connection id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.handle.id()
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.handle.connection().as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.handle.release();
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledConnection").field(&self.handle).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Semaphore;
    use vdb_connector::ConnectorError;

    use super::*;

    #[derive(Default)]
    struct CountingConnection {
        closes: AtomicUsize,
    }

    impl Connection for CountingConnection {
        fn close(&self) -> Result<(), ConnectorError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn detached_handle() -> (ConnectionHandle, Arc<CountingConnection>, Arc<Semaphore>) {
        let conn = Arc::new(CountingConnection::default());
        let semaphore = Arc::new(Semaphore::new(1));
        let permit = semaphore
            .clone()
            .try_acquire_owned()
            .unwrap_or_else(|_| unreachable!("fresh semaphore has a permit"));
        let handle = ConnectionHandle::new(7, conn.clone(), Weak::new(), permit);
        (handle, conn, semaphore)
    }

    #[test]
    fn test_lease_counting() {
        let (handle, conn, _sem) = detached_handle();
        handle.lease();
        handle.lease();
        assert_eq!(handle.lease_count(), 2);

        handle.release();
        assert_eq!(handle.lease_count(), 1);
        assert_eq!(conn.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_completion_with_zero_leases_closes() {
        let (handle, conn, sem) = detached_handle();
        handle.lease();
        handle.mark_transaction_bound();
        handle.release();

        // Still bound: nothing happens and capacity stays held.
        assert!(!handle.is_closed());
        assert_eq!(sem.available_permits(), 0);

        handle.mark_transaction_complete();
        assert!(handle.is_closed());
        assert_eq!(conn.closes.load(Ordering::SeqCst), 1);
        assert_eq!(sem.available_permits(), 1);
    }

    #[test]
    fn test_completion_with_leases_defers_close() {
        let (handle, conn, _sem) = detached_handle();
        handle.lease();
        handle.lease();
        handle.mark_transaction_bound();

        handle.mark_transaction_complete();
        assert!(!handle.is_closed());
        assert!(!handle.is_transaction_bound());

        handle.release();
        assert!(!handle.is_closed());
        handle.release();
        assert!(handle.is_closed());
        assert_eq!(conn.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (handle, conn, _sem) = detached_handle();
        handle.close(None);
        handle.close(None);
        handle.mark_transaction_complete();
        assert_eq!(conn.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_without_lease_is_ignored() {
        let (handle, conn, _sem) = detached_handle();
        handle.release();
        assert_eq!(handle.lease_count(), 0);
        assert!(!handle.is_closed());
        assert_eq!(conn.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let (handle, _conn, _sem) = detached_handle();
        handle.lease();
        handle.lease();
        let guard = PooledConnection::new(handle.clone());
        assert_eq!(guard.id(), 7);
        assert!(guard.xa_resource().is_none());

        drop(guard);
        assert_eq!(handle.lease_count(), 1);
    }
}
