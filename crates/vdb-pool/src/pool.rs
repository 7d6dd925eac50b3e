//! Connection pool implementation.
//!
//! One pool caches idle connections for one connector, either plain or XA.
//! Capacity is a semaphore with one permit per checked-out handle; idle
//! handles hold no permit. A borrower takes a permit first, then either
//! reuses an idle handle or reserves an outstanding slot and creates a new
//! connection outside the pool lock. Because reuse is preferred and a
//! returning handle enters the idle set before its permit is released, the
//! number of outstanding connections never exceeds the pool maximum.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use vdb_connector::{Connection, Connector, ExecutionContext, TransactionContext};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::handle::ConnectionHandle;

/// Which connections a pool holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Connections for non-transactional work.
    Plain,
    /// Connections that can enlist in distributed transactions.
    Xa,
}

impl PoolKind {
    /// Short name, for logs and errors.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Xa => "xa",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a pool: connector binding name and kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolId {
    connector: Arc<str>,
    kind: PoolKind,
}

impl PoolId {
    /// Create a pool identity.
    #[must_use]
    pub fn new(connector: impl Into<Arc<str>>, kind: PoolKind) -> Self {
        Self {
            connector: connector.into(),
            kind,
        }
    }

    /// Connector binding name.
    #[must_use]
    pub fn connector(&self) -> &str {
        &self.connector
    }

    /// Pool kind.
    #[must_use]
    pub fn kind(&self) -> PoolKind {
        self.kind
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.connector, self.kind)
    }
}

/// A bounded pool of connections for one connector.
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolShared>,
}

pub(crate) struct PoolShared {
    id: PoolId,
    connector: Arc<dyn Connector>,
    config: PoolConfig,
    max: u32,
    state: Mutex<PoolState>,
    semaphore: Arc<Semaphore>,
    next_connection_id: AtomicU64,
    created_at: Instant,
    metrics: Mutex<PoolMetricsInner>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

struct PoolState {
    /// Oldest returned at the front.
    idle: VecDeque<IdleEntry>,
    /// Created and not yet closed, idle or checked out.
    outstanding: u32,
    closed: bool,
}

struct IdleEntry {
    handle: ConnectionHandle,
    since: Instant,
}

enum Checkout {
    Evict(Vec<IdleEntry>),
    Reuse(IdleEntry),
    Create,
}

/// Outstanding slot reserved for a connection being created.
///
/// Given back on drop unless [`keep`](Self::keep) was called, so a borrow
/// cancelled while the connector is still connecting does not leak it.
struct CreateSlot<'a> {
    pool: &'a PoolShared,
    armed: bool,
}

impl CreateSlot<'_> {
    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for CreateSlot<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.pool.state.lock();
            state.outstanding = state.outstanding.saturating_sub(1);
        }
    }
}

impl IdleEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.since.elapsed() > ttl
    }
}

/// Internal metrics tracking.
#[derive(Debug, Default)]
struct PoolMetricsInner {
    connections_created: u64,
    connections_closed: u64,
    checkouts_successful: u64,
    checkouts_failed: u64,
    waits: u64,
    timeouts: u64,
    evictions: u64,
}

impl ConnectionPool {
    /// Create a pool for `connector`.
    ///
    /// If the configuration enables a cleaning interval, a background sweep
    /// task is spawned on the current tokio runtime.
    pub fn new(
        connector_name: &str,
        kind: PoolKind,
        connector: Arc<dyn Connector>,
        config: &PoolConfig,
    ) -> Result<Self> {
        config.validate()?;

        let max = config.max_for(kind == PoolKind::Xa);
        let inner = Arc::new(PoolShared {
            id: PoolId::new(connector_name, kind),
            connector,
            config: config.clone(),
            max,
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(max as usize),
                outstanding: 0,
                closed: false,
            }),
            semaphore: Arc::new(Semaphore::new(max as usize)),
            next_connection_id: AtomicU64::new(1),
            created_at: Instant::now(),
            metrics: Mutex::new(PoolMetricsInner::default()),
            sweeper: Mutex::new(None),
        });

        if let Some(interval) = config.cleaning_interval {
            spawn_sweeper(&inner, interval);
        }

        tracing::info!(
            pool = %inner.id,
            max,
            idle_timeout_ms = config.idle_timeout.as_millis() as u64,
            wait_ms = config.connection_timeout.as_millis() as u64,
            "connection pool created"
        );

        Ok(Self { inner })
    }

    /// Pool identity.
    #[must_use]
    pub fn id(&self) -> &PoolId {
        &self.inner.id
    }

    /// Borrow a handle.
    ///
    /// Reuses an idle, unexpired, live connection if there is one; otherwise
    /// creates one through the connector if the pool is under its maximum;
    /// otherwise waits up to the configured connection timeout. The returned
    /// handle has no leases.
    ///
    /// `txn` is passed to the connector when an XA connection is created.
    pub async fn obtain(
        &self,
        ctx: &ExecutionContext,
        txn: Option<&TransactionContext>,
    ) -> Result<ConnectionHandle> {
        let inner = &self.inner;
        let permit = match self.acquire_permit().await {
            Ok(permit) => permit,
            Err(e) => {
                inner.metrics.lock().checkouts_failed += 1;
                return Err(e);
            }
        };

        loop {
            let next = {
                let mut state = inner.state.lock();
                if state.closed {
                    drop(state);
                    inner.metrics.lock().checkouts_failed += 1;
                    return Err(PoolError::PoolClosed {
                        pool: inner.id.clone(),
                    });
                }
                let expired = take_expired(&mut state.idle, inner.config.idle_timeout);
                if !expired.is_empty() {
                    Checkout::Evict(expired)
                } else if let Some(entry) = state.idle.pop_back() {
                    Checkout::Reuse(entry)
                } else {
                    state.outstanding += 1;
                    Checkout::Create
                }
            };

            let entry = match next {
                Checkout::Evict(expired) => {
                    inner.close_evicted(expired);
                    continue;
                }
                Checkout::Reuse(entry) => entry,
                Checkout::Create => {
                    let slot = CreateSlot { pool: inner, armed: true };
                    return self.create(ctx, txn, permit, slot).await;
                }
            };

            if !entry.handle.connection().is_alive() {
                tracing::debug!(
                    pool = %inner.id,
                    connection_id = entry.handle.id(),
                    "discarding dead idle connection"
                );
                inner.metrics.lock().evictions += 1;
                entry.handle.close(None);
                continue;
            }

            entry.handle.attach(permit);
            inner.metrics.lock().checkouts_successful += 1;
            tracing::debug!(
                pool = %inner.id,
                connection_id = entry.handle.id(),
                "reusing idle connection"
            );
            return Ok(entry.handle);
        }
    }

    /// Return an unleased handle to the idle set.
    ///
    /// No-op if the handle still has leases or is bound to a transaction; such
    /// handles settle themselves when their last lease or their transaction
    /// ends.
    pub fn release(&self, handle: &ConnectionHandle) {
        handle.settle();
    }

    /// Close and remove idle connections past their time-to-live.
    ///
    /// Returns how many were evicted.
    pub fn evict_expired(&self) -> usize {
        let expired = {
            let mut state = self.inner.state.lock();
            take_expired(&mut state.idle, self.inner.config.idle_timeout)
        };
        let count = expired.len();
        self.inner.close_evicted(expired);
        count
    }

    /// Shut the pool down.
    ///
    /// Closes every idle connection and fails current and future borrowers
    /// with [`PoolError::PoolClosed`]. Leased connections are closed when
    /// their last lease is released.
    pub fn shut_down(&self) {
        let idle = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.idle.drain(..).collect::<Vec<_>>()
        };

        self.inner.semaphore.close();
        if let Some(sweeper) = self.inner.sweeper.lock().take() {
            sweeper.abort();
        }

        let closing = idle.len();
        for entry in idle {
            entry.handle.close(None);
        }

        tracing::info!(
            pool = %self.inner.id,
            idle_closed = closing,
            "connection pool shut down"
        );
    }

    /// Check if the pool has been shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Get the current pool status.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        let available = state.idle.len() as u32;
        PoolStatus {
            available,
            in_use: state.outstanding.saturating_sub(available),
            total: state.outstanding,
            max: self.inner.max,
        }
    }

    /// Get pool metrics.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        let inner = self.inner.metrics.lock();
        PoolMetrics {
            connections_created: inner.connections_created,
            connections_closed: inner.connections_closed,
            checkouts_successful: inner.checkouts_successful,
            checkouts_failed: inner.checkouts_failed,
            waits: inner.waits,
            timeouts: inner.timeouts,
            evictions: inner.evictions,
            uptime: self.inner.created_at.elapsed(),
        }
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit> {
        let inner = &self.inner;
        match inner.semaphore.clone().try_acquire_owned() {
            Ok(permit) => return Ok(permit),
            Err(TryAcquireError::Closed) => {
                return Err(PoolError::PoolClosed {
                    pool: inner.id.clone(),
                });
            }
            Err(TryAcquireError::NoPermits) => {}
        }

        let wait = inner.config.connection_timeout;
        inner.metrics.lock().waits += 1;
        tracing::debug!(pool = %inner.id, wait_ms = wait.as_millis() as u64, "pool exhausted, waiting");

        match tokio::time::timeout(wait, inner.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(PoolError::PoolClosed {
                pool: inner.id.clone(),
            }),
            Err(_) => {
                inner.metrics.lock().timeouts += 1;
                Err(PoolError::Exhausted {
                    pool: inner.id.clone(),
                    max: inner.max,
                    waited: wait,
                })
            }
        }
    }

    /// Create a new handle in the outstanding slot reserved by `obtain`.
    async fn create(
        &self,
        ctx: &ExecutionContext,
        txn: Option<&TransactionContext>,
        permit: OwnedSemaphorePermit,
        slot: CreateSlot<'_>,
    ) -> Result<ConnectionHandle> {
        let inner = &self.inner;
        let id = inner.next_connection_id.fetch_add(1, Ordering::Relaxed);

        let connection = match inner.connect(ctx, txn).await {
            Ok(connection) => connection,
            Err(e) => {
                drop(slot);
                inner.metrics.lock().checkouts_failed += 1;
                tracing::debug!(pool = %inner.id, error = %e, "connection creation failed");
                return Err(e);
            }
        };

        {
            let mut metrics = inner.metrics.lock();
            metrics.connections_created += 1;
            metrics.checkouts_successful += 1;
        }
        let handle = ConnectionHandle::new(
            id,
            Arc::from(connection),
            Arc::downgrade(&self.inner),
            permit,
        );
        // The handle now accounts for the slot; closing it gives the slot back.
        slot.keep();
        tracing::debug!(pool = %inner.id, connection_id = id, "created connection");

        // Shut down while we were connecting.
        if self.is_closed() {
            handle.close(None);
            return Err(PoolError::PoolClosed {
                pool: inner.id.clone(),
            });
        }
        Ok(handle)
    }
}

impl PoolShared {
    async fn connect(
        &self,
        ctx: &ExecutionContext,
        txn: Option<&TransactionContext>,
    ) -> Result<Box<dyn Connection>> {
        let created = match self.id.kind {
            PoolKind::Plain => self.connector.get_connection(ctx).await,
            PoolKind::Xa => match self.connector.as_xa() {
                Some(xa) => xa.get_xa_connection(ctx, txn).await,
                None => return Err(PoolError::XaNotSupported),
            },
        };
        created.map_err(|source| PoolError::ConnectionCreation {
            pool: self.id.clone(),
            source,
        })
    }

    /// Accept a handle whose last lease was released.
    pub(crate) fn check_in(&self, handle: &ConnectionHandle, permit: OwnedSemaphorePermit) {
        handle.connection().clean_up();

        let accepted = {
            let mut state = self.state.lock();
            if state.closed {
                false
            } else {
                state.idle.push_back(IdleEntry {
                    handle: handle.clone(),
                    since: Instant::now(),
                });
                true
            }
        };

        if accepted {
            tracing::trace!(pool = %self.id, connection_id = handle.id(), "connection returned to pool");
            // Idle entry is visible before the capacity it frees.
            drop(permit);
        } else {
            handle.close(Some(permit));
        }
    }

    pub(crate) fn on_closed(&self) {
        {
            let mut state = self.state.lock();
            state.outstanding = state.outstanding.saturating_sub(1);
        }
        self.metrics.lock().connections_closed += 1;
    }

    fn close_evicted(&self, expired: Vec<IdleEntry>) {
        if expired.is_empty() {
            return;
        }
        self.metrics.lock().evictions += expired.len() as u64;
        for entry in expired {
            tracing::debug!(
                pool = %self.id,
                connection_id = entry.handle.id(),
                "evicting expired idle connection"
            );
            entry.handle.close(None);
        }
    }
}

fn take_expired(idle: &mut VecDeque<IdleEntry>, ttl: Duration) -> Vec<IdleEntry> {
    let mut expired = Vec::new();
    while idle.front().is_some_and(|entry| entry.is_expired(ttl)) {
        if let Some(entry) = idle.pop_front() {
            expired.push(entry);
        }
    }
    expired
}

fn spawn_sweeper(inner: &Arc<PoolShared>, interval: Duration) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(pool = %inner.id, "no tokio runtime, idle sweep disabled");
        return;
    };

    let weak: Weak<PoolShared> = Arc::downgrade(inner);
    let task = runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else { break };
            let pool = ConnectionPool { inner };
            if pool.is_closed() {
                break;
            }
            let evicted = pool.evict_expired();
            if evicted > 0 {
                tracing::debug!(pool = %pool.id(), evicted, "idle sweep");
            }
        }
    });
    *inner.sweeper.lock() = Some(task);
}

impl fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish()
    }
}

/// Status information about the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently checked out (leased or transaction-bound).
    pub in_use: u32,
    /// Total number of open connections.
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

impl PoolStatus {
    /// Calculate the utilization percentage.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        (f64::from(self.in_use) / f64::from(self.max)) * 100.0
    }

    /// Check if the pool is at capacity.
    #[must_use]
    pub fn is_at_capacity(&self) -> bool {
        self.total >= self.max
    }
}

/// Metrics collected from the pool.
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total connections created since pool start.
    pub connections_created: u64,
    /// Total connections closed since pool start.
    pub connections_closed: u64,
    /// Successful checkouts.
    pub checkouts_successful: u64,
    /// Failed checkouts (timeouts, pool closed, creation errors).
    pub checkouts_failed: u64,
    /// Borrows that had to wait for capacity.
    pub waits: u64,
    /// Borrows that gave up after the wait bound.
    pub timeouts: u64,
    /// Idle connections discarded as expired or dead.
    pub evictions: u64,
    /// Time since pool creation.
    pub uptime: Duration,
}

impl PoolMetrics {
    /// Calculate checkout success rate (0.0 to 1.0).
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            return 1.0;
        }
        self.checkouts_successful as f64 / total as f64
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use vdb_connector::{ConnectorEnvironment, ConnectorError};

    use super::*;

    #[derive(Default)]
    struct Counters {
        created: AtomicUsize,
        closed: AtomicUsize,
    }

    struct TestConnection {
        counters: Arc<Counters>,
    }

    impl Connection for TestConnection {
        fn close(&self) -> std::result::Result<(), ConnectorError> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct TestConnector {
        counters: Arc<Counters>,
        connect_delay: Duration,
    }

    #[async_trait]
    impl Connector for TestConnector {
        async fn start(&self, _env: &ConnectorEnvironment) -> std::result::Result<(), ConnectorError> {
            Ok(())
        }

        async fn stop(&self) {}

        async fn get_connection(
            &self,
            _ctx: &ExecutionContext,
        ) -> std::result::Result<Box<dyn Connection>, ConnectorError> {
            if !self.connect_delay.is_zero() {
                tokio::time::sleep(self.connect_delay).await;
            }
            self.counters.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(TestConnection {
                counters: self.counters.clone(),
            }))
        }
    }

    fn pool(config: PoolConfig) -> (ConnectionPool, Arc<Counters>) {
        let connector = TestConnector::default();
        let counters = connector.counters.clone();
        let pool = ConnectionPool::new("test", PoolKind::Plain, Arc::new(connector), &config).unwrap();
        (pool, counters)
    }

    #[test]
    fn test_pool_id_display() {
        assert_eq!(PoolId::new("xml", PoolKind::Xa).to_string(), "xml[xa]");
        assert_eq!(PoolId::new("xml", PoolKind::Plain).to_string(), "xml[plain]");
    }

    #[test]
    fn test_pool_status_utilization() {
        let status = PoolStatus {
            available: 5,
            in_use: 5,
            total: 10,
            max: 20,
        };
        assert!((status.utilization() - 25.0).abs() < f64::EPSILON);
        assert!(!status.is_at_capacity());
    }

    #[test]
    fn test_pool_metrics_success_rate() {
        let metrics = PoolMetrics {
            connections_created: 10,
            connections_closed: 2,
            checkouts_successful: 90,
            checkouts_failed: 10,
            waits: 12,
            timeouts: 3,
            evictions: 1,
            uptime: Duration::from_secs(3600),
        };
        assert!((metrics.checkout_success_rate() - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = ConnectionPool::new(
            "test",
            PoolKind::Plain,
            Arc::new(TestConnector::default()),
            &PoolConfig::new().max_connections(0),
        )
        .unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_reuses_idle_connection() {
        let (pool, counters) = pool(PoolConfig::default());
        let ctx = ExecutionContext::new("r1");

        let handle = pool.obtain(&ctx, None).await.unwrap();
        let first_id = handle.id();
        handle.lease();
        handle.release();
        assert_eq!(pool.status().available, 1);

        let again = pool.obtain(&ctx, None).await.unwrap();
        assert_eq!(again.id(), first_id);
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.status().in_use, 1);
    }

    #[tokio::test]
    async fn test_expired_idle_connection_is_not_reused() {
        let (pool, counters) = pool(PoolConfig::new().idle_timeout(Duration::from_millis(20)));
        let ctx = ExecutionContext::new("r1");

        let handle = pool.obtain(&ctx, None).await.unwrap();
        let first_id = handle.id();
        handle.lease();
        handle.release();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let fresh = pool.obtain(&ctx, None).await.unwrap();
        assert_ne!(fresh.id(), first_id);
        assert_eq!(counters.created.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert_eq!(pool.metrics().evictions, 1);
        assert_eq!(pool.status().total, 1);
    }

    #[tokio::test]
    async fn test_fail_fast_when_wait_is_zero() {
        let (pool, _) = pool(
            PoolConfig::new()
                .max_connections(1)
                .connection_timeout(Duration::ZERO),
        );
        let ctx = ExecutionContext::new("r1");

        let _held = pool.obtain(&ctx, None).await.unwrap();
        let err = pool.obtain(&ctx, None).await.unwrap_err();
        assert!(matches!(err, PoolError::Exhausted { max: 1, .. }));
        assert_eq!(pool.metrics().timeouts, 1);
    }

    #[tokio::test]
    async fn test_shut_down_closes_idle_and_rejects_borrowers() {
        let (pool, counters) = pool(PoolConfig::default());
        let ctx = ExecutionContext::new("r1");

        let idle = pool.obtain(&ctx, None).await.unwrap();
        let leased = pool.obtain(&ctx, None).await.unwrap();
        idle.lease();
        idle.release();
        leased.lease();

        pool.shut_down();
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        assert!(matches!(
            pool.obtain(&ctx, None).await,
            Err(PoolError::PoolClosed { .. })
        ));

        // Leased handle closes on its last release, not before.
        assert!(!leased.is_closed());
        leased.release();
        assert!(leased.is_closed());
        assert_eq!(counters.closed.load(Ordering::SeqCst), 2);
        assert_eq!(pool.status().total, 0);
    }

    #[tokio::test]
    async fn test_release_of_leased_handle_is_noop() {
        let (pool, _) = pool(PoolConfig::default());
        let handle = pool.obtain(&ExecutionContext::new("r1"), None).await.unwrap();
        handle.lease();

        pool.release(&handle);
        assert_eq!(pool.status().available, 0);
        assert_eq!(pool.status().in_use, 1);
    }

    #[tokio::test]
    async fn test_background_sweep_evicts() {
        let (pool, counters) = pool(
            PoolConfig::new()
                .idle_timeout(Duration::from_millis(10))
                .cleaning_interval(Duration::from_millis(20)),
        );
        let handle = pool.obtain(&ExecutionContext::new("r1"), None).await.unwrap();
        handle.lease();
        handle.release();
        assert_eq!(pool.status().available, 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pool.status().available, 0);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
        pool.shut_down();
    }

    #[tokio::test]
    async fn test_cancelled_create_gives_back_slot() {
        let connector = TestConnector {
            connect_delay: Duration::from_millis(100),
            ..TestConnector::default()
        };
        let counters = connector.counters.clone();
        let pool = ConnectionPool::new(
            "test",
            PoolKind::Plain,
            Arc::new(connector),
            &PoolConfig::new().max_connections(1),
        )
        .unwrap();
        let ctx = ExecutionContext::new("r1");

        let cancelled =
            tokio::time::timeout(Duration::from_millis(10), pool.obtain(&ctx, None)).await;
        assert!(cancelled.is_err());
        assert_eq!(pool.status().total, 0);
        assert_eq!(pool.status().in_use, 0);

        let handle = pool.obtain(&ctx, None).await.unwrap();
        handle.lease();
        let status = pool.status();
        assert_eq!(status.total, 1);
        assert!(status.total <= status.max);
        assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_xa_pool_requires_xa_connector() {
        let pool = ConnectionPool::new(
            "test",
            PoolKind::Xa,
            Arc::new(TestConnector::default()),
            &PoolConfig::default(),
        )
        .unwrap();
        let err = pool.obtain(&ExecutionContext::new("r1"), None).await.unwrap_err();
        assert!(matches!(err, PoolError::XaNotSupported));
        assert_eq!(pool.status().total, 0);
    }
}
