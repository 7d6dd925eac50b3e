//! Pooling around a connector.
//!
//! [`PooledConnector`] wraps a [`Connector`] by composition. It keeps two
//! independent pools, one for plain connections and one for connections
//! participating in distributed transactions, since most sources need the
//! two segregated. XA connections are bound to their transaction: every
//! borrow under one global transaction identifier gets the same physical
//! connection until the coordinator reports completion.

use std::sync::Arc;

use parking_lot::RwLock;
use vdb_connector::{Connector, ConnectorEnvironment, ExecutionContext, TransactionContext};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::handle::PooledConnection;
use crate::pool::{ConnectionPool, PoolKind, PoolStatus};
use crate::registry::{Lookup, RemovalCallback, Reservation, TransactionRegistry};

/// Transaction-aware pooling wrapper for a connector.
///
/// # Example
///
/// ```rust,ignore
/// use vdb_pool::{PooledConnector, PoolConfig};
///
/// let pooled = PooledConnector::builder(connector)
///     .max_connections(10)
///     .connection_timeout(Duration::from_millis(500))
///     .build();
/// pooled.start(&env).await?;
///
/// // Two borrows in one transaction share a connection.
/// let a = pooled.get_xa_connection(&ctx, Some(&txn)).await?;
/// let b = pooled.get_xa_connection(&ctx, Some(&txn)).await?;
/// assert_eq!(a.id(), b.id());
/// ```
pub struct PooledConnector {
    connector: Arc<dyn Connector>,
    config: Option<PoolConfig>,
    pools: RwLock<Option<Arc<Pools>>>,
    registry: Arc<TransactionRegistry>,
}

struct Pools {
    plain: ConnectionPool,
    xa: Option<ConnectionPool>,
}

impl Pools {
    fn shut_down(&self) {
        self.plain.shut_down();
        if let Some(xa) = &self.xa {
            xa.shut_down();
        }
    }
}

impl PooledConnector {
    /// Wrap a connector. The pool configuration is read from the connector
    /// environment on [`start`](Self::start).
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            config: None,
            pools: RwLock::new(None),
            registry: Arc::new(TransactionRegistry::new()),
        }
    }

    /// Wrap a connector with an explicit pool configuration.
    pub fn with_config(connector: Arc<dyn Connector>, config: PoolConfig) -> Self {
        Self {
            config: Some(config),
            ..Self::new(connector)
        }
    }

    /// Create a builder.
    pub fn builder(connector: Arc<dyn Connector>) -> PooledConnectorBuilder {
        PooledConnectorBuilder::new(connector)
    }

    /// The wrapped connector.
    #[must_use]
    pub fn inner(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Whether the wrapped connector can hand out XA connections.
    #[must_use]
    pub fn supports_xa(&self) -> bool {
        self.connector.as_xa().is_some()
    }

    /// Initialize the pools and start the wrapped connector.
    ///
    /// The XA pool exists only if the wrapped connector is XA-capable. Both
    /// pools share one configuration.
    pub async fn start(&self, env: &ConnectorEnvironment) -> Result<()> {
        let config = match &self.config {
            Some(config) => config.clone(),
            None => PoolConfig::from_properties(&env.properties)?,
        };

        let plain = ConnectionPool::new(
            &env.name,
            PoolKind::Plain,
            self.connector.clone(),
            &config,
        )?;
        let xa = if self.supports_xa() {
            Some(ConnectionPool::new(
                &env.name,
                PoolKind::Xa,
                self.connector.clone(),
                &config,
            )?)
        } else {
            None
        };
        let pools = Arc::new(Pools { plain, xa });

        if let Err(e) = self.connector.start(env).await {
            pools.shut_down();
            return Err(e.into());
        }

        let previous = self.pools.write().replace(pools);
        if let Some(previous) = previous {
            previous.shut_down();
        }

        tracing::info!(
            connector = %env.name,
            xa = self.supports_xa(),
            max = config.max_connections,
            "pooled connector started"
        );
        Ok(())
    }

    /// Shut down both pools and stop the wrapped connector.
    ///
    /// Connections still bound to transactions are released from the
    /// registry; each closes as soon as it has no leases left. Completion
    /// callbacks arriving afterwards are ignored.
    pub async fn stop(&self) {
        let pools = self.pools.write().take();
        let Some(pools) = pools else {
            return;
        };
        pools.shut_down();

        for (txn_id, handle) in self.registry.drain() {
            tracing::debug!(
                txn_id = %txn_id,
                connection_id = handle.id(),
                "releasing transaction connection at shutdown"
            );
            handle.mark_transaction_complete();
        }

        self.connector.stop().await;
        tracing::info!("pooled connector stopped");
    }

    /// Borrow a plain connection.
    pub async fn get_connection(&self, ctx: &ExecutionContext) -> Result<PooledConnection> {
        let pools = self.pools()?;
        let handle = pools.plain.obtain(ctx, None).await?;
        handle.lease();
        Ok(PooledConnection::new(handle))
    }

    /// Borrow an XA connection.
    ///
    /// With a transaction context, the first borrow for its identifier
    /// enlists a connection from the XA pool and registers a completion
    /// callback with the coordinator; every later borrow for the same
    /// identifier gets that connection with one more lease. If the
    /// coordinator rejects the callback, the new connection is closed and
    /// [`PoolError::TransactionRegistration`] is returned.
    pub async fn get_xa_connection(
        &self,
        ctx: &ExecutionContext,
        txn: Option<&TransactionContext>,
    ) -> Result<PooledConnection> {
        let pools = self.pools()?;
        let xa = pools.xa.as_ref().ok_or(PoolError::XaNotSupported)?;

        let Some(txn) = txn else {
            let handle = xa.obtain(ctx, None).await?;
            handle.lease();
            return Ok(PooledConnection::new(handle));
        };

        loop {
            match self.registry.lookup_or_reserve(txn.txn_id()) {
                Lookup::Bound(handle) => {
                    tracing::trace!(
                        txn_id = %txn.txn_id(),
                        connection_id = handle.id(),
                        "transaction already has a connection, reusing it"
                    );
                    return Ok(PooledConnection::new(handle));
                }
                Lookup::Pending(gate) => {
                    // Resolves once the enlisting borrower binds or gives up.
                    let _ = gate.acquire().await;
                }
                Lookup::Vacant(reservation) => {
                    return self.enlist(ctx, txn, xa, reservation).await;
                }
            }
        }
    }

    async fn enlist(
        &self,
        ctx: &ExecutionContext,
        txn: &TransactionContext,
        xa: &ConnectionPool,
        reservation: Reservation,
    ) -> Result<PooledConnection> {
        let txn_id = txn.txn_id();
        let handle = xa.obtain(ctx, Some(txn)).await?;
        handle.lease();
        handle.mark_transaction_bound();
        reservation.stage(&handle);

        let callback = RemovalCallback::new(txn_id.clone(), handle.clone(), self.registry.clone());
        if let Err(source) = txn.transaction().register_synchronization(Arc::new(callback)) {
            drop(reservation);
            handle.close(None);
            tracing::warn!(
                txn_id = %txn_id,
                connection_id = handle.id(),
                error = %source,
                "completion callback rejected, connection closed"
            );
            return Err(PoolError::TransactionRegistration {
                txn_id: txn_id.clone(),
                source,
            });
        }

        if !reservation.bind() {
            // Completed or shut down while enlisting.
            handle.mark_transaction_complete();
        }

        tracing::debug!(
            txn_id = %txn_id,
            connection_id = handle.id(),
            "obtained new connection for transaction"
        );
        Ok(PooledConnection::new(handle))
    }

    /// The transaction registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<TransactionRegistry> {
        &self.registry
    }

    /// The plain pool, once started.
    #[must_use]
    pub fn pool(&self) -> Option<ConnectionPool> {
        self.pools.read().as_ref().map(|pools| pools.plain.clone())
    }

    /// The XA pool, once started, if the connector is XA-capable.
    #[must_use]
    pub fn xa_pool(&self) -> Option<ConnectionPool> {
        self.pools.read().as_ref().and_then(|pools| pools.xa.clone())
    }

    /// Read-only statistics for observability tooling.
    #[must_use]
    pub fn stats(&self) -> ConnectorStats {
        let pools = self.pools.read().clone();
        ConnectorStats {
            plain: pools.as_ref().map(|pools| pools.plain.status()),
            xa: pools
                .as_ref()
                .and_then(|pools| pools.xa.as_ref().map(ConnectionPool::status)),
            transactions: self.registry.len(),
        }
    }

    fn pools(&self) -> Result<Arc<Pools>> {
        self.pools.read().clone().ok_or(PoolError::NotStarted)
    }
}

impl std::fmt::Debug for PooledConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnector")
            .field("xa", &self.supports_xa())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Statistics for a pooled connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectorStats {
    /// Plain pool status, once started.
    pub plain: Option<PoolStatus>,
    /// XA pool status, once started, if the connector is XA-capable.
    pub xa: Option<PoolStatus>,
    /// Transactions with a bound or enlisting connection.
    pub transactions: usize,
}

impl ConnectorStats {
    /// Connections checked out across both pools.
    #[must_use]
    pub fn active(&self) -> u32 {
        self.plain.map_or(0, |s| s.in_use) + self.xa.map_or(0, |s| s.in_use)
    }

    /// Idle connections across both pools.
    #[must_use]
    pub fn idle(&self) -> u32 {
        self.plain.map_or(0, |s| s.available) + self.xa.map_or(0, |s| s.available)
    }
}

/// Builder for a [`PooledConnector`] with an explicit configuration.
///
/// # Example
///
/// ```rust,ignore
/// let pooled = PooledConnector::builder(connector)
///     .max_connections(20)
///     .idle_timeout(Duration::from_secs(60))
///     .build();
/// ```
pub struct PooledConnectorBuilder {
    connector: Arc<dyn Connector>,
    pool_config: PoolConfig,
}

impl PooledConnectorBuilder {
    /// Create a builder with default pool settings.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            pool_config: PoolConfig::default(),
        }
    }

    /// Set the pool configuration.
    #[must_use]
    pub fn pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Set the maximum number of connections per pool.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.pool_config.max_connections = count;
        self
    }

    /// Set a separate maximum for the XA pool.
    #[must_use]
    pub fn xa_max_connections(mut self, count: u32) -> Self {
        self.pool_config.xa_max_connections = Some(count);
        self
    }

    /// Set the maximum wait on an exhausted pool.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.pool_config.connection_timeout = timeout;
        self
    }

    /// Set the idle time-to-live.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.pool_config.idle_timeout = timeout;
        self
    }

    /// Enable the background idle sweep.
    #[must_use]
    pub fn cleaning_interval(mut self, interval: std::time::Duration) -> Self {
        self.pool_config.cleaning_interval = Some(interval);
        self
    }

    /// Build the pooled connector. Configuration is validated on `start`.
    pub fn build(self) -> PooledConnector {
        PooledConnector::with_config(self.connector, self.pool_config)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_test::{assert_err, assert_ok};

    use super::*;

    struct Inert;

    #[async_trait::async_trait]
    impl Connector for Inert {
        async fn start(
            &self,
            _env: &ConnectorEnvironment,
        ) -> std::result::Result<(), vdb_connector::ConnectorError> {
            Ok(())
        }

        async fn stop(&self) {}

        async fn get_connection(
            &self,
            _ctx: &ExecutionContext,
        ) -> std::result::Result<Box<dyn vdb_connector::Connection>, vdb_connector::ConnectorError>
        {
            Err(vdb_connector::ConnectorError::Unavailable("inert".into()))
        }
    }

    #[test]
    fn test_builder_fluent() {
        let builder = PooledConnector::builder(Arc::new(Inert))
            .max_connections(50)
            .xa_max_connections(5)
            .connection_timeout(Duration::from_millis(200));

        assert_eq!(builder.pool_config.max_connections, 50);
        assert_eq!(builder.pool_config.xa_max_connections, Some(5));
        assert_eq!(
            builder.pool_config.connection_timeout,
            Duration::from_millis(200)
        );
    }

    #[tokio::test]
    async fn test_borrow_before_start_fails() {
        let pooled = PooledConnector::new(Arc::new(Inert));
        let err = assert_err!(pooled.get_connection(&ExecutionContext::new("r1")).await);
        assert!(matches!(err, PoolError::NotStarted));
        assert_eq!(pooled.stats().plain, None);
    }

    #[tokio::test]
    async fn test_plain_connector_has_no_xa_pool() {
        let pooled = PooledConnector::new(Arc::new(Inert));
        assert_ok!(pooled.start(&ConnectorEnvironment::new("inert")).await);

        assert!(pooled.pool().is_some());
        assert!(pooled.xa_pool().is_none());
        let err = assert_err!(
            pooled
                .get_xa_connection(&ExecutionContext::new("r1"), None)
                .await
        );
        assert!(matches!(err, PoolError::XaNotSupported));

        pooled.stop().await;
        assert!(pooled.pool().is_none());
    }

    #[tokio::test]
    async fn test_start_rejects_bad_properties() {
        let pooled = PooledConnector::new(Arc::new(Inert));
        let env = ConnectorEnvironment::new("inert").property("MaxConnections", "0");
        let err = assert_err!(pooled.start(&env).await);
        assert!(matches!(err, PoolError::Configuration(_)));
        assert!(pooled.pool().is_none());
    }
}
