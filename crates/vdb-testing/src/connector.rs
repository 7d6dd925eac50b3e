//! Mock connector and connections.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use vdb_connector::{
    Connection, Connector, ConnectorEnvironment, ConnectorError, ExecutionContext,
    TransactionContext, TransactionError, TransactionId, XaConnector, XaResource, XaVote,
};
use vdb_pool::{PoolConfig, PoolError, PooledConnector};

#[derive(Debug, Default)]
struct Counters {
    created: AtomicUsize,
    closed: AtomicUsize,
    open: AtomicUsize,
    peak_open: AtomicUsize,
    /// Open and peak open, per origin: `[plain, xa]`.
    open_by_origin: [AtomicUsize; 2],
    peak_by_origin: [AtomicUsize; 2],
}

impl Counters {
    fn record_open(&self, origin: Origin) {
        self.created.fetch_add(1, Ordering::SeqCst);
        let open = self.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_open.fetch_max(open, Ordering::SeqCst);
        let i = origin as usize;
        let open = self.open_by_origin[i].fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_by_origin[i].fetch_max(open, Ordering::SeqCst);
    }

    fn record_close(&self, origin: Origin) {
        self.open.fetch_sub(1, Ordering::SeqCst);
        self.open_by_origin[origin as usize].fetch_sub(1, Ordering::SeqCst);
    }
}

/// Which factory method created a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Plain = 0,
    Xa = 1,
}

/// A connector that creates [`MockConnection`]s and counts them.
#[derive(Debug)]
pub struct MockConnector {
    name: String,
    xa: bool,
    counters: Arc<Counters>,
    next_id: AtomicU64,
    fail_connections: AtomicBool,
    connect_delay: Mutex<Duration>,
    started: AtomicBool,
    /// Liveness flags of every connection created, in creation order.
    liveness: Mutex<Vec<Arc<AtomicBool>>>,
    xa_resources: Mutex<Vec<Arc<MockXaResource>>>,
    /// Transactions XA connections were created under, in order.
    enlisted: Mutex<Vec<Option<TransactionId>>>,
}

impl MockConnector {
    fn new(name: &str, xa: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            xa,
            counters: Arc::new(Counters::default()),
            next_id: AtomicU64::new(1),
            fail_connections: AtomicBool::new(false),
            connect_delay: Mutex::new(Duration::ZERO),
            started: AtomicBool::new(false),
            liveness: Mutex::new(Vec::new()),
            xa_resources: Mutex::new(Vec::new()),
            enlisted: Mutex::new(Vec::new()),
        })
    }

    /// A connector without XA support.
    #[must_use]
    pub fn plain() -> Arc<Self> {
        Self::new("mock", false)
    }

    /// An XA-capable connector.
    #[must_use]
    pub fn xa() -> Arc<Self> {
        Self::new("mock-xa", true)
    }

    /// Make every connection attempt wait before completing.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    /// Make connection attempts fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.fail_connections.store(failing, Ordering::SeqCst);
    }

    /// Environment naming this connector.
    #[must_use]
    pub fn environment(&self) -> ConnectorEnvironment {
        ConnectorEnvironment::new(self.name.clone())
    }

    /// Wrap this connector in a started [`PooledConnector`].
    pub async fn pooled(self: &Arc<Self>, config: PoolConfig) -> Result<PooledConnector, PoolError> {
        let pooled = PooledConnector::with_config(self.clone(), config);
        pooled.start(&self.environment()).await?;
        Ok(pooled)
    }

    /// Physical connections created.
    #[must_use]
    pub fn created(&self) -> usize {
        self.counters.created.load(Ordering::SeqCst)
    }

    /// Physical close calls.
    #[must_use]
    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    /// Physical connections currently open.
    #[must_use]
    pub fn open(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open physical connections.
    #[must_use]
    pub fn peak_open(&self) -> usize {
        self.counters.peak_open.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open connections created by
    /// `get_connection`.
    #[must_use]
    pub fn peak_open_plain(&self) -> usize {
        self.counters.peak_by_origin[Origin::Plain as usize].load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open connections created by
    /// `get_xa_connection`.
    #[must_use]
    pub fn peak_open_xa(&self) -> usize {
        self.counters.peak_by_origin[Origin::Xa as usize].load(Ordering::SeqCst)
    }

    /// Whether `start` has been called without a later `stop`.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Mark every connection created so far as dead.
    pub fn kill_all(&self) {
        for alive in self.liveness.lock().iter() {
            alive.store(false, Ordering::SeqCst);
        }
    }

    /// XA resources of the connections created so far.
    #[must_use]
    pub fn xa_resources(&self) -> Vec<Arc<MockXaResource>> {
        self.xa_resources.lock().clone()
    }

    /// Transactions XA connections were created under.
    #[must_use]
    pub fn enlisted(&self) -> Vec<Option<TransactionId>> {
        self.enlisted.lock().clone()
    }

    async fn connect(&self, origin: Origin) -> Result<MockConnection, ConnectorError> {
        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connections.load(Ordering::SeqCst) {
            return Err(ConnectorError::Unavailable(format!(
                "{} refused the connection",
                self.name
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.counters.record_open(origin);
        tracing::debug!(connector = %self.name, connection_id = id, "mock connection opened");

        let alive = Arc::new(AtomicBool::new(true));
        self.liveness.lock().push(alive.clone());
        let xa = self.xa.then(|| Arc::new(MockXaResource::default()));
        if let Some(xa) = &xa {
            self.xa_resources.lock().push(xa.clone());
        }

        Ok(MockConnection {
            id,
            counters: self.counters.clone(),
            origin,
            alive,
            closes: AtomicUsize::new(0),
            xa,
        })
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn start(&self, env: &ConnectorEnvironment) -> Result<(), ConnectorError> {
        tracing::debug!(connector = %env.name, "mock connector started");
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    async fn get_connection(
        &self,
        _ctx: &ExecutionContext,
    ) -> Result<Box<dyn Connection>, ConnectorError> {
        Ok(Box::new(self.connect(Origin::Plain).await?))
    }

    fn as_xa(&self) -> Option<&dyn XaConnector> {
        if self.xa {
            Some(self as &dyn XaConnector)
        } else {
            None
        }
    }
}

#[async_trait]
impl XaConnector for MockConnector {
    async fn get_xa_connection(
        &self,
        _ctx: &ExecutionContext,
        txn: Option<&TransactionContext>,
    ) -> Result<Box<dyn Connection>, ConnectorError> {
        let connection = self.connect(Origin::Xa).await?;
        self.enlisted
            .lock()
            .push(txn.map(|txn| txn.txn_id().clone()));
        Ok(Box::new(connection))
    }
}

/// A physical connection created by [`MockConnector`].
#[derive(Debug)]
pub struct MockConnection {
    id: u64,
    counters: Arc<Counters>,
    origin: Origin,
    alive: Arc<AtomicBool>,
    closes: AtomicUsize,
    xa: Option<Arc<MockXaResource>>,
}

impl Connection for MockConnection {
    fn close(&self) -> Result<(), ConnectorError> {
        if self.closes.fetch_add(1, Ordering::SeqCst) == 0 {
            self.counters.record_close(self.origin);
        } else {
            tracing::warn!(connection_id = self.id, "mock connection closed twice");
        }
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn xa_resource(&self) -> Option<&dyn XaResource> {
        self.xa.as_deref().map(|xa| xa as &dyn XaResource)
    }
}

/// Two-phase-commit resource that records the calls made on it.
#[derive(Debug, Default)]
pub struct MockXaResource {
    calls: Mutex<Vec<String>>,
}

impl MockXaResource {
    /// Calls made so far, as `"<op>:<txn>"`.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, op: &str, txn_id: &TransactionId) {
        self.calls.lock().push(format!("{op}:{txn_id}"));
    }
}

#[async_trait]
impl XaResource for MockXaResource {
    async fn start(&self, txn_id: &TransactionId) -> Result<(), TransactionError> {
        self.record("start", txn_id);
        Ok(())
    }

    async fn end(&self, txn_id: &TransactionId, _success: bool) -> Result<(), TransactionError> {
        self.record("end", txn_id);
        Ok(())
    }

    async fn prepare(&self, txn_id: &TransactionId) -> Result<XaVote, TransactionError> {
        self.record("prepare", txn_id);
        Ok(XaVote::Ok)
    }

    async fn commit(&self, txn_id: &TransactionId, _one_phase: bool) -> Result<(), TransactionError> {
        self.record("commit", txn_id);
        Ok(())
    }

    async fn rollback(&self, txn_id: &TransactionId) -> Result<(), TransactionError> {
        self.record("rollback", txn_id);
        Ok(())
    }
}
