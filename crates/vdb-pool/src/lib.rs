//! # vdb-pool
//!
//! Transaction-aware connection pooling for vdb connectors.
//!
//! Unlike a generic connection pool, this layer understands distributed
//! transactions: every borrow made under one global transaction identifier
//! observes the same physical connection, and that connection is released
//! exactly once, after the coordinator reports the transaction complete.
//!
//! ## Features
//!
//! - Separate plain and XA pools per connector
//! - Bounded pool size with a configurable borrow wait
//! - Idle time-to-live, checked at borrow time and by an optional sweep task
//! - Transaction affinity through a per-connector transaction registry
//! - Lease counting so several call sites can share one connection
//! - Pool status and metrics for observability
//!
//! ## Example
//!
//! ```rust,ignore
//! use vdb_pool::{PoolConfig, PooledConnector};
//! use std::time::Duration;
//!
//! let pooled = PooledConnector::builder(connector)
//!     .max_connections(20)
//!     .idle_timeout(Duration::from_secs(60))
//!     .connection_timeout(Duration::from_secs(30))
//!     .build();
//! pooled.start(&env).await?;
//!
//! // Plain borrow; the lease is released on drop.
//! let conn = pooled.get_connection(&ctx).await?;
//!
//! // Transactional borrow; bound to `txn` until it completes.
//! let xa = pooled.get_xa_connection(&ctx, Some(&txn)).await?;
//!
//! let stats = pooled.stats();
//! println!("active: {}, idle: {}", stats.active(), stats.idle());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connector;
pub mod error;
pub mod handle;
pub mod pool;
pub mod registry;

// Configuration
pub use config::PoolConfig;

// Error types
pub use error::{PoolError, Result};

// Pooling orchestrator
pub use connector::{ConnectorStats, PooledConnector, PooledConnectorBuilder};

// Pool types
pub use handle::{ConnectionHandle, PooledConnection};
pub use pool::{ConnectionPool, PoolId, PoolKind, PoolMetrics, PoolStatus};

// Transaction affinity
pub use registry::{RemovalCallback, TransactionRegistry};
