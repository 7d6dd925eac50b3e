//! # vdb-testing
//!
//! Test infrastructure for the vdb pooling layer.
//!
//! - [`MockConnector`]: a plain or XA-capable connector that counts physical
//!   connection creations and closes, tracks the peak number of open
//!   connections, and can be told to fail or to connect slowly.
//! - [`MockTransaction`]: a transaction coordinator stand-in that records
//!   completion callbacks, can reject registration, and fires completion on
//!   demand.
//!
//! ## Example
//!
//! ```rust,ignore
//! use vdb_testing::{MockConnector, MockTransaction};
//!
//! let connector = MockConnector::xa();
//! let pooled = PooledConnector::builder(connector.clone()).build();
//! pooled.start(&connector.environment()).await?;
//!
//! let txn = MockTransaction::new("T1");
//! let conn = pooled.get_xa_connection(&ctx, Some(&txn.context())).await?;
//! drop(conn);
//! txn.complete(TransactionOutcome::Committed);
//! assert_eq!(connector.closed(), 1);
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connector;
pub mod transaction;

pub use connector::{MockConnection, MockConnector, MockXaResource};
pub use transaction::{MockTransaction, RegistrationMode};
