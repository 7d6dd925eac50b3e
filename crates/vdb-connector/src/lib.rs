//! # vdb-connector
//!
//! Contracts between the vdb pooling layer and the data-source connectors it
//! wraps.
//!
//! A connector adapts one external data source. The pooling layer only needs
//! a small slice of it: lifecycle (`start`/`stop`) and connection acquisition.
//! Connectors that can enlist in distributed two-phase-commit transactions
//! additionally implement [`XaConnector`] and hand out connections that expose
//! an [`XaResource`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use vdb_connector::{Connector, ConnectorEnvironment, ExecutionContext};
//!
//! connector.start(&ConnectorEnvironment::new("xml-source")).await?;
//!
//! let ctx = ExecutionContext::new("req-1").with_user("alice");
//! let conn = connector.get_connection(&ctx).await?;
//! // Use connection...
//! conn.close()?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod connection;
pub mod connector;
pub mod context;
pub mod error;
pub mod transaction;

pub use connection::{Connection, XaResource, XaVote};
pub use connector::{Connector, ConnectorEnvironment, XaConnector};
pub use context::ExecutionContext;
pub use error::{ConnectorError, TransactionError};
pub use transaction::{
    Synchronization, Transaction, TransactionContext, TransactionId, TransactionOutcome,
};
