//! Connector capability traits.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::connection::Connection;
use crate::context::ExecutionContext;
use crate::error::ConnectorError;
use crate::transaction::TransactionContext;

/// Environment handed to a connector when it starts.
#[derive(Debug, Clone, Default)]
pub struct ConnectorEnvironment {
    /// Connector binding name (used in logs and error messages).
    pub name: String,

    /// Connector properties, as configured for the binding.
    pub properties: HashMap<String, String>,
}

impl ConnectorEnvironment {
    /// Create an environment with no properties.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
        }
    }

    /// Add a property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Look up a property by key.
    ///
    /// Keys are matched case-insensitively, as pool configuration reads them.
    /// An exact match wins over one differing only in case.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .or_else(|| {
                self.properties
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}

/// A data-source adapter.
///
/// Connectors are shared behind `Arc<dyn Connector>` and called from many
/// tasks at once.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Start the connector.
    async fn start(&self, env: &ConnectorEnvironment) -> Result<(), ConnectorError>;

    /// Stop the connector.
    async fn stop(&self);

    /// Create a new physical connection.
    ///
    /// May perform network I/O.
    async fn get_connection(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<Box<dyn Connection>, ConnectorError>;

    /// Downcast to the XA capability, if this connector has it.
    fn as_xa(&self) -> Option<&dyn XaConnector> {
        None
    }
}

/// A connector whose connections can enlist in distributed transactions.
#[async_trait]
pub trait XaConnector: Connector {
    /// Create a new physical connection whose
    /// [`xa_resource`](Connection::xa_resource) is available.
    ///
    /// `txn` is the transaction the connection will first be used under, if
    /// any.
    async fn get_xa_connection(
        &self,
        ctx: &ExecutionContext,
        txn: Option<&TransactionContext>,
    ) -> Result<Box<dyn Connection>, ConnectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_properties() {
        let env = ConnectorEnvironment::new("xml")
            .property("MaxConnections", "5")
            .property("WaitForSourceTime", "200");

        assert_eq!(env.name, "xml");
        assert_eq!(env.get("MaxConnections"), Some("5"));
        assert_eq!(env.get("missing"), None);
    }

    #[test]
    fn test_environment_keys_ignore_case() {
        let env = ConnectorEnvironment::new("xml")
            .property("maxconnections", "5")
            .property("WaitForSourceTime", "200")
            .property("waitforsourcetime", "300");

        assert_eq!(env.get("MaxConnections"), Some("5"));
        assert_eq!(env.get("MAXCONNECTIONS"), Some("5"));
        assert_eq!(env.get("WaitForSourceTime"), Some("200"));
        assert_eq!(env.get("waitforsourcetime"), Some("300"));
    }
}
