//! Caller execution context.

use std::collections::HashMap;

/// Caller and security context for one request.
///
/// Opaque to the pooling layer: it is passed through to the connector
/// unmodified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Identifier of the request being served.
    pub request_id: String,

    /// Authenticated user, if any. `None` for administrative work.
    pub user: Option<String>,

    /// Name of the virtual database the request runs against.
    pub vdb_name: Option<String>,

    /// Free-form properties for the connector.
    pub properties: HashMap<String, String>,
}

impl ExecutionContext {
    /// Create a context for the given request.
    #[must_use]
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }

    /// Set the user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the virtual database name.
    #[must_use]
    pub fn with_vdb(mut self, vdb_name: impl Into<String>) -> Self {
        self.vdb_name = Some(vdb_name.into());
        self
    }

    /// Add a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}
