//! Pool configuration.

use std::collections::HashMap;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::PoolError;

/// Property key for the maximum number of connections per pool.
pub const MAX_CONNECTIONS: &str = "MaxConnections";
/// Property key for a separate maximum for the XA pool.
pub const XA_MAX_CONNECTIONS: &str = "XaMaxConnections";
/// Property key for the idle time-to-live, in milliseconds.
pub const LIVE_AND_UNUSED_TIME: &str = "LiveAndUnusedTime";
/// Property key for the maximum borrow wait, in milliseconds.
pub const WAIT_FOR_SOURCE_TIME: &str = "WaitForSourceTime";
/// Property key for the background sweep interval, in milliseconds (0 disables).
pub const CLEANING_INTERVAL: &str = "CleaningInterval";

/// Configuration shared by the plain and XA pools of one connector.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfig {
    /// Maximum number of outstanding connections per pool.
    pub max_connections: u32,

    /// Maximum for the XA pool, when it differs from `max_connections`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub xa_max_connections: Option<u32>,

    /// How long a connection may sit idle before it is discarded.
    pub idle_timeout: Duration,

    /// How long a borrower waits on an exhausted pool.
    ///
    /// Zero means fail fast without waiting.
    pub connection_timeout: Duration,

    /// Interval of the background idle sweep. `None` relies on eviction at
    /// borrow time only.
    #[cfg_attr(feature = "serde", serde(default))]
    pub cleaning_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            xa_max_connections: None,
            idle_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(30),
            cleaning_interval: None,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from connector properties.
    ///
    /// Keys are matched case-insensitively. Durations are milliseconds.
    /// Unknown keys are ignored.
    pub fn from_properties(properties: &HashMap<String, String>) -> Result<Self, PoolError> {
        let mut config = Self::default();

        for (key, value) in properties {
            let value = value.trim();
            let lower = key.trim().to_ascii_lowercase();

            if lower == MAX_CONNECTIONS.to_ascii_lowercase() {
                config.max_connections = parse_count(key, value)?;
            } else if lower == XA_MAX_CONNECTIONS.to_ascii_lowercase() {
                config.xa_max_connections = Some(parse_count(key, value)?);
            } else if lower == LIVE_AND_UNUSED_TIME.to_ascii_lowercase() {
                config.idle_timeout = parse_millis(key, value)?;
            } else if lower == WAIT_FOR_SOURCE_TIME.to_ascii_lowercase() {
                config.connection_timeout = parse_millis(key, value)?;
            } else if lower == CLEANING_INTERVAL.to_ascii_lowercase() {
                let interval = parse_millis(key, value)?;
                config.cleaning_interval = (!interval.is_zero()).then_some(interval);
            } else {
                tracing::debug!(key = %key, "ignoring unrecognized pool property");
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the maximum number of connections.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.max_connections = count;
        self
    }

    /// Set a separate maximum for the XA pool.
    #[must_use]
    pub fn xa_max_connections(mut self, count: u32) -> Self {
        self.xa_max_connections = Some(count);
        self
    }

    /// Set the idle time-to-live.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum wait on an exhausted pool.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Enable the background idle sweep.
    #[must_use]
    pub fn cleaning_interval(mut self, interval: Duration) -> Self {
        self.cleaning_interval = Some(interval);
        self
    }

    /// Maximum size for the plain or XA pool.
    #[must_use]
    pub fn max_for(&self, xa: bool) -> u32 {
        if xa {
            self.xa_max_connections.unwrap_or(self.max_connections)
        } else {
            self.max_connections
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_connections == 0 {
            return Err(PoolError::Configuration(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.xa_max_connections == Some(0) {
            return Err(PoolError::Configuration(
                "xa_max_connections must be greater than 0".into(),
            ));
        }
        if self.cleaning_interval.is_some_and(|i| i.is_zero()) {
            return Err(PoolError::Configuration(
                "cleaning_interval must be greater than 0 when set".into(),
            ));
        }
        Ok(())
    }
}

fn parse_count(key: &str, value: &str) -> Result<u32, PoolError> {
    let count: i64 = value
        .parse()
        .map_err(|_| PoolError::Configuration(format!("invalid {key}: {value}")))?;
    if count <= 0 {
        return Err(PoolError::Configuration(format!(
            "{key} must be positive, got {count}"
        )));
    }
    u32::try_from(count).map_err(|_| PoolError::Configuration(format!("{key} too large: {count}")))
}

fn parse_millis(key: &str, value: &str) -> Result<Duration, PoolError> {
    let millis: i64 = value
        .parse()
        .map_err(|_| PoolError::Configuration(format!("invalid {key}: {value}")))?;
    if millis < 0 {
        return Err(PoolError::Configuration(format!(
            "{key} must not be negative, got {millis}"
        )));
    }
    Ok(Duration::from_millis(millis.unsigned_abs()))
}
