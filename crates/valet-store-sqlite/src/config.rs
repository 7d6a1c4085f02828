//! Configuration for the SQLite connection pool

use std::time::Duration;

/// Configuration for the SQLite connection pool
///
/// # Example
/// ```
/// use valet_store_sqlite::SqliteStoreConfig;
/// use std::time::Duration;
///
/// let config = SqliteStoreConfig::default()
///     .with_max_connections(8)
///     .with_busy_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// How long a statement waits on a locked database before failing
    pub busy_timeout: Duration,

    /// Timeout for acquiring a connection from the pool
    pub acquire_timeout: Duration,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

impl SqliteStoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}
