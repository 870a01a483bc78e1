//! Configuration Module
//!
//! Handles loading store, pool and cache configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CacheError, Result};

/// Connection parameters for the key-value store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store host name
    pub host: String,
    /// Store port
    pub port: u16,
    /// Logical database index
    pub db: i64,
    /// Optional password for AUTH
    pub password: Option<String>,
    /// Timeout for establishing a connection
    pub connect_timeout: Duration,
    /// Timeout for a single store call (or one pipelined batch)
    pub op_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
            connect_timeout: Duration::from_millis(2000),
            op_timeout: Duration::from_millis(2000),
        }
    }
}

/// Connection pool limits.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Upper bound on concurrently leased connections
    pub max_total: usize,
    /// Upper bound on the idle reserve
    pub max_idle: usize,
    /// Idle connections kept open proactively
    pub min_idle: usize,
    /// Validate an idle connection with PING before handing it out
    pub test_on_borrow: bool,
    /// How long `get` waits for a free slot before failing
    pub max_wait: Duration,
    /// Upper bound for the PING that validates an idle connection
    pub validation_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: 10,
            max_idle: 5,
            min_idle: 1,
            test_on_borrow: true,
            max_wait: Duration::from_millis(2000),
            validation_timeout: Duration::from_millis(2000),
        }
    }
}

impl PoolConfig {
    /// Checks the limits are consistent with each other.
    pub fn validate(&self) -> Result<()> {
        if self.max_total == 0 {
            return Err(CacheError::InvalidConfig(
                "max_total must be at least 1".to_string(),
            ));
        }
        if self.max_idle > self.max_total {
            return Err(CacheError::InvalidConfig(format!(
                "max_idle ({}) exceeds max_total ({})",
                self.max_idle, self.max_total
            )));
        }
        if self.min_idle > self.max_idle {
            return Err(CacheError::InvalidConfig(format!(
                "min_idle ({}) exceeds max_idle ({})",
                self.min_idle, self.max_idle
            )));
        }
        Ok(())
    }
}

/// Process configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Store connection parameters
    pub store: StoreConfig,
    /// Pool limits
    pub pool: PoolConfig,
    /// Key namespace for records
    pub namespace: String,
    /// Pool maintenance task interval in seconds
    pub maintenance_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `REDIS_HOST` - Store host (default: localhost)
    /// - `REDIS_PORT` - Store port (default: 6379)
    /// - `REDIS_DB` - Database index (default: 0)
    /// - `REDIS_PASSWORD` - Password (default: none)
    /// - `REDIS_TIMEOUT_MS` - Connect, operation and validation timeout (default: 2000)
    /// - `POOL_MAX_TOTAL` - Max leased connections (default: 10)
    /// - `POOL_MAX_IDLE` - Max idle connections (default: 5)
    /// - `POOL_MIN_IDLE` - Min idle connections (default: 1)
    /// - `POOL_TEST_ON_BORROW` - Validate on borrow (default: true)
    /// - `POOL_MAX_WAIT_MS` - Max wait for a connection (default: 2000)
    /// - `POOL_MAINTENANCE_INTERVAL` - Maintenance frequency in seconds (default: 30)
    /// - `CACHE_NAMESPACE` - Key namespace (default: product)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeout = env_parse("REDIS_TIMEOUT_MS").map(Duration::from_millis);

        Self {
            store: StoreConfig {
                host: env::var("REDIS_HOST").unwrap_or(defaults.store.host),
                port: env_parse("REDIS_PORT").unwrap_or(defaults.store.port),
                db: env_parse("REDIS_DB").unwrap_or(defaults.store.db),
                password: env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
                connect_timeout: timeout.unwrap_or(defaults.store.connect_timeout),
                op_timeout: timeout.unwrap_or(defaults.store.op_timeout),
            },
            pool: PoolConfig {
                max_total: env_parse("POOL_MAX_TOTAL").unwrap_or(defaults.pool.max_total),
                max_idle: env_parse("POOL_MAX_IDLE").unwrap_or(defaults.pool.max_idle),
                min_idle: env_parse("POOL_MIN_IDLE").unwrap_or(defaults.pool.min_idle),
                test_on_borrow: env_parse("POOL_TEST_ON_BORROW")
                    .unwrap_or(defaults.pool.test_on_borrow),
                max_wait: env_parse("POOL_MAX_WAIT_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.pool.max_wait),
                validation_timeout: timeout.unwrap_or(defaults.pool.validation_timeout),
            },
            namespace: env::var("CACHE_NAMESPACE").unwrap_or(defaults.namespace),
            maintenance_interval: env_parse("POOL_MAINTENANCE_INTERVAL")
                .unwrap_or(defaults.maintenance_interval),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            pool: PoolConfig::default(),
            namespace: "product".to_string(),
            maintenance_interval: 30,
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}
