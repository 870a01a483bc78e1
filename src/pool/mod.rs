//! Connection Pool Module
//!
//! Bounded-wait pool of store connections built on `deadpool`.
//!
//! The deadpool pool bounds how many connections are leased at once
//! (`max_total`) and how long a caller waits for one (`max_wait`). This module
//! adds the idle reserve cap (`max_idle`), proactive `min_idle` connections and
//! bounded PING validation of idle connections.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use deadpool::managed::{self, Metrics, Object, PoolError, RecycleError, RecycleResult, TimeoutType};
use deadpool::Runtime;
use tracing::{debug, warn};

use crate::config::PoolConfig;
use crate::error::{CacheError, Result};
use crate::store::Connector;

// == Pool Status ==
/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Configured lease limit
    pub max_total: usize,
    /// Connections currently leased
    pub leased: usize,
    /// Connections waiting in the idle reserve
    pub idle: usize,
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Idle connections dropped because they failed validation
    pub evicted: usize,
    /// Connections opened to replace them or to restore `min_idle`
    pub opened: usize,
}

// == Connection Manager ==
/// Adapts a [`Connector`] to deadpool's object manager.
pub struct ConnectionManager<C: Connector> {
    connector: C,
    config: PoolConfig,
    /// Idle connections discarded by validation so far
    evicted: AtomicUsize,
}

impl<C: Connector> ConnectionManager<C> {
    fn new(connector: C, config: PoolConfig) -> Self {
        Self {
            connector,
            config,
            evicted: AtomicUsize::new(0),
        }
    }

    /// PINGs a connection, giving up after `validation_timeout`.
    async fn validate(&self, conn: &mut C::Connection) -> bool {
        let valid = matches!(
            tokio::time::timeout(
                self.config.validation_timeout,
                self.connector.is_valid(conn)
            )
            .await,
            Ok(true)
        );

        if !valid {
            self.evicted.fetch_add(1, Ordering::SeqCst);
            debug!("Discarding idle connection that failed validation");
        }
        valid
    }

    fn evicted(&self) -> usize {
        self.evicted.load(Ordering::SeqCst)
    }
}

impl<C: Connector> managed::Manager for ConnectionManager<C> {
    type Type = C::Connection;
    type Error = CacheError;

    async fn create(&self) -> Result<C::Connection> {
        let conn = self.connector.connect().await?;
        debug!("Opened new pooled connection");
        Ok(conn)
    }

    async fn recycle(&self, conn: &mut C::Connection, _: &Metrics) -> RecycleResult<CacheError> {
        if !self.config.test_on_borrow || self.validate(conn).await {
            Ok(())
        } else {
            Err(RecycleError::Message("connection failed validation".into()))
        }
    }
}

// == Pool ==
/// Shared handle to a connection pool. Clones refer to the same pool.
pub struct Pool<C: Connector> {
    inner: managed::Pool<ConnectionManager<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: Connector> fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("config", self.config())
            .field("status", &self.status())
            .finish()
    }
}

impl<C: Connector> Pool<C> {
    // == Constructor ==
    /// Creates a pool and opens `min_idle` connections.
    ///
    /// Only an invalid configuration fails construction. If the store cannot
    /// be reached yet, connections are opened on demand later.
    pub async fn new(connector: C, config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let max_total = config.max_total;
        let max_wait = config.max_wait;
        let inner: managed::Pool<ConnectionManager<C>> =
            managed::Pool::builder(ConnectionManager::new(connector, config))
                .max_size(max_total)
                .wait_timeout(Some(max_wait))
                .runtime(Runtime::Tokio1)
                .build()
                .map_err(|e| CacheError::InvalidConfig(format!("Failed to build pool: {}", e)))?;

        let pool = Self { inner };
        if let Err(e) = pool.fill_min_idle().await {
            warn!("Could not pre-open idle connections: {}", e);
        }

        Ok(pool)
    }

    // == Get ==
    /// Leases a connection, waiting at most `max_wait` for a free slot.
    ///
    /// With `test_on_borrow`, an idle connection is PINGed first and dropped if
    /// the PING fails or outlasts `validation_timeout`. The connection goes
    /// back to the pool when the returned guard is dropped.
    pub async fn get(&self) -> Result<PooledConnection<C>> {
        let conn = self.inner.get().await.map_err(|e| self.lease_error(e))?;
        Ok(PooledConnection {
            conn: Some(conn),
            pool: self.inner.clone(),
            broken: false,
        })
    }

    // == Maintain ==
    /// Evicts idle connections that fail validation, then restores `min_idle`.
    pub async fn maintain(&self) -> Result<MaintenanceReport> {
        let manager = self.inner.manager();
        let before = self.inner.status();
        let evicted_before = manager.evicted();

        // Leasing every idle connection at once passes each through validation
        let mut held = Vec::with_capacity(before.available);
        for _ in 0..before.available {
            let mut conn = self.get().await?;
            if !manager.config.test_on_borrow && !manager.validate(&mut conn).await {
                conn.mark_broken();
            }
            held.push(conn);
        }
        drop(held);

        self.fill_min_idle().await?;

        let evicted = manager.evicted() - evicted_before;
        let opened = (self.inner.status().size + evicted).saturating_sub(before.size);
        Ok(MaintenanceReport { evicted, opened })
    }

    // == Status ==
    pub fn status(&self) -> PoolStatus {
        let status = self.inner.status();
        PoolStatus {
            max_total: status.max_size,
            leased: status.size.saturating_sub(status.available),
            idle: status.available,
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.manager().config
    }

    /// Opens connections until `min_idle` are idle, never exceeding `max_total`
    /// open connections. Returns how many were opened.
    async fn fill_min_idle(&self) -> Result<usize> {
        let config = self.config();
        let status = self.status();
        if status.idle >= config.min_idle {
            return Ok(0);
        }

        let target = config.min_idle.min(config.max_total - status.leased);
        let size_before = self.inner.status().size;

        // Idle connections are reused first, so the rest must be opened
        let mut held = Vec::with_capacity(target);
        for _ in 0..target {
            held.push(self.get().await?);
        }
        drop(held);

        let opened = self.inner.status().size.saturating_sub(size_before);
        if opened > 0 {
            debug!("Opened {} idle connections", opened);
        }
        Ok(opened)
    }

    fn lease_error(&self, err: PoolError<CacheError>) -> CacheError {
        match err {
            PoolError::Backend(e) => e,
            PoolError::Timeout(TimeoutType::Wait) => {
                let max_wait = self.config().max_wait;
                warn!(
                    "No connection available after {:?} ({} leased)",
                    max_wait,
                    self.status().leased
                );
                CacheError::PoolExhausted(max_wait)
            }
            PoolError::Timeout(_) => CacheError::StoreTimeout {
                op: "CONNECT",
                after: self.config().validation_timeout,
            },
            PoolError::Closed => {
                CacheError::StoreUnavailable("connection pool is closed".to_string())
            }
            other => CacheError::StoreUnavailable(other.to_string()),
        }
    }
}

// == Pooled Connection ==
/// A leased connection. Returned to the pool on drop.
pub struct PooledConnection<C: Connector> {
    conn: Option<Object<ConnectionManager<C>>>,
    pool: managed::Pool<ConnectionManager<C>>,
    broken: bool,
}

impl<C: Connector> PooledConnection<C> {
    /// Discards the connection on release instead of returning it to the reserve.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_deref().expect("connection is present until drop")
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_deref_mut()
            .expect("connection is present until drop")
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        if self.broken {
            debug!("Discarding broken connection");
            drop(Object::take(conn));
            return;
        }

        // A full reserve closes the connection instead of keeping it
        if self.pool.status().available >= self.pool.manager().config.max_idle {
            drop(Object::take(conn));
        }
    }
}
