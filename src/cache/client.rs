//! Cache Store Client Module
//!
//! String-level access to the key-value store. Every call leases its own
//! connection from the pool and is bounded by the operation timeout.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::error::{CacheError, Result};
use crate::pool::{Pool, PooledConnection, PoolStatus};
use crate::store::{Connector, StoreConnection};

// == Cache Client ==
/// Pooled client exposing GET, MGET, SET, DEL, FLUSHDB and pipelined SET.
pub struct CacheClient<C: Connector> {
    pool: Pool<C>,
    op_timeout: Duration,
}

impl<C: Connector> Clone for CacheClient<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            op_timeout: self.op_timeout,
        }
    }
}

impl<C: Connector> CacheClient<C> {
    // == Constructor ==
    /// Creates a client over a pool.
    ///
    /// # Arguments
    /// * `pool` - Connection pool to lease from
    /// * `op_timeout` - Upper bound for one store call or one pipelined batch
    pub fn new(pool: Pool<C>, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    // == Get ==
    /// Returns the value stored under `key`, or `None` if absent.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        debug!("Looking up key [{}]", key);
        let mut conn = self.pool.get().await?;
        let result = self.bounded("GET", conn.get(key)).await;
        settle(&mut conn, result)
    }

    // == Multi Get ==
    /// Returns one slot per key, in ascending key order.
    ///
    /// Missing keys yield `None` in place; the result always has `keys.len()`
    /// entries.
    pub async fn mget(&self, keys: &BTreeSet<String>) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Looking up {} keys", keys.len());
        let ordered: Vec<String> = keys.iter().cloned().collect();
        let mut conn = self.pool.get().await?;
        let result = self.bounded("MGET", conn.mget(&ordered)).await;
        let values = settle(&mut conn, result)?;

        if values.len() != ordered.len() {
            return Err(CacheError::Command(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                ordered.len()
            )));
        }
        Ok(values)
    }

    // == Set ==
    /// Stores `value` under `key`, overwriting any previous value.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let result = self.bounded("SET", conn.set(key, value)).await;
        settle(&mut conn, result)?;
        debug!("Key [{}] stored", key);
        Ok(())
    }

    // == Delete ==
    /// Removes `key`. Returns 1 if it was present, 0 otherwise.
    pub async fn del(&self, key: &str) -> Result<u64> {
        let keys = [key.to_string()];
        let mut conn = self.pool.get().await?;
        let result = self.bounded("DEL", conn.del(&keys)).await;
        settle(&mut conn, result)
    }

    // == Multi Delete ==
    /// Removes every key. Returns how many were present.
    pub async fn mdel(&self, keys: &BTreeSet<String>) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let ordered: Vec<String> = keys.iter().cloned().collect();
        let mut conn = self.pool.get().await?;
        let result = self.bounded("DEL", conn.del(&ordered)).await;
        let removed = settle(&mut conn, result)?;
        debug!("Removed {} of {} keys", removed, ordered.len());
        Ok(removed)
    }

    // == Flush All ==
    /// Empties the whole store database.
    ///
    /// This is NOT limited to one key namespace: every key in the database is
    /// removed, including keys written by other applications sharing it. Use
    /// [`scan_delete`](Self::scan_delete) to clear a single namespace.
    pub async fn flush_all(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let result = self.bounded("FLUSHDB", conn.flush_db()).await;
        settle(&mut conn, result)?;
        info!("Store database flushed");
        Ok(())
    }

    // == Scan Delete ==
    /// Removes every key matching a glob pattern. Returns how many were removed.
    ///
    /// Keys written concurrently with the scan may survive.
    pub async fn scan_delete(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.pool.get().await?;
        let result = self.bounded("SCAN", conn.scan_match(pattern)).await;
        let keys = settle(&mut conn, result)?;

        if keys.is_empty() {
            return Ok(0);
        }

        let result = self.bounded("DEL", conn.del(&keys)).await;
        let removed = settle(&mut conn, result)?;
        debug!("Removed {} keys matching [{}]", removed, pattern);
        Ok(removed)
    }

    // == Bulk Set ==
    /// Writes every entry over one connection in a single pipelined round trip.
    ///
    /// Blocks until the store acknowledges the whole batch. This is not a
    /// transaction: if the batch fails, any subset of the writes may have
    /// been applied.
    pub async fn bulk_set(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.get().await?;
        debug!("Queueing {} writes on one pipeline", entries.len());
        let result = self.bounded("PIPELINE", conn.pipelined_set(entries)).await;

        if let Err(e) = &result {
            error!("Pipelined write of {} entries failed: {}", entries.len(), e);
        }
        settle(&mut conn, result)
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.op_timeout, call)
            .await
            .map_err(|_| CacheError::StoreTimeout {
                op,
                after: self.op_timeout,
            })?
    }
}

/// Marks the connection broken when the call left it in an unknown state.
fn settle<C: Connector, T>(conn: &mut PooledConnection<C>, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.is_connection_fault() {
            conn.mark_broken();
        }
    }
    result
}
