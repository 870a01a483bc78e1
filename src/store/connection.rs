//! Store Connection Traits
//!
//! The seam between the cache client and a concrete key-value store.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;

/// A single leased connection to a key-value store.
///
/// Values are opaque strings; the connection never sees domain records.
#[async_trait]
pub trait StoreConnection: Send + 'static {
    /// GET: returns `None` when the key is absent.
    async fn get(&mut self, key: &str) -> Result<Option<String>>;

    /// MGET: one slot per submitted key, in submission order.
    async fn mget(&mut self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// SET with upsert semantics.
    async fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// DEL: returns how many of the keys were present.
    async fn del(&mut self, keys: &[String]) -> Result<u64>;

    /// FLUSHDB: empties the whole database, not only one namespace.
    async fn flush_db(&mut self) -> Result<()>;

    /// Queues one SET per entry and flushes them in a single round trip.
    ///
    /// Returns once the store has acknowledged the whole batch. On failure the
    /// applied/unapplied status of individual writes is unknown.
    async fn pipelined_set(&mut self, entries: &BTreeMap<String, String>) -> Result<()>;

    /// Collects every key matching a glob pattern (SCAN MATCH).
    async fn scan_match(&mut self, pattern: &str) -> Result<Vec<String>>;

    /// Round-trip liveness check.
    async fn ping(&mut self) -> Result<()>;
}

/// Opens connections for the pool.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: StoreConnection;

    /// Establishes a new connection.
    async fn connect(&self) -> Result<Self::Connection>;

    /// Checks an idle connection before it is handed out again.
    async fn is_valid(&self, conn: &mut Self::Connection) -> bool {
        conn.ping().await.is_ok()
    }
}
