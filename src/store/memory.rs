//! In-Memory Store Module
//!
//! A HashMap-backed key-value store speaking the same connection contract as
//! Redis. Used for tests and offline runs, with fault injection so pool and
//! failure handling can be exercised without a server.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::RwLock;

use crate::error::{CacheError, Result};
use crate::store::{Connector, StoreConnection, StoreStats};

// == Memory Store ==
/// String-keyed, string-valued storage with activity statistics.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Key-value storage
    entries: HashMap<String, String>,
    /// Activity statistics
    stats: StoreStats,
}

impl MemoryStore {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Set ==
    /// Stores a key-value pair, overwriting any previous value.
    pub fn set(&mut self, key: String, value: String) {
        self.entries.insert(key, value);
        self.stats.record_write();
        self.stats.set_total_entries(self.entries.len());
    }

    // == Get ==
    /// Retrieves a value by key, recording a hit or a miss.
    pub fn get(&mut self, key: &str) -> Option<String> {
        match self.entries.get(key) {
            Some(value) => {
                self.stats.record_hit();
                Some(value.clone())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether it was present.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.stats.record_deletes(1);
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    // == Flush ==
    /// Removes every entry. Returns the number of entries removed.
    pub fn flush(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.stats.record_deletes(count as u64);
        self.stats.set_total_entries(0);
        count
    }

    // == Keys Matching ==
    /// Returns every key matching a glob pattern (`*` and `?` wildcards).
    pub fn keys_matching(&self, pattern: &str) -> Result<Vec<String>> {
        let regex = glob_regex(pattern)?;
        let mut keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| regex.is_match(key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    // == Stats ==
    pub fn stats(&self) -> StoreStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Translates a glob pattern (`*` and `?` wildcards) into an anchored regex.
fn glob_regex(pattern: &str) -> Result<Regex> {
    let mut translated = String::from("(?s)^");
    for c in pattern.chars() {
        match c {
            '*' => translated.push_str(".*"),
            '?' => translated.push('.'),
            _ => translated.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    translated.push('$');

    Regex::new(&translated).map_err(|e| CacheError::Command(format!("Invalid pattern: {}", e)))
}

// == Fault Injection ==
#[derive(Debug, Default)]
struct Faults {
    /// New connections are refused and existing ones fail
    refuse_connections: AtomicBool,
    /// Connections opened before the current generation are dead
    generation: AtomicU64,
    /// Pipelines fail after applying this many writes
    pipeline_fail_after: Mutex<Option<usize>>,
    /// Artificial latency added to every call, in milliseconds
    latency_ms: AtomicU64,
    /// Total connections opened
    connects: AtomicUsize,
}

// == Memory Connector ==
/// Opens connections to a shared [`MemoryStore`].
///
/// Clones share the same store and fault switches.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    store: Arc<RwLock<MemoryStore>>,
    faults: Arc<Faults>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the backing store.
    pub fn store(&self) -> Arc<RwLock<MemoryStore>> {
        self.store.clone()
    }

    /// Number of connections opened so far.
    pub fn connects(&self) -> usize {
        self.faults.connects.load(Ordering::SeqCst)
    }

    /// Makes the store unreachable (or reachable again).
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.faults.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Kills every connection opened so far; new connections work.
    pub fn drop_connections(&self) {
        self.faults.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Makes pipelines fail after applying `writes` entries. `None` clears it.
    pub fn fail_pipeline_after(&self, writes: Option<usize>) {
        *self
            .faults
            .pipeline_fail_after
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = writes;
    }

    /// Adds artificial latency to every store call.
    pub fn set_latency(&self, latency: Duration) {
        self.faults
            .latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection> {
        if self.faults.refuse_connections.load(Ordering::SeqCst) {
            return Err(CacheError::StoreUnavailable(
                "connection refused".to_string(),
            ));
        }

        self.faults.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            store: self.store.clone(),
            faults: self.faults.clone(),
            generation: self.faults.generation.load(Ordering::SeqCst),
        })
    }
}

// == Memory Connection ==
/// A connection handle to a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryConnection {
    store: Arc<RwLock<MemoryStore>>,
    faults: Arc<Faults>,
    generation: u64,
}

impl MemoryConnection {
    async fn check(&self) -> Result<()> {
        let latency = self.faults.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.faults.refuse_connections.load(Ordering::SeqCst) {
            return Err(CacheError::StoreUnavailable(
                "connection refused".to_string(),
            ));
        }
        if self.generation != self.faults.generation.load(Ordering::SeqCst) {
            return Err(CacheError::StoreUnavailable(
                "connection reset by peer".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.check().await?;
        Ok(self.store.write().await.get(key))
    }

    async fn mget(&mut self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.check().await?;
        let mut store = self.store.write().await;
        Ok(keys.iter().map(|key| store.get(key)).collect())
    }

    async fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.check().await?;
        self.store
            .write()
            .await
            .set(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&mut self, keys: &[String]) -> Result<u64> {
        self.check().await?;
        let mut store = self.store.write().await;
        Ok(keys.iter().filter(|key| store.delete(key)).count() as u64)
    }

    async fn flush_db(&mut self) -> Result<()> {
        self.check().await?;
        self.store.write().await.flush();
        Ok(())
    }

    async fn pipelined_set(&mut self, entries: &BTreeMap<String, String>) -> Result<()> {
        self.check().await?;
        let fail_after = *self
            .faults
            .pipeline_fail_after
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        let mut store = self.store.write().await;
        for (applied, (key, value)) in entries.iter().enumerate() {
            if fail_after == Some(applied) {
                return Err(CacheError::StoreUnavailable(format!(
                    "connection lost after {} of {} pipelined writes",
                    applied,
                    entries.len()
                )));
            }
            store.set(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn scan_match(&mut self, pattern: &str) -> Result<Vec<String>> {
        self.check().await?;
        self.store.read().await.keys_matching(pattern)
    }

    async fn ping(&mut self) -> Result<()> {
        self.check().await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_set_and_get() {
        let mut store = MemoryStore::new();

        store.set("key1".to_string(), "value1".to_string());
        assert_eq!(store.get("key1"), Some("value1".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("nonexistent"), None);
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_store_overwrite() {
        let mut store = MemoryStore::new();

        store.set("key1".to_string(), "value1".to_string());
        store.set("key1".to_string(), "value2".to_string());

        assert_eq!(store.get("key1"), Some("value2".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_delete() {
        let mut store = MemoryStore::new();

        store.set("key1".to_string(), "value1".to_string());
        assert!(store.delete("key1"));
        assert!(!store.delete("key1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_flush() {
        let mut store = MemoryStore::new();
        store.set("a".to_string(), "1".to_string());
        store.set("b".to_string(), "2".to_string());

        assert_eq!(store.flush(), 2);
        assert!(store.is_empty());
        assert_eq!(store.stats().deletes, 2);
    }

    #[test]
    fn test_store_stats() {
        let mut store = MemoryStore::new();

        store.set("key1".to_string(), "value1".to_string());
        store.get("key1"); // hit
        store.get("nonexistent"); // miss

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_keys_matching_prefix() {
        let mut store = MemoryStore::new();
        store.set("product::1".to_string(), "a".to_string());
        store.set("product::2".to_string(), "b".to_string());
        store.set("order::1".to_string(), "c".to_string());

        assert_eq!(
            store.keys_matching("product::*").unwrap(),
            vec!["product::1".to_string(), "product::2".to_string()]
        );
        assert_eq!(store.keys_matching("*").unwrap().len(), 3);
        assert_eq!(
            store.keys_matching("order::?").unwrap(),
            vec!["order::1".to_string()]
        );
    }

    #[test]
    fn test_glob_regex() {
        let matches = |pattern: &str, key: &str| glob_regex(pattern).unwrap().is_match(key);

        assert!(matches("*", ""));
        assert!(matches("a*c", "abbbc"));
        assert!(matches("a*b*c", "aXbYc"));
        assert!(matches("a*", "a\nb"));
        assert!(!matches("a*c", "abcd"));
        assert!(!matches("a?", "a"));
        assert!(!matches("product::*", "products::1"));
        assert!(!matches("a.c", "abc"), "regex metacharacters are literal");
        assert!(matches("a+(b)", "a+(b)"));
    }

    #[tokio::test]
    async fn test_connections_share_store() {
        let connector = MemoryConnector::new();
        let mut first = connector.connect().await.unwrap();
        let mut second = connector.connect().await.unwrap();

        first.set("k", "v").await.unwrap();
        assert_eq!(second.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(connector.connects(), 2);
    }

    #[tokio::test]
    async fn test_mget_preserves_slots() {
        let connector = MemoryConnector::new();
        let mut conn = connector.connect().await.unwrap();
        conn.set("a", "1").await.unwrap();
        conn.set("c", "3").await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let values = conn.mget(&keys).await.unwrap();
        assert_eq!(
            values,
            vec![Some("1".to_string()), None, Some("3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_refused_connections() {
        let connector = MemoryConnector::new();
        let mut conn = connector.connect().await.unwrap();

        connector.set_refuse_connections(true);
        assert!(matches!(
            connector.connect().await,
            Err(CacheError::StoreUnavailable(_))
        ));
        assert!(conn.ping().await.is_err());

        connector.set_refuse_connections(false);
        assert!(conn.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_connections_stay_dead() {
        let connector = MemoryConnector::new();
        let mut old = connector.connect().await.unwrap();

        connector.drop_connections();

        assert!(!connector.is_valid(&mut old).await);
        let mut fresh = connector.connect().await.unwrap();
        assert!(connector.is_valid(&mut fresh).await);
    }

    #[tokio::test]
    async fn test_pipeline_partial_failure() {
        let connector = MemoryConnector::new();
        let mut conn = connector.connect().await.unwrap();
        connector.fail_pipeline_after(Some(2));

        let entries: BTreeMap<String, String> = (0..5)
            .map(|i| (format!("k{}", i), i.to_string()))
            .collect();

        let result = conn.pipelined_set(&entries).await;
        assert!(matches!(result, Err(CacheError::StoreUnavailable(_))));
        assert_eq!(connector.store().read().await.len(), 2);
    }
}
