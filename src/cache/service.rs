//! Cache Service Module
//!
//! Record-level cache-aside operations built from the key scheme, the record
//! codec and the cache client.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{error, info, warn};

use crate::cache::{codec, CacheClient, KeyScheme};
use crate::error::Result;
use crate::models::{Record, RecordId};
use crate::pool::PoolStatus;
use crate::source::SourceStore;
use crate::store::Connector;

// == Cache Service ==
/// Mirrors records into the key-value store.
///
/// Single-record writes go through plain SET; only [`populate_from`]
/// (and [`warm_from`]) use pipelining.
///
/// [`populate_from`]: CacheService::populate_from
/// [`warm_from`]: CacheService::warm_from
pub struct CacheService<C: Connector> {
    client: CacheClient<C>,
    keys: KeyScheme,
}

impl<C: Connector> Clone for CacheService<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            keys: self.keys.clone(),
        }
    }
}

impl<C: Connector> CacheService<C> {
    // == Constructor ==
    pub fn new(client: CacheClient<C>, keys: KeyScheme) -> Self {
        Self { client, keys }
    }

    pub fn keys(&self) -> &KeyScheme {
        &self.keys
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.client.pool_status()
    }

    // == Fetch One ==
    /// Reads one record.
    ///
    /// Returns `None` if the key is absent or if the stored value cannot be
    /// decoded; a decode failure is logged, not returned.
    pub async fn fetch_one(&self, id: RecordId) -> Result<Option<Record>> {
        let key = self.keys.derive_key(id);
        info!("Fetching record with key [{}]", key);

        let Some(value) = self.client.get(&key).await? else {
            return Ok(None);
        };

        match codec::decode(&value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Dropping undecodable value for key [{}]: {}", key, e);
                Ok(None)
            }
        }
    }

    // == Fetch Many ==
    /// Reads several records in one round trip.
    ///
    /// Absent and undecodable entries are skipped, so the result may be
    /// shorter than `ids`. Records come back in key order.
    pub async fn fetch_many(&self, ids: &BTreeSet<RecordId>) -> Result<Vec<Record>> {
        info!("Fetching {} records", ids.len());
        let keys: BTreeSet<String> = ids.iter().map(|id| self.keys.derive_key(*id)).collect();
        let values = self.client.mget(&keys).await?;

        let records = keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| match codec::decode(value.as_deref()?) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Dropping undecodable value for key [{}]: {}", key, e);
                    None
                }
            })
            .collect();

        Ok(records)
    }

    // == Save ==
    /// Writes one record, overwriting any cached version.
    pub async fn save(&self, record: &Record) -> Result<()> {
        let key = self.keys.derive_key(record.id);
        let value = codec::encode(record)?;
        info!("Saving record with key [{}]", key);
        self.client.set(&key, &value).await
    }

    // == Remove One ==
    /// Removes one record. Returns whether a cached entry was removed.
    pub async fn remove_one(&self, id: RecordId) -> Result<bool> {
        let key = self.keys.derive_key(id);
        info!("Removing record with key [{}]", key);

        let removed = self.client.del(&key).await? > 0;
        if !removed {
            warn!("Key [{}] was not cached", key);
        }
        Ok(removed)
    }

    // == Remove Many ==
    /// Removes several records. Returns how many cached entries were removed.
    pub async fn remove_many(&self, ids: &BTreeSet<RecordId>) -> Result<u64> {
        info!("Removing {} records", ids.len());
        let keys: BTreeSet<String> = ids.iter().map(|id| self.keys.derive_key(*id)).collect();
        self.client.mdel(&keys).await
    }

    // == Invalidate All ==
    /// Flushes the entire store database.
    ///
    /// Also removes keys outside this service's namespace. Prefer
    /// [`invalidate_namespace`](Self::invalidate_namespace) when the database
    /// is shared.
    pub async fn invalidate_all(&self) -> Result<()> {
        warn!(
            "Flushing entire store database, including keys outside [{}]",
            self.keys.namespace()
        );
        self.client.flush_all().await
    }

    // == Invalidate Namespace ==
    /// Removes only this namespace's keys. Returns how many were removed.
    pub async fn invalidate_namespace(&self) -> Result<u64> {
        let pattern = self.keys.namespace_pattern();
        info!("Invalidating keys matching [{}]", pattern);
        self.client.scan_delete(&pattern).await
    }

    // == Populate From ==
    /// Writes every record through one pipelined batch.
    ///
    /// Every record is encoded before anything is sent; one unencodable record
    /// fails the whole call with nothing written. When ids repeat, the last
    /// record wins. Returns the number of distinct keys written.
    pub async fn populate_from(&self, records: &[Record]) -> Result<usize> {
        info!("Bulk loading {} records", records.len());

        let mut entries = BTreeMap::new();
        for record in records {
            entries.insert(self.keys.derive_key(record.id), codec::encode(record)?);
        }

        if let Err(e) = self.client.bulk_set(&entries).await {
            error!("Bulk load failed; cached state is indeterminate: {}", e);
            return Err(e);
        }

        info!("Cached {} records", entries.len());
        Ok(entries.len())
    }

    // == Warm From ==
    /// Loads every record from the source store and populates the cache.
    pub async fn warm_from(&self, source: &dyn SourceStore) -> Result<usize> {
        let records = source.fetch_all().await?;
        self.populate_from(&records).await
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheClient;
    use crate::config::PoolConfig;
    use crate::error::CacheError;
    use crate::pool::Pool;
    use crate::source::InMemorySource;
    use crate::store::MemoryConnector;
    use std::time::Duration;

    async fn test_service(connector: &MemoryConnector) -> CacheService<MemoryConnector> {
        let pool = Pool::new(connector.clone(), PoolConfig::default())
            .await
            .unwrap();
        let client = CacheClient::new(pool, Duration::from_secs(1));
        CacheService::new(client, KeyScheme::default())
    }

    fn ids(values: &[RecordId]) -> BTreeSet<RecordId> {
        values.iter().copied().collect()
    }

    #[tokio::test]
    async fn test_save_fetch_remove_widget() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;
        let widget = Record::new(7, "Widget", 19.99);

        service.save(&widget).await.unwrap();
        assert_eq!(service.fetch_one(7).await.unwrap(), Some(widget));

        assert!(service.remove_one(7).await.unwrap());
        assert_eq!(service.fetch_one(7).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_uses_namespaced_key() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;

        service.save(&Record::new(7, "Widget", 19.99)).await.unwrap();

        let store = connector.store();
        assert_eq!(
            store.write().await.get("product::7"),
            Some(r#"{"id":7,"name":"Widget","price":19.99}"#.to_string())
        );
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;

        service.save(&Record::new(0, "Product #0", 0.0)).await.unwrap();
        service.save(&Record::new(0, "Product 000", 100.0)).await.unwrap();

        let record = service.fetch_one(0).await.unwrap().unwrap();
        assert_eq!(record.name, "Product 000");
        assert_eq!(record.price, 100.0);
    }

    #[tokio::test]
    async fn test_save_propagates_encode_error() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;

        let result = service.save(&Record::new(1, "Bad", f64::NAN)).await;
        assert!(matches!(result, Err(CacheError::Encode { id: 1, .. })));
        assert!(connector.store().read().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_one_twice() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;

        service.save(&Record::new(3, "Thing", 1.0)).await.unwrap();
        assert!(service.remove_one(3).await.unwrap());
        assert!(!service.remove_one(3).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_one_drops_malformed_value() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;

        connector
            .store()
            .write()
            .await
            .set("product::5".to_string(), "{\"id\":5,".to_string());

        assert_eq!(service.fetch_one(5).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_many_skips_misses_and_corruption() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;

        service
            .populate_from(&[
                Record::new(1, "One", 1.0),
                Record::new(2, "Two", 2.0),
                Record::new(3, "Three", 3.0),
            ])
            .await
            .unwrap();
        connector
            .store()
            .write()
            .await
            .set("product::3".to_string(), "garbage".to_string());

        let records = service.fetch_many(&ids(&[1, 2, 3, 999])).await.unwrap();
        let found: Vec<RecordId> = records.iter().map(|r| r.id).collect();
        assert_eq!(found, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_fetch_many_empty_ids() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;

        assert!(service.fetch_many(&BTreeSet::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_many_counts_present_entries() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;

        service
            .populate_from(&[Record::new(1, "One", 1.0), Record::new(2, "Two", 2.0)])
            .await
            .unwrap();

        assert_eq!(service.remove_many(&ids(&[1, 2, 3])).await.unwrap(), 2);
        assert!(service.fetch_many(&ids(&[1, 2])).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_populate_from_last_duplicate_wins() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;

        let written = service
            .populate_from(&[Record::new(1, "Old", 1.0), Record::new(1, "New", 2.0)])
            .await
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(service.fetch_one(1).await.unwrap().unwrap().name, "New");
    }

    #[tokio::test]
    async fn test_populate_from_encode_error_writes_nothing() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;

        let result = service
            .populate_from(&[Record::new(1, "Fine", 1.0), Record::new(2, "Bad", f64::INFINITY)])
            .await;

        assert!(matches!(result, Err(CacheError::Encode { id: 2, .. })));
        assert!(connector.store().read().await.is_empty());
    }

    #[tokio::test]
    async fn test_populate_from_pipeline_failure_propagates() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;
        connector.fail_pipeline_after(Some(1));

        let records: Vec<Record> = (0..5).map(|i| Record::new(i, "R", 1.0)).collect();
        let result = service.populate_from(&records).await;

        assert!(matches!(result, Err(CacheError::StoreUnavailable(_))));
        assert_eq!(service.pool_status().leased, 0);
    }

    #[tokio::test]
    async fn test_invalidate_all_flushes_foreign_keys() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;

        service.save(&Record::new(1, "One", 1.0)).await.unwrap();
        connector
            .store()
            .write()
            .await
            .set("session::abc".to_string(), "x".to_string());

        service.invalidate_all().await.unwrap();

        assert_eq!(service.fetch_one(1).await.unwrap(), None);
        assert!(connector.store().read().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_namespace_keeps_foreign_keys() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;

        service
            .populate_from(&[Record::new(1, "One", 1.0), Record::new(2, "Two", 2.0)])
            .await
            .unwrap();
        connector
            .store()
            .write()
            .await
            .set("session::abc".to_string(), "x".to_string());

        assert_eq!(service.invalidate_namespace().await.unwrap(), 2);
        assert_eq!(service.fetch_one(1).await.unwrap(), None);
        assert_eq!(connector.store().read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_warm_from_source() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;
        let source = InMemorySource::synthetic(100);

        assert_eq!(service.warm_from(&source).await.unwrap(), 100);

        let record = service.fetch_one(42).await.unwrap().unwrap();
        assert_eq!(record, Record::new(42, "Product #42", 42_000.0));
    }

    #[tokio::test]
    async fn test_store_errors_propagate_from_reads() {
        let connector = MemoryConnector::new();
        let service = test_service(&connector).await;
        connector.set_refuse_connections(true);

        assert!(matches!(
            service.fetch_one(1).await,
            Err(CacheError::StoreUnavailable(_))
        ));
        assert!(matches!(
            service.fetch_many(&ids(&[1, 2])).await,
            Err(CacheError::StoreUnavailable(_))
        ));
    }
}
