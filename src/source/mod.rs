//! Source Store Module
//!
//! The authoritative record set the cache is populated from.

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::models::{Record, RecordId};

/// Read-only access to the system of record.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Returns every record.
    async fn fetch_all(&self) -> Result<Vec<Record>>;
}

// == In-Memory Source ==
/// A fixed, in-memory list of records.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    records: Vec<Record>,
}

impl InMemorySource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Builds `count` records: id `i`, name `Product #i`, price `i * 1000`.
    pub fn synthetic(count: usize) -> Self {
        let records = (0..count as RecordId)
            .map(|i| Record::new(i, format!("Product #{}", i), (i * 1000) as f64))
            .collect();
        info!("Source populated with {} records", count);
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl SourceStore for InMemorySource {
    async fn fetch_all(&self) -> Result<Vec<Record>> {
        info!("Loading all records from source ({} found)", self.records.len());
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_synthetic_source() {
        let source = InMemorySource::synthetic(100);
        let records = source.fetch_all().await.unwrap();

        assert_eq!(records.len(), 100);
        assert_eq!(records[0], Record::new(0, "Product #0", 0.0));
        assert_eq!(records[99], Record::new(99, "Product #99", 99_000.0));
    }

    #[tokio::test]
    async fn test_custom_source() {
        let source = InMemorySource::new(vec![Record::new(7, "Widget", 19.99)]);
        assert_eq!(source.len(), 1);
        assert_eq!(source.fetch_all().await.unwrap()[0].name, "Widget");
    }

    #[test]
    fn test_empty_source() {
        assert!(InMemorySource::default().is_empty());
    }
}
