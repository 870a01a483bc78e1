//! Record Cache - A cache-aside layer over a key-value store
//!
//! Mirrors records from a source store into Redis (or an in-memory store)
//! through explicit write-through, bulk population and invalidation.

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod pool;
pub mod source;
pub mod store;
pub mod tasks;

pub use cache::{CacheClient, CacheService, KeyScheme};
pub use config::Config;
pub use error::{CacheError, Result};
pub use models::{Record, RecordId};
pub use pool::Pool;
pub use source::{InMemorySource, SourceStore};
pub use tasks::spawn_pool_maintenance_task;
