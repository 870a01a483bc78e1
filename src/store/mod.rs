//! Store Module
//!
//! Key-value store backends behind a common connection contract.

mod connection;
mod memory;
mod redis;
mod stats;

pub use connection::{Connector, StoreConnection};
pub use memory::{MemoryConnection, MemoryConnector, MemoryStore};
pub use self::redis::{RedisConnection, RedisConnector};
pub use stats::StoreStats;
