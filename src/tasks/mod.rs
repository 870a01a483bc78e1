//! Background Tasks Module
//!
//! Contains background tasks that run periodically while the cache is in use.
//!
//! # Tasks
//! - Pool maintenance: evicts dead idle connections and restores `min_idle`

mod maintenance;

pub use maintenance::spawn_pool_maintenance_task;
