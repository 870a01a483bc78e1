//! Cache Module
//!
//! Key scheme, record codec, pooled store client and the record-level
//! cache-aside service built from them.

pub mod codec;
mod client;
mod key;
mod service;


// Re-export public types
pub use client::CacheClient;
pub use key::{KeyScheme, DEFAULT_NAMESPACE, KEY_SEPARATOR};
pub use service::CacheService;
