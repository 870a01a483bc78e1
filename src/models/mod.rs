//! Domain models for the record cache

pub mod record;

pub use record::{Record, RecordId};
