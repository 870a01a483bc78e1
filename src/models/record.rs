//! Record Model
//!
//! The domain record mirrored from the source store into the cache.

use serde::{Deserialize, Serialize};

/// Identifier of a record, unique within the source store.
pub type RecordId = i64;

/// A catalogue record.
///
/// Records are only ever replaced as a whole; there is no partial update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Record {
    /// Unique identifier
    pub id: RecordId,
    /// Display name
    pub name: String,
    /// Unit price
    pub price: f64,
}

impl Record {
    /// Creates a new Record
    pub fn new(id: RecordId, name: impl Into<String>, price: f64) -> Self {
        Self {
            id,
            name: name.into(),
            price,
        }
    }
}
