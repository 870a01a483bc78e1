//! Record Codec Module
//!
//! The only serialization boundary between records and stored string values.
//! Records are stored as JSON objects: `{"id":7,"name":"Widget","price":19.99}`.

use crate::error::{CacheError, Result};
use crate::models::Record;

// == Encode ==
/// Serializes a record to its stored JSON form.
///
/// Fails for a non-finite price, which JSON cannot represent.
pub fn encode(record: &Record) -> Result<String> {
    if !record.price.is_finite() {
        return Err(CacheError::Encode {
            id: record.id,
            reason: format!("price {} is not a finite number", record.price),
        });
    }

    serde_json::to_string(record).map_err(|e| CacheError::Encode {
        id: record.id,
        reason: e.to_string(),
    })
}

// == Decode ==
/// Parses a stored value back into a record.
pub fn decode(value: &str) -> Result<Record> {
    serde_json::from_str(value).map_err(|e| CacheError::MalformedRecord(e.to_string()))
}
