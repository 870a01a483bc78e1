//! Error types for the record cache
//!
//! Provides unified error handling using thiserror.

use std::time::Duration;

use thiserror::Error;

use crate::models::RecordId;

// == Cache Error Enum ==
/// Unified error type for the record cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A stored value does not have the serialized record shape
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// A record could not be serialized
    #[error("Failed to encode record {id}: {reason}")]
    Encode { id: RecordId, reason: String },

    /// Connection could not be established or was lost mid-operation
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// No connection became available within the bounded wait
    #[error("Connection pool exhausted after waiting {0:?}")]
    PoolExhausted(Duration),

    /// A store call did not complete within the operation timeout
    #[error("Store operation {op} timed out after {after:?}")]
    StoreTimeout { op: &'static str, after: Duration },

    /// The store rejected a command
    #[error("Store command failed: {0}")]
    Command(String),

    /// Invalid pool or connection configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key namespace would make derived keys ambiguous
    #[error("Invalid key namespace: {0}")]
    InvalidNamespace(String),
}

impl CacheError {
    /// Returns true if the error leaves the leased connection in an unknown state.
    ///
    /// Such connections are discarded instead of going back to the idle reserve.
    pub fn is_connection_fault(&self) -> bool {
        matches!(
            self,
            CacheError::StoreUnavailable(_) | CacheError::StoreTimeout { .. }
        )
    }
}

// == Result Type Alias ==
/// Convenience Result type for the record cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_faults() {
        assert!(CacheError::StoreUnavailable("refused".to_string()).is_connection_fault());
        assert!(CacheError::StoreTimeout {
            op: "GET",
            after: Duration::from_millis(10)
        }
        .is_connection_fault());

        assert!(!CacheError::PoolExhausted(Duration::from_millis(10)).is_connection_fault());
        assert!(!CacheError::Command("WRONGTYPE".to_string()).is_connection_fault());
        assert!(!CacheError::MalformedRecord("eof".to_string()).is_connection_fault());
    }

    #[test]
    fn test_error_messages() {
        let err = CacheError::Encode {
            id: 3,
            reason: "price is not finite".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to encode record 3: price is not finite"
        );

        let err = CacheError::StoreTimeout {
            op: "MGET",
            after: Duration::from_millis(50),
        };
        assert!(err.to_string().contains("MGET"));
    }
}
