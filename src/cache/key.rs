//! Key Scheme Module
//!
//! Deterministic mapping from record identifiers to namespaced cache keys.

use crate::error::{CacheError, Result};
use crate::models::RecordId;

/// Namespace used when none is configured
pub const DEFAULT_NAMESPACE: &str = "product";

/// Separator between namespace and identifier
pub const KEY_SEPARATOR: &str = "::";

/// Characters a namespace may not contain.
///
/// `:` would make the separator ambiguous; the rest are SCAN glob syntax.
const RESERVED_CHARS: &[char] = &[':', '*', '?', '[', ']', '\\'];

// == Key Scheme ==
/// Builds keys of the form `<namespace>::<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    namespace: String,
}

impl KeyScheme {
    /// Creates a key scheme for the given namespace.
    ///
    /// Fails if the namespace is empty or contains `:`, whitespace or glob
    /// metacharacters.
    pub fn new(namespace: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();

        if namespace.is_empty() {
            return Err(CacheError::InvalidNamespace(
                "namespace cannot be empty".to_string(),
            ));
        }
        if let Some(c) = namespace
            .chars()
            .find(|c| RESERVED_CHARS.contains(c) || c.is_whitespace())
        {
            return Err(CacheError::InvalidNamespace(format!(
                "namespace '{}' contains reserved character {:?}",
                namespace, c
            )));
        }

        Ok(Self { namespace })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    // == Derive Key ==
    /// Returns the cache key for a record identifier.
    pub fn derive_key(&self, id: RecordId) -> String {
        format!("{}{}{}", self.namespace, KEY_SEPARATOR, id)
    }

    /// Glob pattern matching every key of this namespace.
    pub fn namespace_pattern(&self) -> String {
        format!("{}{}*", self.namespace, KEY_SEPARATOR)
    }

    /// Recovers the identifier from a key built by [`derive_key`](Self::derive_key).
    ///
    /// Returns `None` for keys of other namespaces or non-canonical forms
    /// such as `product::007`.
    pub fn parse_id(&self, key: &str) -> Option<RecordId> {
        let id: RecordId = key
            .strip_prefix(self.namespace.as_str())?
            .strip_prefix(KEY_SEPARATOR)?
            .parse()
            .ok()?;

        (self.derive_key(id) == key).then_some(id)
    }
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}
