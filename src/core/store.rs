//! Persistent key-value store consumed by the queue and the error service.

use thiserror::Error;

/// Errors produced by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend cannot be reached (no window, storage disabled, ...).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// Write would exceed the backend quota.
    #[error("storage quota exceeded writing `{namespace}` ({requested} bytes, limit {limit})")]
    QuotaExceeded {
        /// Namespace being written.
        namespace: String,
        /// Total bytes the store would hold after the write.
        requested: usize,
        /// Configured quota in bytes.
        limit: usize,
    },
    /// Filesystem failure.
    #[error("storage i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Value could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Synchronous string store scoped to one browser profile (or process).
///
/// Namespaces are opaque keys. Each component owns its namespace exclusively;
/// the store gives no durability guarantee beyond the backend's own.
pub trait KeyValueStore: Send + Sync {
    /// Read a namespace. `Ok(None)` when nothing is stored.
    fn get(&self, namespace: &str) -> Result<Option<String>, StoreError>;
    /// Replace the value stored under a namespace.
    fn set(&self, namespace: &str, value: &str) -> Result<(), StoreError>;
    /// Delete a namespace. Removing a missing namespace is not an error.
    fn remove(&self, namespace: &str) -> Result<(), StoreError>;
}
