//! Identifiers and tolerant JSON persistence over a [`KeyValueStore`].
//!
//! Reads never fail: a missing, unreadable or malformed namespace degrades to
//! the type's default value. Writes report their error so callers can decide
//! whether to log or surface it.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::store::{KeyValueStore, StoreError};

/// Identifier of a queued request.
pub type RequestId = String;

/// Identifier of a stored error record.
pub type RecordId = String;

/// Identifier of a polling subscription.
pub type SubscriptionId = u64;

/// Generate a fresh random identifier.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Load and decode a namespace, falling back to `T::default()`.
pub fn load_or_default<T>(store: &dyn KeyValueStore, namespace: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let raw = match store.get(namespace) {
        Ok(Some(raw)) => raw,
        Ok(None) => return T::default(),
        Err(e) => {
            tracing::warn!("failed to read `{namespace}`, starting empty: {e}");
            return T::default();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("malformed data in `{namespace}`, starting empty: {e}");
            T::default()
        }
    }
}

/// Encode a value and write it under a namespace.
pub fn persist<T>(store: &dyn KeyValueStore, namespace: &str, value: &T) -> Result<(), StoreError>
where
    T: Serialize + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set(namespace, &raw)
}
