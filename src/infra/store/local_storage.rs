//! Browser `localStorage` backend.

use web_sys::{window, Storage};

use crate::core::{KeyValueStore, StoreError};

/// Store backed by the window's `localStorage`.
///
/// The storage handle is looked up on every call, so the store holds no
/// JavaScript values and stays `Send + Sync`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalStorageStore;

impl LocalStorageStore {
    /// Create the store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn storage() -> Result<Storage, StoreError> {
        window()
            .ok_or_else(|| StoreError::Unavailable("no window".into()))?
            .local_storage()
            .map_err(|_| StoreError::Unavailable("localStorage access denied".into()))?
            .ok_or_else(|| StoreError::Unavailable("localStorage disabled".into()))
    }
}

impl KeyValueStore for LocalStorageStore {
    fn get(&self, namespace: &str) -> Result<Option<String>, StoreError> {
        Self::storage()?
            .get_item(namespace)
            .map_err(|_| StoreError::Unavailable(format!("reading `{namespace}` failed")))
    }

    fn set(&self, namespace: &str, value: &str) -> Result<(), StoreError> {
        // setItem throws QuotaExceededError; the exception carries no sizes.
        Self::storage()?.set_item(namespace, value).map_err(|_| StoreError::QuotaExceeded {
            namespace: namespace.to_string(),
            requested: value.len(),
            limit: 0,
        })
    }

    fn remove(&self, namespace: &str) -> Result<(), StoreError> {
        Self::storage()?
            .remove_item(namespace)
            .map_err(|_| StoreError::Unavailable(format!("removing `{namespace}` failed")))
    }
}
