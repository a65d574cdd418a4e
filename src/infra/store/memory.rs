//! In-memory store with an optional byte quota.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::core::{KeyValueStore, StoreError};

/// Process-local store for development and testing.
///
/// The quota counts key and value bytes across all namespaces, mirroring the
/// per-origin quota of browser storage.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    values: Mutex<HashMap<String, String>>,
    quota: Option<usize>,
    unavailable: Mutex<Option<String>>,
}

impl InMemoryStore {
    /// Create an unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes past `bytes`.
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota: Some(bytes),
            ..Self::default()
        }
    }

    /// Make every call fail with [`StoreError::Unavailable`] until reset with `None`.
    pub fn set_unavailable(&self, reason: Option<&str>) {
        *self.unavailable.lock() = reason.map(str::to_string);
    }

    /// Bytes currently held.
    pub fn used_bytes(&self) -> usize {
        self.values.lock().iter().map(|(k, v)| k.len() + v.len()).sum()
    }

    /// Raw value of a namespace, bypassing availability checks.
    pub fn raw(&self, namespace: &str) -> Option<String> {
        self.values.lock().get(namespace).cloned()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        match &*self.unavailable.lock() {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, namespace: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        Ok(self.values.lock().get(namespace).cloned())
    }

    fn set(&self, namespace: &str, value: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut values = self.values.lock();
        if let Some(limit) = self.quota {
            let others: usize = values
                .iter()
                .filter(|(k, _)| k.as_str() != namespace)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            let requested = others + namespace.len() + value.len();
            if requested > limit {
                return Err(StoreError::QuotaExceeded {
                    namespace: namespace.to_string(),
                    requested,
                    limit,
                });
            }
        }
        values.insert(namespace.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, namespace: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.values.lock().remove(namespace);
        Ok(())
    }
}
