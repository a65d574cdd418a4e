//! File-backed store: one JSON document per namespace.
//!
//! Writes go to a temporary file that is renamed over the target, so a crash
//! mid-write leaves the previous document intact.

use std::fs::{self, create_dir_all, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::core::{KeyValueStore, StoreError};

/// Directory-backed store for native hosts.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Open (and create) the store directory.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Directory holding the namespace files.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_path(&self, namespace: &str) -> PathBuf {
        let name: String = namespace
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        self.path.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, namespace: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.file_path(namespace)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, namespace: &str, value: &str) -> Result<(), StoreError> {
        let target = self.file_path(namespace);
        let tmp = target.with_extension("json.tmp");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &target)?;
        Ok(())
    }

    fn remove(&self, namespace: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.file_path(namespace)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
