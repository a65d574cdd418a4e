//! Key-value store backends.

pub mod file;
#[cfg(feature = "web")]
pub mod local_storage;
pub mod memory;

pub use file::FileStore;
#[cfg(feature = "web")]
pub use local_storage::LocalStorageStore;
pub use memory::InMemoryStore;
