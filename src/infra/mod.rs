//! Infrastructure adapters for storage backends and host capture hooks.

pub mod hooks;
pub mod store;

pub use hooks::{ManualHooks, PanicHooks};
pub use store::{FileStore, InMemoryStore};
#[cfg(feature = "web")]
pub use store::LocalStorageStore;
