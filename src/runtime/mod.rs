//! Runtime adapters (tokio, deterministic test runtime) and status API surface.

pub mod api;
pub mod manual;
#[cfg(feature = "tokio-runtime")]
pub mod timer;
#[cfg(feature = "tokio-runtime")]
pub mod tokio_spawner;

pub use api::{health, CoreStatus, Health};
pub use manual::ManualTimer;
#[cfg(feature = "tokio-runtime")]
pub use timer::TokioTimer;
#[cfg(feature = "tokio-runtime")]
pub use tokio_spawner::TokioSpawner;
