//! Capture-hook adapters.

pub mod manual;
pub mod panic;

pub use manual::ManualHooks;
pub use panic::PanicHooks;
