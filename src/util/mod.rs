//! Shared utilities.

pub mod clock;
pub mod listeners;
pub mod serde;
pub mod telemetry;

pub use self::clock::*;
pub use self::listeners::{Listener, ListenerSet, Subscription};
pub use self::serde::*;
pub use self::telemetry::*;
