//! Builders to construct the resiliency core from configuration.

pub mod core_builder;

pub use core_builder::{ResilienceCore, ResilienceCoreBuilder};
