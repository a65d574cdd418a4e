//! Configuration models for the queue, error service, scheduler and connectivity monitor.

pub mod resilience;

pub use resilience::{
    ConnectivityConfig, ErrorServiceConfig, PollingConfig, QueueConfig, ResilienceConfig,
    DEFAULT_PROBE_INTERVAL_MS,
};
