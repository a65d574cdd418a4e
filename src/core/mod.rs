//! Core resiliency abstractions: connectivity, offline queue, error aggregation and polling.

pub mod connectivity;
pub mod error;
pub mod error_service;
pub mod hooks;
pub mod offline_queue;
pub mod polling;
pub mod spawn;
pub mod store;
pub mod transport;

pub use connectivity::{ConnectivityEvent, ConnectivityMonitor, ProbeLoop, ReachabilityProbe};
pub use error::{AppResult, ResilienceError};
pub use error_service::{
    fingerprint, ErrorAggregator, ErrorConfigUpdate, ErrorContext, ErrorKind, ErrorReport,
    ErrorReporter, ErrorSinkFn, ErrorStats, GlobalErrorRecord, Severity, FINGERPRINT_KEYS,
};
pub use hooks::{CaptureHooks, RejectionHandler, UncaughtError, UncaughtHandler, UnhandledRejection};
pub use offline_queue::{DrainResult, OfflineQueue, QueueStatus, QueuedRequest, RequestStatus};
pub use polling::{
    PollCallback, PollFailure, PollFuture, PollHandle, PollOptions, PollResult, PollingScheduler,
    PollingSubscription,
};
pub use spawn::{Spawn, Timer, TimerCallback, TimerToken};
pub use store::{KeyValueStore, StoreError};
pub use transport::{FailureKind, HttpMethod, RequestDescriptor, Transport, TransportFailure};
