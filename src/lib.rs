//! # Sleeplog Resilience
//!
//! Client-side resiliency core for the sleep-session dashboard.
//!
//! The dashboard talks to its backend over an unreliable network. This crate
//! keeps user mutations, error reports and refreshes flowing through network
//! loss, backend outages and page reloads.
//!
//! ## Components
//!
//! - **Connectivity Monitor**: effective online/offline state from the host's
//!   native signal, optionally gated by a reachability probe.
//! - **Offline Request Queue**: durable FIFO of mutating calls made while
//!   offline, replayed one at a time on reconnect. Server rejections are never
//!   retried; server unavailability is retried up to a ceiling.
//! - **Error Aggregation Service**: bounded, persisted log of runtime, rejection
//!   and network errors with severity classification and coalescing of
//!   duplicates inside a time window.
//! - **Polling Scheduler**: periodic refresh of read-only views with no
//!   overlapping calls, pause while offline and immediate refresh on demand.
//!
//! ## Runtime seams
//!
//! Every component runs on injected capabilities: a [`core::Transport`] for
//! HTTP, a [`core::KeyValueStore`] for persistence, [`core::Spawn`] and
//! [`core::Timer`] for scheduling, and [`core::CaptureHooks`] for global error
//! capture. Tokio adapters ship behind the default `tokio-runtime` feature; the
//! `web` feature adds a `localStorage` store. [`runtime::ManualTimer`] drives
//! time deterministically in tests.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sleeplog_resilience::builders::ResilienceCoreBuilder;
//! use sleeplog_resilience::config::ResilienceConfig;
//! use sleeplog_resilience::core::{HttpMethod, PollOptions, RequestDescriptor};
//! use sleeplog_resilience::infra::{FileStore, PanicHooks};
//!
//! let hooks = Arc::new(PanicHooks::new());
//! hooks.install();
//! let core = ResilienceCoreBuilder::tokio(ResilienceConfig::from_env()?)?
//!     .with_transport(Arc::new(my_http_client))
//!     .with_store(Arc::new(FileStore::new("./state")?))
//!     .with_hooks(hooks)
//!     .build()?;
//!
//! // feed host signals
//! core.connectivity().handle_signal(false);
//! core.queue().enqueue(RequestDescriptor::new(HttpMethod::Post, "/api/sessions/42/notes"));
//! core.connectivity().handle_signal(true); // queue drains on reconnect
//!
//! let sessions = core.scheduler().schedule(refresh_sessions, PollOptions::every(interval));
//! sessions.force_update();
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core resiliency abstractions: connectivity, queue, error service and polling.
pub mod core;
/// Configuration models and environment loading.
pub mod config;
/// Builders to construct the wired core from configuration.
pub mod builders;
/// Infrastructure adapters for storage backends and capture hooks.
pub mod infra;
/// Runtime adapters (tokio, deterministic timer) and status API surface.
pub mod runtime;
/// Shared utilities.
pub mod util;
