//! Error types for resiliency-core operations.

use thiserror::Error;

use crate::core::store::StoreError;

/// Errors returned from public entry points.
///
/// Capture paths never return these; only programmer errors and explicit
/// user actions on unknown entries do.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// Configuration has an invalid shape or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// No queued request carries the given id.
    #[error("queued request not found: {0}")]
    NotFound(String),
    /// Store failure surfaced by an explicit user action.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
