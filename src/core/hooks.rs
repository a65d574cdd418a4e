//! Capability interface for global exception and rejection capture.
//!
//! The host environment supplies an implementation; the error service only
//! registers handlers through it, so aggregation runs without a real browser.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::util::Subscription;

/// An exception nobody caught.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncaughtError {
    /// Error message.
    pub message: String,
    /// Script or source file, when known.
    pub source: Option<String>,
    /// Line number, when known.
    pub line: Option<u32>,
    /// Column number, when known.
    pub column: Option<u32>,
    /// Stack trace, when known.
    pub stack: Option<String>,
}

impl UncaughtError {
    /// Error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
            line: None,
            column: None,
            stack: None,
        }
    }
}

/// A rejected async operation nobody awaited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnhandledRejection {
    /// Rendered rejection reason.
    pub reason: String,
}

impl UnhandledRejection {
    /// Rejection with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Handler for uncaught errors.
pub type UncaughtHandler = Arc<dyn Fn(&UncaughtError) + Send + Sync>;

/// Handler for unhandled rejections.
pub type RejectionHandler = Arc<dyn Fn(&UnhandledRejection) + Send + Sync>;

/// Host-provided registration of global capture handlers.
pub trait CaptureHooks: Send + Sync {
    /// Register a handler for uncaught errors.
    fn on_uncaught(&self, handler: UncaughtHandler) -> Subscription;
    /// Register a handler for unhandled rejections.
    fn on_unhandled_rejection(&self, handler: RejectionHandler) -> Subscription;
}
