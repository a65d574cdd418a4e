//! API-facing status models.

use serde::{Deserialize, Serialize};

use crate::core::{ErrorStats, GlobalErrorRecord, QueueStatus};

/// Snapshot of the whole core, serializable for a debug panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreStatus {
    /// Effective connectivity.
    pub online: bool,
    /// Offline queue counts.
    pub queue: QueueStatus,
    /// Whether a drain is running.
    pub draining: bool,
    /// Error log counts.
    pub errors: ErrorStats,
    /// Most recent error records, newest first.
    pub recent_errors: Vec<GlobalErrorRecord>,
    /// Live polling subscriptions.
    pub active_polls: usize,
}

/// Health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    /// No permanently failed requests and no critical errors.
    pub ok: bool,
    /// Effective connectivity.
    pub online: bool,
    /// Requests still waiting for replay.
    pub pending_requests: usize,
    /// Requests that will not be retried.
    pub failed_requests: usize,
    /// Stored critical records.
    pub critical_errors: usize,
}

/// Summarize a status snapshot.
#[must_use]
pub const fn health(status: &CoreStatus) -> Health {
    Health {
        ok: status.queue.failed == 0 && status.errors.critical == 0,
        online: status.online,
        pending_requests: status.queue.pending,
        failed_requests: status.queue.failed,
        critical_errors: status.errors.critical,
    }
}
