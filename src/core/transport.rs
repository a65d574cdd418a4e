//! Network-call abstraction consumed by the offline queue and the polling scheduler.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP verb of a deferred call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// Upper-case verb as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the verb mutates server state and may be queued.
    #[must_use]
    pub const fn is_mutating(self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of a mutating call handed to the offline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// HTTP verb.
    pub method: HttpMethod,
    /// Path relative to the API base, e.g. `/sleep-sessions/42`.
    pub path: String,
    /// Optional JSON body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestDescriptor {
    /// Descriptor without a body.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Why a network call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The request never reached the server. Retryable.
    ConnectivityLoss,
    /// The server refused the request (4xx). Never retried automatically.
    ServerRejected,
    /// The server failed or timed out (5xx). Retried up to the ceiling.
    ServerUnavailable,
}

impl FailureKind {
    /// Classify an HTTP status. Status `0` means no response was received;
    /// anything else outside 4xx counts as unavailable.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        if status == 0 {
            Self::ConnectivityLoss
        } else if status >= 400 && status < 500 {
            Self::ServerRejected
        } else {
            Self::ServerUnavailable
        }
    }
}

/// Typed failure returned by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportFailure {
    /// Failure class driving retry decisions.
    pub kind: FailureKind,
    /// HTTP status when a response was received.
    pub status: Option<u16>,
    /// Human-readable description.
    pub message: String,
}

impl TransportFailure {
    /// The network is unreachable.
    pub fn connectivity_loss(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ConnectivityLoss,
            status: None,
            message: message.into(),
        }
    }

    /// A response with an error status; the kind follows the status range.
    /// Status `0` is treated as [`TransportFailure::connectivity_loss`].
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        if status == 0 {
            return Self::connectivity_loss(message);
        }
        Self {
            kind: FailureKind::from_status(status),
            status: Some(status),
            message: message.into(),
        }
    }

    /// The server did not answer in time.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::ServerUnavailable,
            status: None,
            message: message.into(),
        }
    }

    /// Whether the failure is caused by lost connectivity.
    #[must_use]
    pub fn is_connectivity_loss(&self) -> bool {
        self.kind == FailureKind::ConnectivityLoss
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{:?} ({status}): {}", self.kind, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for TransportFailure {}

/// Performs HTTP-like calls against the dashboard's REST backend.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use sleeplog_resilience::core::{HttpMethod, Transport, TransportFailure};
///
/// struct FetchTransport;
///
/// #[async_trait]
/// impl Transport for FetchTransport {
///     async fn perform(
///         &self,
///         method: HttpMethod,
///         path: &str,
///         body: Option<&serde_json::Value>,
///     ) -> Result<serde_json::Value, TransportFailure> {
///         // issue the request through the host's HTTP client
///         # unimplemented!()
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Perform one call and return its JSON payload or a typed failure.
    async fn perform(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, TransportFailure>;
}
