//! Resiliency-core configuration structures.

use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::AppResult;

/// Offline request queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Attempts after which a server-unavailable request becomes permanently failed.
    pub max_attempts: u32,
    /// Age after which a still-retryable request is considered stale.
    pub max_age_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_age_ms: None,
        }
    }
}

impl QueueConfig {
    /// Validate queue settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be greater than 0".into());
        }
        if self.max_age_ms == Some(0) {
            return Err("max_age_ms must be greater than 0 when set".into());
        }
        Ok(())
    }
}

/// Error aggregation service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorServiceConfig {
    /// Ring-buffer capacity of the stored error log.
    pub max_stored_errors: usize,
    /// Window within which identical errors are coalesced.
    pub coalesce_window_ms: u64,
    /// User identifier attached to every record's context.
    pub user_id: Option<String>,
    /// Register the uncaught-error hook on `initialize`.
    pub capture_uncaught: bool,
    /// Register the unhandled-rejection hook on `initialize`.
    pub capture_rejections: bool,
}

impl Default for ErrorServiceConfig {
    fn default() -> Self {
        Self {
            max_stored_errors: 100,
            coalesce_window_ms: 30_000,
            user_id: None,
            capture_uncaught: true,
            capture_rejections: true,
        }
    }
}

impl ErrorServiceConfig {
    /// Validate error service settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_stored_errors == 0 {
            return Err("max_stored_errors must be greater than 0".into());
        }
        Ok(())
    }
}

/// Polling scheduler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval used when a subscription does not specify one.
    pub default_interval_ms: u64,
    /// Lower bound applied to every subscription interval.
    pub min_interval_ms: u64,
    /// Default backoff ceiling after consecutive failures; `None` polls at a fixed rate.
    pub max_backoff_ms: Option<u64>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            default_interval_ms: 30_000,
            min_interval_ms: 1_000,
            max_backoff_ms: Some(300_000),
        }
    }
}

impl PollingConfig {
    /// Validate polling settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.min_interval_ms == 0 {
            return Err("min_interval_ms must be greater than 0".into());
        }
        if self.default_interval_ms < self.min_interval_ms {
            return Err("default_interval_ms must not be below min_interval_ms".into());
        }
        if let Some(max) = self.max_backoff_ms {
            if max < self.default_interval_ms {
                return Err("max_backoff_ms must not be below default_interval_ms".into());
            }
        }
        Ok(())
    }

    /// Default interval as a [`Duration`].
    #[must_use]
    pub const fn default_interval(&self) -> Duration {
        Duration::from_millis(self.default_interval_ms)
    }

    /// Clamp an interval to the configured minimum.
    #[must_use]
    pub fn clamp_interval(&self, interval: Duration) -> Duration {
        interval.max(Duration::from_millis(self.min_interval_ms))
    }
}

/// Probe interval used when a reachability probe is set but no interval is configured.
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 30_000;

/// Connectivity monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// State assumed before the host reports its first signal.
    pub assume_online: bool,
    /// Reachability probe interval; `None` falls back to
    /// [`DEFAULT_PROBE_INTERVAL_MS`] when a probe is set.
    pub probe_interval_ms: Option<u64>,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            assume_online: true,
            probe_interval_ms: None,
        }
    }
}

impl ConnectivityConfig {
    /// Validate connectivity settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.probe_interval_ms == Some(0) {
            return Err("probe_interval_ms must be greater than 0 when set".into());
        }
        Ok(())
    }

    /// Interval of the probe loop.
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms.unwrap_or(DEFAULT_PROBE_INTERVAL_MS))
    }
}

/// Root configuration of the resiliency core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Prefix of the two storage namespaces.
    pub storage_prefix: String,
    /// Offline queue section.
    pub queue: QueueConfig,
    /// Error service section.
    pub errors: ErrorServiceConfig,
    /// Polling section.
    pub polling: PollingConfig,
    /// Connectivity section.
    pub connectivity: ConnectivityConfig,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            storage_prefix: "sleeplog".into(),
            queue: QueueConfig::default(),
            errors: ErrorServiceConfig::default(),
            polling: PollingConfig::default(),
            connectivity: ConnectivityConfig::default(),
        }
    }
}

impl ResilienceConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        if self.storage_prefix.trim().is_empty() {
            return Err("storage_prefix must not be empty".into());
        }
        self.queue.validate().map_err(|e| format!("queue: {e}"))?;
        self.errors.validate().map_err(|e| format!("errors: {e}"))?;
        self.polling.validate().map_err(|e| format!("polling: {e}"))?;
        self.connectivity
            .validate()
            .map_err(|e| format!("connectivity: {e}"))?;
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from the process environment, loading `.env` first.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from `SLEEPLOG_*` variables resolved by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(prefix) = lookup("SLEEPLOG_STORAGE_PREFIX") {
            cfg.storage_prefix = prefix;
        }
        if let Some(v) = parse_var(&lookup, "SLEEPLOG_QUEUE_MAX_ATTEMPTS")? {
            cfg.queue.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "SLEEPLOG_QUEUE_MAX_AGE_MS")? {
            cfg.queue.max_age_ms = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "SLEEPLOG_ERRORS_MAX_STORED")? {
            cfg.errors.max_stored_errors = v;
        }
        if let Some(v) = parse_var(&lookup, "SLEEPLOG_ERRORS_COALESCE_WINDOW_MS")? {
            cfg.errors.coalesce_window_ms = v;
        }
        if let Some(user) = lookup("SLEEPLOG_ERRORS_USER_ID") {
            cfg.errors.user_id = Some(user);
        }
        if let Some(v) = parse_var(&lookup, "SLEEPLOG_POLL_INTERVAL_MS")? {
            cfg.polling.default_interval_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "SLEEPLOG_POLL_MIN_INTERVAL_MS")? {
            cfg.polling.min_interval_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "SLEEPLOG_POLL_MAX_BACKOFF_MS")? {
            cfg.polling.max_backoff_ms = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "SLEEPLOG_PROBE_INTERVAL_MS")? {
            cfg.connectivity.probe_interval_ms = Some(v);
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        Ok(cfg)
    }

    /// Namespace owned by the offline queue.
    #[must_use]
    pub fn queue_namespace(&self) -> String {
        format!("{}.offline_queue", self.storage_prefix)
    }

    /// Namespace owned by the error service.
    #[must_use]
    pub fn error_namespace(&self) -> String {
        format!("{}.error_log", self.storage_prefix)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> AppResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {key}: `{raw}`"))
        })
        .transpose()
}
