//! Tests for configuration validation

use std::collections::HashMap;
use std::time::Duration;

use sleeplog_resilience::config::{
    ConnectivityConfig, ErrorServiceConfig, PollingConfig, QueueConfig, ResilienceConfig,
    DEFAULT_PROBE_INTERVAL_MS,
};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_defaults_are_valid() {
    let config = ResilienceConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.queue.max_attempts, 5);
    assert_eq!(config.errors.max_stored_errors, 100);
    assert_eq!(config.errors.coalesce_window_ms, 30_000);
    assert_eq!(config.polling.default_interval(), Duration::from_secs(30));
    assert_eq!(config.queue_namespace(), "sleeplog.offline_queue");
    assert_eq!(config.error_namespace(), "sleeplog.error_log");
}

#[test]
fn test_queue_config_invalid_max_attempts() {
    let invalid = QueueConfig {
        max_attempts: 0,
        max_age_ms: None,
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_error_config_invalid_capacity() {
    let invalid = ErrorServiceConfig {
        max_stored_errors: 0,
        ..ErrorServiceConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_polling_config_bounds() {
    let below_min = PollingConfig {
        default_interval_ms: 500,
        ..PollingConfig::default()
    };
    assert!(below_min.validate().is_err());

    let backoff_too_small = PollingConfig {
        max_backoff_ms: Some(1_000),
        ..PollingConfig::default()
    };
    assert!(backoff_too_small.validate().is_err());

    let config = PollingConfig::default();
    assert_eq!(
        config.clamp_interval(Duration::from_millis(5)),
        Duration::from_secs(1)
    );
}

#[test]
fn test_empty_prefix_rejected() {
    let config = ResilienceConfig {
        storage_prefix: "  ".into(),
        ..ResilienceConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn test_config_from_json_fills_defaults() {
    let json = r#"{
        "storage_prefix": "nightowl",
        "queue": { "max_attempts": 3 },
        "errors": { "coalesce_window_ms": 0, "user_id": "u-1" }
    }"#;

    let config = ResilienceConfig::from_json_str(json).unwrap();
    assert_eq!(config.queue.max_attempts, 3);
    assert_eq!(config.errors.max_stored_errors, 100);
    assert_eq!(config.errors.user_id.as_deref(), Some("u-1"));
    assert_eq!(config.queue_namespace(), "nightowl.offline_queue");
}

#[test]
fn test_config_from_json_rejects_invalid_values() {
    let err = ResilienceConfig::from_json_str(r#"{ "polling": { "min_interval_ms": 0 } }"#)
        .unwrap_err();
    assert!(err.starts_with("polling:"));
    assert!(ResilienceConfig::from_json_str("not json").is_err());
}

#[test]
fn test_config_from_lookup() {
    let config = ResilienceConfig::from_lookup(lookup(&[
        ("SLEEPLOG_STORAGE_PREFIX", "dash"),
        ("SLEEPLOG_QUEUE_MAX_ATTEMPTS", "7"),
        ("SLEEPLOG_ERRORS_COALESCE_WINDOW_MS", " 10000 "),
        ("SLEEPLOG_POLL_INTERVAL_MS", "60000"),
        ("SLEEPLOG_PROBE_INTERVAL_MS", "15000"),
    ]))
    .unwrap();
    assert_eq!(config.storage_prefix, "dash");
    assert_eq!(config.queue.max_attempts, 7);
    assert_eq!(config.errors.coalesce_window_ms, 10_000);
    assert_eq!(config.polling.default_interval_ms, 60_000);
    assert_eq!(config.connectivity.probe_interval_ms, Some(15_000));
    assert_eq!(config.connectivity.probe_interval(), Duration::from_secs(15));
}

#[test]
fn test_probe_interval_falls_back_to_default() {
    let config = ConnectivityConfig::default();
    assert_eq!(config.probe_interval_ms, None);
    assert_eq!(
        config.probe_interval(),
        Duration::from_millis(DEFAULT_PROBE_INTERVAL_MS)
    );
}

#[test]
fn test_config_from_lookup_reports_bad_numbers() {
    let err = ResilienceConfig::from_lookup(lookup(&[("SLEEPLOG_QUEUE_MAX_ATTEMPTS", "many")]))
        .unwrap_err();
    assert!(err.to_string().contains("SLEEPLOG_QUEUE_MAX_ATTEMPTS"));

    let invalid = ResilienceConfig::from_lookup(lookup(&[("SLEEPLOG_ERRORS_MAX_STORED", "0")]));
    assert!(invalid.is_err());
}
