//! Tests for error types

use sleeplog_resilience::core::{ResilienceError, StoreError};

#[test]
fn test_invalid_config_error() {
    let err = ResilienceError::InvalidConfig("max_attempts must be greater than 0".to_string());
    assert_eq!(
        format!("{err}"),
        "invalid configuration: max_attempts must be greater than 0"
    );
}

#[test]
fn test_not_found_error() {
    let err = ResilienceError::NotFound("abc".to_string());
    assert_eq!(format!("{err}"), "queued request not found: abc");
}

#[test]
fn test_store_error_converts() {
    let err: ResilienceError = StoreError::Unavailable("no window".into()).into();
    assert_eq!(format!("{err}"), "storage error: storage unavailable: no window");
}

#[test]
fn test_quota_error_message() {
    let err = StoreError::QuotaExceeded {
        namespace: "sleeplog.error_log".into(),
        requested: 6_000_000,
        limit: 5_242_880,
    };
    assert_eq!(
        format!("{err}"),
        "storage quota exceeded writing `sleeplog.error_log` (6000000 bytes, limit 5242880)"
    );
}

#[test]
fn test_io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
    let err: StoreError = io.into();
    assert!(matches!(err, StoreError::Io(_)));
}
