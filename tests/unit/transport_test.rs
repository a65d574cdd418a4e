//! Tests for transport types and failure classification

use serde_json::json;

use sleeplog_resilience::core::{
    fingerprint, ErrorContext, ErrorKind, ErrorReport, FailureKind, HttpMethod, RequestDescriptor,
    Severity, TransportFailure, FINGERPRINT_KEYS,
};

#[test]
fn test_status_ranges_map_to_failure_kinds() {
    assert_eq!(FailureKind::from_status(400), FailureKind::ServerRejected);
    assert_eq!(FailureKind::from_status(499), FailureKind::ServerRejected);
    assert_eq!(FailureKind::from_status(500), FailureKind::ServerUnavailable);
    assert_eq!(FailureKind::from_status(503), FailureKind::ServerUnavailable);
    assert_eq!(TransportFailure::timeout("slow").status, None);
    assert!(TransportFailure::connectivity_loss("down").is_connectivity_loss());
}

#[test]
fn test_status_zero_is_connectivity_loss() {
    assert_eq!(FailureKind::from_status(0), FailureKind::ConnectivityLoss);
    let failed_fetch = TransportFailure::from_status(0, "failed to fetch");
    assert!(failed_fetch.is_connectivity_loss());
    assert_eq!(failed_fetch.status, None);
    let report = ErrorReport::network(&failed_fetch, "/api/sessions", HttpMethod::Get);
    assert_eq!(report.severity(), Severity::Warning);
}

#[test]
fn test_fingerprint_keys_are_exported_in_order() {
    assert_eq!(FINGERPRINT_KEYS, ["component", "url", "method", "status"]);
}

#[test]
fn test_method_wire_format() {
    assert_eq!(serde_json::to_value(HttpMethod::Patch).unwrap(), json!("PATCH"));
    assert!(!HttpMethod::Get.is_mutating());
    assert!(HttpMethod::Delete.is_mutating());
    assert_eq!(HttpMethod::Put.to_string(), "PUT");
}

#[test]
fn test_descriptor_body_is_optional_on_the_wire() {
    let bare = serde_json::to_value(RequestDescriptor::new(HttpMethod::Delete, "/x")).unwrap();
    assert_eq!(bare, json!({ "method": "DELETE", "path": "/x" }));
    let with_body = RequestDescriptor::new(HttpMethod::Post, "/x").with_body(json!({ "a": 1 }));
    assert_eq!(with_body.body, Some(json!({ "a": 1 })));
}

#[test]
fn test_failure_kind_serializes_kebab_case() {
    assert_eq!(
        serde_json::to_value(FailureKind::ConnectivityLoss).unwrap(),
        json!("connectivity-loss")
    );
}

#[test]
fn test_network_report_severity_follows_failure() {
    let timeout = ErrorReport::network(&TransportFailure::timeout("slow"), "/a", HttpMethod::Get);
    assert_eq!(timeout.severity(), Severity::Error);
    let offline = ErrorReport::network(
        &TransportFailure::connectivity_loss("down"),
        "/a",
        HttpMethod::Get,
    );
    assert_eq!(offline.severity(), Severity::Warning);
    let redirect = ErrorReport::network(
        &TransportFailure::from_status(304, "not modified"),
        "/a",
        HttpMethod::Get,
    );
    assert_eq!(redirect.severity(), Severity::Info);
}

#[test]
fn test_fingerprint_ignores_non_identifying_context() {
    let mut a = ErrorContext::new();
    a.insert("component".into(), json!("SleepChart"));
    a.insert("user_agent".into(), json!("firefox"));
    let mut b = ErrorContext::new();
    b.insert("component".into(), json!("SleepChart"));
    b.insert("user_agent".into(), json!("safari"));

    assert_eq!(
        fingerprint(ErrorKind::Runtime, "boom", &a),
        fingerprint(ErrorKind::Runtime, "boom", &b)
    );
    assert_ne!(
        fingerprint(ErrorKind::Runtime, "boom", &a),
        fingerprint(ErrorKind::PromiseRejection, "boom", &a)
    );
}
