// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;

fn backup_doc() -> Value {
    json!({
        "operation": "backup",
        "target_plugin": "fs",
        "target_endpoint": "{\"path\":\"/var/lib/app\"}",
        "store_plugin": "s3",
        "store_endpoint": "{\"bucket\":\"b\"}",
    })
}

fn parse(doc: &Value) -> Result<JobRequest, ValidationError> {
    JobRequest::parse(doc.to_string().as_bytes())
}

#[test]
fn backup_request_parses() {
    let req = parse(&backup_doc()).unwrap();
    assert_eq!(req.operation, JobOperation::Backup);
    assert_eq!(req.target_plugin, "fs");
    assert_eq!(req.target_endpoint, r#"{"path":"/var/lib/app"}"#);
    assert_eq!(req.store_plugin, "s3");
    assert_eq!(req.restore_key, None);
    assert_eq!(req.raw(), backup_doc().to_string().as_bytes());
}

#[test]
fn backup_ignores_restore_key() {
    let mut doc = backup_doc();
    doc["restore_key"] = json!("leftover");
    assert_eq!(parse(&doc).unwrap().restore_key, None);
}

#[test]
fn restore_requires_key() {
    let mut doc = backup_doc();
    doc["operation"] = json!("restore");
    assert_eq!(parse(&doc).unwrap_err(), ValidationError::MissingRestoreKey);

    doc["restore_key"] = json!("");
    assert_eq!(parse(&doc).unwrap_err(), ValidationError::MissingRestoreKey);

    doc["restore_key"] = json!("abc-123");
    assert_eq!(parse(&doc).unwrap().restore_key.as_deref(), Some("abc-123"));
}

#[test]
fn object_endpoints_are_serialized() {
    let mut doc = backup_doc();
    doc["store_endpoint"] = json!({"base_dir": "/srv/backups"});
    let req = parse(&doc).unwrap();
    let back: Value = serde_json::from_str(&req.store_endpoint).unwrap();
    assert_eq!(back, json!({"base_dir": "/srv/backups"}));
}

#[test]
fn malformed_json_is_rejected_first() {
    let err = JobRequest::parse(b"{\"operation\":").unwrap_err();
    assert!(matches!(err, ValidationError::Malformed(_)));
    assert!(err.to_string().starts_with("malformed agent-request: "), "{err}");
}

#[yare::parameterized(
    array = { "[1,2]" },
    number_operation = { r#"{"operation": 5}"# },
    number_endpoint = {
        r#"{"operation":"backup","target_plugin":"a","target_endpoint":7,"store_plugin":"b","store_endpoint":"{}"}"#
    },
)]
fn wrong_shapes_are_malformed(payload: &str) {
    assert!(matches!(JobRequest::parse(payload.as_bytes()), Err(ValidationError::Malformed(_))));
}

#[yare::parameterized(
    unknown = { "snapshot" },
    uppercase = { "BACKUP" },
    purge = { "purge" },
)]
fn unsupported_operation(op: &str) {
    let mut doc = backup_doc();
    doc["operation"] = json!(op);
    let err = parse(&doc).unwrap_err();
    assert_eq!(err, ValidationError::UnsupportedOperation(op.to_string()));
    assert_eq!(err.to_string(), format!("unsupported operation: '{op}'"));
}

/// Removing fields one at a time from the end reports the earliest missing one.
#[yare::parameterized(
    operation = { &["operation"], "operation" },
    target_plugin = { &["target_plugin", "store_plugin"], "target_plugin" },
    target_endpoint = { &["target_endpoint", "store_endpoint"], "target_endpoint" },
    store_plugin = { &["store_plugin", "store_endpoint"], "store_plugin" },
    store_endpoint = { &["store_endpoint"], "store_endpoint" },
    everything = {
        &["operation", "target_plugin", "target_endpoint", "store_plugin", "store_endpoint"],
        "operation"
    },
)]
fn first_missing_field_wins(remove: &[&str], expected: &'static str) {
    let mut doc = backup_doc();
    for key in remove {
        doc.as_object_mut().unwrap().remove(*key);
    }
    let err = parse(&doc).unwrap_err();
    assert_eq!(err, ValidationError::Missing(expected));
    assert_eq!(err.to_string(), format!("missing required '{expected}' value in payload"));
}

#[yare::parameterized(
    empty_string = { json!("") },
    null = { Value::Null },
)]
fn empty_values_count_as_missing(value: Value) {
    let mut doc = backup_doc();
    doc["target_endpoint"] = value;
    assert_eq!(parse(&doc).unwrap_err(), ValidationError::Missing("target_endpoint"));
}

/// Only the empty string is missing; whitespace is passed on as given.
#[test]
fn whitespace_values_are_not_missing() {
    let mut doc = backup_doc();
    doc["operation"] = json!("restore");
    doc["restore_key"] = json!(" ");
    doc["target_plugin"] = json!(" fs");
    let req = parse(&doc).unwrap();
    assert_eq!(req.restore_key.as_deref(), Some(" "));
    assert_eq!(req.target_plugin, " fs");

    doc["target_endpoint"] = json!("  ");
    assert_eq!(parse(&doc).unwrap().target_endpoint, "  ");
}

#[test]
fn unsupported_operation_reported_before_missing_plugins() {
    let err = parse(&json!({"operation": "archive"})).unwrap_err();
    assert_eq!(err, ValidationError::UnsupportedOperation("archive".into()));
}

#[test]
fn restore_key_checked_after_identity_fields() {
    let err = parse(&json!({"operation": "restore", "target_plugin": "fs"})).unwrap_err();
    assert_eq!(err, ValidationError::Missing("target_endpoint"));
}

#[test]
fn debug_redacts_endpoints() {
    let mut doc = backup_doc();
    doc["store_endpoint"] = json!({"secret_key": "hunter2"});
    let req = parse(&doc).unwrap();
    let debug = format!("{req:?}");
    assert!(!debug.contains("hunter2"), "{debug}");
    assert!(debug.contains("<redacted>"));
}

#[yare::parameterized(
    backup = { JobOperation::Backup, (Role::Target, Operation::Backup), (Role::Store, Operation::Store) },
    restore = { JobOperation::Restore, (Role::Store, Operation::Retrieve), (Role::Target, Operation::Restore) },
)]
fn stages_per_operation(op: JobOperation, producer: (Role, Operation), consumer: (Role, Operation)) {
    assert_eq!(op.producer(), producer);
    assert_eq!(op.consumer(), consumer);
}
