// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backup and restore jobs end to end.

use crate::prelude::*;

#[tokio::test]
async fn backup_then_restore_reproduces_the_data() {
    let agent = TestAgent::start().await;
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    agent.write("data/source", &payload);

    let backup = agent.submit(&agent.backup()).await;
    let key = restore_key(&backup);
    assert_eq!(backup.exit_status, Some(0));
    assert_eq!(backup.report.as_ref().unwrap().bytes, payload.len() as u64);
    assert!(backup.diagnostics.contains("[files backup] reading"), "{}", backup.diagnostics);
    similar_asserts::assert_eq!(agent.artifacts(), vec![key.clone()]);

    let restore = agent.submit(&agent.restore(&key)).await;
    assert!(restore.succeeded(), "{:?}\n{}", restore.status, restore.diagnostics);
    assert!(agent.read("data/restored") == payload, "restored data differs");

    agent.stop().await;
}

#[tokio::test]
async fn failed_backup_is_attributed_and_leaves_no_artifact() {
    let agent = TestAgent::start().await;
    // No data/source: the target's `backup` fails.

    let outcome = agent.submit(&agent.backup()).await;

    assert_eq!(outcome.exit_status, Some(1));
    let report = outcome.report.unwrap();
    let error = report.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Plugin);
    assert_eq!(error.plugin.as_deref(), Some("files"));
    assert!(error.diagnostics.contains("source"), "{}", error.diagnostics);
    assert!(report.restore_key.is_none());
    assert!(agent.artifacts().is_empty(), "{:?}", agent.artifacts());

    agent.stop().await;
}

#[tokio::test]
async fn restore_of_unknown_key_fails_in_the_store_stage() {
    let agent = TestAgent::start().await;

    let outcome = agent.submit(&agent.restore("blob-missing")).await;

    let TerminalStatus::Failed { reason } = &outcome.status else {
        panic!("expected failure, got {:?}", outcome.status);
    };
    assert!(reason.contains("vault retrieve"), "{reason}");
    assert!(!agent.path("data/restored").exists() || agent.read("data/restored").is_empty());

    agent.stop().await;
}

#[tokio::test]
async fn unknown_plugin_fails_before_anything_runs() {
    let agent = TestAgent::start().await;
    let mut request = agent.backup();
    request["store_plugin"] = "s3".into();

    let outcome = agent.submit(&request).await;

    let error = outcome.report.unwrap().error.unwrap();
    assert_eq!(error.kind, ErrorKind::Configuration);
    assert!(error.message.contains("no plugin named 's3'"), "{}", error.message);

    agent.stop().await;
}

#[tokio::test]
async fn endpoint_validation_runs_before_the_pipeline() {
    let agent = TestAgent::start().await;
    agent.write("data/source", b"data");
    let mut request = agent.backup();
    request["store_endpoint"] = json!({});

    let outcome = agent.submit(&request).await;

    let error = outcome.report.unwrap().error.unwrap();
    assert_eq!(error.kind, ErrorKind::Configuration);
    assert_eq!(error.plugin.as_deref(), Some("vault"));
    assert!(error.diagnostics.contains("dir: required"), "{}", error.diagnostics);
    assert!(agent.artifacts().is_empty());

    agent.stop().await;
}

#[tokio::test]
async fn job_timeout_fails_a_stuck_job() {
    let agent = TestAgent::start_with(|config| config.job_timeout_secs = Some(1)).await;
    let mut request = agent.backup();
    request["target_plugin"] = "endless".into();

    let outcome = agent.submit(&request).await;

    let error = outcome.report.unwrap().error.unwrap();
    assert_eq!(error.kind, ErrorKind::TimedOut);
    assert!(agent.path("data/terminated").exists());

    agent.stop().await;
}
