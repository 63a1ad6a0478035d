// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::pin::Pin;
use std::task::{Context, Poll};

use serial_test::serial;

use super::*;
use crate::test_support::PluginDir;

fn spec(dir: &PluginDir, name: &str, operation: Operation) -> InvocationSpec {
    InvocationSpec::new(&dir.entry(name), operation)
}

#[tokio::test]
async fn captures_stdout_and_classifies_success() {
    let dir = PluginDir::new();
    dir.script("p", r#"[ "$1" = meta ] && echo '{"name":"p"}'"#);

    let result = invoke(spec(&dir, "p", Operation::Meta), None, None, None).await.unwrap();
    assert!(result.succeeded());
    assert_eq!(result.code, Some(0));
    assert_eq!(String::from_utf8_lossy(&result.output).trim(), r#"{"name":"p"}"#);
    assert!(result.check().is_ok());
}

#[tokio::test]
async fn operation_is_the_only_argument() {
    let dir = PluginDir::new();
    dir.script("p", r#"echo "$#:$1""#);

    let result = invoke(spec(&dir, "p", Operation::Validate), None, None, None).await.unwrap();
    assert_eq!(String::from_utf8_lossy(&result.output).trim(), "1:validate");
}

#[tokio::test]
async fn endpoint_is_passed_verbatim_without_a_shell() {
    let dir = PluginDir::new();
    dir.script("p", r#"printf '%s' "$SHIELD_ENDPOINT""#);
    let marker = dir.path().join("pwned");
    let endpoint = format!(r#"{{"password":"$(touch {})`id`;"}}"#, marker.display());

    let spec = spec(&dir, "p", Operation::Validate).endpoint(endpoint.clone());
    let result = invoke(spec, None, None, None).await.unwrap();
    assert_eq!(String::from_utf8_lossy(&result.output), endpoint);
    assert!(!marker.exists());
}

#[tokio::test]
#[serial]
async fn inherited_shield_variables_are_scrubbed() {
    let dir = PluginDir::new();
    dir.script("p", r#"env | grep '^SHIELD_' | sort"#);
    std::env::set_var("SHIELD_INHERITED", "leak");

    let spec = spec(&dir, "p", Operation::Purge).endpoint("{}").restore_key("k1");
    let result = invoke(spec, None, None, None).await;
    std::env::remove_var("SHIELD_INHERITED");

    let output = String::from_utf8(result.unwrap().output).unwrap();
    assert_eq!(output, "SHIELD_ENDPOINT={}\nSHIELD_RESTORE_KEY=k1\n");
}

#[tokio::test]
async fn stderr_is_captured_and_forwarded_line_by_line() {
    let dir = PluginDir::new();
    dir.script("p", "echo one >&2; echo two >&2; printf 'three' >&2");
    let (tx, mut rx) = mpsc::channel(16);

    let result = invoke(spec(&dir, "p", Operation::Backup), None, None, Some(tx)).await.unwrap();
    assert_eq!(result.diagnostics, "one\ntwo\nthree");

    let mut lines = Vec::new();
    while let Some(progress) = rx.recv().await {
        assert_eq!(progress.plugin, "p");
        assert_eq!(progress.operation, Operation::Backup);
        lines.push(progress.line);
    }
    assert_eq!(lines, ["one", "two", "three"]);
}

#[tokio::test]
async fn diagnostics_keep_the_tail() {
    let dir = PluginDir::new();
    dir.script("p", "i=0; while [ $i -lt 2000 ]; do echo \"line $i padded with some text to make it longer\" >&2; i=$((i+1)); done");

    let result = invoke(spec(&dir, "p", Operation::Backup), None, None, None).await.unwrap();
    assert!(result.diagnostics.len() <= DIAGNOSTICS_LIMIT);
    assert!(result.diagnostics.ends_with("line 1999 padded with some text to make it longer\n"));
}

#[yare::parameterized(
    failure = { 1, ErrorKind::Plugin },
    usage = { 2, ErrorKind::Configuration },
    endpoint_invalid = { 3, ErrorKind::Configuration },
    key_required = { 4, ErrorKind::Configuration },
    unimplemented = { 10, ErrorKind::Unimplemented },
    unknown = { 77, ErrorKind::Plugin },
)]
#[test_macro(tokio::test)]
async fn exit_codes_map_to_error_kinds(code: i32, kind: ErrorKind) {
    let dir = PluginDir::new();
    dir.script("p", &format!("echo 'went wrong' >&2; exit {code}"));

    let result = invoke(spec(&dir, "p", Operation::Store), None, None, None).await.unwrap();
    let err = result.check().unwrap_err();
    assert_eq!(err.kind, kind);
    assert_eq!(err.stage, Some(Role::Store));
    assert_eq!(err.plugin.as_deref(), Some("p"));
    assert_eq!(err.operation, Some(Operation::Store));
    assert_eq!(err.diagnostics, "went wrong\n");
}

#[tokio::test]
async fn killed_by_signal_is_a_plugin_failure() {
    let dir = PluginDir::new();
    dir.script("p", "kill -KILL $$");

    let result = invoke(spec(&dir, "p", Operation::Backup), None, None, None).await.unwrap();
    assert_eq!(result.code, None);
    assert_eq!(result.status, "terminated by signal 9");
    assert_eq!(result.check().unwrap_err().kind, ErrorKind::Plugin);
}

#[tokio::test]
async fn missing_executable_is_a_configuration_error() {
    let dir = PluginDir::new();
    let err = invoke(spec(&dir, "absent", Operation::Meta), None, None, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
    assert!(err.message.contains("cannot execute"), "{err}");
}

#[tokio::test]
async fn non_executable_file_is_a_configuration_error() {
    let dir = PluginDir::new();
    std::fs::write(dir.path().join("plain"), "#!/bin/sh\nexit 0\n").unwrap();
    let err = invoke(spec(&dir, "plain", Operation::Meta), None, None, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Configuration);
}

#[tokio::test]
async fn stdin_source_is_fed_to_the_plugin() {
    let dir = PluginDir::new();
    let out = dir.path().join("received");
    dir.script("p", &format!("cat > '{}'", out.display()));

    let payload = vec![42u8; 200_000];
    let mut source = &payload[..];
    let result =
        invoke(spec(&dir, "p", Operation::Restore), Some(&mut source), None, None).await.unwrap();
    assert!(result.succeeded());
    assert_eq!(std::fs::read(out).unwrap(), payload);
}

#[tokio::test]
async fn stdout_sink_receives_plugin_output() {
    let dir = PluginDir::new();
    dir.script("p", "head -c 150000 /dev/zero");

    let mut sink: Vec<u8> = Vec::new();
    let result =
        invoke(spec(&dir, "p", Operation::Backup), None, Some(&mut sink), None).await.unwrap();
    assert!(result.succeeded());
    assert!(result.output.is_empty());
    assert_eq!(sink.len(), 150_000);
}

struct BrokenSink;

impl AsyncWrite for BrokenSink {
    fn poll_write(self: Pin<&mut Self>, _: &mut Context<'_>, _: &[u8]) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "sink closed")))
    }

    fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn bridge_failure_stops_and_reaps_the_plugin() {
    let dir = PluginDir::new();
    // Never exits on its own; only the SIGTERM hint ends it.
    dir.script("p", "trap '' PIPE; trap 'exit 0' TERM; while :; do echo data 2>/dev/null; done");

    let mut sink = BrokenSink;
    let err = tokio::time::timeout(
        Duration::from_secs(10),
        invoke(spec(&dir, "p", Operation::Backup), None, Some(&mut sink), None),
    )
    .await
    .expect("plugin was not stopped")
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Pipeline);
    assert!(err.message.contains("sink closed"), "{err}");
}

#[tokio::test]
async fn restore_key_is_last_non_empty_stdout_line() {
    let dir = PluginDir::new();
    dir.script("p", "echo uploading; echo 'abc-123  '; echo");

    let result = invoke(spec(&dir, "p", Operation::Store), None, None, None).await.unwrap();
    assert_eq!(result.restore_key().as_deref(), Some("abc-123"));
}

#[tokio::test]
async fn terminate_delivers_sigterm() {
    let dir = PluginDir::new();
    dir.script("p", "exec sleep 30");

    let plugin = RunningPlugin::spawn(spec(&dir, "p", Operation::Backup), Input::Null, Output::Null, None)
        .unwrap();
    let signal = plugin.signal();
    signal.terminate();
    let result = tokio::time::timeout(Duration::from_secs(10), plugin.wait()).await.unwrap();
    assert_eq!(result.status, "terminated by signal 15");

    // After exit the hint is a no-op.
    signal.terminate();
}
