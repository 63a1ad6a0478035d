// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Harness for the specs: an agent in a temp directory with shell plugins.

use std::net::SocketAddr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use std::time::Duration;

pub use serde_json::json;
pub use shield_agent::{AgentClient, ClientError, Config, JobOutcome, TerminalStatus};
pub use shield_engine::{ErrorKind, JobReport};
pub use shield_wire::{Keypair, Message, OpenFailureReason, ProtocolError, PublicKey};

/// Pulls `"<name>":"<value>"` out of `$SHIELD_ENDPOINT`.
const FIELD: &str = r#"field() { printf '%s' "$SHIELD_ENDPOINT" | sed -n "s/.*\"$1\":\"\([^\"]*\)\".*/\1/p"; }
dir=$(field dir)"#;

/// Target: `backup` streams `$dir/source`, `restore` writes `$dir/restored`.
const FILES: &str = r#"case "$1" in
  validate) [ -n "$dir" ] || { echo "dir: required" >&2; exit 3; } ;;
  backup) echo "reading $dir/source" >&2; exec cat "$dir/source" ;;
  restore) exec cat > "$dir/restored" ;;
  *) exit 10 ;;
esac"#;

/// Store keeping one file per artifact, keyed `blob-<pid>`.
const VAULT: &str = r#"case "$1" in
  validate) [ -n "$dir" ] || { echo "dir: required" >&2; exit 3; } ;;
  store) key="blob-$$"; cat > "$dir/$key" || exit 1; echo "$key" ;;
  retrieve) exec cat "$dir/$SHIELD_RESTORE_KEY" ;;
  purge) rm -f "$dir/$SHIELD_RESTORE_KEY" ;;
  *) exit 10 ;;
esac"#;

/// Target that waits for its peer job to start before producing output.
const RENDEZVOUS: &str = r#"me=$(field me); peer=$(field peer)
case "$1" in
  validate) ;;
  backup)
    touch "$dir/$me"
    i=0
    while [ ! -e "$dir/$peer" ]; do
      i=$((i + 1)); [ $i -gt 100 ] && { echo "$peer never started" >&2; exit 1; }
      sleep 0.1
    done
    echo "$me"
    ;;
  *) exit 10 ;;
esac"#;

/// Target whose `backup` runs until terminated and records the signal.
const ENDLESS: &str = r#"case "$1" in
  validate) ;;
  backup)
    trap 'touch "$dir/terminated"; exit 143' TERM
    touch "$dir/started"
    while :; do sleep 0.1; done
    ;;
  *) exit 10 ;;
esac"#;

/// A running agent plus the caller credentials it trusts.
pub struct TestAgent {
    dir: TempDir,
    pub addr: SocketAddr,
    pub host_key: PublicKey,
    pub caller: Keypair,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl TestAgent {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(configure: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for sub in ["plugins", "data", "vault"] {
            std::fs::create_dir(root.join(sub)).unwrap();
        }
        for (name, body) in
            [("files", FILES), ("vault", VAULT), ("rendezvous", RENDEZVOUS), ("endless", ENDLESS)]
        {
            let path = root.join("plugins").join(name);
            std::fs::write(&path, format!("#!/bin/sh\n{FIELD}\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        shield_agent::keyfile::generate(&root.join("host_key"), "agent", false).unwrap();
        let caller = shield_agent::keyfile::generate(&root.join("caller"), "specs", false).unwrap();
        std::fs::copy(
            shield_agent::keyfile::public_path(&root.join("caller")),
            root.join("authorized_keys"),
        )
        .unwrap();

        let mut config = Config::parse(&format!(
            r#"
listen = "127.0.0.1:0"
host_key = "{root}/host_key"
authorized_keys = "{root}/authorized_keys"
plugin_paths = ["{root}/plugins"]
probe_plugins = false
"#,
            root = root.display()
        ))
        .unwrap();
        configure(&mut config);

        let agent = shield_agent::startup(&config).await.unwrap();
        let addr = agent.listener.local_addr().unwrap();
        let host_key = *shield_agent::keyfile::load_keypair(&root.join("host_key")).unwrap().public();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(agent.listener.run(shutdown.clone()));

        Self { dir, addr, host_key, caller, shutdown, task }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write(&self, rel: &str, contents: &[u8]) {
        std::fs::write(self.path(rel), contents).unwrap();
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.path(rel)).unwrap()
    }

    /// Artifacts currently held by the `vault` store.
    pub fn artifacts(&self) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(self.path("vault"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub async fn client(&self) -> AgentClient {
        AgentClient::connect(self.addr, &self.caller, Some(&self.host_key)).await.unwrap()
    }

    /// Connect, submit one request and wait for its outcome.
    pub async fn submit(&self, request: &serde_json::Value) -> JobOutcome {
        let payload = request.to_string();
        let mut client = self.client().await;
        let run = client.run_job(payload.as_bytes());
        tokio::time::timeout(Duration::from_secs(30), run).await.unwrap().unwrap()
    }

    pub fn backup(&self) -> serde_json::Value {
        json!({
            "operation": "backup",
            "target_plugin": "files",
            "target_endpoint": { "dir": self.path("data") },
            "store_plugin": "vault",
            "store_endpoint": { "dir": self.path("vault") },
        })
    }

    pub fn restore(&self, key: &str) -> serde_json::Value {
        let mut request = self.backup();
        request["operation"] = "restore".into();
        request["restore_key"] = key.into();
        request
    }

    pub async fn stop(self) {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(10), self.task).await.unwrap().unwrap();
    }
}

/// Poll until `path` exists.
pub async fn wait_for_file(path: &Path) -> bool {
    for _ in 0..100 {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

pub fn restore_key(outcome: &JobOutcome) -> String {
    match &outcome.status {
        TerminalStatus::Succeeded { restore_key: Some(key) } => key.clone(),
        other => panic!("expected a restore key, got {other:?}\n{}", outcome.diagnostics),
    }
}
