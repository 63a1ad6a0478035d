// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin Invoker: runs one plugin executable for one operation.
//!
//! Plugins are spawned directly from an argument vector. Nothing passes
//! through a shell, so endpoint values (passwords included) are never
//! interpreted. Each invocation owns exactly one child process and always
//! reaps it, including when bridging its streams fails.
//!
//! Every plugin leads its own process group. Signals go to the whole group,
//! so helpers a plugin started (a CLI it shells out to, say) stop with it.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use shield_plugin::{
    parse_restore_key, ExitClass, Operation, Role, ENDPOINT_ENV, ENV_PREFIX, RESTORE_KEY_ENV,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::capture::{read_tail, TailBuffer};
use crate::error::{ErrorKind, JobError};
use crate::registry::PluginEntry;

/// Diagnostics kept per invocation (the tail is kept).
pub const DIAGNOSTICS_LIMIT: usize = 64 * 1024;

/// Captured stdout kept per invocation (the tail is kept).
pub const OUTPUT_LIMIT: usize = 64 * 1024;

/// Longest diagnostic line forwarded as one progress event.
const LINE_LIMIT: u64 = 8 * 1024;

/// How long output readers may run on after the plugin itself exited.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// One line of plugin diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub plugin: String,
    pub operation: Operation,
    pub line: String,
}

/// Receives diagnostics while plugins run.
pub type ProgressSink = mpsc::Sender<Progress>;

/// What to run: executable, operation and the environment it receives.
#[derive(Debug, Clone)]
pub struct InvocationSpec {
    pub plugin: String,
    pub executable: PathBuf,
    pub operation: Operation,
    /// The stage this invocation is attributed to in errors.
    pub role: Option<Role>,
    pub endpoint: Option<String>,
    pub restore_key: Option<String>,
}

impl InvocationSpec {
    pub fn new(entry: &PluginEntry, operation: Operation) -> Self {
        Self {
            plugin: entry.name.clone(),
            executable: entry.path.clone(),
            operation,
            role: operation.role(),
            endpoint: None,
            restore_key: None,
        }
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn restore_key(mut self, key: impl Into<String>) -> Self {
        self.restore_key = Some(key.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg(self.operation.as_str());
        for (key, _) in std::env::vars_os() {
            if key.to_string_lossy().starts_with(ENV_PREFIX) {
                cmd.env_remove(&key);
            }
        }
        if let Some(endpoint) = &self.endpoint {
            cmd.env(ENDPOINT_ENV, endpoint);
        }
        if let Some(key) = &self.restore_key {
            cmd.env(RESTORE_KEY_ENV, key);
        }
        cmd.process_group(0);
        cmd.kill_on_drop(true);
        cmd
    }

    fn error(&self, kind: ErrorKind, message: impl Into<String>) -> JobError {
        let err = JobError::new(kind, message);
        match self.role {
            Some(role) => err.at(role, &self.plugin, self.operation),
            None => JobError { plugin: Some(self.plugin.clone()), operation: Some(self.operation), ..err },
        }
    }
}

/// Where a plugin's stdin comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Null,
    Piped,
}

/// Where a plugin's stdout goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Null,
    /// Handed to the caller via [`RunningPlugin::take_stdout`].
    Piped,
    /// Collected (bounded) into [`InvocationResult::output`].
    Capture,
}

/// Signals the process group of one running plugin.
#[derive(Debug, Clone)]
pub struct StageSignal {
    pgid: Option<u32>,
    plugin: String,
    exited: Arc<AtomicBool>,
}

impl StageSignal {
    /// Send the cancellation hint (`SIGTERM`) to the plugin and its helpers.
    pub fn terminate(&self) {
        if self.exited.load(Ordering::Acquire) {
            return;
        }
        self.send(Signal::SIGTERM);
    }

    /// `SIGKILL` whatever is left of the group once the plugin has exited.
    fn kill_leftovers(&self) {
        self.send(Signal::SIGKILL);
    }

    fn send(&self, signal: Signal) {
        let Some(pgid) = self.pgid.and_then(|p| i32::try_from(p).ok()) else {
            return;
        };
        match killpg(Pid::from_raw(pgid), signal) {
            Ok(()) => debug!(plugin = %self.plugin, pgid, "sent {signal}"),
            Err(e) => debug!(plugin = %self.plugin, pgid, "{signal} not delivered: {e}"),
        }
    }
}

/// A spawned plugin that has not been reaped yet.
pub struct RunningPlugin {
    spec: InvocationSpec,
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    capture: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    diagnostics: JoinHandle<String>,
    signal: StageSignal,
    started: Instant,
}

impl RunningPlugin {
    pub fn spawn(
        spec: InvocationSpec,
        input: Input,
        output: Output,
        progress: Option<ProgressSink>,
    ) -> Result<Self, JobError> {
        let mut cmd = spec.command();
        cmd.stdin(match input {
            Input::Null => Stdio::null(),
            Input::Piped => Stdio::piped(),
        });
        cmd.stdout(match output {
            Output::Null => Stdio::null(),
            Output::Piped | Output::Capture => Stdio::piped(),
        });
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            spec.error(
                ErrorKind::Configuration,
                format!("cannot execute {}: {e}", spec.executable.display()),
            )
        })?;

        let stdin = child.stdin.take();
        let mut stdout = child.stdout.take();
        let capture = match output {
            Output::Capture => stdout.take().map(|out| tokio::spawn(read_tail(out, OUTPUT_LIMIT))),
            _ => None,
        };
        let diagnostics = tokio::spawn(collect_diagnostics(
            child.stderr.take(),
            spec.plugin.clone(),
            spec.operation,
            progress,
        ));
        let signal = StageSignal {
            pgid: child.id(),
            plugin: spec.plugin.clone(),
            exited: Arc::new(AtomicBool::new(false)),
        };
        debug!(plugin = %spec.plugin, operation = %spec.operation, pid = ?child.id(), "spawned plugin");

        Ok(Self { spec, child, stdin, stdout, capture, diagnostics, signal, started: Instant::now() })
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn signal(&self) -> StageSignal {
        self.signal.clone()
    }

    /// Wait for the process to exit and collect what it wrote.
    ///
    /// Pipes still held here are closed first so the plugin sees EOF.
    pub async fn wait(mut self) -> InvocationResult {
        drop(self.stdin.take());
        drop(self.stdout.take());

        let status = self.child.wait().await;
        self.signal.exited.store(true, Ordering::Release);
        let finished = Instant::now();

        let output = match self.capture.take() {
            Some(mut task) => match drain(&mut task, &self.signal).await {
                Some(Ok(bytes)) => bytes,
                Some(Err(e)) => {
                    warn!(plugin = %self.spec.plugin, "reading plugin output failed: {e}");
                    Vec::new()
                }
                None => Vec::new(),
            },
            None => Vec::new(),
        };
        let diagnostics = drain(&mut self.diagnostics, &self.signal).await.unwrap_or_default();

        let (class, code, status) = match status {
            Ok(status) => (classify(&status), status.code(), describe(&status)),
            Err(e) => (ExitClass::Failure, None, format!("waiting for plugin failed: {e}")),
        };
        debug!(
            plugin = %self.spec.plugin,
            operation = %self.spec.operation,
            %class,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "plugin exited: {status}"
        );

        InvocationResult {
            spec: self.spec,
            class,
            code,
            status,
            diagnostics,
            output,
            finished,
            elapsed: finished.duration_since(self.started),
        }
    }
}

/// Outcome of one invocation.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    pub spec: InvocationSpec,
    pub class: ExitClass,
    /// Raw exit code; `None` when killed by a signal.
    pub code: Option<i32>,
    /// Human-readable exit description.
    pub status: String,
    /// Tail of stderr.
    pub diagnostics: String,
    /// Tail of stdout when it was captured.
    pub output: Vec<u8>,
    pub finished: Instant,
    pub elapsed: Duration,
}

impl InvocationResult {
    pub fn succeeded(&self) -> bool {
        self.class == ExitClass::Success
    }

    /// The restore key printed by a `store` invocation.
    pub fn restore_key(&self) -> Option<String> {
        parse_restore_key(&String::from_utf8_lossy(&self.output)).map(str::to_string)
    }

    /// The job error this outcome represents, if any.
    pub fn check(&self) -> Result<(), JobError> {
        let (kind, message) = match self.class {
            ExitClass::Success => return Ok(()),
            ExitClass::Failure => (ErrorKind::Plugin, self.status.clone()),
            ExitClass::Misconfigured => (ErrorKind::Configuration, self.status.clone()),
            ExitClass::Unimplemented => (
                ErrorKind::Unimplemented,
                format!("{} does not implement '{}'", self.spec.plugin, self.spec.operation),
            ),
        };
        Err(self.spec.error(kind, message).with_diagnostics(self.diagnostics.clone()))
    }
}

/// Run one operation to completion.
///
/// With `stdin` the source is copied into the plugin; with `stdout` the
/// plugin's output is copied into the sink, otherwise it is captured. A
/// non-zero exit is reported through [`InvocationResult::check`]; `Err` here
/// means the plugin could not be started or its streams could not be bridged.
pub async fn invoke(
    spec: InvocationSpec,
    stdin: Option<&mut (dyn AsyncRead + Unpin + Send)>,
    stdout: Option<&mut (dyn AsyncWrite + Unpin + Send)>,
    progress: Option<ProgressSink>,
) -> Result<InvocationResult, JobError> {
    let input = if stdin.is_some() { Input::Piped } else { Input::Null };
    let output = if stdout.is_some() { Output::Piped } else { Output::Capture };
    let mut plugin = RunningPlugin::spawn(spec, input, output, progress)?;
    let signal = plugin.signal();

    let child_in = plugin.take_stdin();
    let child_out = plugin.take_stdout();
    let feed = async move {
        match (stdin, child_in) {
            (Some(src), Some(mut dst)) => {
                tokio::io::copy(src, &mut dst).await?;
                dst.shutdown().await
            }
            _ => Ok(()),
        }
    };
    let drain = async move {
        match (stdout, child_out) {
            (Some(dst), Some(mut src)) => {
                tokio::io::copy(&mut src, dst).await?;
                dst.flush().await
            }
            _ => Ok(()),
        }
    };
    let (fed, drained) = tokio::join!(feed, drain);
    let bridge = fed.and(drained);
    if bridge.is_err() {
        signal.terminate();
    }

    let result = plugin.wait().await;
    match bridge {
        Err(e) if result.check().is_ok() => Err(result
            .spec
            .error(ErrorKind::Pipeline, format!("bridging plugin streams failed: {e}"))
            .with_diagnostics(result.diagnostics)),
        _ => Ok(result),
    }
}

/// Await a reader that finishes at EOF on a plugin pipe.
///
/// A helper the plugin left running can hold the pipe open after the plugin
/// exited. After [`DRAIN_GRACE`] the rest of the group is killed; if the pipe
/// is still open after another grace period the reader is abandoned.
async fn drain<T>(task: &mut JoinHandle<T>, signal: &StageSignal) -> Option<T> {
    if let Ok(joined) = tokio::time::timeout(DRAIN_GRACE, &mut *task).await {
        return joined.ok();
    }
    warn!(plugin = %signal.plugin, "plugin pipes still open after exit, killing its process group");
    signal.kill_leftovers();
    match tokio::time::timeout(DRAIN_GRACE, &mut *task).await {
        Ok(joined) => joined.ok(),
        Err(_) => {
            warn!(plugin = %signal.plugin, "abandoning plugin pipes held by an escaped process");
            task.abort();
            None
        }
    }
}

async fn collect_diagnostics(
    stderr: Option<ChildStderr>,
    plugin: String,
    operation: Operation,
    progress: Option<ProgressSink>,
) -> String {
    let Some(stderr) = stderr else {
        return String::new();
    };
    let mut reader = BufReader::new(stderr);
    let mut tail = TailBuffer::new(DIAGNOSTICS_LIMIT);
    let mut line = Vec::new();
    loop {
        line.clear();
        match (&mut reader).take(LINE_LIMIT).read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                tail.extend(&line);
                let text = String::from_utf8_lossy(&line).trim_end().to_string();
                debug!(plugin = %plugin, %operation, "stderr: {text}");
                if let Some(sink) = &progress {
                    let event = Progress { plugin: plugin.clone(), operation, line: text };
                    // The receiver going away only stops forwarding.
                    let _ = sink.send(event).await;
                }
            }
            Err(e) => {
                debug!(plugin = %plugin, "reading stderr failed: {e}");
                break;
            }
        }
    }
    tail.into_string()
}

fn classify(status: &ExitStatus) -> ExitClass {
    status.code().map(ExitClass::from_code).unwrap_or(ExitClass::Failure)
}

fn describe(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exited with status {code}"),
        (None, Some(signal)) => format!("terminated by signal {signal}"),
        (None, None) => "exited abnormally".to_string(),
    }
}

#[cfg(test)]
#[path = "invoke_tests.rs"]
mod tests;
