// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job Pipeline Engine: runs one job as a producer/consumer pair of plugins.
//!
//! Backup pipes target `backup` into store `store`; restore pipes store
//! `retrieve` into target `restore`. Both stages run concurrently, joined by
//! a relay with a fixed buffer, so memory use does not depend on artifact
//! size and a slow consumer throttles the producer.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use shield_plugin::{ExitClass, Operation, Role};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::{ErrorKind, JobError};
use crate::invoke::{
    invoke, Input, InvocationResult, InvocationSpec, Output, ProgressSink, RunningPlugin,
    StageSignal,
};
use crate::job::{Job, JobState};
use crate::registry::Registry;
use crate::report::JobReport;
use crate::request::JobRequest;

/// Relay buffer between the two stages.
pub const RELAY_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Run both plugins' `validate` before starting the pipeline.
    pub validate_endpoints: bool,
    /// Stop jobs running longer than this.
    pub job_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { validate_endpoints: true, job_timeout: None }
    }
}

/// Runs jobs against a fixed plugin registry.
#[derive(Debug, Clone)]
pub struct Engine {
    registry: Arc<Registry>,
    config: EngineConfig,
}

/// What a finished pipeline produced.
#[derive(Debug, Default)]
struct Outcome {
    restore_key: Option<String>,
    bytes: u64,
    errors: Vec<JobError>,
}

impl Outcome {
    fn failed(error: JobError) -> Self {
        Self { errors: vec![error], ..Self::default() }
    }
}

impl Engine {
    pub fn new(registry: Arc<Registry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run one job to a terminal state.
    ///
    /// `cancel` stops the job: every plugin's process group gets `SIGTERM`
    /// and each plugin is reaped before this returns.
    pub async fn run(
        &self,
        request: JobRequest,
        progress: Option<ProgressSink>,
        cancel: CancellationToken,
    ) -> JobReport {
        let mut job = Job::new(request);
        let span = info_span!("job", job_id = %job.id, operation = %job.request.operation);
        async move {
            let started = Instant::now();
            info!(
                target_plugin = %job.request.target_plugin,
                store_plugin = %job.request.store_plugin,
                "job received"
            );

            let deadline = self.config.job_timeout.map(|t| (tokio::time::Instant::now() + t, t));
            let outcome = self.execute(&mut job, progress, &cancel, deadline).await;

            let mut errors = outcome.errors.into_iter();
            let error = errors.next();
            let status = if error.is_none() { JobState::Succeeded } else { JobState::Failed };
            job.advance(status);

            let report = JobReport {
                job_id: job.id.clone(),
                operation: job.request.operation,
                status,
                restore_key: if error.is_none() { outcome.restore_key } else { None },
                bytes: outcome.bytes,
                error,
                secondary: errors.collect(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            match &report.error {
                None => info!(bytes = report.bytes, elapsed_ms = report.elapsed_ms, "job succeeded"),
                Some(e) => warn!(
                    bytes = report.bytes,
                    secondary = report.secondary.len(),
                    "job failed: {e}"
                ),
            }
            report
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        job: &mut Job,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
        deadline: Option<(tokio::time::Instant, Duration)>,
    ) -> Outcome {
        let request = job.request.clone();
        let target = match self.registry.resolve(&request.target_plugin, Role::Target) {
            Ok(entry) => entry,
            Err(e) => return Outcome::failed(e),
        };
        let store = match self.registry.resolve(&request.store_plugin, Role::Store) {
            Ok(entry) => entry,
            Err(e) => return Outcome::failed(e),
        };
        let spec = |role: Role, operation: Operation| {
            let entry = match role {
                Role::Target => target,
                Role::Store => store,
            };
            let spec = InvocationSpec::new(entry, operation)
                .role(role)
                .endpoint(request.endpoint(role));
            match (operation.requires_restore_key(), &request.restore_key) {
                (true, Some(key)) => spec.restore_key(key.clone()),
                _ => spec,
            }
        };

        if self.config.validate_endpoints {
            let validation = validate(
                spec(Role::Target, Operation::Validate),
                spec(Role::Store, Operation::Validate),
                progress.clone(),
                interruption(cancel, deadline),
            );
            if let Err(e) = validation.await {
                return Outcome::failed(e);
            }
        }
        job.advance(JobState::Validated);

        if cancel.is_cancelled() {
            return Outcome::failed(JobError::new(ErrorKind::Cancelled, "job cancelled"));
        }
        job.advance(JobState::Running);

        let (producer_role, producer_op) = request.operation.producer();
        let (consumer_role, consumer_op) = request.operation.consumer();
        run_stages(
            spec(producer_role, producer_op),
            spec(consumer_role, consumer_op),
            progress,
            interruption(cancel, deadline),
        )
        .await
    }
}

/// Run both plugins' `validate` concurrently. A plugin that does not
/// implement `validate` is skipped. On interruption both are stopped and
/// reaped before the interruption is returned.
async fn validate(
    target: InvocationSpec,
    store: InvocationSpec,
    progress: Option<ProgressSink>,
    interrupt: impl Future<Output = JobError>,
) -> Result<(), JobError> {
    let target = RunningPlugin::spawn(target, Input::Null, Output::Capture, progress.clone())?;
    let store = match RunningPlugin::spawn(store, Input::Null, Output::Capture, progress) {
        Ok(plugin) => plugin,
        Err(e) => {
            target.signal().terminate();
            target.wait().await;
            return Err(e);
        }
    };

    let signals = [target.signal(), store.signal()];
    let both = async { tokio::join!(target.wait(), store.wait()) };
    tokio::pin!(both, interrupt);
    let (target, store) = tokio::select! {
        results = &mut both => results,
        e = &mut interrupt => {
            signals.iter().for_each(StageSignal::terminate);
            both.await;
            return Err(e);
        }
    };

    for result in [target, store] {
        if result.class == ExitClass::Unimplemented {
            debug!(plugin = %result.spec.plugin, "plugin does not implement validate, skipping");
            continue;
        }
        result.check().map_err(|e| JobError { kind: ErrorKind::Configuration, ..e })?;
    }
    Ok(())
}

/// Resolves when the job is cancelled or its deadline passes.
async fn interruption(
    cancel: &CancellationToken,
    deadline: Option<(tokio::time::Instant, Duration)>,
) -> JobError {
    let expired = async {
        match deadline {
            Some((at, limit)) => {
                tokio::time::sleep_until(at).await;
                limit
            }
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = cancel.cancelled() => JobError::new(ErrorKind::Cancelled, "job cancelled"),
        limit = expired => JobError::new(ErrorKind::TimedOut, format!("job exceeded {limit:?}")),
    }
}

async fn run_stages(
    producer_spec: InvocationSpec,
    consumer_spec: InvocationSpec,
    progress: Option<ProgressSink>,
    interrupt: impl Future<Output = JobError>,
) -> Outcome {
    let consumer_output = match consumer_spec.operation {
        Operation::Store => Output::Capture,
        _ => Output::Null,
    };

    let mut producer =
        match RunningPlugin::spawn(producer_spec.clone(), Input::Null, Output::Piped, progress.clone()) {
            Ok(plugin) => plugin,
            Err(e) => return Outcome::failed(e),
        };
    let mut consumer =
        match RunningPlugin::spawn(consumer_spec.clone(), Input::Piped, consumer_output, progress) {
            Ok(plugin) => plugin,
            Err(e) => {
                producer.signal().terminate();
                producer.wait().await;
                return Outcome::failed(e);
            }
        };

    let bytes = Arc::new(AtomicU64::new(0));
    let relay = match (producer.take_stdout(), consumer.take_stdin()) {
        (Some(reader), Some(writer)) => tokio::spawn(pump(reader, writer, Arc::clone(&bytes))),
        _ => tokio::spawn(async { Err(std::io::Error::other("plugin pipes unavailable")) }),
    };

    let producer_signal = producer.signal();
    let consumer_signal = consumer.signal();
    let mut producer_wait = tokio::spawn(producer.wait());
    let mut consumer_wait = tokio::spawn(consumer.wait());
    let mut produced: Option<InvocationResult> = None;
    let mut consumed: Option<InvocationResult> = None;
    let mut interrupted: Option<JobError> = None;
    tokio::pin!(interrupt);

    while produced.is_none() || consumed.is_none() {
        tokio::select! {
            joined = &mut producer_wait, if produced.is_none() => {
                let result = joined.unwrap_or_else(|e| lost(&producer_spec, e));
                if !result.succeeded() {
                    // The consumer sees EOF now instead of whenever the relay notices.
                    relay.abort();
                }
                produced = Some(result);
            }
            joined = &mut consumer_wait, if consumed.is_none() => {
                let result = joined.unwrap_or_else(|e| lost(&consumer_spec, e));
                if !result.succeeded() && produced.is_none() {
                    debug!(plugin = %producer_spec.plugin, "consumer failed, stopping producer");
                    producer_signal.terminate();
                    relay.abort();
                }
                consumed = Some(result);
            }
            e = &mut interrupt, if interrupted.is_none() => {
                warn!("{e}, stopping plugins");
                producer_signal.terminate();
                consumer_signal.terminate();
                relay.abort();
                interrupted = Some(e);
            }
        }
    }

    let relayed = match relay.await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(e.to_string()),
    };
    let (Some(produced), Some(consumed)) = (produced, consumed) else {
        return Outcome::failed(JobError::pipeline("pipeline stage result missing"));
    };

    let mut failures: Vec<(Instant, JobError)> = [&produced, &consumed]
        .into_iter()
        .filter_map(|result| result.check().err().map(|e| (result.finished, e)))
        .collect();
    failures.sort_by_key(|(at, _)| *at);
    let mut errors: Vec<JobError> = interrupted.into_iter().collect();
    errors.extend(failures.into_iter().map(|(_, e)| e));

    match relayed {
        Err(e) if errors.is_empty() => {
            errors.push(JobError::pipeline(format!("relaying payload failed: {e}")));
        }
        Err(e) => debug!("relay ended with {e} after a stage failure"),
        Ok(()) => {}
    }

    let mut restore_key = None;
    if consumed.spec.operation == Operation::Store && consumed.succeeded() {
        match consumed.restore_key() {
            Some(key) if errors.is_empty() => restore_key = Some(key),
            Some(key) => purge_truncated(&consumed.spec, key).await,
            None if errors.is_empty() => errors.push(
                JobError::new(ErrorKind::Plugin, "store succeeded without printing a restore key")
                    .at(Role::Store, &consumed.spec.plugin, Operation::Store)
                    .with_diagnostics(consumed.diagnostics.clone()),
            ),
            None => {}
        }
    }

    Outcome { restore_key, bytes: bytes.load(Ordering::Relaxed), errors }
}

/// Copy producer stdout into consumer stdin, counting bytes.
async fn pump(
    reader: ChildStdout,
    mut writer: ChildStdin,
    bytes: Arc<AtomicU64>,
) -> std::io::Result<()> {
    let mut reader = BufReader::with_capacity(RELAY_BUFFER, reader);
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            break;
        }
        let n = chunk.len();
        writer.write_all(chunk).await?;
        reader.consume(n);
        bytes.fetch_add(n as u64, Ordering::Relaxed);
    }
    writer.shutdown().await
}

/// Remove an artifact stored from a producer that failed part-way.
async fn purge_truncated(store: &InvocationSpec, key: String) {
    let spec = InvocationSpec {
        operation: Operation::Purge,
        restore_key: Some(key.clone()),
        ..store.clone()
    };
    match invoke(spec, None, None, None).await {
        Ok(result) if result.succeeded() => {
            info!(plugin = %store.plugin, restore_key = %key, "purged truncated artifact");
        }
        Ok(result) => {
            warn!(plugin = %store.plugin, restore_key = %key, "purging truncated artifact failed: {}", result.status);
        }
        Err(e) => warn!(plugin = %store.plugin, restore_key = %key, "purging truncated artifact failed: {e}"),
    }
}

fn lost(spec: &InvocationSpec, e: JoinError) -> InvocationResult {
    InvocationResult {
        spec: spec.clone(),
        class: ExitClass::Failure,
        code: None,
        status: format!("stage task failed: {e}"),
        diagnostics: String::new(),
        output: Vec::new(),
        finished: Instant::now(),
        elapsed: Duration::ZERO,
    }
}

#[async_trait::async_trait]
impl crate::executor::JobExecutor for Engine {
    async fn execute(
        &self,
        request: JobRequest,
        progress: Option<ProgressSink>,
        cancel: CancellationToken,
    ) -> JobReport {
        self.run(request, progress, cancel).await
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
