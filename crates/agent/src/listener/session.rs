// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One authenticated session: channel demultiplexing and the job lifecycle.
//!
//! Only `session` channels are opened and only `exec` requests run jobs.
//! Anything else is refused without side effects and the session keeps
//! serving. Once an `exec` is accepted the job owns the connection: the
//! report is written back on its channel and the connection is closed.

use std::collections::BTreeSet;
use std::sync::Arc;

use shield_engine::{JobError, JobExecutor, JobId, JobReport, JobRequest, JobState, Progress};
use shield_wire::{
    ChannelId, Message, OpenFailureReason, ProtocolError, SecureStream, SecureWriter,
    EXEC_REQUEST, MAX_DATA_CHUNK, SESSION_CHANNEL,
};
use tokio::io::{AsyncRead, AsyncWrite, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::protocol;

/// Channels one session may hold open at a time.
pub const MAX_CHANNELS: usize = 16;

type Inbound = mpsc::Receiver<Result<Message, ProtocolError>>;

enum Flow {
    Continue,
    Done,
}

struct Session<S> {
    writer: SecureWriter<WriteHalf<S>>,
    inbound: Inbound,
    channels: BTreeSet<ChannelId>,
    executor: Arc<dyn JobExecutor>,
}

/// Serve one session until the caller leaves, a job completes, or shutdown.
pub(super) async fn serve<S>(
    stream: SecureStream<S>,
    executor: Arc<dyn JobExecutor>,
    shutdown: CancellationToken,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, writer) = stream.split();

    // Receiving is not cancel safe, so it gets a task of its own.
    let (tx, inbound) = mpsc::channel(16);
    let reader_task = tokio::spawn(async move {
        loop {
            let msg = reader.recv().await;
            let last = msg.is_err();
            if tx.send(msg).await.is_err() || last {
                break;
            }
        }
    });

    let mut session = Session { writer, inbound, channels: BTreeSet::new(), executor };
    let result = session.run(&shutdown).await;
    reader_task.abort();
    result
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn run(&mut self, shutdown: &CancellationToken) -> Result<(), ProtocolError> {
        loop {
            let msg = tokio::select! {
                _ = shutdown.cancelled() => {
                    self.disconnect("agent shutting down").await;
                    return Ok(());
                }
                msg = self.inbound.recv() => msg,
            };
            let msg = match msg {
                Some(Ok(msg)) => msg,
                Some(Err(ProtocolError::ConnectionClosed)) | None => {
                    debug!("client closed the connection");
                    return Ok(());
                }
                Some(Err(e)) => return Err(e),
            };
            match self.dispatch(msg, shutdown).await? {
                Flow::Continue => {}
                Flow::Done => return Ok(()),
            }
        }
    }

    async fn dispatch(
        &mut self,
        msg: Message,
        shutdown: &CancellationToken,
    ) -> Result<Flow, ProtocolError> {
        match msg {
            Message::ChannelOpen { channel, channel_type } => {
                self.open(channel, &channel_type).await?;
            }
            Message::ChannelRequest { channel, request_type, want_reply, payload } => {
                self.require_open(channel, "channel_request")?;
                if request_type == EXEC_REQUEST {
                    return self.exec(channel, &payload, shutdown).await;
                }
                info!(channel, request_type, "refusing unsupported request type");
                if want_reply {
                    self.send(&Message::ChannelFailure { channel }).await?;
                }
            }
            Message::ChannelClose { channel } => {
                if self.channels.remove(&channel) {
                    debug!(channel, "channel closed by client");
                    self.send(&Message::ChannelClose { channel }).await?;
                }
            }
            Message::Disconnect { reason } => {
                debug!("client disconnected: {reason}");
                return Ok(Flow::Done);
            }
            Message::ChannelData { channel, .. }
            | Message::ChannelExtendedData { channel, .. }
            | Message::ChannelEof { channel } => {
                self.require_open(channel, "channel data")?;
            }
            other => debug!(kind = other.kind(), "ignoring unexpected message"),
        }
        Ok(Flow::Continue)
    }

    async fn open(&mut self, channel: ChannelId, channel_type: &str) -> Result<(), ProtocolError> {
        let refusal = if channel_type != SESSION_CHANNEL {
            info!(channel, channel_type, "rejecting unknown channel type");
            Some((OpenFailureReason::UnknownChannelType, "unknown channel type".to_string()))
        } else if self.channels.contains(&channel) {
            Some((OpenFailureReason::ConnectFailed, format!("channel {channel} is already open")))
        } else if self.channels.len() >= MAX_CHANNELS {
            Some((OpenFailureReason::ResourceShortage, "too many open channels".to_string()))
        } else {
            None
        };

        match refusal {
            Some((reason, description)) => {
                self.send(&Message::ChannelOpenFailure { channel, reason, description }).await
            }
            None => {
                self.channels.insert(channel);
                debug!(channel, "session channel opened");
                self.send(&Message::ChannelOpenConfirm { channel }).await
            }
        }
    }

    /// Traffic on a channel that was never opened is a protocol violation.
    fn require_open(&self, channel: ChannelId, what: &str) -> Result<(), ProtocolError> {
        if self.channels.contains(&channel) {
            Ok(())
        } else {
            Err(ProtocolError::Malformed(format!("{what} on unopened channel {channel}")))
        }
    }

    async fn exec(
        &mut self,
        channel: ChannelId,
        payload: &[u8],
        shutdown: &CancellationToken,
    ) -> Result<Flow, ProtocolError> {
        let request = match protocol::parse_exec(payload) {
            Ok(request) => request,
            Err(rejection) => {
                warn!(channel, class = rejection.class(), "rejected exec request: {rejection}");
                self.extended(channel, format!("{rejection}\n")).await?;
                self.send(&Message::ChannelFailure { channel }).await?;
                return Ok(Flow::Continue);
            }
        };

        info!(
            channel,
            operation = %request.operation,
            target_plugin = %request.target_plugin,
            store_plugin = %request.store_plugin,
            "accepted exec request"
        );
        self.send(&Message::ChannelSuccess { channel }).await?;
        self.run_job(channel, request, shutdown).await?;
        Ok(Flow::Done)
    }

    /// Run one job, streaming progress while it runs, then report it.
    async fn run_job(
        &mut self,
        channel: ChannelId,
        request: JobRequest,
        shutdown: &CancellationToken,
    ) -> Result<(), ProtocolError> {
        let operation = request.operation;
        self.extended(
            channel,
            format!(
                "running {operation} job: {} -> {}\n",
                request.plugin(operation.producer().0),
                request.plugin(operation.consumer().0)
            ),
        )
        .await?;

        let cancel = shutdown.child_token();
        let (progress_tx, mut progress) = mpsc::channel::<Progress>(64);
        let executor = Arc::clone(&self.executor);
        let job_cancel = cancel.clone();
        let mut job = tokio::spawn(async move {
            executor.execute(request, Some(progress_tx), job_cancel).await
        });

        let mut caller_gone = false;
        let joined = loop {
            tokio::select! {
                joined = &mut job => break joined,
                Some(event) = progress.recv() => {
                    if !caller_gone && self.extended(channel, progress_line(&event)).await.is_err() {
                        warn!(channel, "cannot reach the caller, cancelling job");
                        cancel.cancel();
                        caller_gone = true;
                    }
                }
                msg = self.inbound.recv(), if !caller_gone => match msg {
                    Some(Ok(Message::ChannelOpen { channel: other, .. })) => {
                        let refusal = Message::ChannelOpenFailure {
                            channel: other,
                            reason: OpenFailureReason::AdministrativelyProhibited,
                            description: "a job is running on this connection".into(),
                        };
                        self.send(&refusal).await.ok();
                    }
                    Some(Ok(Message::ChannelRequest { channel: other, want_reply: true, .. })) => {
                        self.send(&Message::ChannelFailure { channel: other }).await.ok();
                    }
                    Some(Ok(Message::ChannelClose { channel: closed })) if closed == channel => {
                        info!(channel, "caller closed the channel, cancelling job");
                        cancel.cancel();
                        caller_gone = true;
                    }
                    Some(Ok(Message::Disconnect { .. })) | Some(Err(_)) | None => {
                        info!(channel, "caller disconnected, cancelling job");
                        cancel.cancel();
                        caller_gone = true;
                    }
                    Some(Ok(other)) => debug!(kind = other.kind(), "ignoring message while job runs"),
                },
            }
        };

        let report = match joined {
            Ok(report) => report,
            Err(e) => JobReport {
                job_id: JobId::new(),
                operation,
                status: JobState::Failed,
                restore_key: None,
                bytes: 0,
                error: Some(JobError::pipeline(format!("job task failed: {e}"))),
                secondary: Vec::new(),
                elapsed_ms: 0,
            },
        };
        if caller_gone {
            info!(job_id = %report.job_id, status = %report.status, "job ended after the caller left");
            return Ok(());
        }

        while let Ok(event) = progress.try_recv() {
            self.extended(channel, progress_line(&event)).await?;
        }
        self.report(channel, &report).await
    }

    /// Final report: JSON on the data stream, `exit-status`, EOF and close.
    async fn report(&mut self, channel: ChannelId, report: &JobReport) -> Result<(), ProtocolError> {
        let body = report.to_json()?;
        for chunk in body.chunks(MAX_DATA_CHUNK) {
            self.send(&Message::ChannelData { channel, data: chunk.to_vec() }).await?;
        }
        self.send(&Message::exit_status(channel, report.exit_status())).await?;
        self.send(&Message::ChannelEof { channel }).await?;
        self.send(&Message::ChannelClose { channel }).await?;
        self.channels.remove(&channel);
        self.disconnect("job finished").await;
        Ok(())
    }

    async fn extended(&mut self, channel: ChannelId, text: String) -> Result<(), ProtocolError> {
        for chunk in text.as_bytes().chunks(MAX_DATA_CHUNK) {
            let msg = Message::ChannelExtendedData { channel, data: chunk.to_vec() };
            self.send(&msg).await?;
        }
        Ok(())
    }

    async fn send(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        self.writer.send(msg).await
    }

    async fn disconnect(&mut self, reason: &str) {
        let msg = Message::Disconnect { reason: reason.to_string() };
        if let Err(e) = self.send(&msg).await {
            debug!("disconnect not delivered: {e}");
        }
    }
}

fn progress_line(event: &Progress) -> String {
    format!("[{} {}] {}\n", event.plugin, event.operation, event.line)
}
