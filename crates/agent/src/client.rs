// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Caller side of the session protocol, as used by `shield-agent submit`
//! and by the integration tests.

use std::net::SocketAddr;

use shield_engine::JobReport;
use shield_wire::{
    connect, decode_exit_status, ChannelId, Keypair, Message, OpenFailureReason, ProtocolError,
    PublicKey, SecureStream, EXIT_STATUS_REQUEST, SESSION_CHANNEL,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot connect: {0}")]
    Connect(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("channel open refused ({reason}): {description}")]
    OpenRejected { reason: OpenFailureReason, description: String },

    #[error("unexpected message from agent: {0}")]
    Unexpected(&'static str),

    #[error("agent disconnected: {0}")]
    Disconnected(String),

    #[error("unreadable job report: {0}")]
    Report(#[source] serde_json::Error),
}

/// How a submitted job ended, from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStatus {
    Succeeded { restore_key: Option<String> },
    Failed { reason: String },
    /// The agent refused the request before running anything.
    Rejected { reason: String },
}

#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub status: TerminalStatus,
    pub report: Option<JobReport>,
    /// Everything received on the extended-data stream.
    pub diagnostics: String,
    pub exit_status: Option<u32>,
}

impl JobOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, TerminalStatus::Succeeded { .. })
    }
}

pub struct AgentClient<S = TcpStream> {
    stream: SecureStream<S>,
    next_channel: ChannelId,
}

impl AgentClient<TcpStream> {
    pub async fn connect(
        addr: SocketAddr,
        key: &Keypair,
        host_key: Option<&PublicKey>,
    ) -> Result<Self, ClientError> {
        let tcp = TcpStream::connect(addr).await?;
        tcp.set_nodelay(true)?;
        Self::handshake(tcp, key, host_key).await
    }
}

impl<S> AgentClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub async fn handshake(
        stream: S,
        key: &Keypair,
        host_key: Option<&PublicKey>,
    ) -> Result<Self, ClientError> {
        let stream = connect(stream, key, host_key).await?;
        Ok(Self { stream, next_channel: 0 })
    }

    /// The agent's static key, as presented during the handshake.
    pub fn host_key(&self) -> &PublicKey {
        self.stream.peer()
    }

    pub async fn send(&mut self, msg: &Message) -> Result<(), ClientError> {
        Ok(self.stream.send(msg).await?)
    }

    pub async fn recv(&mut self) -> Result<Message, ClientError> {
        match self.stream.recv().await? {
            Message::Disconnect { reason } => Err(ClientError::Disconnected(reason)),
            msg => Ok(msg),
        }
    }

    pub async fn open_channel(&mut self, channel_type: &str) -> Result<ChannelId, ClientError> {
        let channel = self.next_channel;
        self.next_channel += 1;
        self.send(&Message::ChannelOpen { channel, channel_type: channel_type.to_string() })
            .await?;
        loop {
            match self.recv().await? {
                Message::ChannelOpenConfirm { channel: c } if c == channel => return Ok(channel),
                Message::ChannelOpenFailure { channel: c, reason, description } if c == channel => {
                    return Err(ClientError::OpenRejected { reason, description });
                }
                // Diagnostics of a job running on another channel.
                Message::ChannelExtendedData { .. } => {}
                other => return Err(ClientError::Unexpected(other.kind())),
            }
        }
    }

    pub async fn open_session(&mut self) -> Result<ChannelId, ClientError> {
        self.open_channel(SESSION_CHANNEL).await
    }

    /// Send a request with `want_reply` set and wait for the verdict.
    /// Extended data received meanwhile is discarded.
    pub async fn request(
        &mut self,
        channel: ChannelId,
        request_type: &str,
        payload: &[u8],
    ) -> Result<bool, ClientError> {
        self.send(&Message::ChannelRequest {
            channel,
            request_type: request_type.to_string(),
            want_reply: true,
            payload: payload.to_vec(),
        })
        .await?;
        loop {
            match self.recv().await? {
                Message::ChannelSuccess { channel: c } if c == channel => return Ok(true),
                Message::ChannelFailure { channel: c } if c == channel => return Ok(false),
                Message::ChannelExtendedData { .. } => {}
                other => return Err(ClientError::Unexpected(other.kind())),
            }
        }
    }

    /// Open a session channel and run one job request on it.
    pub async fn run_job(&mut self, request: &[u8]) -> Result<JobOutcome, ClientError> {
        let channel = self.open_session().await?;
        self.run_job_on(channel, request, |_| {}).await
    }

    /// Run one job request on an open channel, passing each diagnostic
    /// chunk to `on_progress` as it arrives.
    pub async fn run_job_on(
        &mut self,
        channel: ChannelId,
        request: &[u8],
        mut on_progress: impl FnMut(&str),
    ) -> Result<JobOutcome, ClientError> {
        self.send(&Message::exec(channel, request)).await?;

        let mut diagnostics = String::new();
        let mut data = Vec::new();
        let mut exit_status = None;
        let mut accepted = false;

        loop {
            let msg = match self.stream.recv().await {
                Ok(msg) => msg,
                // The agent closes the connection right after the job.
                Err(ProtocolError::ConnectionClosed) if accepted && exit_status.is_some() => break,
                Err(e) => return Err(e.into()),
            };
            match msg {
                Message::ChannelExtendedData { channel: c, data: chunk } if c == channel => {
                    let text = String::from_utf8_lossy(&chunk);
                    on_progress(&text);
                    diagnostics.push_str(&text);
                }
                Message::ChannelSuccess { channel: c } if c == channel => accepted = true,
                Message::ChannelFailure { channel: c } if c == channel && !accepted => {
                    return Ok(JobOutcome {
                        status: TerminalStatus::Rejected { reason: diagnostics.trim().to_string() },
                        report: None,
                        diagnostics,
                        exit_status: None,
                    });
                }
                Message::ChannelData { channel: c, data: chunk } if c == channel => {
                    data.extend_from_slice(&chunk);
                }
                Message::ChannelRequest { channel: c, request_type, payload, .. }
                    if c == channel && request_type == EXIT_STATUS_REQUEST =>
                {
                    exit_status = Some(decode_exit_status(&payload)?);
                }
                Message::ChannelEof { channel: c } if c == channel => {}
                Message::ChannelClose { channel: c } if c == channel => {
                    // The agent may already be gone.
                    let _ = self.stream.send(&Message::ChannelClose { channel }).await;
                    break;
                }
                Message::Disconnect { reason } if !accepted || exit_status.is_none() => {
                    return Err(ClientError::Disconnected(reason));
                }
                Message::Disconnect { .. } => break,
                other => return Err(ClientError::Unexpected(other.kind())),
            }
        }

        if !accepted {
            return Err(ClientError::Unexpected("job ended before the request was accepted"));
        }
        let report: JobReport = serde_json::from_slice(&data).map_err(ClientError::Report)?;
        let status = if report.succeeded() {
            TerminalStatus::Succeeded { restore_key: report.restore_key.clone() }
        } else {
            let reason = report
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "job failed".to_string());
            TerminalStatus::Failed { reason }
        };
        Ok(JobOutcome { status, report: Some(report), diagnostics, exit_status })
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
