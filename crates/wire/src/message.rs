// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel messages exchanged over an established secure session.
//!
//! The model is a small subset of SSH connection semantics: a client opens
//! channels, sends typed requests on them, and both sides stream data,
//! extended (diagnostic) data, EOF and close.

use serde::{Deserialize, Serialize};

use crate::frame::ProtocolError;

/// Channel identifier chosen by the client.
pub type ChannelId = u32;

/// The only channel type the agent serves.
pub const SESSION_CHANNEL: &str = "session";

/// Request type carrying a job payload.
pub const EXEC_REQUEST: &str = "exec";

/// Request type the agent sends to report the job outcome.
pub const EXIT_STATUS_REQUEST: &str = "exit-status";

/// Largest data chunk a sender should put in one message. Leaves room for
/// base64 expansion and the JSON envelope inside one encrypted frame.
pub const MAX_DATA_CHUNK: usize = 32 * 1024;

/// Why a channel open was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenFailureReason {
    AdministrativelyProhibited,
    ConnectFailed,
    UnknownChannelType,
    ResourceShortage,
}

impl std::fmt::Display for OpenFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OpenFailureReason::AdministrativelyProhibited => "administratively prohibited",
            OpenFailureReason::ConnectFailed => "connect failed",
            OpenFailureReason::UnknownChannelType => "unknown channel type",
            OpenFailureReason::ResourceShortage => "resource shortage",
        })
    }
}

/// One message on a secure session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    ChannelOpen {
        channel: ChannelId,
        channel_type: String,
    },

    ChannelOpenConfirm {
        channel: ChannelId,
    },

    ChannelOpenFailure {
        channel: ChannelId,
        reason: OpenFailureReason,
        description: String,
    },

    ChannelRequest {
        channel: ChannelId,
        request_type: String,
        want_reply: bool,
        #[serde(default, with = "b64")]
        payload: Vec<u8>,
    },

    ChannelSuccess {
        channel: ChannelId,
    },

    ChannelFailure {
        channel: ChannelId,
    },

    ChannelData {
        channel: ChannelId,
        #[serde(with = "b64")]
        data: Vec<u8>,
    },

    /// Out-of-band diagnostics (the stderr stream).
    ChannelExtendedData {
        channel: ChannelId,
        #[serde(with = "b64")]
        data: Vec<u8>,
    },

    ChannelEof {
        channel: ChannelId,
    },

    ChannelClose {
        channel: ChannelId,
    },

    /// Session teardown. Either side may send it before closing the stream.
    Disconnect {
        reason: String,
    },
}

impl Message {
    /// The channel this message addresses, if any.
    pub fn channel(&self) -> Option<ChannelId> {
        match self {
            Message::ChannelOpen { channel, .. }
            | Message::ChannelOpenConfirm { channel }
            | Message::ChannelOpenFailure { channel, .. }
            | Message::ChannelRequest { channel, .. }
            | Message::ChannelSuccess { channel }
            | Message::ChannelFailure { channel }
            | Message::ChannelData { channel, .. }
            | Message::ChannelExtendedData { channel, .. }
            | Message::ChannelEof { channel }
            | Message::ChannelClose { channel } => Some(*channel),
            Message::Disconnect { .. } => None,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ChannelOpen { .. } => "channel_open",
            Message::ChannelOpenConfirm { .. } => "channel_open_confirm",
            Message::ChannelOpenFailure { .. } => "channel_open_failure",
            Message::ChannelRequest { .. } => "channel_request",
            Message::ChannelSuccess { .. } => "channel_success",
            Message::ChannelFailure { .. } => "channel_failure",
            Message::ChannelData { .. } => "channel_data",
            Message::ChannelExtendedData { .. } => "channel_extended_data",
            Message::ChannelEof { .. } => "channel_eof",
            Message::ChannelClose { .. } => "channel_close",
            Message::Disconnect { .. } => "disconnect",
        }
    }

    pub fn exec(channel: ChannelId, command: &[u8]) -> Self {
        Message::ChannelRequest {
            channel,
            request_type: EXEC_REQUEST.to_string(),
            want_reply: true,
            payload: encode_string(command),
        }
    }

    pub fn exit_status(channel: ChannelId, status: u32) -> Self {
        Message::ChannelRequest {
            channel,
            request_type: EXIT_STATUS_REQUEST.to_string(),
            want_reply: false,
            payload: status.to_be_bytes().to_vec(),
        }
    }
}

/// Encode `value` as an SSH string: `u32` big-endian length then the bytes.
pub fn encode_string(value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + value.len());
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
    out
}

/// Decode a payload holding exactly one SSH string.
pub fn decode_string(payload: &[u8]) -> Result<&[u8], ProtocolError> {
    let Some((prefix, rest)) = payload.split_first_chunk::<4>() else {
        return Err(ProtocolError::Malformed("string length prefix truncated".into()));
    };
    let len = u32::from_be_bytes(*prefix) as usize;
    if rest.len() < len {
        return Err(ProtocolError::Malformed(format!(
            "string declares {len} bytes, {} present",
            rest.len()
        )));
    }
    if rest.len() > len {
        return Err(ProtocolError::Malformed(format!(
            "{} trailing bytes after string",
            rest.len() - len
        )));
    }
    Ok(rest)
}

/// Decode an `exit-status` payload.
pub fn decode_exit_status(payload: &[u8]) -> Result<u32, ProtocolError> {
    let bytes: [u8; 4] = payload
        .try_into()
        .map_err(|_| ProtocolError::Malformed(format!("exit status is {} bytes", payload.len())))?;
    Ok(u32::from_be_bytes(bytes))
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
