// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request Protocol Handler: turns an `exec` payload into a [`JobRequest`].
//!
//! Nothing here spawns a process. A rejected request never reaches the
//! engine; the reason goes back to the caller on the channel.

use shield_engine::{JobRequest, ValidationError};
use shield_wire::{decode_string, ProtocolError};
use thiserror::Error;

/// Why an `exec` request was refused.
#[derive(Debug, Error)]
pub enum Rejection {
    /// The payload is not a well-formed SSH string.
    #[error("malformed exec payload: {0}")]
    Envelope(#[from] ProtocolError),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

impl Rejection {
    /// Stable label for logs.
    pub fn class(&self) -> &'static str {
        match self {
            Rejection::Envelope(_) => "protocol",
            Rejection::Invalid(ValidationError::UnsupportedOperation(_)) => "unsupported_operation",
            Rejection::Invalid(_) => "validation",
        }
    }
}

/// Decode and validate one `exec` payload.
pub fn parse_exec(payload: &[u8]) -> Result<JobRequest, Rejection> {
    let document = decode_string(payload)?;
    Ok(JobRequest::parse(document)?)
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
