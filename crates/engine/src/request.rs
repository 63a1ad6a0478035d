// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job requests: the JSON document carried by an `exec` request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use shield_plugin::{Operation, Role};
use thiserror::Error;

/// What a job does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOperation {
    Backup,
    Restore,
}

shield_plugin::labels! {
    JobOperation {
        Backup => "backup",
        Restore => "restore",
    }
}

impl JobOperation {
    /// The stage writing payload bytes into the pipeline.
    pub fn producer(self) -> (Role, Operation) {
        match self {
            JobOperation::Backup => (Role::Target, Operation::Backup),
            JobOperation::Restore => (Role::Store, Operation::Retrieve),
        }
    }

    /// The stage reading payload bytes out of the pipeline.
    pub fn consumer(self) -> (Role, Operation) {
        match self {
            JobOperation::Backup => (Role::Store, Operation::Store),
            JobOperation::Restore => (Role::Target, Operation::Restore),
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "backup" => Some(JobOperation::Backup),
            "restore" => Some(JobOperation::Restore),
            _ => None,
        }
    }
}

/// Why a job request was rejected. Checked in a fixed order so the first
/// problem reported is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed agent-request: {0}")]
    Malformed(String),

    #[error("missing required '{0}' value in payload")]
    Missing(&'static str),

    #[error("unsupported operation: '{0}'")]
    UnsupportedOperation(String),

    #[error("missing required 'restore_key' value in payload (for restore operation)")]
    MissingRestoreKey,
}

/// Wire shape before validation. Every field is optional so that absence is
/// reported as a validation error rather than a decode error.
#[derive(Deserialize)]
struct RawRequest {
    #[serde(default)]
    operation: Option<String>,
    #[serde(default)]
    target_plugin: Option<String>,
    #[serde(default)]
    target_endpoint: Option<Value>,
    #[serde(default)]
    store_plugin: Option<String>,
    #[serde(default)]
    store_endpoint: Option<Value>,
    #[serde(default)]
    restore_key: Option<String>,
}

/// A validated unit of work.
///
/// Endpoints are kept as the JSON text handed to the plugins. An endpoint
/// sent as a JSON object is serialized back to text.
#[derive(Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub operation: JobOperation,
    pub target_plugin: String,
    pub target_endpoint: String,
    pub store_plugin: String,
    pub store_endpoint: String,
    /// Present exactly when `operation` is restore.
    pub restore_key: Option<String>,
    raw: Vec<u8>,
}

impl JobRequest {
    /// Decode and validate a request payload.
    pub fn parse(raw: &[u8]) -> Result<Self, ValidationError> {
        let doc: RawRequest =
            serde_json::from_slice(raw).map_err(|e| ValidationError::Malformed(e.to_string()))?;

        let operation = match non_empty(doc.operation) {
            None => return Err(ValidationError::Missing("operation")),
            Some(op) => JobOperation::parse(&op).ok_or(ValidationError::UnsupportedOperation(op))?,
        };

        let target_plugin =
            non_empty(doc.target_plugin).ok_or(ValidationError::Missing("target_plugin"))?;
        let target_endpoint = endpoint("target_endpoint", doc.target_endpoint)?;
        let store_plugin =
            non_empty(doc.store_plugin).ok_or(ValidationError::Missing("store_plugin"))?;
        let store_endpoint = endpoint("store_endpoint", doc.store_endpoint)?;

        let restore_key = match operation {
            JobOperation::Backup => None,
            JobOperation::Restore => {
                Some(non_empty(doc.restore_key).ok_or(ValidationError::MissingRestoreKey)?)
            }
        };

        Ok(Self {
            operation,
            target_plugin,
            target_endpoint,
            store_plugin,
            store_endpoint,
            restore_key,
            raw: raw.to_vec(),
        })
    }

    /// The undecoded payload this request was parsed from.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn plugin(&self, role: Role) -> &str {
        match role {
            Role::Target => &self.target_plugin,
            Role::Store => &self.store_plugin,
        }
    }

    pub fn endpoint(&self, role: Role) -> &str {
        match role {
            Role::Target => &self.target_endpoint,
            Role::Store => &self.store_endpoint,
        }
    }
}

// Endpoints can carry credentials; keep them out of logs.
impl std::fmt::Debug for JobRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRequest")
            .field("operation", &self.operation)
            .field("target_plugin", &self.target_plugin)
            .field("target_endpoint", &"<redacted>")
            .field("store_plugin", &self.store_plugin)
            .field("store_endpoint", &"<redacted>")
            .field("restore_key", &self.restore_key)
            .finish_non_exhaustive()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

fn endpoint(field: &'static str, value: Option<Value>) -> Result<String, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::Missing(field)),
        Some(Value::String(s)) if s.is_empty() => Err(ValidationError::Missing(field)),
        Some(Value::String(s)) => Ok(s),
        Some(doc @ Value::Object(_)) => Ok(doc.to_string()),
        Some(_) => Err(ValidationError::Malformed(format!(
            "'{field}' must be a string or an object"
        ))),
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
