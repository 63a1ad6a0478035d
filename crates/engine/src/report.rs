// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::job::{JobId, JobState};
use crate::request::JobOperation;

/// Terminal result of one job, sent back to the caller as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub operation: JobOperation,
    /// `succeeded` or `failed`.
    pub status: JobState,
    /// Restore key of the stored artifact (successful backups only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_key: Option<String>,
    /// Payload bytes relayed between the stages.
    #[serde(default)]
    pub bytes: u64,
    /// The primary failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    /// Failures observed after the primary one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary: Vec<JobError>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.status == JobState::Succeeded
    }

    /// Value of the `exit-status` sent after the report.
    pub fn exit_status(&self) -> u32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
