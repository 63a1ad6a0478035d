// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identity and lifecycle.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::{error, info};

use crate::request::JobRequest;

/// Unique identifier for one executed job: `job-` plus a 19 character
/// nanoid, which keeps it inline in a `SmolStr`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(SmolStr);

impl JobId {
    const PREFIX: &'static str = "job-";

    pub fn new() -> Self {
        Self(SmolStr::new(format!("{}{}", Self::PREFIX, nanoid::nanoid!(19))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The random part, without `job-`.
    pub fn suffix(&self) -> &str {
        self.0.strip_prefix(Self::PREFIX).unwrap_or(&self.0)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

/// Lifecycle: `Received -> Validated -> Running -> {Succeeded, Failed}`.
///
/// A job may fail from any non-terminal state. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Received,
    Validated,
    Running,
    Succeeded,
    Failed,
}

shield_plugin::labels! {
    JobState {
        Received => "received",
        Validated => "validated",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
    }
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn can_advance_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Received, Validated)
                | (Validated, Running)
                | (Running, Succeeded)
                | (Received | Validated | Running, Failed)
        )
    }
}

/// One job, owned by the pipeline running it.
#[derive(Debug)]
pub struct Job {
    pub id: JobId,
    pub request: JobRequest,
    state: JobState,
}

impl Job {
    pub fn new(request: JobRequest) -> Self {
        Self { id: JobId::new(), request, state: JobState::Received }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Move to `next`. Invalid transitions are logged and ignored.
    pub(crate) fn advance(&mut self, next: JobState) {
        if !self.state.can_advance_to(next) {
            error!(job_id = %self.id, from = %self.state, to = %next, "invalid job state transition");
            return;
        }
        info!(job_id = %self.id, from = %self.state, to = %next, "job state");
        self.state = next;
    }
}
