// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job failure taxonomy.

use serde::{Deserialize, Serialize};
use shield_plugin::{Operation, Role};

/// Classification of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Plugin missing, unusable, lacking the role, or rejecting its endpoint.
    Configuration,
    /// A plugin ran and failed.
    Plugin,
    /// Moving bytes between stages failed.
    Pipeline,
    /// A plugin does not implement the operation it was asked for.
    Unimplemented,
    Cancelled,
    TimedOut,
}

shield_plugin::labels! {
    ErrorKind {
        Configuration => "configuration error",
        Plugin => "plugin error",
        Pipeline => "pipeline error",
        Unimplemented => "unimplemented operation",
        Cancelled => "cancelled",
        TimedOut => "timed out",
    }
}

/// A job failure, attributed to the stage that caused it when there is one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    pub message: String,
    /// Captured stderr of the failing plugin.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub diagnostics: String,
}

impl JobError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            stage: None,
            plugin: None,
            operation: None,
            message: message.into(),
            diagnostics: String::new(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn pipeline(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Pipeline, message)
    }

    /// Attribute the failure to a plugin stage.
    pub fn at(mut self, stage: Role, plugin: &str, operation: Operation) -> Self {
        self.stage = Some(stage);
        self.plugin = Some(plugin.to_string());
        self.operation = Some(operation);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: impl Into<String>) -> Self {
        self.diagnostics = diagnostics.into();
        self
    }
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(stage) = self.stage {
            write!(f, " in {stage} stage")?;
        }
        match (&self.plugin, self.operation) {
            (Some(plugin), Some(op)) => write!(f, " ({plugin} {op})")?,
            (Some(plugin), None) => write!(f, " ({plugin})")?,
            _ => {}
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for JobError {}
