// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! shield-engine: job requests, the plugin registry, the Plugin Invoker and
//! the Job Pipeline Engine.

mod capture;
pub mod error;
pub mod executor;
pub mod invoke;
pub mod job;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod request;

pub use error::{ErrorKind, JobError};
pub use executor::JobExecutor;
pub use invoke::{
    invoke, Input, InvocationResult, InvocationSpec, Output, Progress, ProgressSink,
    RunningPlugin, StageSignal, DIAGNOSTICS_LIMIT, OUTPUT_LIMIT,
};
pub use job::{Job, JobId, JobState};
pub use pipeline::{Engine, EngineConfig, RELAY_BUFFER};
pub use registry::{is_valid_name, PluginEntry, Registry, RegistryError};
pub use report::JobReport;
pub use request::{JobOperation, JobRequest, ValidationError};

#[cfg(test)]
mod test_support;
