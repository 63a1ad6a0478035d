// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! shield-plugin: the process contract every SHIELD adapter implements.
//!
//! A plugin is a standalone executable invoked as `<executable> <operation>`:
//!
//! - the endpoint configuration (JSON) arrives in `SHIELD_ENDPOINT`
//! - `retrieve`/`purge` receive the restore key in `SHIELD_RESTORE_KEY`
//! - payload bytes flow over stdin (`restore`, `store`) or stdout (`backup`, `retrieve`)
//! - diagnostics go to stderr
//! - `store` prints the restore key as the last non-empty line of stdout
//! - the outcome is the exit status, see [`exit`]
//!
//! Adapters are expected to exit promptly on `SIGTERM`, which the engine sends
//! when the other side of the pipeline has failed or the job was cancelled.

pub mod macros;

pub mod endpoint;
pub mod exit;
pub mod info;
pub mod operation;
pub mod run;

pub use endpoint::{Endpoint, EndpointError};
pub use exit::ExitClass;
pub use info::{Features, PluginInfo, Support};
pub use operation::{Operation, Role, UnknownOperation};
pub use run::{dispatch, run, Environment, Plugin, PluginError};

/// Environment variable carrying the endpoint document.
pub const ENDPOINT_ENV: &str = "SHIELD_ENDPOINT";

/// Environment variable carrying the restore key for `retrieve` and `purge`.
pub const RESTORE_KEY_ENV: &str = "SHIELD_RESTORE_KEY";

/// Prefix of every variable the engine controls; inherited ones are scrubbed.
pub const ENV_PREFIX: &str = "SHIELD_";

/// Extract the restore key from the stdout of a `store` invocation.
///
/// The key is the last non-empty line, trimmed.
pub fn parse_restore_key(stdout: &str) -> Option<&str> {
    stdout.lines().map(str::trim).filter(|line| !line.is_empty()).last()
}
