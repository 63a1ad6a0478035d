// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SHIELD agent library
//!
//! Accepts authenticated sessions, turns `exec` requests into jobs and runs
//! them through the plugin pipeline. The binary wraps this with a CLI.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod config;
pub mod env;
pub mod keyfile;
pub mod lifecycle;
pub mod listener;
pub mod logging;
pub mod protocol;

pub use client::{AgentClient, ClientError, JobOutcome, TerminalStatus};
pub use config::{Config, ConfigError, LogConfig, LogFormat};
pub use lifecycle::{startup, Agent, LifecycleError};
pub use listener::{ListenCtx, Listener};
pub use protocol::{parse_exec, Rejection};
