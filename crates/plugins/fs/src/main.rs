// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `fs`: a target and store plugin over the local filesystem.
//!
//! As a target the endpoint names one file (`{"path": "/var/lib/app.db"}`).
//! As a store it names a directory (`{"base_dir": "/backups"}`) holding one
//! file per artifact, keyed by a random UUID.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod fs;

use std::process::ExitCode;

fn main() -> ExitCode {
    shield_plugin::run(&fs::FsPlugin)
}
