// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exit status convention shared by every plugin executable.

/// The operation completed.
pub const SUCCESS: i32 = 0;
/// The operation ran and failed.
pub const FAILURE: i32 = 1;
/// The plugin was invoked with a missing or unknown operation.
pub const USAGE: i32 = 2;
/// The endpoint configuration is missing, malformed or incomplete.
pub const ENDPOINT_INVALID: i32 = 3;
/// `retrieve`/`purge` was invoked without `SHIELD_RESTORE_KEY`.
pub const RESTORE_KEY_REQUIRED: i32 = 4;
/// The plugin does not implement the requested operation.
pub const UNIMPLEMENTED: i32 = 10;

/// How the engine interprets a plugin's exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Success,
    /// Ran and failed (also any status outside the reserved set).
    Failure,
    /// The caller got the invocation wrong (usage, endpoint, missing key).
    Misconfigured,
    Unimplemented,
}

impl ExitClass {
    /// Classify a raw exit code.
    pub fn from_code(code: i32) -> Self {
        match code {
            SUCCESS => ExitClass::Success,
            USAGE | ENDPOINT_INVALID | RESTORE_KEY_REQUIRED => ExitClass::Misconfigured,
            UNIMPLEMENTED => ExitClass::Unimplemented,
            _ => ExitClass::Failure,
        }
    }
}

crate::labels! {
    ExitClass {
        Success => "success",
        Failure => "failure",
        Misconfigured => "misconfigured",
        Unimplemented => "unimplemented",
    }
}
