// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin operations and the roles that may perform them.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An operation a plugin executable is invoked with (`<executable> <operation>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Print the plugin's [`PluginInfo`](crate::PluginInfo) as JSON.
    Meta,
    /// Check an endpoint configuration without side effects.
    Validate,
    /// Target: extract data and write it to stdout.
    Backup,
    /// Target: read data from stdin and apply it.
    Restore,
    /// Store: persist stdin and print the restore key.
    Store,
    /// Store: write the artifact named by the restore key to stdout.
    Retrieve,
    /// Store: delete the artifact named by the restore key.
    Purge,
}

/// Which side of a job a plugin plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Target,
    Store,
}

crate::labels! {
    Role {
        Target => "target",
        Store => "store",
    }
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Meta,
        Operation::Validate,
        Operation::Backup,
        Operation::Restore,
        Operation::Store,
        Operation::Retrieve,
        Operation::Purge,
    ];

    /// The argv token for this operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Meta => "meta",
            Operation::Validate => "validate",
            Operation::Backup => "backup",
            Operation::Restore => "restore",
            Operation::Store => "store",
            Operation::Retrieve => "retrieve",
            Operation::Purge => "purge",
        }
    }

    /// The role a plugin must declare to perform this operation.
    ///
    /// `meta` and `validate` are common to every plugin.
    pub fn role(&self) -> Option<Role> {
        match self {
            Operation::Meta | Operation::Validate => None,
            Operation::Backup | Operation::Restore => Some(Role::Target),
            Operation::Store | Operation::Retrieve | Operation::Purge => Some(Role::Store),
        }
    }

    /// Whether the operation needs `SHIELD_RESTORE_KEY`.
    pub fn requires_restore_key(&self) -> bool {
        matches!(self, Operation::Retrieve | Operation::Purge)
    }

    /// Whether the operation consumes payload bytes on stdin.
    pub fn reads_payload(&self) -> bool {
        matches!(self, Operation::Restore | Operation::Store)
    }

    /// Whether the operation produces payload bytes on stdout.
    pub fn writes_payload(&self) -> bool {
        matches!(self, Operation::Backup | Operation::Retrieve)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing an operation name from argv.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown operation '{0}'")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}

#[cfg(test)]
#[path = "operation_tests.rs"]
mod tests;
