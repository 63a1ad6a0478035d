// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static plugin identity reported by the `meta` operation.

use serde::{Deserialize, Serialize};

use crate::Role;

/// A `"yes"`/`"no"` capability flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Support {
    Yes,
    #[default]
    No,
}

impl Support {
    pub fn is_yes(self) -> bool {
        self == Support::Yes
    }
}

impl From<bool> for Support {
    fn from(b: bool) -> Self {
        if b {
            Support::Yes
        } else {
            Support::No
        }
    }
}

/// Which job roles a plugin implements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Features {
    #[serde(default)]
    pub target: Support,
    #[serde(default)]
    pub store: Support,
}

impl Features {
    pub fn supports(&self, role: Role) -> bool {
        match role {
            Role::Target => self.target.is_yes(),
            Role::Store => self.store.is_yes(),
        }
    }
}

/// Plugin descriptor: identity, features, and documentation for operators.
///
/// `example` and `defaults` are endpoint documents shown by tooling; the
/// engine never reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub author: String,
    pub version: String,
    #[serde(default)]
    pub features: Features,
    #[serde(default)]
    pub example: String,
    #[serde(default)]
    pub defaults: String,
}

impl PluginInfo {
    /// Parse the stdout of a `meta` invocation.
    pub fn from_meta_output(output: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(output.trim())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
#[path = "info_tests.rs"]
mod tests;
