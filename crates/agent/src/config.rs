// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent configuration file.
//!
//! ```toml
//! listen = "0.0.0.0:5444"
//! host_key = "host_key"
//! authorized_keys = "authorized_keys"
//! plugin_paths = ["/var/vcap/packages/shield/plugins"]
//! job_timeout_secs = 86400
//!
//! [plugins]
//! postgres = "/opt/shield/bin/postgres"
//!
//! [log]
//! level = "info"
//! format = "json"
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use shield_engine::EngineConfig;
use thiserror::Error;

use crate::env;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:5444";

const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("invalid configuration in {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Key file holding the agent's static keypair.
    pub host_key: PathBuf,
    /// One base64 public key per line; only these callers may connect.
    pub authorized_keys: PathBuf,
    /// Directories scanned for plugin executables, in priority order.
    #[serde(default)]
    pub plugin_paths: Vec<PathBuf>,
    /// Explicit plugin executables; these win over scanned ones.
    #[serde(default)]
    pub plugins: BTreeMap<String, PathBuf>,
    #[serde(default = "enabled")]
    pub validate_endpoints: bool,
    #[serde(default = "enabled")]
    pub probe_plugins: bool,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    pub job_timeout_secs: Option<u64>,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Filter directive; `SHIELD_LOG` and `--log-level` take precedence.
    pub level: Option<String>,
    #[serde(default)]
    pub format: LogFormat,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn enabled() -> bool {
    true
}

fn default_handshake_timeout_ms() -> u64 {
    DEFAULT_HANDSHAKE_TIMEOUT_MS
}

impl Config {
    /// Read, parse and resolve a configuration file, then apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let mut config = Self::parse(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.apply_env();
        config.check()?;
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.host_key);
        resolve(&mut self.authorized_keys);
        self.plugin_paths.iter_mut().for_each(resolve);
        self.plugins.values_mut().for_each(resolve);
        if let Some(file) = self.log.file.as_mut() {
            resolve(file);
        }
    }

    fn apply_env(&mut self) {
        if let Some(listen) = env::listen_addr() {
            self.listen = listen;
        }
        if let Some(timeout) = env::handshake_timeout() {
            self.handshake_timeout_ms = timeout.as_millis() as u64;
        }
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.listen.trim().is_empty() {
            return Err(ConfigError::Invalid("'listen' must not be empty".into()));
        }
        if self.handshake_timeout_ms == 0 {
            return Err(ConfigError::Invalid("'handshake_timeout_ms' must be positive".into()));
        }
        if self.job_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("'job_timeout_secs' must be positive".into()));
        }
        if self.plugin_paths.is_empty() && self.plugins.is_empty() {
            return Err(ConfigError::Invalid(
                "no plugins configured: set 'plugin_paths' or '[plugins]'".into(),
            ));
        }
        Ok(())
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            validate_endpoints: self.validate_endpoints,
            job_timeout: self.job_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
