// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plugin registry: the immutable mapping from plugin name to executable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use shield_plugin::{Operation, PluginInfo, Role};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::JobError;
use crate::invoke::{invoke, InvocationSpec};

/// How long a `meta` probe may take before the plugin is left unprobed.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid plugin name '{0}'")]
    InvalidName(String),

    #[error("plugin '{name}': {path} is not an executable file")]
    NotExecutable { name: String, path: PathBuf },

    #[error("plugin '{name}': {path}: {source}")]
    Io { name: String, path: PathBuf, source: std::io::Error },
}

/// One registered plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginEntry {
    pub name: String,
    pub path: PathBuf,
    /// Declared identity, when the `meta` probe succeeded.
    pub info: Option<PluginInfo>,
}

/// Process-wide, read-only after startup.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    plugins: BTreeMap<String, PluginEntry>,
}

/// Plugin names are plain file names: `[A-Za-z0-9._-]`, not starting with `.`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl Registry {
    /// Build from explicit entries and a scan of `dirs`.
    ///
    /// Explicit entries must exist and be executable. Scanned directories
    /// contribute every executable regular file with a valid name; the first
    /// directory providing a name wins, and explicit entries win over scans.
    pub fn build(
        explicit: &BTreeMap<String, PathBuf>,
        dirs: &[PathBuf],
    ) -> Result<Self, RegistryError> {
        let mut plugins = BTreeMap::new();

        for (name, path) in explicit {
            if !is_valid_name(name) {
                return Err(RegistryError::InvalidName(name.clone()));
            }
            match is_executable(path) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(RegistryError::NotExecutable { name: name.clone(), path: path.clone() })
                }
                Err(source) => {
                    return Err(RegistryError::Io { name: name.clone(), path: path.clone(), source })
                }
            }
            plugins.insert(name.clone(), PluginEntry { name: name.clone(), path: path.clone(), info: None });
        }

        for dir in dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(dir = %dir.display(), "skipping plugin directory: {e}");
                    continue;
                }
            };
            let mut found: Vec<(String, PathBuf)> = entries
                .filter_map(Result::ok)
                .filter_map(|entry| {
                    let name = entry.file_name().into_string().ok()?;
                    Some((name, entry.path()))
                })
                .collect();
            found.sort();

            for (name, path) in found {
                if !is_valid_name(&name) || plugins.contains_key(&name) {
                    continue;
                }
                if matches!(is_executable(&path), Ok(true)) {
                    debug!(plugin = %name, path = %path.display(), "discovered plugin");
                    plugins.insert(name.clone(), PluginEntry { name, path, info: None });
                }
            }
        }

        Ok(Self { plugins })
    }

    /// Run `meta` for every plugin and record what it declares.
    ///
    /// A plugin whose probe fails stays registered without declared features.
    pub async fn probe(mut self) -> Self {
        for entry in self.plugins.values_mut() {
            let spec = InvocationSpec::new(entry, Operation::Meta);
            let outcome = tokio::time::timeout(PROBE_TIMEOUT, invoke(spec, None, None, None)).await;
            let result = match outcome {
                Ok(Ok(result)) if result.succeeded() => result,
                Ok(Ok(result)) => {
                    warn!(plugin = %entry.name, "meta probe failed: {}", result.status);
                    continue;
                }
                Ok(Err(e)) => {
                    warn!(plugin = %entry.name, "meta probe failed: {e}");
                    continue;
                }
                Err(_) => {
                    warn!(plugin = %entry.name, "meta probe timed out after {PROBE_TIMEOUT:?}");
                    continue;
                }
            };
            match PluginInfo::from_meta_output(&String::from_utf8_lossy(&result.output)) {
                Ok(info) => {
                    info!(
                        plugin = %entry.name,
                        version = %info.version,
                        target = info.features.target.is_yes(),
                        store = info.features.store.is_yes(),
                        "probed plugin"
                    );
                    entry.info = Some(info);
                }
                Err(e) => warn!(plugin = %entry.name, "meta output is not valid plugin info: {e}"),
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&PluginEntry> {
        self.plugins.get(name)
    }

    /// Look up the plugin to run in `role`.
    ///
    /// Fails with a configuration error when the name is invalid or unknown,
    /// or when the plugin was probed and does not declare the role.
    pub fn resolve(&self, name: &str, role: Role) -> Result<&PluginEntry, JobError> {
        if !is_valid_name(name) {
            return Err(JobError {
                stage: Some(role),
                ..JobError::configuration(format!("invalid plugin name '{name}'"))
            });
        }
        let Some(entry) = self.plugins.get(name) else {
            return Err(JobError {
                stage: Some(role),
                plugin: Some(name.to_string()),
                ..JobError::configuration(format!("no plugin named '{name}' is installed"))
            });
        };
        if let Some(info) = &entry.info {
            if !info.features.supports(role) {
                return Err(JobError {
                    stage: Some(role),
                    plugin: Some(name.to_string()),
                    ..JobError::configuration(format!("plugin '{name}' does not act as a {role}"))
                });
            }
        }
        Ok(entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginEntry> {
        self.plugins.values()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl FromIterator<PluginEntry> for Registry {
    fn from_iter<I: IntoIterator<Item = PluginEntry>>(iter: I) -> Self {
        Self { plugins: iter.into_iter().map(|entry| (entry.name.clone(), entry)).collect() }
    }
}

fn is_executable(path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::PermissionsExt;
    let meta = std::fs::metadata(path)?;
    Ok(meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
