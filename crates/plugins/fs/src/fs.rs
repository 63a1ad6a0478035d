// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use shield_plugin::{Endpoint, EndpointError, Features, Plugin, PluginError, PluginInfo, Support};
use uuid::Uuid;

const PATH: &str = "path";
const BASE_DIR: &str = "base_dir";

pub struct FsPlugin;

impl Plugin for FsPlugin {
    fn meta(&self) -> PluginInfo {
        PluginInfo {
            name: "fs".to_string(),
            author: "SHIELD".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            features: Features { target: Support::Yes, store: Support::Yes },
            example: r#"{"path":"/var/lib/app/data.db","base_dir":"/var/backups/shield"}"#
                .to_string(),
            defaults: "{}".to_string(),
        }
    }

    fn validate(&self, endpoint: &Endpoint) -> Result<(), PluginError> {
        let mut problems = Vec::new();
        if !endpoint.contains(PATH) && !endpoint.contains(BASE_DIR) {
            problems.push(EndpointError::Missing(format!("{PATH}' or '{BASE_DIR}")));
        }
        for key in [PATH, BASE_DIR] {
            if endpoint.contains(key) {
                if let Err(e) = endpoint.string_value(key) {
                    problems.push(e);
                }
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(PluginError::Invalid(problems))
        }
    }

    fn backup(&self, endpoint: &Endpoint, out: &mut dyn Write) -> Result<(), PluginError> {
        let path = endpoint.string_value(PATH)?;
        let mut file = File::open(&path).map_err(|e| failed(format!("cannot open {path}"), e))?;
        io::copy(&mut file, out)?;
        Ok(())
    }

    fn restore(&self, endpoint: &Endpoint, input: &mut dyn Read) -> Result<(), PluginError> {
        let path = PathBuf::from(endpoint.string_value(PATH)?);
        write_atomically(&path, input)
    }

    fn store(&self, endpoint: &Endpoint, input: &mut dyn Read) -> Result<String, PluginError> {
        let base = PathBuf::from(endpoint.string_value(BASE_DIR)?);
        let key = Uuid::new_v4().to_string();
        write_atomically(&base.join(&key), input)?;
        eprintln!("stored artifact {key} in {}", base.display());
        Ok(key)
    }

    fn retrieve(&self, endpoint: &Endpoint, key: &str, out: &mut dyn Write) -> Result<(), PluginError> {
        let path = artifact(endpoint, key)?;
        let mut file =
            File::open(&path).map_err(|e| failed(format!("cannot open artifact {key}"), e))?;
        io::copy(&mut file, out)?;
        Ok(())
    }

    fn purge(&self, endpoint: &Endpoint, key: &str) -> Result<(), PluginError> {
        let path = artifact(endpoint, key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(failed(format!("cannot remove artifact {key}"), e)),
        }
    }
}

/// Resolve a restore key under `base_dir`. Keys are plain file names.
fn artifact(endpoint: &Endpoint, key: &str) -> Result<PathBuf, PluginError> {
    let plain = !key.is_empty()
        && !key.starts_with('.')
        && !key.contains(['/', '\\'])
        && !key.contains('\0');
    if !plain {
        return Err(PluginError::Failed(format!("invalid restore key {key:?}")));
    }
    Ok(Path::new(&endpoint.string_value(BASE_DIR)?).join(key))
}

/// Write `input` to a hidden sibling of `dest`, then rename it into place.
/// A failed transfer leaves `dest` untouched.
fn write_atomically(dest: &Path, input: &mut dyn Read) -> Result<(), PluginError> {
    let name = dest
        .file_name()
        .ok_or_else(|| PluginError::Failed(format!("{} is not a file path", dest.display())))?;
    let tmp = dest.with_file_name(format!(".{}.{}.partial", name.to_string_lossy(), Uuid::new_v4()));

    let result = (|| -> io::Result<()> {
        let mut file = File::create(&tmp)?;
        io::copy(input, &mut file)?;
        file.sync_all()?;
        std::fs::rename(&tmp, dest)
    })();
    if let Err(e) = result {
        let _ = std::fs::remove_file(&tmp);
        return Err(failed(format!("cannot write {}", dest.display()), e));
    }
    Ok(())
}

fn failed(context: String, e: io::Error) -> PluginError {
    PluginError::Failed(format!("{context}: {e}"))
}

#[cfg(test)]
#[path = "fs_tests.rs"]
mod tests;
