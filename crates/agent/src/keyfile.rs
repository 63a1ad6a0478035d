// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk key material.
//!
//! A keypair file is a small TOML document with base64 `private` and `public`
//! keys; `keygen` also writes the public key alone to `<file>.pub` in the
//! format `authorized_keys` expects.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shield_wire::{AuthorizedKeys, KeyError, Keypair, PublicKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyFileError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("cannot write {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },

    #[error("{path} is not a key file: {source}")]
    Format { path: PathBuf, source: toml::de::Error },

    #[error("{path}: {source}")]
    Key { path: PathBuf, source: KeyError },

    #[error("{0} already exists")]
    Exists(PathBuf),

    #[error(transparent)]
    Generate(KeyError),

    #[error("cannot encode key file: {0}")]
    Encode(#[from] toml::ser::Error),
}

#[derive(Serialize, Deserialize)]
struct KeyFile {
    private: String,
    public: String,
}

fn read(path: &Path) -> Result<String, KeyFileError> {
    std::fs::read_to_string(path)
        .map_err(|source| KeyFileError::Read { path: path.to_path_buf(), source })
}

pub fn load_keypair(path: &Path) -> Result<Keypair, KeyFileError> {
    let file: KeyFile = toml::from_str(&read(path)?)
        .map_err(|source| KeyFileError::Format { path: path.to_path_buf(), source })?;
    Keypair::from_base64(&file.private, &file.public)
        .map_err(|source| KeyFileError::Key { path: path.to_path_buf(), source })
}

pub fn load_authorized_keys(path: &Path) -> Result<AuthorizedKeys, KeyFileError> {
    AuthorizedKeys::parse(&read(path)?)
        .map_err(|source| KeyFileError::Key { path: path.to_path_buf(), source })
}

/// Read a public key given either inline as base64 or as a file holding one.
pub fn load_public_key(value: &str) -> Result<PublicKey, KeyFileError> {
    let path = Path::new(value);
    if path.is_file() {
        let text = read(path)?;
        let first = text.split_whitespace().next().unwrap_or_default();
        return PublicKey::from_base64(first)
            .map_err(|source| KeyFileError::Key { path: path.to_path_buf(), source });
    }
    PublicKey::from_base64(value.trim())
        .map_err(|source| KeyFileError::Key { path: path.to_path_buf(), source })
}

/// Generate a keypair into `path` (mode 0600) and its public half into
/// `<path>.pub`.
pub fn generate(path: &Path, comment: &str, force: bool) -> Result<Keypair, KeyFileError> {
    if path.exists() && !force {
        return Err(KeyFileError::Exists(path.to_path_buf()));
    }
    let keypair = Keypair::generate().map_err(KeyFileError::Generate)?;
    save_keypair(path, &keypair)?;

    let pub_path = public_path(path);
    let line = match comment {
        "" => format!("{}\n", keypair.public()),
        comment => format!("{} {comment}\n", keypair.public()),
    };
    std::fs::write(&pub_path, line)
        .map_err(|source| KeyFileError::Write { path: pub_path, source })?;
    Ok(keypair)
}

pub fn save_keypair(path: &Path, keypair: &Keypair) -> Result<(), KeyFileError> {
    use std::os::unix::fs::OpenOptionsExt;

    let file = KeyFile { private: keypair.private_base64(), public: keypair.public().to_base64() };
    let text = toml::to_string(&file)?;
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        out.write_all(b"# shield-agent keypair\n")?;
        out.write_all(text.as_bytes())?;
        out.flush()
    };
    write().map_err(|source| KeyFileError::Write { path: path.to_path_buf(), source })
}

pub fn public_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".pub");
    PathBuf::from(name)
}

#[cfg(test)]
#[path = "keyfile_tests.rs"]
mod tests;
