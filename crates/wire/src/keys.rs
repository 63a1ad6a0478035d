// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static Curve25519 keys and the authorized-keys list.

use std::collections::HashSet;
use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::noise::NOISE_PARAMS;

/// Length of a Curve25519 key in bytes.
pub const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("key must be {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("line {line}: {source}")]
    Line { line: usize, source: Box<KeyError> },

    #[error("key generation failed: {0}")]
    Generate(#[from] snow::Error),
}

/// A peer's static public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| KeyError::InvalidLength(bytes.len()))?;
        Ok(Self(key))
    }

    pub fn from_base64(s: &str) -> Result<Self, KeyError> {
        Self::from_bytes(&STANDARD.decode(s.trim())?)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_base64())
    }
}

impl std::str::FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

/// A static keypair. The private half never appears in `Debug` output.
#[derive(Clone)]
pub struct Keypair {
    private: [u8; KEY_LEN],
    public: PublicKey,
}

impl Keypair {
    pub fn generate() -> Result<Self, KeyError> {
        let params: snow::params::NoiseParams = NOISE_PARAMS.parse()?;
        let kp = snow::Builder::new(params).generate_keypair()?;
        Self::from_bytes(&kp.private, &kp.public)
    }

    pub fn from_bytes(private: &[u8], public: &[u8]) -> Result<Self, KeyError> {
        let private: [u8; KEY_LEN] =
            private.try_into().map_err(|_| KeyError::InvalidLength(private.len()))?;
        Ok(Self { private, public: PublicKey::from_bytes(public)? })
    }

    pub fn from_base64(private: &str, public: &str) -> Result<Self, KeyError> {
        Self::from_bytes(&STANDARD.decode(private.trim())?, &STANDARD.decode(public.trim())?)
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn private_bytes(&self) -> &[u8] {
        &self.private
    }

    pub fn private_base64(&self) -> String {
        STANDARD.encode(self.private)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair").field("public", &self.public).finish_non_exhaustive()
    }
}

/// Public keys allowed to open sessions.
///
/// Text format: one base64 key per line. Blank lines and lines starting with
/// `#` are ignored; anything after the key on the same line is a comment.
#[derive(Debug, Clone, Default)]
pub struct AuthorizedKeys {
    keys: HashSet<PublicKey>,
}

impl AuthorizedKeys {
    pub fn parse(text: &str) -> Result<Self, KeyError> {
        let mut keys = HashSet::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let field = line.split_whitespace().next().unwrap_or_default();
            let key = PublicKey::from_base64(field)
                .map_err(|e| KeyError::Line { line: idx + 1, source: Box::new(e) })?;
            keys.insert(key);
        }
        Ok(Self { keys })
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<PublicKey> for AuthorizedKeys {
    fn from_iter<I: IntoIterator<Item = PublicKey>>(iter: I) -> Self {
        Self { keys: iter.into_iter().collect() }
    }
}

#[cfg(test)]
#[path = "keys_tests.rs"]
mod tests;
