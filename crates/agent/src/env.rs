// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the agent crate.

use std::path::PathBuf;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/shield/agent.toml";

/// Agent version (from Cargo.toml)
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve the configuration file: SHIELD_AGENT_CONFIG > /etc/shield/agent.toml
pub fn config_path() -> PathBuf {
    std::env::var("SHIELD_AGENT_CONFIG")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Listen address override.
pub fn listen_addr() -> Option<String> {
    std::env::var("SHIELD_AGENT_LISTEN").ok().filter(|s| !s.is_empty())
}

/// Log filter directive (same syntax as `RUST_LOG`), e.g. `shield_engine=debug`.
pub fn log_filter() -> Option<String> {
    std::env::var("SHIELD_LOG").ok().filter(|s| !s.is_empty())
}

/// Handshake timeout override.
pub fn handshake_timeout() -> Option<Duration> {
    std::env::var("SHIELD_HANDSHAKE_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
}
