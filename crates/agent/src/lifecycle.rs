// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent startup: keys, plugin registry, engine and the bound socket.

use std::sync::Arc;

use shield_engine::{Engine, JobExecutor, Registry, RegistryError};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::keyfile::{self, KeyFileError};
use crate::listener::{ListenCtx, Listener};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Keys(#[from] KeyFileError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to bind {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A started agent, ready to accept connections.
pub struct Agent {
    pub listener: Listener,
    pub registry: Arc<Registry>,
}

/// Build the registry from the configured plugin entries and directories,
/// probing each plugin's `meta` when enabled.
pub async fn load_registry(config: &Config) -> Result<Registry, LifecycleError> {
    let registry = Registry::build(&config.plugins, &config.plugin_paths)?;
    if registry.is_empty() {
        warn!("no plugins found; every job will fail");
    }
    if config.probe_plugins {
        return Ok(registry.probe().await);
    }
    Ok(registry)
}

/// Start the agent
pub async fn startup(config: &Config) -> Result<Agent, LifecycleError> {
    let keypair = keyfile::load_keypair(&config.host_key)?;
    let authorized = keyfile::load_authorized_keys(&config.authorized_keys)?;
    if authorized.is_empty() {
        warn!(path = %config.authorized_keys.display(), "no authorized keys; every caller will be refused");
    }

    let registry = Arc::new(load_registry(config).await?);
    let engine = Engine::new(Arc::clone(&registry), config.engine());

    let tcp = TcpListener::bind(&config.listen)
        .await
        .map_err(|e| LifecycleError::BindFailed(config.listen.clone(), e))?;
    let addr = tcp.local_addr()?;

    info!(
        listen = %addr,
        host_key = %keypair.public(),
        authorized = authorized.len(),
        plugins = registry.len(),
        "agent ready"
    );

    let ctx = ListenCtx {
        keypair,
        authorized,
        executor: Arc::new(engine) as Arc<dyn JobExecutor>,
        handshake_timeout: config.handshake_timeout(),
    };
    Ok(Agent { listener: Listener::new(tcp, Arc::new(ctx)), registry })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
