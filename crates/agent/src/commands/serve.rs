// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use anyhow::Context;
use shield_agent::env::AGENT_VERSION;
use shield_agent::{logging, startup, Config};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub async fn run(config_path: &Path, log_level: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let _guard = logging::init(&config.log, log_level)?;
    info!(version = AGENT_VERSION, config = %config_path.display(), "starting shield-agent");

    let agent = startup(&config).await?;

    let mut sigterm = signal(SignalKind::terminate()).context("cannot install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("cannot install SIGINT handler")?;
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
        }
        trigger.cancel();
    });

    agent.listener.run(shutdown).await;
    info!("shield-agent stopped");
    Ok(())
}
