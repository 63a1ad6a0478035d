// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use clap::Args;
use shield_agent::lifecycle::load_registry;
use shield_agent::{logging, Config};
use shield_engine::PluginEntry;

#[derive(Args)]
pub struct PluginsArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: PluginsArgs, config_path: &Path, log_level: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let _guard = logging::init(&config.log, Some(log_level.unwrap_or("warn")))?;
    let registry = load_registry(&config).await?;

    if args.json {
        let entries: Vec<_> = registry
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "name": entry.name,
                    "path": entry.path,
                    "info": entry.info,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if registry.is_empty() {
        println!("No plugins found");
        return Ok(());
    }
    let width = registry.iter().map(|e| e.name.len()).max().unwrap_or(0).max(4);
    println!("{:<width$}  {:<6}  {:<5}  {:<8}  PATH", "NAME", "TARGET", "STORE", "VERSION");
    for entry in registry.iter() {
        let (target, store, version) = describe(entry);
        println!(
            "{:<width$}  {:<6}  {:<5}  {:<8}  {}",
            entry.name,
            target,
            store,
            version,
            entry.path.display()
        );
    }
    Ok(())
}

fn describe(entry: &PluginEntry) -> (&'static str, &'static str, &str) {
    match &entry.info {
        Some(info) => (
            yes_no(info.features.target.is_yes()),
            yes_no(info.features.store.is_yes()),
            info.version.as_str(),
        ),
        None => ("?", "?", "-"),
    }
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}
