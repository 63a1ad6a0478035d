// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `shield-agent`: the SHIELD backup/restore agent.
//!
//! - `shield-agent serve` (default) runs the agent until SIGINT/SIGTERM.
//! - `shield-agent keygen` writes a keypair for the agent or a caller.
//! - `shield-agent plugins` lists the plugins the agent would register.
//! - `shield-agent submit` sends one job request to a running agent.

mod commands;
mod exit_error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::exit_error::ExitError;

#[derive(Parser)]
#[command(name = "shield-agent", about = "SHIELD backup/restore agent", version)]
struct Cli {
    /// Configuration file [default: $SHIELD_AGENT_CONFIG or /etc/shield/agent.toml]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `shield_engine=trace`
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent (the default)
    Serve,

    /// Generate a keypair file and its `.pub` companion
    Keygen(commands::keygen::KeygenArgs),

    /// List registered plugins
    Plugins(commands::plugins::PluginsArgs),

    /// Submit one job request to a running agent
    Submit(commands::submit::SubmitArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => match e.downcast_ref::<ExitError>() {
            Some(exit) => {
                if !exit.message.is_empty() {
                    eprintln!("{}", exit.message);
                }
                exit.code
            }
            None => {
                eprintln!("error: {e:#}");
                1
            }
        },
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.unwrap_or_else(shield_agent::env::config_path);
    let log_level = cli.log_level.as_deref();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => commands::serve::run(&config_path, log_level).await,
        Command::Keygen(args) => commands::keygen::run(args),
        Command::Plugins(args) => commands::plugins::run(args, &config_path, log_level).await,
        Command::Submit(args) => commands::submit::run(args, log_level).await,
    }
}
