// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use shield_agent::{keyfile, logging, AgentClient, LogConfig, TerminalStatus};

use crate::exit_error::{ExitError, EXIT_FAILED, EXIT_REJECTED};

#[derive(Args)]
pub struct SubmitArgs {
    /// Agent address
    #[arg(short, long, default_value = "127.0.0.1:5444")]
    pub addr: String,

    /// Caller keypair file (see `keygen`)
    #[arg(short, long)]
    pub key: PathBuf,

    /// Expected agent public key, inline base64 or a `.pub` file
    #[arg(long)]
    pub host_key: Option<String>,

    /// Job request document (JSON); `-` reads standard input
    pub request: String,

    /// Print the full job report as JSON
    #[arg(long)]
    pub json: bool,

    /// Do not echo plugin diagnostics
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn run(args: SubmitArgs, log_level: Option<&str>) -> anyhow::Result<()> {
    let _guard = logging::init(&LogConfig::default(), Some(log_level.unwrap_or("warn")))?;

    let request = read_request(&args.request)?;
    let key = keyfile::load_keypair(&args.key)?;
    let host_key = args.host_key.as_deref().map(keyfile::load_public_key).transpose()?;
    let addr = tokio::net::lookup_host(&args.addr)
        .await
        .with_context(|| format!("cannot resolve {}", args.addr))?
        .next()
        .with_context(|| format!("{} resolved to no address", args.addr))?;

    let mut client = AgentClient::connect(addr, &key, host_key.as_ref()).await?;
    let channel = client.open_session().await?;
    let quiet = args.quiet;
    let outcome = client
        .run_job_on(channel, &request, |chunk| {
            if !quiet {
                eprint!("{chunk}");
                let _ = std::io::stderr().flush();
            }
        })
        .await?;

    if args.json {
        if let Some(report) = &outcome.report {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
    }

    match outcome.status {
        TerminalStatus::Succeeded { restore_key } => {
            if let (Some(key), false) = (restore_key, args.json) {
                println!("{key}");
            }
            Ok(())
        }
        TerminalStatus::Failed { reason } => {
            Err(ExitError::new(EXIT_FAILED, format!("job failed: {reason}")).into())
        }
        TerminalStatus::Rejected { reason } => {
            Err(ExitError::new(EXIT_REJECTED, format!("request rejected: {reason}")).into())
        }
    }
}

fn read_request(source: &str) -> anyhow::Result<Vec<u8>> {
    if source == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf).context("cannot read request from stdin")?;
        return Ok(buf);
    }
    std::fs::read(source).with_context(|| format!("cannot read request file {source}"))
}
