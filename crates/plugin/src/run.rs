// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adapter-side runtime: turns a [`Plugin`] implementation into an executable
//! that honours the process contract.
//!
//! The engine never links against this trait. It only sees the process
//! contract: argv, environment, standard streams, and exit status.

use std::io::{self, Read, Write};
use std::process::ExitCode;

use thiserror::Error;

use crate::endpoint::{Endpoint, EndpointError};
use crate::exit;
use crate::{Operation, PluginInfo, ENDPOINT_ENV, RESTORE_KEY_ENV};

/// Errors a plugin operation can return.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("operation not implemented by this plugin")]
    Unimplemented,

    #[error(transparent)]
    Endpoint(#[from] EndpointError),

    #[error("invalid endpoint configuration: {}", join_problems(.0))]
    Invalid(Vec<EndpointError>),

    #[error("a restore key is required (set SHIELD_RESTORE_KEY)")]
    RestoreKeyRequired,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Failed(String),
}

fn join_problems(problems: &[EndpointError]) -> String {
    problems.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl PluginError {
    /// The exit status this error is reported with.
    pub fn exit_code(&self) -> i32 {
        match self {
            PluginError::Unimplemented => exit::UNIMPLEMENTED,
            PluginError::Endpoint(_) | PluginError::Invalid(_) => exit::ENDPOINT_INVALID,
            PluginError::RestoreKeyRequired => exit::RESTORE_KEY_REQUIRED,
            PluginError::Io(_) | PluginError::Failed(_) => exit::FAILURE,
        }
    }
}

/// One adapter. Target plugins implement `backup`/`restore`, store plugins
/// implement `store`/`retrieve`/`purge`; the rest stay unimplemented.
pub trait Plugin {
    fn meta(&self) -> PluginInfo;

    fn validate(&self, endpoint: &Endpoint) -> Result<(), PluginError>;

    fn backup(&self, _endpoint: &Endpoint, _out: &mut dyn Write) -> Result<(), PluginError> {
        Err(PluginError::Unimplemented)
    }

    fn restore(&self, _endpoint: &Endpoint, _input: &mut dyn Read) -> Result<(), PluginError> {
        Err(PluginError::Unimplemented)
    }

    /// Persist `input` and return the restore key.
    fn store(&self, _endpoint: &Endpoint, _input: &mut dyn Read) -> Result<String, PluginError> {
        Err(PluginError::Unimplemented)
    }

    fn retrieve(
        &self,
        _endpoint: &Endpoint,
        _key: &str,
        _out: &mut dyn Write,
    ) -> Result<(), PluginError> {
        Err(PluginError::Unimplemented)
    }

    /// Delete the artifact named by `key`. Purging an absent key succeeds.
    fn purge(&self, _endpoint: &Endpoint, _key: &str) -> Result<(), PluginError> {
        Err(PluginError::Unimplemented)
    }
}

/// Values a plugin reads from its environment.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub endpoint: Option<String>,
    pub restore_key: Option<String>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self {
            endpoint: std::env::var(ENDPOINT_ENV).ok(),
            restore_key: std::env::var(RESTORE_KEY_ENV).ok(),
        }
    }

    fn endpoint(&self) -> Result<Endpoint, PluginError> {
        match self.endpoint.as_deref() {
            Some(json) if !json.trim().is_empty() => Ok(Endpoint::parse(json)?),
            _ => Err(EndpointError::Missing(ENDPOINT_ENV.to_string()).into()),
        }
    }

    fn restore_key(&self) -> Result<String, PluginError> {
        match self.restore_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(PluginError::RestoreKeyRequired),
        }
    }
}

/// Run `plugin` against the current process: argv, environment and stdio.
pub fn run<P: Plugin + ?Sized>(plugin: &P) -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let env = Environment::from_process();
    let stdin = io::stdin();
    let stdout = io::stdout();
    let stderr = io::stderr();
    let code = dispatch(
        plugin,
        &args,
        &env,
        &mut stdin.lock(),
        &mut stdout.lock(),
        &mut stderr.lock(),
    );
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

/// Dispatch one invocation and return its exit status.
pub fn dispatch<P: Plugin + ?Sized>(
    plugin: &P,
    args: &[String],
    env: &Environment,
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let Some(arg) = args.first() else {
        let _ = writeln!(stderr, "usage: <plugin> <operation>");
        return exit::USAGE;
    };
    let op = match arg.parse::<Operation>() {
        Ok(op) => op,
        Err(e) => {
            let _ = writeln!(stderr, "{e}");
            return exit::USAGE;
        }
    };

    match execute(plugin, op, env, stdin, stdout) {
        Ok(()) => exit::SUCCESS,
        Err(PluginError::Invalid(problems)) => {
            for problem in &problems {
                let _ = writeln!(stderr, "\u{2717} {problem}");
            }
            exit::ENDPOINT_INVALID
        }
        Err(e) => {
            let _ = writeln!(stderr, "{op}: {e}");
            e.exit_code()
        }
    }
}

fn execute<P: Plugin + ?Sized>(
    plugin: &P,
    op: Operation,
    env: &Environment,
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
) -> Result<(), PluginError> {
    if op == Operation::Meta {
        let json = serde_json::to_string(&plugin.meta())
            .map_err(|e| PluginError::Failed(e.to_string()))?;
        writeln!(stdout, "{json}")?;
        stdout.flush()?;
        return Ok(());
    }

    let endpoint = env.endpoint()?;
    match op {
        Operation::Meta => Ok(()),
        Operation::Validate => plugin.validate(&endpoint),
        Operation::Backup => {
            plugin.backup(&endpoint, stdout)?;
            stdout.flush()?;
            Ok(())
        }
        Operation::Restore => plugin.restore(&endpoint, stdin),
        Operation::Store => {
            let key = plugin.store(&endpoint, stdin)?;
            let key = key.trim();
            if key.is_empty() || key.contains('\n') {
                return Err(PluginError::Failed(format!("invalid restore key {key:?}")));
            }
            writeln!(stdout, "{key}")?;
            stdout.flush()?;
            Ok(())
        }
        Operation::Retrieve => {
            let key = env.restore_key()?;
            plugin.retrieve(&endpoint, &key, stdout)?;
            stdout.flush()?;
            Ok(())
        }
        Operation::Purge => {
            let key = env.restore_key()?;
            plugin.purge(&endpoint, &key)
        }
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
