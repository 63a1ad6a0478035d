// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log subscriber setup for the agent binary.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};
use crate::env;

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{directive}': {message}")]
    Filter { directive: String, message: String },

    #[error("invalid log file path {0}")]
    File(PathBuf),

    #[error("cannot create log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot install log subscriber: {0}")]
    Init(String),
}

/// Pick the filter directive: `--log-level` > `SHIELD_LOG` > config > `info`.
pub fn filter_directive(
    config: &LogConfig,
    cli: Option<&str>,
    from_env: Option<String>,
) -> String {
    cli.map(str::to_string)
        .or(from_env)
        .or_else(|| config.level.clone())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

/// Install the global subscriber. The returned guard flushes the log file
/// when dropped and must be held for the life of the process.
pub fn init(config: &LogConfig, cli: Option<&str>) -> Result<Option<WorkerGuard>, LoggingError> {
    let directive = filter_directive(config, cli, env::log_filter());
    let filter = EnvFilter::try_new(&directive)
        .map_err(|e| LoggingError::Filter { message: e.to_string(), directive })?;

    let (writer, guard) = match &config.file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            std::fs::create_dir_all(dir)?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (BoxMakeWriter::new(writer), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(config.file.is_none());
    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| LoggingError::Init(e.to_string()))?;
    Ok(guard)
}

fn split_log_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr), LoggingError> {
    let name = path.file_name().ok_or_else(|| LoggingError::File(path.to_path_buf()))?;
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    Ok((dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(level: Option<&str>) -> LogConfig {
        LogConfig { level: level.map(str::to_string), ..LogConfig::default() }
    }

    #[yare::parameterized(
        default = { None, None, None, "info" },
        from_config = { Some("warn"), None, None, "warn" },
        env_beats_config = { Some("warn"), None, Some("debug"), "debug" },
        cli_beats_all = { Some("warn"), Some("trace"), Some("debug"), "trace" },
    )]
    fn directive_precedence(level: Option<&str>, cli: Option<&str>, env: Option<&str>, expected: &str) {
        assert_eq!(filter_directive(&config(level), cli, env.map(str::to_string)), expected);
    }

    #[test]
    fn log_path_splits_into_dir_and_file() {
        let (dir, name) = split_log_path(Path::new("/var/log/shield/agent.log")).unwrap();
        assert_eq!(dir, Path::new("/var/log/shield"));
        assert_eq!(name, "agent.log");

        let (dir, _) = split_log_path(Path::new("agent.log")).unwrap();
        assert_eq!(dir, Path::new("."));

        assert!(matches!(split_log_path(Path::new("/")), Err(LoggingError::File(_))));
    }
}
