//! Tracing subscriber setup for the command line front end
//!
//! Logs go to stderr so stdout stays machine readable, or to
//! `depwatch.log` in the data directory when file logging is requested.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::{LOG_FILE_NAME, data_dir};

/// Level used when `RUST_LOG` is unset or invalid
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install the tracing subscriber: {0}")]
    Install(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    /// Write to the log file in the data directory instead of stderr
    pub file: bool,
    /// Emit one JSON object per event
    pub json: bool,
}

/// Installs the global subscriber
///
/// The returned guard flushes the file writer on drop and must be held
/// until the program exits.
pub fn init(options: LogOptions) -> Result<Option<WorkerGuard>, LoggingError> {
    let (writer, guard) = if options.file {
        let (writer, guard) = file_writer(&data_dir())?;
        (writer, Some(guard))
    } else {
        (BoxMakeWriter::new(std::io::stderr), None)
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok()))
        .with_target(false)
        .with_ansi(!options.file)
        .with_writer(writer);

    let installed = if options.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(LoggingError::Install)?;

    Ok(guard)
}

fn env_filter(directives: Option<String>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_LEVEL))
}

fn file_writer(dir: &Path) -> Result<(BoxMakeWriter, WorkerGuard), LoggingError> {
    std::fs::create_dir_all(dir).map_err(|source| LoggingError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((BoxMakeWriter::new(writer), guard))
}
