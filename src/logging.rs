// src/logging.rs

//! Logging setup
//!
//! Console output drops timestamps and targets. When a log file is
//! given, the same events are also appended there so the result record can
//! point at a complete log of the run.

use crate::error::{Error, Result};
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Build the level filter, letting `RUST_LOG` override the verbosity flag
pub fn build_filter(verbose: bool) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Create a fresh log file, replacing any left over from a previous run
pub fn open_log_file(path: &Path) -> Result<File> {
    if path.is_file() {
        std::fs::remove_file(path)?;
    }
    File::create(path)
        .map_err(|e| Error::IoError(format!("Failed to create log file {}: {e}", path.display())))
}

/// Install the global subscriber
///
/// Fails if a subscriber is already installed.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let console = fmt::layer()
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr);

    let file_layer = match log_file {
        Some(path) => Some(
            fmt::layer()
                .without_time()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(build_filter(verbose))
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::IoError(format!("Failed to initialize logging: {e}")))
}
