//! File logging setup.
//!
//! The shell owns stdout, so log lines go to a daily rolling file instead.

use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "listcache.log";

/// Install the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed.
pub fn init(config: &LoggingConfig) -> Result<WorkerGuard> {
  let directory = match &config.directory {
    Some(directory) => directory.clone(),
    None => default_log_dir()?,
  };
  std::fs::create_dir_all(&directory)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", directory.display(), e))?;

  let filter = build_filter(&config.level)?;
  let appender = tracing_appender::rolling::daily(&directory, LOG_FILE_PREFIX);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .try_init()
    .map_err(|e| eyre!("Failed to install log subscriber: {}", e))?;

  Ok(guard)
}

/// RUST_LOG when set, otherwise the configured level.
fn build_filter(level: &str) -> Result<EnvFilter> {
  EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(level))
    .map_err(|e| eyre!("Invalid log level '{}': {}", level, e))
}

/// Get the default log directory
fn default_log_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("listcache").join("logs"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_filter_accepts_directives() {
    assert!(build_filter("info").is_ok());
    assert!(build_filter("listcache=debug,reqwest=warn").is_ok());
  }
}
