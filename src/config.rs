use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::DEFAULT_STALE_SECONDS;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub endpoint: EndpointConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
  /// List endpoint, e.g. "https://api.example.com/products"
  pub url: String,
  /// Path under `url` that accepts bulk imports
  #[serde(default = "default_bulk_path")]
  pub bulk_path: String,
}

fn default_bulk_path() -> String {
  "bulk".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Seconds before cached pages are refetched on next access
  #[serde(default = "default_stale_seconds")]
  pub stale_seconds: u64,
}

fn default_stale_seconds() -> u64 {
  DEFAULT_STALE_SECONDS as u64
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_seconds: default_stale_seconds(),
    }
  }
}

impl CacheConfig {
  pub fn stale_time(&self) -> Duration {
    i64::try_from(self.stale_seconds)
      .ok()
      .and_then(Duration::try_seconds)
      .unwrap_or_else(|| Duration::seconds(DEFAULT_STALE_SECONDS))
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
  /// Filter directive, e.g. "info" or "listcache=debug" (RUST_LOG wins)
  #[serde(default = "default_log_level")]
  pub level: String,
  /// Log file directory (defaults to the user data directory)
  pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
  "info".to_string()
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      directory: None,
    }
  }
}

impl Config {
  /// Configuration for a bare endpoint URL with everything else defaulted.
  pub fn for_endpoint(url: impl Into<String>) -> Self {
    Self {
      endpoint: EndpointConfig {
        url: url.into(),
        bulk_path: default_bulk_path(),
      },
      cache: CacheConfig::default(),
      logging: LoggingConfig::default(),
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./listcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/listcache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    Self::load_optional(explicit_path)?.ok_or_else(|| {
      eyre!(
        "No configuration file found. Create one at ~/.config/listcache/config.yaml\n\
                 or pass --endpoint."
      )
    })
  }

  /// Like [`Config::load`], but `Ok(None)` when no file exists.
  pub fn load_optional(explicit_path: Option<&Path>) -> Result<Option<Self>> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    path.map(|p| Self::load_from_path(&p)).transpose()
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("listcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("listcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }
}
