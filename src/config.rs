use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{OfflineError, Result};

/// Default time-to-live for cache entries (one hour).
pub const DEFAULT_CACHE_TTL_MS: i64 = 3_600_000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Server the pending requests are replayed against
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Location of the SQLite store (defaults to the user data dir)
  pub database_path: Option<PathBuf>,
  #[serde(default = "default_cache_ttl_ms")]
  pub cache_ttl_ms: i64,
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
  #[serde(default)]
  pub probe: ProbeConfig,
}

/// Connectivity probe used by `watch` to detect online/offline edges.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
  #[serde(default = "default_probe_path")]
  pub path: String,
  #[serde(default = "default_probe_interval_secs")]
  pub interval_secs: u64,
}

impl Default for ProbeConfig {
  fn default() -> Self {
    Self {
      path: default_probe_path(),
      interval_secs: default_probe_interval_secs(),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      database_path: None,
      cache_ttl_ms: default_cache_ttl_ms(),
      request_timeout_secs: default_request_timeout_secs(),
      probe: ProbeConfig::default(),
    }
  }
}

fn default_base_url() -> String {
  "http://localhost:5000".to_string()
}

fn default_cache_ttl_ms() -> i64 {
  DEFAULT_CACHE_TTL_MS
}

fn default_request_timeout_secs() -> u64 {
  30
}

fn default_probe_path() -> String {
  "/".to_string()
}

fn default_probe_interval_secs() -> u64 {
  15
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./factosync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/factosync/config.yaml
  ///
  /// Falls back to defaults when no file is found. `FACTOSYNC_BASE_URL`
  /// overrides the configured server in every case.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(OfflineError::Config(format!(
          "Config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    Ok(config.with_env_overrides())
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("factosync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("factosync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      OfflineError::Config(format!(
        "Failed to read config file {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::from_yaml(&contents).map_err(|e| match e {
      OfflineError::Config(msg) => {
        OfflineError::Config(format!("{} ({})", msg, path.display()))
      }
      other => other,
    })
  }

  /// Parse configuration from a YAML document.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    // An empty file deserializes to unit, not to a map
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }

    serde_yaml::from_str(contents)
      .map_err(|e| OfflineError::Config(format!("Failed to parse config: {}", e)))
  }

  fn with_env_overrides(self) -> Self {
    match std::env::var("FACTOSYNC_BASE_URL") {
      Ok(base_url) if !base_url.trim().is_empty() => Config { base_url, ..self },
      _ => self,
    }
  }

  /// Resolve the database path, defaulting to the user data directory.
  pub fn database_path(&self) -> Result<PathBuf> {
    if let Some(p) = &self.database_path {
      return Ok(p.clone());
    }

    Ok(data_dir()?.join("offline.db"))
  }
}

/// Directory holding the store and log files.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| OfflineError::Config("Could not determine data directory".to_string()))?;

  Ok(data_dir.join("factosync"))
}
