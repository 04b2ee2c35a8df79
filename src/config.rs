use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::park::schedule::{Rollover, DEFAULT_ROLLOVER_LAST_HOUR};

const APP_NAME: &str = "mousetools";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Base URL of the facility service (schedules)
  pub api_url: String,
  /// Base URL of the sync gateway serving channel changes
  pub sync_url: String,
  /// Cache database path (defaults to the data directory)
  pub database: Option<PathBuf>,
  /// Timeout for each remote request
  pub request_timeout_secs: u64,
  /// End hours up to this value close on the following day
  pub rollover_last_hour: u32,
  /// Serve live status without syncing if synced within this many seconds
  pub status_ttl_secs: Option<u64>,
  /// Same for facility data; it changes far less often than status
  pub facility_ttl_secs: Option<u64>,
  /// Destinations whose facilities are synced at startup
  pub destinations: Vec<String>,
  /// Sync facility data before answering any query
  pub sync_on_init: bool,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      api_url: "https://api.wdpro.disney.go.com".to_string(),
      sync_url: "https://realtime-sync-gw.wdprapps.disney.com/park-platform-pub".to_string(),
      database: None,
      request_timeout_secs: 30,
      rollover_last_hour: DEFAULT_ROLLOVER_LAST_HOUR,
      status_ttl_secs: None,
      facility_ttl_secs: Some(24 * 60 * 60),
      destinations: vec!["wdw".to_string(), "dlr".to_string()],
      sync_on_init: true,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./mousetools.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/mousetools/config.yaml
  ///
  /// Without a config file the defaults are used.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from(format!("{}.yaml", APP_NAME));
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join(APP_NAME).join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if config.rollover_last_hour > 23 {
      return Err(eyre!(
        "rollover_last_hour must be an hour of the day (0-23), got {}",
        config.rollover_last_hour
      ));
    }

    Ok(config)
  }

  /// Cache database path: the configured one, or `<data dir>/mousetools/cache.db`.
  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => Ok(Self::data_dir()?.join("cache.db")),
    }
  }

  /// Directory for log files.
  pub fn log_dir(&self) -> Result<PathBuf> {
    Ok(Self::data_dir()?.join("logs"))
  }

  fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join(APP_NAME))
  }

  pub fn rollover(&self) -> Rollover {
    Rollover {
      last_hour: self.rollover_last_hour,
    }
  }

  pub fn status_ttl(&self) -> Option<Duration> {
    self.status_ttl_secs.map(ttl_from_secs)
  }

  pub fn facility_ttl(&self) -> Option<Duration> {
    self.facility_ttl_secs.map(ttl_from_secs)
  }

  /// Get the park API token from the environment, if one is set.
  ///
  /// Checks MOUSETOOLS_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("MOUSETOOLS_API_TOKEN")
      .ok()
      .filter(|token| !token.is_empty())
  }
}

fn ttl_from_secs(secs: u64) -> Duration {
  // chrono caps durations at i64::MAX milliseconds
  let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1000);
  Duration::seconds(secs)
}
