// Host settings (settings.toml)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use drg_recon::error::ConfigError;
use drg_recon::stats::DEFAULT_TOP_N;
use drg_recon::ImportConfig;

const APP_DIR: &str = "drg";

/// Statistics views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsSettings {
    /// Entries per view
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self { top_n: DEFAULT_TOP_N }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Roster database. None = `<data_dir>/drg/roster.db`
    #[serde(default)]
    pub database: Option<PathBuf>,

    #[serde(default)]
    pub import: ImportConfig,

    #[serde(default)]
    pub stats: StatsSettings,
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        config_dir.join("settings.toml")
    }

    pub fn default_database_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("roster.db")
    }

    /// Load settings from the default location. A missing file means defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load settings from `path`. A missing file means defaults; an unreadable
    /// or malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::debug!("no settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        let settings = Self::from_toml(&contents)
            .map_err(|e| match e {
                ConfigError::Parse(msg) => ConfigError::Parse(format!("{}: {msg}", path.display())),
                other => other,
            })?;
        log::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.import.validate()?;
        if self.stats.top_n == 0 {
            return Err(ConfigError::Validation("stats.top_n must be at least 1".into()));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.clone().unwrap_or_else(Self::default_database_path)
    }
}
