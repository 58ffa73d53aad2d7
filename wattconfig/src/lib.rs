#![allow(clippy::multiple_crate_versions)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const APP_NAME: &str = "wattson";
pub const SESSION_FILE_NAME: &str = "session.json";
pub const API_URL_ENV: &str = "WATTSON_API_URL";
pub const TIMEOUT_ENV: &str = "WATTSON_TIMEOUT_SECS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Period shown when the dashboard opens (hourly/daily/monthly)
    #[serde(default = "default_period")]
    pub default_period: String,
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    /// Width in columns of the longest consumption bar
    #[serde(default = "default_bar_width")]
    pub bar_width: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_period: default_period(),
            currency_symbol: default_currency_symbol(),
            bar_width: default_bar_width(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WattConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Where the signed-in session is kept; next to the config file if unset
    #[serde(default)]
    pub session_file: Option<PathBuf>,
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Default for WattConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_secs: default_timeout_secs(),
            session_file: None,
            display: DisplayConfig::default(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8000/api/".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_period() -> String {
    "monthly".to_string()
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

const fn default_bar_width() -> usize {
    40
}

#[derive(Debug, thiserror::Error)]
pub enum WattConfigError {
    #[error("config error: {0}")]
    Confy(#[from] confy::ConfyError),
    #[error("invalid value '{value}' in environment variable '{env}'")]
    InvalidEnv { env: String, value: String },
    #[error("config file path has no parent directory: {path}", path = .path.display())]
    NoConfigDir { path: PathBuf },
}

pub type Result<T> = std::result::Result<T, WattConfigError>;

impl WattConfig {
    /// Loads the config file from the standard OS location and applies
    /// environment overrides.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read or deserialized, or
    /// an override is malformed.
    pub fn load() -> Result<Self> {
        Self::load_file()?.with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Loads the config file as written, without environment overrides.
    ///
    /// # Errors
    /// Returns an error if the config file cannot be read or deserialized.
    pub fn load_file() -> Result<Self> {
        Ok(confy::load(APP_NAME, None)?)
    }

    /// Location of the config file.
    ///
    /// # Errors
    /// Returns an error if the config location cannot be determined.
    pub fn path() -> Result<PathBuf> {
        Ok(confy::get_configuration_file_path(APP_NAME, None)?)
    }

    /// Stores the config to the standard OS location.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn store(&self) -> Result<()> {
        confy::store(APP_NAME, None, self)?;
        Ok(())
    }

    /// Applies `WATTSON_API_URL` and `WATTSON_TIMEOUT_SECS` as read by
    /// `lookup`.
    ///
    /// # Errors
    /// Returns an error if the timeout override is not a positive whole
    /// number of seconds.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(API_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.api_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(TIMEOUT_ENV) {
            self.timeout_secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| WattConfigError::InvalidEnv {
                    env: TIMEOUT_ENV.to_string(),
                    value: raw.clone(),
                })?;
        }
        Ok(self)
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolves the session file, defaulting to `session.json` in the config
    /// directory.
    ///
    /// # Errors
    /// Returns an error if the config location cannot be determined.
    pub fn session_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.session_file {
            return Ok(path.clone());
        }
        let config_path = Self::path()?;
        config_path
            .parent()
            .map(|dir| dir.join(SESSION_FILE_NAME))
            .ok_or(WattConfigError::NoConfigDir { path: config_path })
    }
}
