//! Dashboard configuration

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use raqamly_session::DEFAULT_REFRESH_MARGIN_SECS;

use crate::error::CoreError;
use crate::Result;

pub const BACKEND_URL_VAR: &str = "RAQAMLY_BACKEND_URL";
pub const ANON_KEY_VAR: &str = "RAQAMLY_ANON_KEY";
pub const DATABASE_PATH_VAR: &str = "RAQAMLY_DATABASE_PATH";
pub const REFRESH_MARGIN_VAR: &str = "RAQAMLY_REFRESH_MARGIN_SECS";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the hosted backend project
    pub backend_url: String,
    /// Public (anonymous) API key sent with every request
    pub anon_key: String,
    /// Path to the database file holding the persisted session
    pub database_path: PathBuf,
    /// Sessions closer than this to expiry are refreshed before use
    pub refresh_margin_secs: i64,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            backend_url: String::new(),
            anon_key: String::new(),
            database_path: data_dir.join("raqamly.db"),
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
        }
    }

    /// Defaults overlaid with the `RAQAMLY_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(Self::data_dir(), |key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(data_dir: PathBuf, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new(data_dir);
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = read(BACKEND_URL_VAR) {
            config.backend_url = url;
        }
        if let Some(key) = read(ANON_KEY_VAR) {
            config.anon_key = key;
        }
        if let Some(path) = read(DATABASE_PATH_VAR) {
            config.database_path = PathBuf::from(path);
        }
        if let Some(margin) = read(REFRESH_MARGIN_VAR) {
            config.refresh_margin_secs = margin.parse().map_err(|_| {
                CoreError::Config(format!("{} must be a whole number of seconds", REFRESH_MARGIN_VAR))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend_url.is_empty() {
            return Err(CoreError::Config(format!("{} is not set", BACKEND_URL_VAR)));
        }
        if self.anon_key.is_empty() {
            return Err(CoreError::Config(format!("{} is not set", ANON_KEY_VAR)));
        }
        if self.refresh_margin_secs < 0 {
            return Err(CoreError::Config("refresh margin cannot be negative".to_string()));
        }
        Ok(())
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::seconds(self.refresh_margin_secs)
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("Raqamly"))
            .unwrap_or_else(|| PathBuf::from(".raqamly"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

mod dirs {
    use std::path::PathBuf;

    pub fn data_local_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("LOCALAPPDATA").ok().map(PathBuf::from)
        }
        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library/Application Support"))
        }
        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_DATA_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".local/share"))
                })
        }
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }
}
