//! Configuration and credential storage

mod credentials;

pub use credentials::FileStore;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::jwt::DEFAULT_EXPIRY_BUFFER_SECS;

const DEFAULT_API_URL: &str = "http://localhost:3000/api";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_LOGIN_ROUTE: &str = "/login";

/// Client settings, read from `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL every endpoint path is appended to
    pub api_url: String,
    /// Per-request timeout
    pub request_timeout_ms: u64,
    /// Access tokens this close to expiry are refreshed before use
    pub token_expiry_buffer_secs: i64,
    /// Where the user is sent when the session ends
    pub login_route: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            token_expiry_buffer_secs: DEFAULT_EXPIRY_BUFFER_SECS,
            login_route: DEFAULT_LOGIN_ROUTE.to_string(),
        }
    }
}

impl Settings {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "adminctl", "adminctl")
            .context("Could not determine config directory")
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory holding persisted credentials
    pub fn data_dir() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::from_toml(&content)
    }

    fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save settings to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Absolute URL for an API path such as `/items/42`.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
