//! Configuration management for framefeed.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default configuration directory name.
const CONFIG_DIR_NAME: &str = "framefeed";

/// Environment variable prefix.
const ENV_PREFIX: &str = "FRAMEFEED_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `FRAMEFEED_`, sections split on `__`)
/// 2. TOML config file at `~/.config/framefeed/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Snapshot service configuration.
    pub camera: CameraConfig,
    /// Polling configuration.
    pub poll: PollConfig,
}

/// Snapshot service configuration.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Origin URL of the snapshot service.
    pub base_url: String,
    /// Bearer credential sent with every request.
    pub token: String,
    /// Path of the snapshot endpoint, relative to `base_url`.
    pub snapshot_path: String,
    /// Path of the health endpoint, relative to `base_url`.
    pub health_path: String,
}

/// Polling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Interval between fetch attempts in milliseconds.
    ///
    /// The effective frame rate is bounded by round-trip latency: ticks that
    /// fire while a fetch is outstanding are dropped.
    pub interval_ms: u64,
    /// Per-fetch timeout in milliseconds. Set to 0 to disable.
    pub request_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9000".to_string(),
            token: String::new(),
            snapshot_path: "/camera/snapshot".to_string(),
            health_path: "/health".to_string(),
        }
    }
}

// Keeps the credential out of logs and debug output.
impl fmt::Debug for CameraConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.masked_token())
            .field("snapshot_path", &self.snapshot_path)
            .field("health_path", &self.health_path)
            .finish()
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 16,
            request_timeout_ms: 0,
        }
    }
}

impl CameraConfig {
    /// The token with everything but its last four characters hidden.
    #[must_use]
    pub fn masked_token(&self) -> String {
        let count = self.token.chars().count();
        if count == 0 {
            return "<unset>".to_string();
        }
        if count <= 4 {
            return "*".repeat(count);
        }
        let tail: String = self.token.chars().skip(count - 4).collect();
        format!("{}{tail}", "*".repeat(count - 4))
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Validate the configuration.
    ///
    /// The token is not checked here; an empty token is only rejected when an
    /// HTTP fetcher is built from this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.poll.interval_ms == 0 {
            return Err(Error::config_validation(
                "interval_ms must be greater than 0",
            ));
        }

        self.base_url()?;

        for (name, path) in [
            ("snapshot_path", &self.camera.snapshot_path),
            ("health_path", &self.camera.health_path),
        ] {
            if !path.starts_with('/') {
                return Err(Error::config_validation(format!(
                    "{name} must start with '/': {path}"
                )));
            }
        }

        Ok(())
    }

    /// Parse the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL does not parse or is not http(s).
    pub fn base_url(&self) -> Result<Url> {
        let url = Url::parse(&self.camera.base_url)
            .map_err(|e| Error::invalid_url(&self.camera.base_url, e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::invalid_url(
                &self.camera.base_url,
                format!("unsupported scheme '{other}'"),
            )),
        }
    }

    /// Full URL of the snapshot endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn snapshot_url(&self) -> Result<Url> {
        self.endpoint(&self.camera.snapshot_path)
    }

    /// Full URL of the health endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid.
    pub fn health_url(&self) -> Result<Url> {
        self.endpoint(&self.camera.health_path)
    }

    // Appends to any path already on the base, like `${BASE}/camera/snapshot`.
    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url()?;
        let joined = format!("{}{path}", base.as_str().trim_end_matches('/'));
        Url::parse(&joined).map_err(|e| Error::invalid_url(joined, e.to_string()))
    }

    /// Get the poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll.interval_ms)
    }

    /// Get the per-fetch timeout, if one is configured.
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        if self.poll.request_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.poll.request_timeout_ms))
        }
    }
}
