//! Global configuration parsing, validation, and environment overrides.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::{AppError, Result};

/// Environment variable that overrides the evaluation engine base URL.
pub const ENGINE_URL_ENV: &str = "EVALUATION_ENGINE_URL";

/// Evaluation engine connectivity settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Base URL of the evaluation engine process.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout for engine HTTP calls.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_base_url() -> String {
    "http://127.0.0.1:9000".into()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl EngineConfig {
    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Session timing: message pump cadence and idle grace window.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionConfig {
    /// Interval between message pump polls.
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// Delay after the last job completes before the pump stops.
    #[serde(default = "default_idle_grace_seconds")]
    pub idle_grace_seconds: u64,
}

fn default_poll_interval_seconds() -> u64 {
    1
}

fn default_idle_grace_seconds() -> u64 {
    5
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            idle_grace_seconds: default_idle_grace_seconds(),
        }
    }
}

impl SessionConfig {
    /// Poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Idle grace window as a [`Duration`].
    #[must_use]
    pub fn idle_grace(&self) -> Duration {
        Duration::from_secs(self.idle_grace_seconds)
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Evaluation engine connectivity.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Message pump timing.
    #[serde(default)]
    pub session: SessionConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path, then apply
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from built-in defaults and environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if an environment override fails validation.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var(ENGINE_URL_ENV) {
            if !url.is_empty() {
                info!(%url, "engine base URL overridden from {ENGINE_URL_ENV}");
                self.engine.base_url = url;
            }
        }
    }

    fn validate(&mut self) -> Result<()> {
        if !self.engine.base_url.starts_with("http://") && !self.engine.base_url.starts_with("https://")
        {
            return Err(AppError::Config(format!(
                "engine base_url must be an http(s) URL, got `{}`",
                self.engine.base_url
            )));
        }

        if self.session.poll_interval_seconds == 0 {
            return Err(AppError::Config(
                "poll_interval_seconds must be greater than zero".into(),
            ));
        }

        if self.engine.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "request_timeout_seconds must be greater than zero".into(),
            ));
        }

        // A trailing slash would produce `//install` style paths.
        while self.engine.base_url.ends_with('/') {
            self.engine.base_url.pop();
        }

        Ok(())
    }
}
