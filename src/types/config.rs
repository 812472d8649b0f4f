//! Configuration types
//!
//! Widget configuration and its layered loading: defaults, then an optional
//! settings file in the platform config directory, then the environment.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the backend base URL
pub const BASE_URL_ENV: &str = "PAGECHAT_API_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid settings file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not determine the config directory")]
    NoConfigDir,
}

/// Chat widget configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Base URL of the assistant backend; requests go to `<base>/ask_stream`
    #[serde(default = "default_base_url")]
    pub backend_base_url: String,
    /// Connection timeout only. The response stream itself is never timed out.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Text of the welcome banner seed entry
    #[serde(default = "default_welcome_text")]
    pub welcome_text: String,
    /// Shortcut prompts shown in the quick-actions seed entry
    #[serde(default = "default_quick_actions")]
    pub quick_actions: Vec<String>,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_welcome_text() -> String {
    "Hi, how can I help today?".to_string()
}

fn default_quick_actions() -> Vec<String> {
    vec![
        "Summarize this page".to_string(),
        "Highlight the most important phrase(s)".to_string(),
        "Show where this article mentions ..".to_string(),
        "Find related articles".to_string(),
    ]
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            backend_base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout(),
            welcome_text: default_welcome_text(),
            quick_actions: default_quick_actions(),
        }
    }
}

impl ChatConfig {
    /// Normalize values into acceptable ranges
    pub fn validate(&mut self) {
        let trimmed = self.backend_base_url.trim().trim_end_matches('/');
        self.backend_base_url = if trimmed.is_empty() {
            default_base_url()
        } else {
            trimmed.to_string()
        };

        self.connect_timeout_secs = self.connect_timeout_secs.clamp(1, 120);

        if self.welcome_text.trim().is_empty() {
            self.welcome_text = default_welcome_text();
        }

        self.quick_actions.retain(|a| !a.trim().is_empty());
        if self.quick_actions.is_empty() {
            self.quick_actions = default_quick_actions();
        }
    }

    /// Apply environment overrides on top of the current values
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                tracing::debug!(url = %url, "Backend base URL taken from environment");
                self.backend_base_url = url;
            }
        }
    }

    /// Full URL of the streaming endpoint
    pub fn ask_stream_url(&self) -> String {
        format!("{}/ask_stream", self.backend_base_url.trim_end_matches('/'))
    }
}

/// Default location of the settings file
pub fn settings_path() -> Result<PathBuf, ConfigError> {
    directories::ProjectDirs::from("com", "PageChat", "PageChat")
        .map(|dirs| dirs.config_dir().join("settings.json"))
        .ok_or(ConfigError::NoConfigDir)
}

/// Load configuration from the default locations
///
/// Never fails: a missing or corrupted settings file falls back to defaults.
pub fn load_config() -> ChatConfig {
    let mut config = match settings_path().and_then(|path| load_config_from(&path)) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to load settings, using defaults: {}", e);
            ChatConfig::default()
        }
    };
    config.apply_env();
    config.validate();
    config
}

/// Load configuration from a specific settings file
///
/// A missing file yields the defaults. Environment overrides are not applied.
pub fn load_config_from(path: &Path) -> Result<ChatConfig, ConfigError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "Settings file not found, using defaults");
        return Ok(ChatConfig::default());
    }

    let json = fs::read_to_string(path)?;
    let mut config: ChatConfig = serde_json::from_str(&json)?;
    config.validate();

    tracing::debug!(path = %path.display(), "Loaded settings from disk");
    Ok(config)
}
