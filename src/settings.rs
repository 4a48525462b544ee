//! Shared settings for the ollama-forge CLI and demos.
//! Persisted in the platform-specific config directory via `directories::ProjectDirs`,
//! then overridden by `OLLAMA_FORGE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::client::{
    ClientConfig, DEFAULT_BACKOFF_BASE_MS, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES,
    DEFAULT_STREAM_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS,
};
use crate::config::{DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};

/// Settings file I/O errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Cannot determine config directory")]
    NoConfigDir,
    #[error("Failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid settings file {}: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Settings that can be saved and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeSettings {
    /// Ollama server base URL
    pub base_url: String,
    /// Single-shot request timeout in seconds
    pub timeout_secs: u64,
    /// Streaming idle timeout in seconds
    pub stream_timeout_secs: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Backoff base delay in milliseconds
    pub backoff_base_ms: u64,
    pub fallback_enabled: bool,
    /// Honour HTTP(S)_PROXY for the server connection
    pub use_system_proxy: bool,
    /// Verbose logging
    pub debug: bool,
    /// Model used when the CLI is not given one
    pub chat_model: String,
    pub embedding_model: String,
    /// Extra aliases, layered over the built-in table
    pub aliases: HashMap<String, String>,
}

impl Default for ForgeSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            stream_timeout_secs: DEFAULT_STREAM_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            fallback_enabled: true,
            use_system_proxy: false,
            debug: false,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            aliases: HashMap::new(),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl ForgeSettings {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "moderras", "ollama-forge")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the settings file path.
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("settings.json"))
    }

    /// Load settings from the config file, then apply environment overrides.
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load() -> Self {
        let stored = match Self::settings_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring settings file");
                Self::default()
            }),
            _ => Self::default(),
        };
        stored.with_env()
    }

    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut loaded: Self =
            serde_json::from_str(&content).map_err(|source| SettingsError::Format {
                path: path.to_path_buf(),
                source,
            })?;

        // Backfill fields left empty by older config files
        let defaults = Self::default();
        if loaded.base_url.is_empty() {
            loaded.base_url = defaults.base_url;
        }
        if loaded.chat_model.is_empty() {
            loaded.chat_model = defaults.chat_model;
        }
        if loaded.embedding_model.is_empty() {
            loaded.embedding_model = defaults.embedding_model;
        }

        Ok(loaded)
    }

    /// Save settings to the config file.
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::settings_path().ok_or(SettingsError::NoConfigDir)?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        let io_error = |source: std::io::Error| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_error)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|source| SettingsError::Format {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, content).map_err(io_error)
    }

    /// Apply `OLLAMA_FORGE_*` overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`. Unparseable numbers are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("OLLAMA_FORGE_BASE_URL") {
            self.base_url = url;
        }
        if let Some(secs) = lookup("OLLAMA_FORGE_TIMEOUT").and_then(|s| s.parse().ok()) {
            self.timeout_secs = secs;
        }
        if let Some(secs) = lookup("OLLAMA_FORGE_STREAM_TIMEOUT").and_then(|s| s.parse().ok()) {
            self.stream_timeout_secs = secs;
        }
        if let Some(retries) = lookup("OLLAMA_FORGE_MAX_RETRIES").and_then(|s| s.parse().ok()) {
            self.max_retries = retries;
        }
        if let Some(ms) = lookup("OLLAMA_FORGE_BACKOFF_BASE").and_then(|s| s.parse().ok()) {
            self.backoff_base_ms = ms;
        }
        if let Some(flag) = lookup("OLLAMA_FORGE_DEBUG") {
            self.debug = parse_flag(&flag);
        }
        if let Some(model) = lookup("OLLAMA_FORGE_CHAT_MODEL") {
            self.chat_model = model;
        }
        if let Some(model) = lookup("OLLAMA_FORGE_EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
        self
    }

    /// Client configuration described by these settings.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::default()
            .with_base_url(&self.base_url)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_stream_timeout(Duration::from_secs(self.stream_timeout_secs))
            .with_max_retries(self.max_retries)
            .with_backoff_base(Duration::from_millis(self.backoff_base_ms))
            .with_fallback(self.fallback_enabled)
            .with_system_proxy(self.use_system_proxy);
        for (alias, model) in &self.aliases {
            config = config.with_alias(alias, model);
        }
        config
    }

    /// Default `tracing` filter directive for these settings.
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "ollama_forge=debug,info"
        } else {
            "info"
        }
    }
}
