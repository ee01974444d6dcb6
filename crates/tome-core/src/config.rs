//! Application configuration
//!
//! Configuration is resolved from three layers:
//! 1. Default values
//! 2. Config file (~/.config/tome/config.toml)
//! 3. Environment variables (TOME_* prefix)
//!
//! The merge itself is a pure function over a possibly-partial file record
//! and a set of environment overrides, so the same resolution can be
//! exercised in tests without touching the process environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable prefix
const ENV_PREFIX: &str = "TOME";

/// Default debounce for push scheduling, in milliseconds
const DEFAULT_DEBOUNCE_MS: u64 = 2_000;

/// Default interval between periodic library pulls, in seconds
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Fully-resolved application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory for data storage (SQLite db, book files)
    pub data_dir: PathBuf,

    /// Base URL of the remote library server (optional)
    pub server_url: Option<String>,

    /// Bearer token for the remote server (optional)
    pub api_token: Option<String>,

    /// Whether sync is enabled
    pub sync_enabled: bool,

    /// Debounce window for push scheduling, in milliseconds
    pub debounce_ms: u64,

    /// Interval between periodic library pulls, in seconds
    pub poll_interval_secs: u64,
}

/// A possibly-partial configuration record as persisted on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub data_dir: Option<PathBuf>,
    pub server_url: Option<String>,
    pub api_token: Option<String>,
    pub sync_enabled: Option<bool>,
    pub debounce_ms: Option<u64>,
    pub poll_interval_secs: Option<u64>,
}

/// Environment-provided overrides, captured once at load time
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub data_dir: Option<PathBuf>,
    pub server_url: Option<String>,
    pub api_token: Option<String>,
    pub sync_enabled: Option<bool>,
}

impl EnvOverrides {
    /// Capture TOME_* variables from the process environment
    pub fn from_env() -> Self {
        let var = |suffix: &str| std::env::var(format!("{}_{}", ENV_PREFIX, suffix)).ok();

        Self {
            data_dir: var("DATA_DIR").map(PathBuf::from),
            server_url: var("SERVER_URL")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            api_token: var("API_TOKEN").filter(|v| !v.is_empty()),
            sync_enabled: var("SYNC_ENABLED")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            server_url: None,
            api_token: None,
            sync_enabled: false,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
        }
    }
}

impl Config {
    /// Resolve a full configuration from a partial file record and
    /// environment overrides
    ///
    /// Precedence (highest to lowest): environment, file, defaults.
    /// Pure function: no filesystem or environment access.
    pub fn resolve(file: ConfigFile, env: EnvOverrides) -> Self {
        let defaults = Config::default();
        Self {
            data_dir: env
                .data_dir
                .or(file.data_dir)
                .unwrap_or(defaults.data_dir),
            server_url: env.server_url.or(file.server_url),
            api_token: env.api_token.or(file.api_token),
            sync_enabled: env
                .sync_enabled
                .or(file.sync_enabled)
                .unwrap_or(defaults.sync_enabled),
            debounce_ms: file.debounce_ms.unwrap_or(defaults.debounce_ms),
            poll_interval_secs: file
                .poll_interval_secs
                .unwrap_or(defaults.poll_interval_secs),
        }
    }

    /// Load configuration from the default location and environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let file = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            ConfigFile::default()
        };

        let config = Self::resolve(file, EnvOverrides::from_env());
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        Ok(Self::resolve(file, EnvOverrides::from_env()))
    }

    /// Ensure the data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_file_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with the TOME_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tome")
            .join("config.toml")
    }

    /// Get the path to the SQLite database
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("tome.db")
    }

    /// Get the directory book files are stored in
    pub fn books_dir(&self) -> PathBuf {
        self.data_dir.join("books")
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tome")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.sync_enabled);
        assert!(config.server_url.is_none());
        assert!(config.data_dir.ends_with("tome"));
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.sqlite_path().ends_with("tome.db"));
        assert!(config.books_dir().ends_with("books"));
    }

    #[test]
    fn test_resolve_defaults_when_empty() {
        let config = Config::resolve(ConfigFile::default(), EnvOverrides::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_resolve_file_over_defaults() {
        let file = ConfigFile {
            data_dir: Some(PathBuf::from("/custom/data")),
            server_url: Some("http://example.com".to_string()),
            sync_enabled: Some(true),
            debounce_ms: Some(500),
            ..Default::default()
        };

        let config = Config::resolve(file, EnvOverrides::default());
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.server_url, Some("http://example.com".to_string()));
        assert!(config.sync_enabled);
        assert_eq!(config.debounce_ms, 500);
        assert_eq!(config.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
    }

    #[test]
    fn test_resolve_env_over_file() {
        let file = ConfigFile {
            data_dir: Some(PathBuf::from("/from/file")),
            server_url: Some("http://file.example.com".to_string()),
            sync_enabled: Some(false),
            ..Default::default()
        };
        let env = EnvOverrides {
            data_dir: Some(PathBuf::from("/from/env")),
            server_url: Some("http://env.example.com".to_string()),
            sync_enabled: Some(true),
            ..Default::default()
        };

        let config = Config::resolve(file, env);
        assert_eq!(config.data_dir, PathBuf::from("/from/env"));
        assert_eq!(config.server_url, Some("http://env.example.com".to_string()));
        assert!(config.sync_enabled);
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let file = ConfigFile {
            server_url: Some("http://example.com".to_string()),
            ..Default::default()
        };
        let a = Config::resolve(file.clone(), EnvOverrides::default());
        let b = Config::resolve(file, EnvOverrides::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_load_from_str_partial() {
        let toml = r#"
            server_url = "http://example.com"
            sync_enabled = true
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.server_url, Some("http://example.com".to_string()));
        assert!(config.sync_enabled);
        // Unspecified keys fall back to defaults
        assert_eq!(config.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("missing.toml");
        // Point data_dir somewhere writable via the resolution itself
        let config = Config::resolve(
            ConfigFile {
                data_dir: Some(temp_dir.path().join("data")),
                ..Default::default()
            },
            EnvOverrides::default(),
        );
        assert!(!path.exists());
        assert!(!config.sync_enabled);
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = Config {
            data_dir: PathBuf::from("/data/tome"),
            server_url: Some("http://sync.example.com".to_string()),
            api_token: Some("secret".to_string()),
            sync_enabled: true,
            debounce_ms: 1000,
            poll_interval_secs: 60,
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ConfigFile = toml::from_str(&toml_str).unwrap();
        let resolved = Config::resolve(parsed, EnvOverrides::default());
        assert_eq!(resolved, config);
    }
}
