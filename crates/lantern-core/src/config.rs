//! Configuration management for Lantern.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use crate::route::{CustomSampling, CustomSamplingEntry, GroupRoutesKey};
use directories::ProjectDirs;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/lantern/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the site being scanned
    pub site: String,
    /// Root directory for report artifacts
    pub output_path: PathBuf,
    /// Queue and sampling settings
    pub scanner: ScannerConfig,
    /// Client-facing grouping settings
    pub client: ClientConfig,
    /// Browser automation settings
    pub browser: BrowserConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            site: "http://localhost:3000".to_string(),
            output_path: PathBuf::from(".lantern"),
            scanner: ScannerConfig::default(),
            client: ClientConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit file.
    ///
    /// Unlike [`AppConfig::load`], a missing file is an error.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        tracing::debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `LANTERN_SITE`: Override the site URL
    /// - `LANTERN_HEADLESS`: Override browser headless mode (true/false)
    /// - `LANTERN_DYNAMIC_SAMPLING`: Override the per-group sampling limit
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `LANTERN_*` environment overrides in place.
    pub fn apply_env(&mut self) {
        if let Ok(site) = std::env::var("LANTERN_SITE") {
            tracing::debug!("Override site from env: {}", site);
            self.site = site;
        }

        if let Ok(val) = std::env::var("LANTERN_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Ok(val) = std::env::var("LANTERN_DYNAMIC_SAMPLING") {
            if let Ok(limit) = val.parse() {
                self.scanner.dynamic_sampling = limit;
                tracing::debug!("Override scanner.dynamic_sampling from env: {}", limit);
            }
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scanner.max_workers == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scanner.max_workers".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if self.scanner.event_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scanner.event_capacity".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        CustomSampling::from_config(&self.scanner.custom_sampling)?;
        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/lantern/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("dev", "lantern", "lantern").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Queue, sampling and worker pool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Maximum routes admitted per group; zero or less disables sampling
    pub dynamic_sampling: i64,
    /// Number of concurrent browser workers
    pub max_workers: usize,
    /// Debounce before a requeued route is admitted again, in milliseconds
    pub requeue_delay_ms: u64,
    /// Buffered lifecycle events per subscriber
    pub event_capacity: usize,
    /// Path regex to definition name, applied in file order
    pub custom_sampling: IndexMap<String, CustomSamplingEntry>,
}

impl ScannerConfig {
    /// Requeue debounce as a `Duration`.
    #[must_use]
    pub fn requeue_delay(&self) -> Duration {
        Duration::from_millis(self.requeue_delay_ms)
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            dynamic_sampling: 5,
            max_workers: std::thread::available_parallelism().map_or(1, usize::from),
            requeue_delay_ms: 3000,
            event_capacity: 1024,
            custom_sampling: IndexMap::new(),
        }
    }
}

/// Grouping settings shared with report consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Route attribute used to group routes
    pub group_routes_key: GroupRoutesKey,
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
}

impl BrowserConfig {
    /// Navigation timeout as a `Duration`.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            navigation_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.scanner.dynamic_sampling, 5);
        assert_eq!(config.scanner.requeue_delay(), Duration::from_secs(3));
        assert!(config.scanner.max_workers >= 1);
        assert_eq!(config.client.group_routes_key, GroupRoutesKey::DefinitionName);
        assert!(config.browser.headless);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[scanner]"));
        assert!(toml_str.contains("[client]"));
        assert!(toml_str.contains("[browser]"));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed.site, config.site);
        assert_eq!(parsed.scanner.dynamic_sampling, config.scanner.dynamic_sampling);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("config.toml");

        fs::write(
            &config_path,
            r#"
site = "https://vuejs.org/"

[scanner]
dynamic_sampling = 3

[scanner.custom_sampling."/guide/(.*?)"]
name = "guide"

[client]
group_routes_key = "route.path"
"#,
        )
        .expect("write config file");

        let loaded = AppConfig::load_from(&config_path).expect("load config");
        assert_eq!(loaded.site, "https://vuejs.org/");
        assert_eq!(loaded.scanner.dynamic_sampling, 3);
        assert_eq!(loaded.client.group_routes_key, GroupRoutesKey::Path);
        assert_eq!(
            loaded.scanner.custom_sampling.get("/guide/(.*?)").map(|e| e.name.as_str()),
            Some("guide")
        );
        // Untouched sections keep their defaults
        assert!(loaded.browser.headless);
    }

    #[test]
    fn test_load_from_missing_file() {
        let tmp = TempDir::new().expect("create temp dir");
        let err = AppConfig::load_from(&tmp.path().join("nope.toml")).expect_err("missing file");
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = AppConfig::default();
        config.scanner.max_workers = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "scanner.max_workers"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_sampling_regex() {
        let mut config = AppConfig::default();
        config
            .scanner
            .custom_sampling
            .insert("[".to_string(), CustomSamplingEntry { name: "broken".to_string() });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("LANTERN_SITE", "https://example.com");
        std::env::set_var("LANTERN_HEADLESS", "false");
        std::env::set_var("LANTERN_DYNAMIC_SAMPLING", "0");

        let mut config = AppConfig::default();
        config.apply_env();
        assert_eq!(config.site, "https://example.com");
        assert!(!config.browser.headless);
        assert_eq!(config.scanner.dynamic_sampling, 0);

        std::env::remove_var("LANTERN_SITE");
        std::env::remove_var("LANTERN_HEADLESS");
        std::env::remove_var("LANTERN_DYNAMIC_SAMPLING");
    }
}
