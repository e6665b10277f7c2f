//! Configuration management for plugaudit.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Main application configuration.
///
/// This is loaded from `~/.config/plugaudit/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Bundle download settings
    pub retrieval: RetrievalConfig,
    /// Signature scanning settings
    pub scanning: ScanningConfig,
    /// Orchestrator settings
    pub pipeline: PipelineConfig,
    /// Result store settings
    pub storage: StorageConfig,
    /// Identifier discovery settings
    pub discovery: DiscoveryConfig,
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
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, falling back to defaults if it does not exist.
    pub fn load_from(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            tracing::debug!("Loading config from {}", path.display());
            let contents = fs::read_to_string(path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `PLUGAUDIT_WORKERS`: Override the orchestrator worker count
    /// - `PLUGAUDIT_STORE`: Override the store backend (`sqlite`, `csv`, `memory`)
    /// - `PLUGAUDIT_STORE_PATH`: Override the store file path
    /// - `PLUGAUDIT_SAVE_SOURCES`: Override source archival (true/false)
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `PLUGAUDIT_*` environment overrides to this configuration.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if `PLUGAUDIT_STORE` names an unknown backend.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        if let Ok(val) = std::env::var("PLUGAUDIT_WORKERS") {
            if let Ok(workers) = val.parse::<usize>() {
                self.pipeline.max_workers = workers.max(1);
                tracing::debug!("Override pipeline.max_workers from env: {}", workers);
            }
        }

        if let Ok(val) = std::env::var("PLUGAUDIT_STORE") {
            self.storage.backend = val.parse()?;
            tracing::debug!("Override storage.backend from env: {}", val);
        }

        if let Ok(val) = std::env::var("PLUGAUDIT_STORE_PATH") {
            tracing::debug!("Override storage.path from env: {}", val);
            self.storage.path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("PLUGAUDIT_SAVE_SOURCES") {
            if let Ok(save) = val.parse() {
                self.pipeline.save_sources = save;
                tracing::debug!("Override pipeline.save_sources from env: {}", save);
            }
        }

        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> ConfigResult<()> {
        let config_dir = path.parent().ok_or_else(|| ConfigError::InvalidValue {
            field: "config_path".to_string(),
            reason: "no parent directory".to_string(),
        })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Rebase relative store and archive paths under `dir`. Absolute paths are kept.
    #[must_use]
    pub fn rooted_at(mut self, dir: &Path) -> Self {
        if self.storage.path.is_relative() {
            self.storage.path = dir.join(&self.storage.path);
        }
        if self.pipeline.archive_dir.is_relative() {
            self.pipeline.archive_dir = dir.join(&self.pipeline.archive_dir);
        }
        self
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/plugaudit/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("org", "plugaudit", "plugaudit").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/plugaudit`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("org", "plugaudit", "plugaudit").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

/// Bundle download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Download URL with a `{slug}` placeholder
    pub bundle_url_template: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Retries after the first attempt for 5xx and transport failures
    pub max_retries: u32,
    /// Base backoff in milliseconds, doubled on every retry
    pub backoff_base_ms: u64,
    /// User agent string
    pub user_agent: String,
    /// Parent directory for scratch extraction (system temp dir when unset)
    pub scratch_dir: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            bundle_url_template: "https://downloads.wordpress.org/plugin/{slug}.latest-stable.zip"
                .to_string(),
            timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 3000,
            user_agent: concat!("plugaudit/", env!("CARGO_PKG_VERSION")).to_string(),
            scratch_dir: None,
        }
    }
}

/// A named signature pattern from the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Rule name reported in match evidence
    pub name: String,
    /// Byte regex, compiled case-insensitively
    pub pattern: String,
}

/// Signature scanning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    /// File extensions (without dot) that are scanned
    pub extensions: Vec<String>,
    /// Files above this size in bytes are skipped
    pub max_file_size: u64,
    /// Signature rules; the built-in upload rule is used when empty
    pub rules: Vec<RuleConfig>,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self {
            extensions: ["php", "js", "html", "twig"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            max_file_size: 100 * 1024 * 1024,
            rules: Vec::new(),
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum identifiers processed concurrently
    pub max_workers: usize,
    /// Copy scanned sources of every bundle into `archive_dir`
    pub save_sources: bool,
    /// Destination root for archived sources
    pub archive_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            save_sources: true,
            archive_dir: PathBuf::from("saved_sources"),
        }
    }
}

/// Result store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Embedded `SQLite` database
    Sqlite,
    /// Flat CSV spreadsheet
    Csv,
    /// Process-local map, nothing survives a restart
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "csv" => Ok(Self::Csv),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "storage.backend".to_string(),
                reason: format!("unknown backend '{other}'"),
            }),
        }
    }
}

/// Result store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which backend to open
    pub backend: StorageBackend,
    /// Database or CSV file path (ignored for the memory backend)
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from("plugin_upload_audit.db"),
        }
    }
}

/// Identifier discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Keyword search URL with `{kw}` and `{page}` placeholders
    pub search_url_template: String,
    /// Category listing URL with `{category}` and `{page}` placeholders
    pub category_url_template: String,
    /// Regex whose first capture group is an identifier
    pub identifier_pattern: String,
    /// Hard ceiling on fetched pages per crawl
    pub max_pages: u32,
    /// Consecutive pages without new identifiers before giving up
    pub max_empty_pages: u32,
    /// Attempts per page when rate limited or on transient failures
    pub fetch_attempts: u32,
    /// Listing page size used by the total-count estimate
    pub items_per_page: u64,
    /// Highest page probed by the total-count estimate
    pub probe_ceiling: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Default identifier limit for a search
    pub default_limit: usize,
    /// Minimum delay between page requests in milliseconds
    pub min_interval_ms: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            search_url_template: "https://wordpress.org/plugins/search/{kw}/page/{page}/"
                .to_string(),
            category_url_template: "https://wordpress.org/plugins/browse/{category}/page/{page}/"
                .to_string(),
            identifier_pattern: r"https://wordpress\.org/plugins/([a-z0-9\-]+)/".to_string(),
            max_pages: 50,
            max_empty_pages: 3,
            fetch_attempts: 3,
            items_per_page: 24,
            probe_ceiling: 4096,
            timeout_secs: 30,
            default_limit: 100,
            min_interval_ms: 1000,
            user_agent: concat!("plugaudit/", env!("CARGO_PKG_VERSION")).to_string(),
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
        assert_eq!(config.pipeline.max_workers, 8);
        assert_eq!(config.retrieval.max_retries, 3);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.discovery.max_empty_pages, 3);
        assert_eq!(config.discovery.max_pages, 50);
        assert!(config.retrieval.bundle_url_template.contains("{slug}"));
    }

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("[retrieval]"));
        assert!(toml_str.contains("[pipeline]"));
        assert!(toml_str.contains("[discovery]"));

        let parsed: AppConfig = toml::from_str(&toml_str).expect("parse serialized config");
        assert_eq!(parsed.pipeline.max_workers, config.pipeline.max_workers);
        assert_eq!(
            parsed.discovery.identifier_pattern,
            config.discovery.identifier_pattern
        );
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().expect("create temp dir");
        let config_path = tmp.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Csv;
        config.storage.path = PathBuf::from("audit.csv");
        config.scanning.rules.push(RuleConfig {
            name: "eval".to_string(),
            pattern: r"\beval\s*\(".to_string(),
        });

        config.save_to(&config_path).expect("save config");
        assert!(config_path.is_file());

        let loaded = AppConfig::load_from(&config_path).expect("load config");
        assert_eq!(loaded.storage.backend, StorageBackend::Csv);
        assert_eq!(loaded.scanning.rules.len(), 1);
        assert_eq!(loaded.scanning.rules[0].name, "eval");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = TempDir::new().expect("create temp dir");
        let loaded = AppConfig::load_from(&tmp.path().join("absent.toml")).expect("load");
        assert_eq!(loaded.pipeline.max_workers, 8);
        assert_eq!(loaded.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn test_load_invalid_toml() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[pipeline\nmax_workers = ").expect("write config file");
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_rooted_at() {
        let root = Path::new("/var/lib/plugaudit");
        let config = AppConfig::default().rooted_at(root);
        assert_eq!(config.storage.path, root.join("plugin_upload_audit.db"));
        assert_eq!(config.pipeline.archive_dir, root.join("saved_sources"));

        let mut absolute = AppConfig::default();
        absolute.storage.path = PathBuf::from("/srv/audit.db");
        let absolute = absolute.rooted_at(root);
        assert_eq!(absolute.storage.path, PathBuf::from("/srv/audit.db"));
    }

    #[test]
    fn test_env_overrides() {
        const VARS: [&str; 4] = [
            "PLUGAUDIT_WORKERS",
            "PLUGAUDIT_STORE",
            "PLUGAUDIT_STORE_PATH",
            "PLUGAUDIT_SAVE_SOURCES",
        ];

        std::env::set_var("PLUGAUDIT_WORKERS", "0");
        std::env::set_var("PLUGAUDIT_STORE", "CSV");
        std::env::set_var("PLUGAUDIT_STORE_PATH", "/tmp/results.csv");
        std::env::set_var("PLUGAUDIT_SAVE_SOURCES", "false");

        let mut config = AppConfig::default();
        config.apply_env_overrides().expect("apply overrides");
        assert_eq!(config.pipeline.max_workers, 1);
        assert_eq!(config.storage.backend, StorageBackend::Csv);
        assert_eq!(config.storage.path, PathBuf::from("/tmp/results.csv"));
        assert!(!config.pipeline.save_sources);

        // Unparsable numbers and booleans leave the value alone
        std::env::set_var("PLUGAUDIT_WORKERS", "many");
        std::env::set_var("PLUGAUDIT_SAVE_SOURCES", "maybe");
        std::env::set_var("PLUGAUDIT_STORE", "xlsx");
        let mut config = AppConfig::default();
        let err = config.apply_env_overrides().expect_err("unknown backend");
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "storage.backend"));
        assert_eq!(config.pipeline.max_workers, 8);

        for var in VARS {
            std::env::remove_var(var);
        }
        let mut config = AppConfig::default();
        config.apply_env_overrides().expect("no overrides");
        assert_eq!(config.pipeline.max_workers, 8);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert!(config.pipeline.save_sources);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
[pipeline]
max_workers = 2

[storage]
backend = "memory"
"#;

        let config: AppConfig = toml::from_str(toml_str).expect("parse partial config");
        assert_eq!(config.pipeline.max_workers, 2);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        // These should be defaults
        assert!(config.pipeline.save_sources);
        assert_eq!(config.scanning.extensions.len(), 4);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!(
            "SQLite".parse::<StorageBackend>().expect("parse"),
            StorageBackend::Sqlite
        );
        assert_eq!(
            " csv ".parse::<StorageBackend>().expect("parse"),
            StorageBackend::Csv
        );
        assert!("xlsx".parse::<StorageBackend>().is_err());
    }
}
