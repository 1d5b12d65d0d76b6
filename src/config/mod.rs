//! Configuration management for batch-export
//!
//! Configuration is read from a TOML file and then overridden by command-line
//! arguments. Every field has a default, so an empty or missing file yields
//! a working configuration.
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values
//!
//! The `[merge.<product>]` tables add products to, or replace products in,
//! the built-in merge registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::export::registry::{MergeConfig, MergeRegistry};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Export limits and batch sizing
    #[serde(default)]
    pub export: ExportConfig,

    /// Query result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Column names used by the local CSV source
    #[serde(default)]
    pub source: SourceConfig,

    /// Merge configurations added to or replacing the built-in products
    #[serde(default)]
    pub merge: BTreeMap<String, MergeConfig>,
}

/// Export limits and batch sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Largest row count that may be exported
    #[serde(default = "default_max_rows")]
    pub max_rows: u64,

    /// Rows fetched for the preview
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,

    /// How the export window is cut into batches
    #[serde(default)]
    pub split_mode: SplitMode,

    /// Batch length per storefront count
    #[serde(default)]
    pub sizing: BatchSizing,

    /// Draw progress bars and spinners
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

/// Batch splitting strategy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitMode {
    /// Fixed windows of `batch_days` days
    #[default]
    Days,
    /// Calendar months
    Month,
}

/// Storefront-count based batch length
///
/// More storefronts mean more rows per day, so the window shrinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSizing {
    /// Upper storefront count of the small tier
    #[serde(default = "default_small_max_storefronts")]
    pub small_max_storefronts: usize,

    #[serde(default = "default_small_batch_days")]
    pub small_batch_days: u32,

    /// Upper storefront count of the medium tier
    #[serde(default = "default_medium_max_storefronts")]
    pub medium_max_storefronts: usize,

    #[serde(default = "default_medium_batch_days")]
    pub medium_batch_days: u32,

    #[serde(default = "default_large_batch_days")]
    pub large_batch_days: u32,
}

/// Query cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable result caching
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Entry lifetime in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

/// Local CSV source layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Column holding the row date (`YYYY-MM-DD`)
    #[serde(default = "default_date_column")]
    pub date_column: String,

    /// Column holding the storefront identifier
    #[serde(default = "default_storefront_column")]
    pub storefront_column: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_max_rows() -> u64 {
    50_000
}

fn default_preview_rows() -> usize {
    500
}

fn default_show_progress() -> bool {
    true
}

fn default_small_max_storefronts() -> usize {
    2
}

fn default_small_batch_days() -> u32 {
    14
}

fn default_medium_max_storefronts() -> usize {
    5
}

fn default_medium_batch_days() -> u32 {
    7
}

fn default_large_batch_days() -> u32 {
    7
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_date_column() -> String {
    "date".to_string()
}

fn default_storefront_column() -> String {
    "storefront_id".to_string()
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_rows: default_max_rows(),
            preview_rows: default_preview_rows(),
            split_mode: SplitMode::default(),
            sizing: BatchSizing::default(),
            show_progress: default_show_progress(),
        }
    }
}

impl Default for BatchSizing {
    fn default() -> Self {
        Self {
            small_max_storefronts: default_small_max_storefronts(),
            small_batch_days: default_small_batch_days(),
            medium_max_storefronts: default_medium_max_storefronts(),
            medium_batch_days: default_medium_batch_days(),
            large_batch_days: default_large_batch_days(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            date_column: default_date_column(),
            storefront_column: default_storefront_column(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.display().to_string())
            } else {
                ConfigError::InvalidFormat(format!("{}: {}", path.display(), e))
            }
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Load configuration from an explicit path or the default location
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Self::default_config_path();
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".batch-export")
            .join("config.toml")
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        let export = &self.export;
        if export.max_rows == 0 {
            return Err(invalid("export.max_rows", export.max_rows));
        }
        if export.preview_rows == 0 {
            return Err(invalid("export.preview_rows", export.preview_rows));
        }

        let sizing = &export.sizing;
        for (field, days) in [
            ("export.sizing.small_batch_days", sizing.small_batch_days),
            ("export.sizing.medium_batch_days", sizing.medium_batch_days),
            ("export.sizing.large_batch_days", sizing.large_batch_days),
        ] {
            if days == 0 {
                return Err(invalid(field, days));
            }
        }
        if sizing.medium_max_storefronts < sizing.small_max_storefronts {
            return Err(invalid(
                "export.sizing.medium_max_storefronts",
                sizing.medium_max_storefronts,
            ));
        }

        if self.source.date_column.is_empty() {
            return Err(ConfigError::MissingField("source.date_column".to_string()).into());
        }

        self.merge_registry().validate()
    }

    /// Built-in merge registry with the `[merge]` tables applied
    pub fn merge_registry(&self) -> MergeRegistry {
        MergeRegistry::builtin().with_overrides(&self.merge)
    }

    /// Cache entry lifetime as Duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }
}

fn invalid(field: &str, value: impl ToString) -> crate::error::ExportError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl BatchSizing {
    /// Batch length for a number of selected storefronts
    pub fn batch_days_for(&self, num_storefronts: usize) -> u32 {
        if num_storefronts <= self.small_max_storefronts {
            self.small_batch_days
        } else if num_storefronts <= self.medium_max_storefronts {
            self.medium_batch_days
        } else {
            self.large_batch_days
        }
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
