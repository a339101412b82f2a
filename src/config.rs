//! Configuration management for nitfinder
//!
//! Configuration is loaded from `./config/nitfinder.toml` when present. The
//! same file is compiled into the binary and used when no file exists, so the
//! template is the only place defaults live.

use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::extract::{ExtractError, FieldExtractor, FieldRule};

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/nitfinder.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/nitfinder.toml");

/// Placeholder replaced by the normalized identifier in the registry URL
pub const NIT_PLACEHOLDER: &str = "{nit}";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid URL in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("URL template must contain the {{nit}} placeholder: {0}")]
    MissingPlaceholder(String),

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Invalid extraction rules: {0}")]
    InvalidExtraction(#[from] ExtractError),
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub registry: RegistryConfig,
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub geo: GeoConfig,
    pub extraction: ExtractionConfig,
}

/// Registry endpoint and HTTP client settings
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Lookup URL with a `{nit}` placeholder
    pub url_template: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

/// How lookups are spaced out
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PacingStrategy {
    /// Wait `delay_ms` after every lookup
    FixedDelay,
    /// Allow `requests_per_minute` lookups, one at a time
    TokenBucket,
}

/// Request pacing configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub strategy: PacingStrategy,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub requests_per_minute: u32,
}

/// What to do with identifiers that are empty or not numeric
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InvalidIdentifierPolicy {
    /// Emit a "Sin información" row and keep going
    #[default]
    Degrade,
    /// Refuse to start the run
    Abort,
}

/// Batch run behavior
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub invalid_identifier_policy: InvalidIdentifierPolicy,
    /// Overall time budget in seconds, 0 disables it
    #[serde(default)]
    pub max_duration_secs: u64,
}

/// Input spreadsheet layout
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    #[serde(default = "default_identifier_column")]
    pub identifier_column: String,
}

fn default_identifier_column() -> String {
    "documento".to_string()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            identifier_column: default_identifier_column(),
        }
    }
}

/// Column names of the DANE reference table
#[derive(Debug, Clone, Deserialize)]
pub struct GeoConfig {
    #[serde(default = "default_department_name_column")]
    pub department_name_column: String,
    #[serde(default = "default_department_code_column")]
    pub department_code_column: String,
    #[serde(default = "default_municipality_name_column")]
    pub municipality_name_column: String,
    #[serde(default = "default_municipality_code_column")]
    pub municipality_code_column: String,
    /// Reference table used when none is given on the command line
    #[serde(default)]
    pub reference_path: String,
}

fn default_department_name_column() -> String {
    "Nombre departamento".to_string()
}

fn default_department_code_column() -> String {
    "Código departamento".to_string()
}

fn default_municipality_name_column() -> String {
    "Nombre municipio".to_string()
}

fn default_municipality_code_column() -> String {
    "Código municipio".to_string()
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            department_name_column: default_department_name_column(),
            department_code_column: default_department_code_column(),
            municipality_name_column: default_municipality_name_column(),
            municipality_code_column: default_municipality_code_column(),
            reference_path: String::new(),
        }
    }
}

impl GeoConfig {
    /// Configured default reference table, if any
    pub fn reference_path(&self) -> Option<PathBuf> {
        let path = self.reference_path.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

/// Field extraction rules, tried in order per field
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    pub fields: Vec<FieldRule>,
}

impl AppConfig {
    /// Load configuration
    ///
    /// An explicit path must exist. Without one, `./config/nitfinder.toml` is
    /// used when present and the built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None if Path::new(CONFIG_PATH).exists() => Self::load_from_path(Path::new(CONFIG_PATH)),
            None => {
                debug!("No configuration file at {}, using built-in defaults", CONFIG_PATH);
                Self::from_toml_str(DEFAULT_CONFIG)
            }
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url_template(&self.registry.url_template)?;

        if self.registry.user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "registry.user_agent".to_string(),
            });
        }
        if self.registry.request_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "registry.request_timeout_secs".to_string(),
            });
        }
        if self.input.identifier_column.trim().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "input.identifier_column".to_string(),
            });
        }

        // Every field needs a rule and every selector must compile
        FieldExtractor::new(&self.extraction.fields)?;

        Ok(())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }
}

/// Check a registry URL template for scheme and placeholder
pub fn validate_url_template(template: &str) -> Result<(), ConfigError> {
    if !(template.starts_with("https://") || template.starts_with("http://")) {
        return Err(ConfigError::InvalidUrl {
            field: "registry.url_template".to_string(),
            url: template.to_string(),
        });
    }
    if !template.contains(NIT_PLACEHOLDER) {
        return Err(ConfigError::MissingPlaceholder(template.to_string()));
    }
    Ok(())
}
