use clap::Parser;
use std::path::PathBuf;

use crate::config::{validate_url_template, AppConfig, ConfigError, InvalidIdentifierPolicy, PacingStrategy};
use crate::export::{OutputFormat, DEFAULT_OUTPUT};

#[derive(Parser, Debug)]
#[command(name = "nitfinder")]
#[command(about = "Looks up the registered address, city and department of Colombian NITs and exports them to a spreadsheet")]
#[command(version)]
pub struct Cli {
    /// Create default configuration file at ./config/nitfinder.toml
    #[arg(long)]
    pub init: bool,

    /// Spreadsheet (.xlsx, .xls, .ods), CSV or JSON file with a 'documento' column
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Output file; the extension selects the format (.xlsx, .csv or .json)
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// DANE reference table used to add department and municipality codes
    #[arg(short = 'g', long, value_name = "FILE")]
    pub geo_codes: Option<PathBuf>,

    /// Configuration file (defaults to ./config/nitfinder.toml, then built-in defaults)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Delay between registry requests in milliseconds (forces the fixed delay strategy)
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Registry URL with a {nit} placeholder
    #[arg(long, value_name = "URL")]
    pub url_template: Option<String>,

    /// What to do with empty or non-numeric identifiers
    #[arg(long, value_enum, value_name = "POLICY")]
    pub invalid_policy: Option<InvalidIdentifierPolicy>,

    /// Stop looking up new rows after this many seconds (0 = no limit)
    #[arg(long, value_name = "SECS")]
    pub max_duration_secs: Option<u64>,

    /// Write a JSON run summary to this file
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Export execution logs to a file (specify file path)
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Verbose logging (use -v for every row, -vv for debug details)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        if self.init {
            return Ok(());
        }

        match &self.input {
            None => return Err("An input file is required (use --input)".to_string()),
            Some(path) if path.as_os_str().is_empty() => return Err("Input path cannot be empty".to_string()),
            _ => {}
        }

        if OutputFormat::from_path(&self.output).is_none() {
            return Err(format!(
                "Output file must end in .xlsx, .csv or .json: {}",
                self.output.display()
            ));
        }

        if self.timeout_secs == Some(0) {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Apply command line overrides on top of the loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) -> Result<(), ConfigError> {
        if let Some(template) = &self.url_template {
            validate_url_template(template)?;
            config.registry.url_template = template.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            config.registry.request_timeout_secs = timeout;
        }
        if let Some(delay) = self.delay_ms {
            config.rate_limit.strategy = PacingStrategy::FixedDelay;
            config.rate_limit.delay_ms = delay;
        }
        if let Some(policy) = self.invalid_policy {
            config.batch.invalid_identifier_policy = policy;
        }
        if let Some(secs) = self.max_duration_secs {
            config.batch.max_duration_secs = secs;
        }
        config.validate()
    }

    /// Reference table from the command line, or the configured default
    pub fn geo_reference_path(&self, config: &AppConfig) -> Option<PathBuf> {
        self.geo_codes.clone().or_else(|| config.geo.reference_path())
    }
}
