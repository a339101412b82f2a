//! Batch lookup of identifiers against the registry
//!
//! Rows are processed strictly in input order, one request at a time:
//! validate, fetch, extract, resolve, record. A failing row is recorded with
//! sentinel values and the batch moves on. The run stops early only when the
//! cancellation flag is raised or the time budget runs out; rows not reached
//! are still emitted as `skipped` so the output has one row per input row.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::{AppConfig, InvalidIdentifierPolicy};
use crate::extract::{ExtractError, ExtractedFields, Field, FieldExtractor};
use crate::geo::GeoResolver;
use crate::identifier::{clean_identifier, normalize_identifier, IdentifierError, Nit};
use crate::lookup::{LookupResult, ResultTable, RowStatus, Sentinel};
use crate::rate_limit::RequestGate;
use crate::registry::RegistryClient;

/// An identifier rejected under the abort policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIdentifier {
    /// 1-based input row
    pub row: usize,
    pub value: String,
    pub error: IdentifierError,
}

impl fmt::Display for InvalidIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: '{}' ({})", self.row, self.value, self.error)
    }
}

fn list_invalid(invalid: &[InvalidIdentifier]) -> String {
    invalid.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; ")
}

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("{} invalid identifier(s), no lookups were made: {}", .0.len(), list_invalid(.0))]
    InvalidIdentifiers(Vec<InvalidIdentifier>),

    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Extraction(#[from] ExtractError),
}

/// Cooperative stop signal checked between rows
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a run ended before the last row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::DeadlineExceeded => write!(f, "time budget exceeded"),
        }
    }
}

/// Receives per-row progress from a running batch
pub trait ProgressReporter: Send + Sync {
    fn batch_started(&self, _total: usize) {}

    fn row_started(&self, _row: usize, _total: usize, _identifier: &str) {}

    fn row_finished(&self, _row: usize, _total: usize, _result: &LookupResult) {}

    fn batch_finished(&self, _summary: &BatchSummary) {}
}

/// Reporter that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// Summary of a batch run
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Number of input rows
    pub total_rows: usize,
    pub found: usize,
    pub partial: usize,
    pub empty: usize,
    pub not_found: usize,
    pub errors: usize,
    pub invalid: usize,
    pub skipped: usize,
    /// Set when the run stopped before the last row
    pub stop_reason: Option<StopReason>,
    /// Total batch duration in seconds
    pub total_duration_secs: f64,
    /// Timestamp when batch started
    pub started_at: String,
    /// Timestamp when batch completed
    pub completed_at: String,
}

impl BatchSummary {
    pub fn new() -> Self {
        Self {
            total_rows: 0,
            found: 0,
            partial: 0,
            empty: 0,
            not_found: 0,
            errors: 0,
            invalid: 0,
            skipped: 0,
            stop_reason: None,
            total_duration_secs: 0.0,
            started_at: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            completed_at: String::new(),
        }
    }

    /// Fill in counts and end time from the finished table
    pub fn finalize(&mut self, table: &ResultTable, stop_reason: Option<StopReason>, duration: Duration) {
        self.completed_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        self.total_rows = table.len();
        self.found = table.count(RowStatus::Found);
        self.partial = table.count(RowStatus::Partial);
        self.empty = table.count(RowStatus::Empty);
        self.not_found = table.count(RowStatus::NotFound);
        self.errors = table.count(RowStatus::Error);
        self.invalid = table.count(RowStatus::Invalid);
        self.skipped = table.count(RowStatus::Skipped);
        self.stop_reason = stop_reason;
        self.total_duration_secs = duration.as_secs_f64();
    }

    /// Rows for which a registry request was made
    pub fn lookups_performed(&self) -> usize {
        self.found + self.partial + self.empty + self.not_found + self.errors
    }

    pub fn was_cancelled(&self) -> bool {
        self.stop_reason.is_some()
    }
}

impl Default for BatchSummary {
    fn default() -> Self {
        Self::new()
    }
}

/// Export batch summary to JSON file
pub fn export_batch_summary(summary: &BatchSummary, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)
        .context("Failed to serialize batch summary")?;

    fs::write(output_path, json)
        .context(format!("Failed to write batch summary to: {}", output_path.display()))?;

    Ok(())
}

/// Knobs that change how a run treats its input
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub invalid_policy: InvalidIdentifierPolicy,
    /// Overall time budget, checked between rows
    pub max_duration: Option<Duration>,
}

impl BatchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            invalid_policy: config.batch.invalid_identifier_policy,
            max_duration: (config.batch.max_duration_secs > 0)
                .then(|| Duration::from_secs(config.batch.max_duration_secs)),
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct BatchRun {
    pub table: ResultTable,
    pub summary: BatchSummary,
}

/// Drives the per-row lookup pipeline
pub struct BatchRunner {
    client: RegistryClient,
    extractor: FieldExtractor,
    resolver: Option<GeoResolver>,
    gate: RequestGate,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(
        client: RegistryClient,
        extractor: FieldExtractor,
        resolver: Option<GeoResolver>,
        gate: RequestGate,
        options: BatchOptions,
    ) -> Self {
        Self {
            client,
            extractor,
            resolver,
            gate,
            options,
        }
    }

    /// Build a runner from validated configuration
    pub fn from_config(config: &AppConfig, resolver: Option<GeoResolver>) -> Result<Self, BatchError> {
        Ok(Self::new(
            RegistryClient::new(&config.registry)?,
            FieldExtractor::new(&config.extraction.fields)?,
            resolver,
            RequestGate::from_config(&config.rate_limit),
            BatchOptions::from_config(config),
        ))
    }

    pub fn has_geo_codes(&self) -> bool {
        self.resolver.is_some()
    }

    /// Look up every identifier, in order
    pub async fn run(
        &mut self,
        identifiers: &[String],
        progress: &dyn ProgressReporter,
        cancel: &CancellationFlag,
    ) -> Result<BatchRun, BatchError> {
        let total = identifiers.len();
        let parsed: Vec<Result<Nit, IdentifierError>> =
            identifiers.iter().map(|raw| normalize_identifier(raw)).collect();

        if self.options.invalid_policy == InvalidIdentifierPolicy::Abort {
            let invalid: Vec<InvalidIdentifier> = identifiers
                .iter()
                .zip(&parsed)
                .enumerate()
                .filter_map(|(index, (raw, parsed))| {
                    parsed.as_ref().err().map(|error| InvalidIdentifier {
                        row: index + 1,
                        value: raw.clone(),
                        error: error.clone(),
                    })
                })
                .collect();
            if !invalid.is_empty() {
                return Err(BatchError::InvalidIdentifiers(invalid));
            }
        }

        info!("Starting batch of {} identifiers ({})", total, self.gate.describe());
        let started = Instant::now();
        let deadline = self.options.max_duration.map(|budget| started + budget);
        let mut summary = BatchSummary::new();
        let mut table = ResultTable::with_capacity(self.has_geo_codes(), total);
        let mut stop_reason = None;

        progress.batch_started(total);

        for (index, (raw, parsed)) in identifiers.iter().zip(parsed).enumerate() {
            let row = index + 1;

            if stop_reason.is_none() {
                if cancel.is_cancelled() {
                    stop_reason = Some(StopReason::Cancelled);
                } else if deadline.is_some_and(|d| Instant::now() >= d) {
                    stop_reason = Some(StopReason::DeadlineExceeded);
                }
                if let Some(reason) = stop_reason {
                    info!("Batch stopped at row {}/{} ({}), remaining rows are skipped", row, total, reason);
                }
            }

            let result = match (stop_reason, parsed) {
                (Some(_), _) => self.sentinel_result(row, clean_identifier(raw), Sentinel::NoInformation, RowStatus::Skipped),
                (None, Err(error)) => {
                    debug!("Row {}: invalid identifier '{}': {}", row, raw.trim(), error);
                    self.sentinel_result(row, clean_identifier(raw), Sentinel::NoInformation, RowStatus::Invalid)
                }
                (None, Ok(nit)) => {
                    progress.row_started(row, total, nit.as_str());
                    self.lookup_one(row, &nit).await
                }
            };

            progress.row_finished(row, total, &result);
            table.push(result);
        }

        summary.finalize(&table, stop_reason, started.elapsed());
        info!(
            "Batch finished: {} rows, {} lookups in {:.1}s",
            summary.total_rows,
            summary.lookups_performed(),
            summary.total_duration_secs
        );
        progress.batch_finished(&summary);

        Ok(BatchRun { table, summary })
    }

    /// Fetch, extract and resolve a single valid identifier
    pub async fn lookup_one(&mut self, row: usize, nit: &Nit) -> LookupResult {
        self.gate.before_request().await;
        let fetched = self.client.fetch(nit).await;
        self.gate.after_request().await;

        let page = match fetched {
            Ok(page) => page,
            Err(failure) => {
                debug!("Row {}: lookup for {} failed: {}", row, nit, failure);
                return self.sentinel_result(row, nit.to_string(), failure.sentinel(), failure.row_status());
            }
        };

        let fields = self.extractor.extract(&page.body);
        let status = match fields.found_count() {
            0 => RowStatus::Empty,
            n if n == Field::ALL.len() => RowStatus::Found,
            _ => RowStatus::Partial,
        };
        debug!("Row {}: {} fields extracted from {} (HTTP {})", row, fields.found_count(), page.url, page.status);

        let address = fields.value_or_sentinel(Field::Address);
        let city = place_name(&fields, Field::City);
        let department = place_name(&fields, Field::Department);
        let geo = self
            .resolver
            .as_ref()
            .map(|resolver| resolver.resolve(&department, &city));

        LookupResult {
            row,
            identifier: nit.to_string(),
            address,
            city,
            department,
            geo,
            status,
        }
    }

    fn sentinel_result(&self, row: usize, identifier: String, sentinel: Sentinel, status: RowStatus) -> LookupResult {
        LookupResult::sentinel_row(row, identifier, sentinel, status, self.has_geo_codes())
    }
}

/// City and department are recorded trimmed and uppercased
fn place_name(fields: &ExtractedFields, field: Field) -> String {
    match fields.get(field) {
        Some(name) => name.trim().to_uppercase(),
        None => Sentinel::NoInformation.to_string(),
    }
}
