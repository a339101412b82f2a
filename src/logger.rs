use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};

use crate::batch::{BatchSummary, ProgressReporter};
use crate::lookup::{LookupResult, RowStatus};

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Summary = 0,   // Batch start/end and failed rows (default)
    Detailed = 1,  // Every row
    Debug = 2,     // Everything, including extraction details
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }

    /// Default `tracing` filter directive for this verbosity
    pub fn tracing_directive(&self) -> &'static str {
        match self {
            VerbosityLevel::Summary => "warn",
            VerbosityLevel::Detailed => "nitfinder=info",
            VerbosityLevel::Debug => "nitfinder=debug",
        }
    }
}

/// User-facing progress and log output for a batch run
#[derive(Clone)]
pub struct BatchLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<Mutex<Option<ProgressBar>>>,
    run_metadata: Arc<Mutex<RunMetadata>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<PathBuf>,
}

#[derive(Default, Clone)]
struct RunMetadata {
    start_time: Option<SystemTime>,
    end_time: Option<SystemTime>,
    input_file: String,
    output_file: String,
    geo_reference: Option<String>,
    summary: Option<BatchSummary>,
}

impl BatchLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(Mutex::new(None)),
            run_metadata: Arc::new(Mutex::new(RunMetadata::default())),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: impl Into<PathBuf>) -> Self {
        Self {
            log_file_path: Some(log_file_path.into()),
            ..Self::new(verbosity)
        }
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("WARN", message);
        }
    }

    pub fn error(&self, message: &str) {
        // Errors are shown at every verbosity
        self.print_message("ERROR", message);
    }

    pub fn detail(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("INFO", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let timestamp = Local::now().format("%H:%M:%S%.3f");
        let msg = format!("[{}] {}: {}", timestamp, level, message);

        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        // Print above the progress bar when one is drawn
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref().filter(|pb| !pb.is_hidden()) {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    pub fn start_progress(&self, total_steps: u64) {
        let pb = ProgressBar::new(total_steps);

        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message("Starting...");

        if let Ok(mut guard) = self.progress_bar.lock() {
            *guard = Some(pb);
        }
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.start_time = Some(SystemTime::now());
        }
    }

    pub fn update_progress(&self, message: &str) {
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_message(message.to_string());
            }
        }
    }

    pub fn set_progress_position(&self, position: u64) {
        if let Ok(guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_position(position);
            }
        }
    }

    pub fn finish_progress(&self, final_message: &str) {
        if let Ok(mut guard) = self.progress_bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.end_time = Some(SystemTime::now());
        }

        self.info(final_message);
    }

    pub fn record_input_file(&self, path: &Path) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.input_file = path.display().to_string();
        }
    }

    pub fn record_geo_reference(&self, path: &Path) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.geo_reference = Some(path.display().to_string());
        }
    }

    pub fn record_output_file(&self, path: &Path) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.output_file = path.display().to_string();
        }
    }

    pub fn log_export_success(&self, path: &Path) {
        self.record_output_file(path);
        self.info(&format!("Results exported: {}", path.display()));
    }

    /// Print the end-of-run summary to stdout
    pub fn print_final_summary(&self) {
        let metadata = match self.run_metadata.lock() {
            Ok(metadata) => metadata.clone(),
            Err(_) => return,
        };

        let mut out = io::stdout().lock();
        let _ = write!(out, "\x1b[2K\r");
        let _ = writeln!(out, "{}", render_summary(&metadata));
        let _ = out.flush();
    }

    /// Export all collected logs to the configured file
    pub fn export_logs(&self) -> io::Result<()> {
        let Some(log_file_path) = &self.log_file_path else {
            return Ok(());
        };
        let buffer = match self.log_buffer.lock() {
            Ok(buffer) => buffer.clone(),
            Err(_) => return Ok(()),
        };

        if let Some(parent) = log_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_file_path)?;

        for log_entry in &buffer {
            writeln!(file, "{}", log_entry)?;
        }
        file.flush()
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}

fn render_summary(metadata: &RunMetadata) -> String {
    let mut lines = vec![String::new(), "=== CONSULTA SUMMARY ===".to_string()];

    if let (Some(start), Some(end)) = (metadata.start_time, metadata.end_time) {
        let duration = end.duration_since(start).unwrap_or_default();
        lines.push(format!("Duration: {:.2}s", duration.as_secs_f64()));
    }
    if !metadata.input_file.is_empty() {
        lines.push(format!("Input: {}", metadata.input_file));
    }
    if let Some(reference) = &metadata.geo_reference {
        lines.push(format!("DANE reference: {}", reference));
    }

    if let Some(summary) = &metadata.summary {
        lines.push(format!("Rows: {}", summary.total_rows));
        lines.push(format!("  Found:      {}", summary.found));
        lines.push(format!("  Partial:    {}", summary.partial));
        lines.push(format!("  Empty page: {}", summary.empty));
        lines.push(format!("  Not found:  {}", summary.not_found));
        lines.push(format!("  Errors:     {}", summary.errors));
        lines.push(format!("  Invalid:    {}", summary.invalid));
        lines.push(format!("  Skipped:    {}", summary.skipped));
        if let Some(reason) = summary.stop_reason {
            lines.push(format!("Stopped early: {}", reason));
        }
    }

    if !metadata.output_file.is_empty() {
        lines.push(format!("Results Exported: {}", metadata.output_file));
    }
    lines.push("========================".to_string());
    lines.join("\n")
}

impl ProgressReporter for BatchLogger {
    fn batch_started(&self, total: usize) {
        self.start_progress(total as u64);
        self.info(&format!("Looking up {} identifiers", total));
    }

    fn row_started(&self, row: usize, total: usize, identifier: &str) {
        self.update_progress(&format!("[{}/{}] {}", row, total, identifier));
    }

    fn row_finished(&self, row: usize, total: usize, result: &LookupResult) {
        self.set_progress_position(row as u64);
        let line = format!(
            "[{}/{}] {}: {} / {} / {}",
            row, total, result.identifier, result.address, result.city, result.department
        );
        match result.status {
            RowStatus::Found | RowStatus::Partial | RowStatus::Skipped => self.detail(&line),
            RowStatus::Empty => self.detail(&format!("{} (no fields on page)", line)),
            RowStatus::NotFound => self.warn(&format!("[{}/{}] {}: not found in registry", row, total, result.identifier)),
            RowStatus::Error => self.warn(&format!("[{}/{}] {}: lookup failed", row, total, result.identifier)),
            RowStatus::Invalid => self.warn(&format!("[{}/{}] '{}': invalid identifier", row, total, result.identifier)),
        }
    }

    fn batch_finished(&self, summary: &BatchSummary) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            metadata.summary = Some(summary.clone());
        }
        let message = match summary.stop_reason {
            Some(reason) => format!(
                "Batch stopped ({}): {} of {} rows looked up",
                reason,
                summary.total_rows - summary.skipped,
                summary.total_rows
            ),
            None => format!("Batch completed: {} rows", summary.total_rows),
        };
        self.finish_progress(&message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::Sentinel;

    #[test]
    fn test_verbosity_from_count() {
        assert_eq!(VerbosityLevel::from_verbose_count(0), VerbosityLevel::Summary);
        assert_eq!(VerbosityLevel::from_verbose_count(1), VerbosityLevel::Detailed);
        assert_eq!(VerbosityLevel::from_verbose_count(5), VerbosityLevel::Debug);
        assert_eq!(VerbosityLevel::Debug.tracing_directive(), "nitfinder=debug");
    }

    #[test]
    fn test_log_buffer_only_with_log_file() {
        let logger = BatchLogger::new(VerbosityLevel::Summary);
        logger.error("boom");
        assert_eq!(logger.get_log_count(), 0);
        assert!(!logger.is_log_export_enabled());
    }

    #[test]
    fn test_export_logs_writes_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.log");
        let logger = BatchLogger::with_log_file(VerbosityLevel::Detailed, &path);

        logger.batch_started(1);
        let result = LookupResult::sentinel_row(1, "900123456", Sentinel::Error, RowStatus::Error, false);
        logger.row_finished(1, 1, &result);
        logger.export_logs().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("Looking up 1 identifiers"));
        assert!(content.contains("[1/1] 900123456: lookup failed"));
    }

    #[test]
    fn test_render_summary_includes_counts() {
        let mut summary = BatchSummary::new();
        summary.total_rows = 3;
        summary.found = 2;
        summary.errors = 1;
        let metadata = RunMetadata {
            output_file: "resultado_consultas.xlsx".to_string(),
            summary: Some(summary),
            ..RunMetadata::default()
        };

        let rendered = render_summary(&metadata);
        assert!(rendered.contains("Rows: 3"));
        assert!(rendered.contains("Found:      2"));
        assert!(rendered.contains("Results Exported: resultado_consultas.xlsx"));
    }
}
