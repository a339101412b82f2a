use anyhow::{bail, Context, Result};
use csv::Writer;
use rust_xlsxwriter::{Format, Workbook};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::lookup::ResultTable;

/// Default output file name
pub const DEFAULT_OUTPUT: &str = "resultado_consultas.xlsx";

const WORKSHEET_NAME: &str = "Resultados";

/// Output formats, chosen from the output file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Xlsx,
    Csv,
    Json,
}

impl OutputFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref() {
            Some("xlsx") => Some(Self::Xlsx),
            Some("csv") => Some(Self::Csv),
            Some("json") => Some(Self::Json),
            _ => None,
        }
    }
}

/// Write the result table in the format matching the file extension
pub fn export_results(table: &ResultTable, output_path: &Path) -> Result<()> {
    match OutputFormat::from_path(output_path) {
        Some(OutputFormat::Xlsx) => export_xlsx(table, output_path),
        Some(OutputFormat::Csv) => export_csv(table, output_path),
        Some(OutputFormat::Json) => export_json(table, output_path),
        None => bail!(
            "Cannot determine output format from file extension. Expected .xlsx, .csv or .json: {}",
            output_path.display()
        ),
    }
}

pub fn export_csv(table: &ResultTable, output_path: &Path) -> Result<()> {
    debug!("Exporting {} rows to CSV: {}", table.len(), output_path.display());

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(table.headers())?;
    for result in table.rows() {
        wtr.write_record(result.cells())?;
    }

    wtr.flush()?;
    info!("Successfully exported {} rows to CSV: {}", table.len(), output_path.display());

    Ok(())
}

pub fn export_xlsx(table: &ResultTable, output_path: &Path) -> Result<()> {
    debug!("Exporting {} rows to XLSX: {}", table.len(), output_path.display());

    let mut workbook = build_workbook(table)?;
    workbook
        .save(output_path)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    info!("Successfully exported {} rows to XLSX: {}", table.len(), output_path.display());
    Ok(())
}

fn build_workbook(table: &ResultTable) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(WORKSHEET_NAME)?;

    for (col, header) in table.headers().iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *header, &header_format)?;
    }

    // Every cell is text so identifiers and DANE codes keep their leading zeros
    for (index, result) in table.rows().iter().enumerate() {
        let row = index as u32 + 1;
        for (col, cell) in result.cells().iter().enumerate() {
            worksheet.write_string(row, col as u16, *cell)?;
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    worksheet.autofit();

    Ok(workbook)
}

pub fn export_json(table: &ResultTable, output_path: &Path) -> Result<()> {
    debug!("Exporting {} rows to JSON: {}", table.len(), output_path.display());

    let json_string = serde_json::to_string_pretty(table.rows())?;

    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    file.write_all(json_string.as_bytes())?;

    info!("Successfully exported {} rows to JSON: {}", table.len(), output_path.display());

    Ok(())
}
