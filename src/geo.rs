//! DANE geographic code resolution
//!
//! The reference table ("Códigos DANE") maps department and municipality
//! names to their DANE codes. It is loaded once per run, normalized to
//! uppercase, and handed to a [`GeoResolver`] which owns it for the rest of
//! the run.

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::config::GeoConfig;
use crate::lookup::{is_sentinel, GeoCodes, Sentinel};
use crate::sheet::{self, SheetError};

/// DANE department codes are two digits wide
pub const DEPARTMENT_CODE_WIDTH: usize = 2;
/// DANE municipality codes are five digits wide
pub const MUNICIPALITY_CODE_WIDTH: usize = 5;

/// One row of the reference table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoRecord {
    pub department_name: String,
    pub department_code: String,
    pub municipality_name: String,
    pub municipality_code: String,
}

impl GeoRecord {
    pub fn new(department_name: &str, department_code: &str, municipality_name: &str, municipality_code: &str) -> Self {
        Self {
            department_name: department_name.to_string(),
            department_code: department_code.to_string(),
            municipality_name: municipality_name.to_string(),
            municipality_code: municipality_code.to_string(),
        }
    }
}

/// Uppercase, trim and collapse internal whitespace
pub fn normalize_place_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Left-pad a numeric code to its DANE width; non-numeric codes are kept as written
fn pad_code(code: &str, width: usize) -> String {
    let code = code.trim();
    if !code.is_empty() && code.chars().all(|c| c.is_ascii_digit()) && code.len() < width {
        format!("{:0>width$}", code, width = width)
    } else {
        code.to_uppercase()
    }
}

/// Read-only lookup table of DANE codes
#[derive(Debug, Clone, Default)]
pub struct GeoReference {
    departments: HashMap<String, String>,
    municipalities: HashMap<(String, String), String>,
    record_count: usize,
}

impl GeoReference {
    /// Build the table; on duplicate names the first row wins
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = GeoRecord>,
    {
        let mut reference = Self::default();

        for record in records {
            let department = normalize_place_name(&record.department_name);
            let municipality = normalize_place_name(&record.municipality_name);
            if department.is_empty() {
                continue;
            }
            reference.record_count += 1;

            let department_code = pad_code(&record.department_code, DEPARTMENT_CODE_WIDTH);
            if !department_code.is_empty() {
                reference.departments.entry(department.clone()).or_insert(department_code);
            }

            let municipality_code = pad_code(&record.municipality_code, MUNICIPALITY_CODE_WIDTH);
            if !municipality.is_empty() && !municipality_code.is_empty() {
                reference
                    .municipalities
                    .entry((department, municipality))
                    .or_insert(municipality_code);
            }
        }

        reference
    }

    /// Load the reference spreadsheet using the column names from config
    pub fn load(path: &Path, columns: &GeoConfig) -> Result<Self, SheetError> {
        let table = sheet::read_table(path)?;

        let index = |name: &str| {
            table.column_index(name).ok_or_else(|| SheetError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })
        };
        let department_name = index(&columns.department_name_column)?;
        let department_code = index(&columns.department_code_column)?;
        let municipality_name = index(&columns.municipality_name_column)?;
        let municipality_code = index(&columns.municipality_code_column)?;

        let records = (0..table.rows.len()).map(|row| GeoRecord {
            department_name: table.cell(row, department_name).to_string(),
            department_code: table.cell(row, department_code).to_string(),
            municipality_name: table.cell(row, municipality_name).to_string(),
            municipality_code: table.cell(row, municipality_code).to_string(),
        });

        let reference = Self::from_records(records);
        info!(
            "Loaded DANE reference from {}: {} departments, {} municipalities",
            path.display(),
            reference.department_count(),
            reference.municipality_count()
        );
        Ok(reference)
    }

    pub fn department_code(&self, department: &str) -> Option<&str> {
        self.departments.get(department).map(String::as_str)
    }

    pub fn municipality_code(&self, department: &str, municipality: &str) -> Option<&str> {
        self.municipalities
            .get(&(department.to_string(), municipality.to_string()))
            .map(String::as_str)
    }

    pub fn department_count(&self) -> usize {
        self.departments.len()
    }

    pub fn municipality_count(&self) -> usize {
        self.municipalities.len()
    }

    pub fn len(&self) -> usize {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }
}

/// Resolves department/city names to DANE codes
#[derive(Debug, Clone)]
pub struct GeoResolver {
    reference: GeoReference,
}

impl GeoResolver {
    pub fn new(reference: GeoReference) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> &GeoReference {
        &self.reference
    }

    /// Codes for a department/city pair; unmatched parts are "No encontrado"
    pub fn resolve(&self, department: &str, city: &str) -> GeoCodes {
        let not_found = || Sentinel::NotFound.to_string();

        let department = lookup_key(department);
        let city = lookup_key(city);

        let department_code = department
            .as_deref()
            .and_then(|d| self.reference.department_code(d))
            .map(str::to_string)
            .unwrap_or_else(not_found);

        let municipality_code = department
            .as_deref()
            .zip(city.as_deref())
            .and_then(|(d, c)| self.reference.municipality_code(d, c))
            .map(str::to_string)
            .unwrap_or_else(not_found);

        debug!(
            "Resolved {:?}/{:?} to {} / {}",
            department, city, department_code, municipality_code
        );

        GeoCodes {
            department_code,
            municipality_code,
        }
    }
}

/// Normalized key, or None for empty and sentinel values
fn lookup_key(name: &str) -> Option<String> {
    let key = normalize_place_name(name);
    (!key.is_empty() && !is_sentinel(&key)).then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_resolver() -> GeoResolver {
        GeoResolver::new(GeoReference::from_records(vec![
            GeoRecord::new("Antioquia", "05", "Medellín", "05001"),
            GeoRecord::new("ANTIOQUIA", "05", "ENVIGADO", "05266"),
            GeoRecord::new(" Valle del  Cauca ", "76", "Cali", "76001"),
            GeoRecord::new("Bogotá, D.C.", "11", "Bogotá, D.C.", "11001"),
        ]))
    }

    #[test]
    fn test_resolves_known_pair() {
        let codes = fixture_resolver().resolve("ANTIOQUIA", "MEDELLÍN");
        assert_eq!(codes.department_code, "05");
        assert_eq!(codes.municipality_code, "05001");
    }

    #[test]
    fn test_unknown_city_keeps_department_code() {
        let codes = fixture_resolver().resolve("ANTIOQUIA", "CIUDAD_INEXISTENTE");
        assert_eq!(codes.department_code, "05");
        assert_eq!(codes.municipality_code, "No encontrado");
    }

    #[test]
    fn test_lookup_normalizes_input() {
        let codes = fixture_resolver().resolve("  valle del cauca", "cali ");
        assert_eq!(codes.department_code, "76");
        assert_eq!(codes.municipality_code, "76001");
    }

    #[test]
    fn test_city_must_belong_to_department() {
        let codes = fixture_resolver().resolve("VALLE DEL CAUCA", "MEDELLÍN");
        assert_eq!(codes.department_code, "76");
        assert_eq!(codes.municipality_code, "No encontrado");
    }

    #[test]
    fn test_empty_and_sentinel_names_never_match() {
        let resolver = fixture_resolver();
        for (department, city) in [("", ""), ("Sin información", "Sin información"), ("Error", "Cali")] {
            let codes = resolver.resolve(department, city);
            assert_eq!(codes.department_code, "No encontrado");
            assert_eq!(codes.municipality_code, "No encontrado");
        }
    }

    #[test]
    fn test_numeric_codes_are_padded() {
        let reference = GeoReference::from_records(vec![GeoRecord::new("ANTIOQUIA", "5", "MEDELLÍN", "5001")]);
        assert_eq!(reference.department_code("ANTIOQUIA"), Some("05"));
        assert_eq!(reference.municipality_code("ANTIOQUIA", "MEDELLÍN"), Some("05001"));
    }

    #[test]
    fn test_first_row_wins_on_duplicates() {
        let reference = GeoReference::from_records(vec![
            GeoRecord::new("ANTIOQUIA", "05", "MEDELLÍN", "05001"),
            GeoRecord::new("ANTIOQUIA", "99", "MEDELLÍN", "99999"),
        ]);
        assert_eq!(reference.department_code("ANTIOQUIA"), Some("05"));
        assert_eq!(reference.municipality_code("ANTIOQUIA", "MEDELLÍN"), Some("05001"));
        assert_eq!(reference.len(), 2);
    }

    #[test]
    fn test_empty_reference() {
        let resolver = GeoResolver::new(GeoReference::default());
        assert!(resolver.reference().is_empty());
        assert_eq!(resolver.resolve("ANTIOQUIA", "MEDELLÍN"), GeoCodes::sentinel(Sentinel::NotFound));
    }
}
