//! Lookup results and the sentinel values that stand in for missing data.
//!
//! Every cell of a [`LookupResult`] is always a string: either a real value
//! taken from the registry or one of the three sentinels below.

use serde::Serialize;
use std::fmt;

pub const SIN_INFORMACION: &str = "Sin información";
pub const NO_ENCONTRADO: &str = "No encontrado";
pub const ERROR: &str = "Error";

/// Placeholder written when a value could not be determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentinel {
    /// Value absent from the page, or the input row was empty/invalid
    NoInformation,
    /// Registry answered without the record, or no geo code matched
    NotFound,
    /// Transport failure while talking to the registry
    Error,
}

impl Sentinel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentinel::NoInformation => SIN_INFORMACION,
            Sentinel::NotFound => NO_ENCONTRADO,
            Sentinel::Error => ERROR,
        }
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True when the value is one of the sentinels (case and surrounding whitespace ignored)
pub fn is_sentinel(value: &str) -> bool {
    let value = value.trim().to_uppercase();
    [SIN_INFORMACION, NO_ENCONTRADO, ERROR]
        .iter()
        .any(|s| s.to_uppercase() == value)
}

/// How a single row ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    /// Address, city and department were all extracted
    Found,
    /// Some fields were extracted, others fell back to a sentinel
    Partial,
    /// Page was fetched but none of the fields were on it
    Empty,
    /// Registry answered with a non-200 status
    NotFound,
    /// Timeout, connection failure or unreadable body
    Error,
    /// Identifier was empty or not numeric
    Invalid,
    /// Run was cancelled or ran out of time before reaching this row
    Skipped,
}

/// DANE department and municipality codes for a row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeoCodes {
    pub department_code: String,
    pub municipality_code: String,
}

impl GeoCodes {
    pub fn sentinel(sentinel: Sentinel) -> Self {
        Self {
            department_code: sentinel.to_string(),
            municipality_code: sentinel.to_string(),
        }
    }
}

/// One output row per input identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupResult {
    /// 1-based position in the input table
    pub row: usize,
    pub identifier: String,
    pub address: String,
    pub city: String,
    pub department: String,
    /// Present on every row when a geo reference table was supplied
    pub geo: Option<GeoCodes>,
    pub status: RowStatus,
}

impl LookupResult {
    /// Row where every field carries the same sentinel
    pub fn sentinel_row(
        row: usize,
        identifier: impl Into<String>,
        sentinel: Sentinel,
        status: RowStatus,
        with_geo: bool,
    ) -> Self {
        Self {
            row,
            identifier: identifier.into(),
            address: sentinel.to_string(),
            city: sentinel.to_string(),
            department: sentinel.to_string(),
            geo: with_geo.then(|| GeoCodes::sentinel(sentinel)),
            status,
        }
    }

    /// Cell values in export column order
    pub fn cells(&self) -> Vec<&str> {
        let mut cells = vec![
            self.identifier.as_str(),
            self.address.as_str(),
            self.city.as_str(),
            self.department.as_str(),
        ];
        if let Some(geo) = &self.geo {
            cells.push(geo.department_code.as_str());
            cells.push(geo.municipality_code.as_str());
        }
        cells
    }
}

pub const BASE_HEADERS: [&str; 4] = ["documento", "dirección", "ciudad", "departamento"];
pub const GEO_HEADERS: [&str; 2] = ["código departamento", "código municipio"];

/// Ordered results of a batch run, one entry per input row
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultTable {
    rows: Vec<LookupResult>,
    with_geo_codes: bool,
}

impl ResultTable {
    pub fn new(with_geo_codes: bool) -> Self {
        Self {
            rows: Vec::new(),
            with_geo_codes,
        }
    }

    pub fn with_capacity(with_geo_codes: bool, capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
            with_geo_codes,
        }
    }

    pub fn push(&mut self, result: LookupResult) {
        self.rows.push(result);
    }

    pub fn rows(&self) -> &[LookupResult] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_geo_codes(&self) -> bool {
        self.with_geo_codes
    }

    pub fn headers(&self) -> Vec<&'static str> {
        let mut headers = BASE_HEADERS.to_vec();
        if self.with_geo_codes {
            headers.extend(GEO_HEADERS);
        }
        headers
    }

    pub fn count(&self, status: RowStatus) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }
}
