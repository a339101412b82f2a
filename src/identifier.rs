//! Identifier (NIT) normalization
//!
//! Spreadsheet cells arrive in all shapes: `900123456`, `900123456.0`,
//! `900.123.456`, ` 1.234.567,00 `. Normalization reduces them to a plain
//! digit string or reports why it could not.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Last separator of the value together with the digit runs around it
static DECIMAL_TAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<run>\d+)(?P<sep>[.,])(?P<frac>\d+)$").unwrap()
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier '{0}' is not numeric")]
    NonNumeric(String),
}

/// A normalized business tax identifier: non-empty, ASCII digits only
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Nit(String);

impl Nit {
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        normalize_identifier(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Nit {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_identifier(s)
    }
}

impl AsRef<str> for Nit {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Clean a raw cell value without validating it
///
/// A final separator is read as a decimal point when the group after it is
/// not a 3-digit thousands group, or when the digit run before it is too
/// long to be a thousands group. Everything from that point on is dropped;
/// the remaining `.` and `,` are treated as thousands separators.
pub fn clean_identifier(raw: &str) -> String {
    let value = raw.trim();
    let value = strip_decimal_fragment(value);
    value.chars().filter(|c| *c != '.' && *c != ',').collect()
}

fn strip_decimal_fragment(value: &str) -> &str {
    if let Some(caps) = DECIMAL_TAIL.captures(value) {
        let run = &caps["run"];
        let frac = &caps["frac"];
        if frac.len() != 3 || run.len() > 3 {
            if let Some(sep) = caps.name("sep") {
                return &value[..sep.start()];
            }
        }
    }
    value
}

/// Normalize and validate a raw cell value
pub fn normalize_identifier(raw: &str) -> Result<Nit, IdentifierError> {
    let cleaned = clean_identifier(raw);

    if cleaned.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(IdentifierError::NonNumeric(cleaned));
    }

    Ok(Nit(cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thousands_separators_removed() {
        assert_eq!(normalize_identifier("1.234.567").unwrap().as_str(), "1234567");
        assert_eq!(normalize_identifier("900,123,456").unwrap().as_str(), "900123456");
    }

    #[test]
    fn test_decimal_fragment_truncated() {
        assert_eq!(normalize_identifier("900123456.0").unwrap().as_str(), "900123456");
        assert_eq!(normalize_identifier("900123456.000").unwrap().as_str(), "900123456");
        assert_eq!(normalize_identifier("1.234.567,00").unwrap().as_str(), "1234567");
    }

    #[test]
    fn test_surrounding_whitespace_trimmed() {
        assert_eq!(normalize_identifier("  800197268 \t").unwrap().as_str(), "800197268");
    }

    #[test]
    fn test_invalid_identifiers() {
        assert_eq!(normalize_identifier("abc"), Err(IdentifierError::NonNumeric("abc".to_string())));
        assert_eq!(normalize_identifier("900123456-7"), Err(IdentifierError::NonNumeric("900123456-7".to_string())));
        assert_eq!(normalize_identifier(""), Err(IdentifierError::Empty));
        assert_eq!(normalize_identifier("   "), Err(IdentifierError::Empty));
    }

    #[test]
    fn test_clean_identifier_keeps_invalid_text() {
        assert_eq!(clean_identifier(" NIT 12.0 "), "NIT 12");
        assert_eq!(clean_identifier("12 34"), "12 34");
    }

    #[test]
    fn test_nit_from_str() {
        let nit: Nit = "860.034.313".parse().unwrap();
        assert_eq!(nit.to_string(), "860034313");
    }
}
