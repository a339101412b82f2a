//! Registry page field extraction
//!
//! Registry pages present each datum as a question-style heading followed by
//! a value element:
//!
//! ```html
//! <h2>¿Cuál es su dirección?</h2>
//! <div class="value">CL 10 # 43 - 12</div>
//! ```
//!
//! Which headings to look for, and where the value sits relative to them, is
//! described by an ordered list of [`FieldRule`]s per field. Rules come from
//! the `[[extraction.fields]]` section of the configuration, so markup changes
//! on the registry side only need a config edit.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::lookup::Sentinel;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Invalid CSS selector '{selector}' in {field} rule: {error}")]
    InvalidSelector {
        field: Field,
        selector: String,
        error: String,
    },

    #[error("{field} rule with match = \"{heading_match}\" needs a non-empty text")]
    MissingText { field: Field, heading_match: HeadingMatch },

    #[error("No extraction rule configured for field '{0}'")]
    NoRules(Field),
}

/// Fields read from a registry page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Address,
    City,
    Department,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Address, Field::City, Field::Department];
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Address => write!(f, "address"),
            Field::City => write!(f, "city"),
            Field::Department => write!(f, "department"),
        }
    }
}

/// How a heading's text is compared against the rule text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingMatch {
    /// Whitespace-normalized heading text equals the rule text
    Exact,
    /// Heading text contains the rule text, ignoring case
    Contains,
    /// First element matching the heading selector, text ignored
    Any,
}

impl fmt::Display for HeadingMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeadingMatch::Exact => write!(f, "exact"),
            HeadingMatch::Contains => write!(f, "contains"),
            HeadingMatch::Any => write!(f, "any"),
        }
    }
}

/// Where the value element sits relative to the heading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuePosition {
    /// A later sibling of the heading
    #[default]
    NextSibling,
    /// Anywhere after the heading in document order
    Following,
}

/// Declarative description of where one field lives on the page
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    pub field: Field,
    pub heading_selector: String,
    #[serde(rename = "match")]
    pub heading_match: HeadingMatch,
    #[serde(default)]
    pub text: String,
    pub value_selector: String,
    #[serde(default)]
    pub value_position: ValuePosition,
}

impl FieldRule {
    pub fn new(
        field: Field,
        heading_selector: &str,
        heading_match: HeadingMatch,
        text: &str,
        value_selector: &str,
        value_position: ValuePosition,
    ) -> Self {
        Self {
            field,
            heading_selector: heading_selector.to_string(),
            heading_match,
            text: text.to_string(),
            value_selector: value_selector.to_string(),
            value_position,
        }
    }

    fn compile(&self) -> Result<CompiledRule, ExtractError> {
        if self.heading_match != HeadingMatch::Any && self.text.trim().is_empty() {
            return Err(ExtractError::MissingText {
                field: self.field,
                heading_match: self.heading_match,
            });
        }

        let text = collapse_whitespace(&self.text);
        Ok(CompiledRule {
            field: self.field,
            heading: parse_selector(self.field, &self.heading_selector)?,
            value: parse_selector(self.field, &self.value_selector)?,
            heading_match: self.heading_match,
            text: match self.heading_match {
                HeadingMatch::Contains => text.to_lowercase(),
                _ => text,
            },
            value_position: self.value_position,
        })
    }
}

fn parse_selector(field: Field, selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        field,
        selector: selector.to_string(),
        error: e.to_string(),
    })
}

#[derive(Debug, Clone)]
struct CompiledRule {
    field: Field,
    heading: Selector,
    value: Selector,
    heading_match: HeadingMatch,
    text: String,
    value_position: ValuePosition,
}

impl CompiledRule {
    fn heading_matches(&self, heading: &ElementRef) -> bool {
        match self.heading_match {
            HeadingMatch::Any => true,
            HeadingMatch::Exact => element_text(heading) == self.text,
            HeadingMatch::Contains => element_text(heading).to_lowercase().contains(&self.text),
        }
    }

    /// Value of the first matching heading that has a non-empty value element
    ///
    /// The search for a heading's value ends at the next element matching
    /// `heading_selector`, so a heading without a value never borrows the
    /// value of the field after it.
    fn apply(&self, document: &Html) -> Option<String> {
        document
            .select(&self.heading)
            .filter(|heading| self.heading_matches(heading))
            .find_map(|heading| {
                let value = match self.value_position {
                    ValuePosition::NextSibling => {
                        first_value(heading.next_siblings().filter_map(ElementRef::wrap), &self.value, &self.heading)
                    }
                    ValuePosition::Following => {
                        first_value(following_elements(document, heading), &self.value, &self.heading)
                    }
                }?;
                let text = element_text(&value);
                (!text.is_empty()).then_some(text)
            })
    }
}

/// First value element before the next heading
fn first_value<'a>(
    mut candidates: impl Iterator<Item = ElementRef<'a>>,
    value: &Selector,
    heading: &Selector,
) -> Option<ElementRef<'a>> {
    candidates
        .find(|el| value.matches(el) || heading.matches(el))
        .filter(|el| value.matches(el))
}

/// Elements after `heading` in document order, excluding its own descendants
fn following_elements<'a>(
    document: &'a Html,
    heading: ElementRef<'a>,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    let heading_id = heading.id();
    let inner: Vec<_> = heading.descendants().map(|node| node.id()).collect();
    document
        .tree
        .root()
        .descendants()
        .skip_while(move |node| node.id() != heading_id)
        .filter(move |node| !inner.contains(&node.id()))
        .filter_map(ElementRef::wrap)
}

fn element_text(element: &ElementRef) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Address, city and department read from one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFields {
    pub address: Option<String>,
    pub city: Option<String>,
    pub department: Option<String>,
}

impl ExtractedFields {
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Address => self.address.as_deref(),
            Field::City => self.city.as_deref(),
            Field::Department => self.department.as_deref(),
        }
    }

    pub fn found_count(&self) -> usize {
        Field::ALL.iter().filter(|f| self.get(**f).is_some()).count()
    }

    /// Value for the field, or the "Sin información" sentinel
    pub fn value_or_sentinel(&self, field: Field) -> String {
        self.get(field)
            .map(str::to_string)
            .unwrap_or_else(|| Sentinel::NoInformation.to_string())
    }
}

/// Applies the configured field rules to registry pages
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    rules: Vec<CompiledRule>,
}

impl FieldExtractor {
    /// Compile rules; every field needs at least one
    pub fn new(rules: &[FieldRule]) -> Result<Self, ExtractError> {
        let compiled = rules
            .iter()
            .map(FieldRule::compile)
            .collect::<Result<Vec<_>, _>>()?;

        for field in Field::ALL {
            if !compiled.iter().any(|r| r.field == field) {
                return Err(ExtractError::NoRules(field));
            }
        }

        Ok(Self { rules: compiled })
    }

    pub fn extract(&self, html: &str) -> ExtractedFields {
        let document = Html::parse_document(html);
        ExtractedFields {
            address: self.extract_field(&document, Field::Address),
            city: self.extract_field(&document, Field::City),
            department: self.extract_field(&document, Field::Department),
        }
    }

    fn extract_field(&self, document: &Html, field: Field) -> Option<String> {
        let value = self
            .rules
            .iter()
            .filter(|rule| rule.field == field)
            .find_map(|rule| rule.apply(document));

        if value.is_none() {
            debug!("No value found for {} on registry page", field);
        }
        value
    }
}
