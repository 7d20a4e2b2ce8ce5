//! Placeholder resolution for template cells.
//!
//! A cell holding exactly one `{{ .Field }}` reference resolves to the raw
//! fetched value so numbers, booleans and dates keep their native type. Any
//! other content is rendered through the template language and always yields
//! text.

pub mod template;

use crate::errors::ResolveError;
use crate::value::{FetchedRow, FieldValue};
use once_cell::sync::Lazy;
use regex::Regex;

pub use template::Template;

/// Opening delimiter every placeholder contains.
pub const MARKER: &str = "{{";

static SIMPLE_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\{\{\s*\.\s*([a-zA-Z0-9_]+)\s*\}\}\s*$").expect("valid field regex")
});

/// Cheap check used to skip cells before any parsing happens.
pub fn contains_marker(text: &str) -> bool {
    text.contains(MARKER)
}

/// One way of turning cell text into a value.
///
/// `Ok(None)` means the strategy does not apply and the next one should be tried.
pub trait ResolveStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn try_resolve(
        &self,
        cell_text: &str,
        fields: &FetchedRow,
    ) -> Result<Option<FieldValue>, ResolveError>;
}

/// Fast path: the whole cell is a single `{{ .Field }}` naming a fetched field.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldReference;

impl FieldReference {
    /// The field name if `cell_text` is exactly one simple reference.
    pub fn field_name(cell_text: &str) -> Option<&str> {
        SIMPLE_FIELD
            .captures(cell_text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

impl ResolveStrategy for FieldReference {
    fn name(&self) -> &'static str {
        "field_reference"
    }

    fn try_resolve(
        &self,
        cell_text: &str,
        fields: &FetchedRow,
    ) -> Result<Option<FieldValue>, ResolveError> {
        Ok(Self::field_name(cell_text).and_then(|name| fields.get(name).cloned()))
    }
}

/// Fallback: render the cell as a template with strict field lookup.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateStrategy;

impl ResolveStrategy for TemplateStrategy {
    fn name(&self) -> &'static str {
        "template"
    }

    fn try_resolve(
        &self,
        cell_text: &str,
        fields: &FetchedRow,
    ) -> Result<Option<FieldValue>, ResolveError> {
        let template = Template::parse(cell_text)?;
        template.render(fields).map(|text| Some(FieldValue::Text(text)))
    }
}

/// Ordered chain of strategies; the first one that applies wins.
pub struct PlaceholderResolver {
    strategies: Vec<Box<dyn ResolveStrategy>>,
}

impl Default for PlaceholderResolver {
    fn default() -> Self {
        Self::new(vec![Box::new(FieldReference), Box::new(TemplateStrategy)])
    }
}

impl PlaceholderResolver {
    pub fn new(strategies: Vec<Box<dyn ResolveStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn resolve(&self, cell_text: &str, fields: &FetchedRow) -> Result<FieldValue, ResolveError> {
        for strategy in &self.strategies {
            if let Some(value) = strategy.try_resolve(cell_text, fields)? {
                tracing::trace!(strategy = strategy.name(), "placeholder resolved");
                return Ok(value);
            }
        }
        Err(ResolveError::execute("no placeholder strategy applies"))
    }
}
