//! Listing parsers
//!
//! This module turns a listing page payload into work units:
//! - JSON listings: an array of record objects found through a JSON pointer
//! - HTML listings: table rows selected with a CSS selector
//! - Parse-with-fallback for JSON wrapped in prose or code fences

use crate::config::ParserConfig;
use crate::ConfigError;
use scraper::{Html, Selector};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// The smallest independently fetchable item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    /// Stable identifier, compared by string equality across runs
    pub id: String,
    /// Page the unit was listed on
    pub page: u32,
    /// Listing metadata carried into the result row
    pub fields: BTreeMap<String, String>,
}

/// Units of one listing page plus what the page says about pagination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub units: Vec<WorkUnit>,
    /// Total record count reported by the listing, if any
    pub total_records: Option<u64>,
}

impl Listing {
    /// Whether a page after `page` can hold records
    ///
    /// Without a reported total the answer is always yes; the driver then
    /// stops on the first empty page instead.
    pub fn has_next(&self, page: u32, page_size: u32) -> bool {
        match self.total_records {
            Some(total) => u64::from(page) * u64::from(page_size) < total,
            None => true,
        }
    }
}

/// Errors that can occur while reading a payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("payload is not valid JSON: {0}")]
    Unparseable(String),

    #[error("no value at JSON pointer {0}")]
    MissingRecords(String),

    #[error("value at JSON pointer {0} is not an array")]
    NotAnArray(String),
}

/// Parses JSON, falling back to the JSON embedded in surrounding text
///
/// The fallback only narrows the input: first to the contents of a fenced
/// code block, then to the span between the first opening and the last
/// matching closing bracket. It never adds or removes structure, so input
/// that is broken JSON stays an error.
pub fn parse_json_with_fallback(text: &str) -> Result<Value, ParseError> {
    let strict_error = match serde_json::from_str::<Value>(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let fenced = fenced_block(text);
    let candidates = fenced
        .into_iter()
        .chain(bracketed_span(fenced.unwrap_or(text)));

    for candidate in candidates {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            tracing::debug!("Recovered JSON from surrounding text");
            return Ok(value);
        }
    }

    Err(ParseError::Unparseable(strict_error.to_string()))
}

/// Contents of the first ``` fenced block, without the language tag
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")? + 3;
    let body = &text[start..];
    let body = body.strip_prefix("json").unwrap_or(body);
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// From the first `{` or `[` to the last matching closer
fn bracketed_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let closer = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(closer)?;
    (end > start).then(|| &text[start..=end])
}

/// Renders a JSON value as a flat output cell
fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

fn value_as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A configured listing parser
#[derive(Debug, Clone)]
pub enum PageParser {
    Json {
        records_pointer: String,
        id_field: String,
        total_pointer: Option<String>,
    },
    HtmlTable {
        rows: Selector,
        cells: Selector,
        columns: Vec<String>,
        id_column: String,
    },
}

impl PageParser {
    pub fn from_config(config: &ParserConfig) -> Result<Self, ConfigError> {
        match config {
            ParserConfig::Json {
                records_pointer,
                id_field,
                total_pointer,
            } => Ok(Self::Json {
                records_pointer: records_pointer.clone(),
                id_field: id_field.clone(),
                total_pointer: total_pointer.clone(),
            }),
            ParserConfig::HtmlTable {
                row_selector,
                columns,
                id_column,
            } => {
                let rows = Selector::parse(row_selector).map_err(|e| {
                    ConfigError::InvalidSelector(format!("'{}': {:?}", row_selector, e))
                })?;
                let cells = Selector::parse("td")
                    .map_err(|e| ConfigError::InvalidSelector(format!("'td': {:?}", e)))?;
                Ok(Self::HtmlTable {
                    rows,
                    cells,
                    columns: columns.clone(),
                    id_column: id_column.clone(),
                })
            }
        }
    }

    /// Extracts the work units of `page` from its payload
    pub fn parse(&self, page: u32, payload: &str) -> Result<Listing, ParseError> {
        match self {
            Self::Json {
                records_pointer,
                id_field,
                total_pointer,
            } => parse_json_listing(
                page,
                payload,
                records_pointer,
                id_field,
                total_pointer.as_deref(),
            ),
            Self::HtmlTable {
                rows,
                cells,
                columns,
                id_column,
            } => Ok(parse_html_listing(
                page, payload, rows, cells, columns, id_column,
            )),
        }
    }
}

fn parse_json_listing(
    page: u32,
    payload: &str,
    records_pointer: &str,
    id_field: &str,
    total_pointer: Option<&str>,
) -> Result<Listing, ParseError> {
    let document = parse_json_with_fallback(payload)?;

    let records = document
        .pointer(records_pointer)
        .ok_or_else(|| ParseError::MissingRecords(records_pointer.to_string()))?;

    let records = match records {
        Value::Array(items) => items.as_slice(),
        // Some listings answer an empty result with null instead of []
        Value::Null => &[],
        _ => return Err(ParseError::NotAnArray(records_pointer.to_string())),
    };

    let mut units = Vec::with_capacity(records.len());
    for record in records {
        let Some(object) = record.as_object() else {
            tracing::warn!("Page {}: skipping non-object record {}", page, record);
            continue;
        };

        let id = object.get(id_field).map(cell_text).unwrap_or_default();
        if id.is_empty() {
            tracing::warn!("Page {}: skipping record without '{}'", page, id_field);
            continue;
        }

        let fields = object
            .iter()
            .map(|(key, value)| (key.clone(), cell_text(value)))
            .collect();
        units.push(WorkUnit { id, page, fields });
    }

    let total_records = total_pointer
        .and_then(|pointer| document.pointer(pointer))
        .and_then(value_as_count);

    Ok(Listing {
        units,
        total_records,
    })
}

fn parse_html_listing(
    page: u32,
    payload: &str,
    rows: &Selector,
    cells: &Selector,
    columns: &[String],
    id_column: &str,
) -> Listing {
    let document = Html::parse_document(payload);
    let mut units = Vec::new();

    for row in document.select(rows) {
        let values: Vec<String> = row
            .select(cells)
            .map(|cell| {
                cell.text()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();

        // Header rows carry <th> cells only
        if values.is_empty() {
            continue;
        }

        let fields: BTreeMap<String, String> = columns
            .iter()
            .enumerate()
            .map(|(i, column)| (column.clone(), values.get(i).cloned().unwrap_or_default()))
            .collect();

        let id = fields.get(id_column).cloned().unwrap_or_default();
        if id.is_empty() {
            tracing::debug!("Page {}: skipping row without {}", page, id_column);
            continue;
        }

        units.push(WorkUnit { id, page, fields });
    }

    Listing {
        units,
        total_records: None,
    }
}
