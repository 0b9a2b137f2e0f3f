//! CSV decoding into typed datasets
//!
//! Turns uploaded delimited text into a [`Dataset`]: ordered column names taken
//! from the header row and rows of typed cells. Cell kinds are decided once here
//! so nothing downstream has to re-inspect strings.
//!
//! ## Cell typing
//!
//! - A field that parses as a finite `f64` after trimming becomes [`CellValue::Number`],
//!   keeping its trimmed text so `007` still reads `007`
//! - Any other field, including the empty string, stays [`CellValue::Text`]
//! - A record shorter than the header yields [`CellValue::Missing`] for the absent cells

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use thiserror::Error;

// Text that is already a valid JSON number literal
static JSON_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?$").unwrap_or_else(|_| Regex::new("^$").unwrap())
});

/// Errors that can occur while decoding tabular data
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Uploaded bytes are not UTF-8
    #[error("file is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// CSV parsing error
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    /// Header row missing or blank
    #[error("No columns found")]
    NoColumns,

    /// Decoded dataset has no rows
    #[error("Empty file")]
    Empty,

    /// JSON payload is not an array of row objects
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

/// One scalar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Parsed value plus the field text it came from.
    Number { value: f64, raw: String },
    Text(String),
    Missing,
}

impl CellValue {
    /// Type a raw CSV field.
    pub fn from_field(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<f64>() {
            Ok(value) if value.is_finite() => CellValue::Number { value, raw: trimmed.to_string() },
            _ => CellValue::Text(raw.to_string()),
        }
    }

    /// Type a JSON value as received from the HTTP API. Strings go through
    /// the same typing as CSV fields.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::Null => CellValue::Missing,
            Value::Number(n) => match n.as_f64() {
                Some(value) if value.is_finite() => CellValue::Number { value, raw: n.to_string() },
                _ => CellValue::Text(n.to_string()),
            },
            Value::String(s) => CellValue::from_field(s),
            Value::Bool(b) => CellValue::Text(b.to_string()),
            other => CellValue::Text(other.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool { matches!(self, CellValue::Number { .. }) }

    /// Textual form used for lexical comparison and display.
    /// Missing cells read as `undefined`.
    pub fn text_form(&self) -> Cow<'_, str> {
        match self {
            CellValue::Number { raw, .. } => Cow::Borrowed(raw.as_str()),
            CellValue::Text(s) => Cow::Borrowed(s.as_str()),
            CellValue::Missing => Cow::Borrowed("undefined"),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Numbers go out as their field text: a JSON number when the text
            // is one, otherwise a string ("007", "+5", "1.")
            CellValue::Number { raw, .. } if JSON_NUMBER_RE.is_match(raw) => match RawValue::from_string(raw.clone()) {
                Ok(literal) => literal.serialize(serializer),
                Err(_) => serializer.serialize_str(raw),
            },
            CellValue::Number { raw, .. } => serializer.serialize_str(raw),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Missing => serializer.serialize_none(),
        }
    }
}

static MISSING: CellValue = CellValue::Missing;

/// One row, cells aligned with [`Dataset::columns`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    cells: Vec<CellValue>,
}

impl Row {
    pub fn new(cells: Vec<CellValue>) -> Self { Self { cells } }

    /// Cell at `index`; out-of-range reads as missing.
    pub fn get(&self, index: usize) -> &CellValue {
        self.cells.get(index).unwrap_or(&MISSING)
    }

    pub fn cells(&self) -> &[CellValue] { &self.cells }
}

/// Decoded content of one stored file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self { Self { columns, rows } }

    pub fn columns(&self) -> &[String] { &self.columns }

    pub fn rows(&self) -> &[Row] { &self.rows }

    pub fn rows_mut(&mut self) -> &mut [Row] { &mut self.rows }

    pub fn len(&self) -> usize { self.rows.len() }

    pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell of `row` in column `name`.
    pub fn cell(&self, row: usize, name: &str) -> Option<&CellValue> {
        let idx = self.column_index(name)?;
        self.rows.get(row).map(|r| r.get(idx))
    }

    /// Build a dataset from the JSON rows served by the HTTP API.
    ///
    /// Column names are the keys of the first row in their original order.
    /// Keys missing from later rows read as missing cells; keys absent from
    /// the first row are ignored. Zero rows is rejected.
    pub fn from_json_rows(rows: &[Value]) -> DecodeResult<Self> {
        let first = match rows.first() {
            Some(Value::Object(m)) => m,
            Some(_) => return Err(DecodeError::InvalidData("rows must be JSON objects".to_string())),
            None => return Err(DecodeError::Empty),
        };
        let columns: Vec<String> = first.keys().cloned().collect();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let Value::Object(map) = row else {
                return Err(DecodeError::InvalidData("rows must be JSON objects".to_string()));
            };
            out.push(row_from_map(&columns, map));
        }
        Ok(Self { columns, rows: out })
    }
}

fn row_from_map(columns: &[String], map: &Map<String, Value>) -> Row {
    Row::new(
        columns
            .iter()
            .map(|c| map.get(c).map(CellValue::from_json).unwrap_or(CellValue::Missing))
            .collect(),
    )
}

struct RowObject<'a> {
    columns: &'a [String],
    row: &'a Row,
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (i, name) in self.columns.iter().enumerate() {
            map.serialize_entry(name, self.row.get(i))?;
        }
        map.end()
    }
}

/// Serializes as a JSON array of row objects, keys in column order.
impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&RowObject { columns: &self.columns, row })?;
        }
        seq.end()
    }
}

/// Decode uploaded CSV bytes. The first record is the header row.
///
/// A header-only file decodes to a dataset with columns and no rows; whether
/// that is acceptable is up to the caller. Repeated header names collapse into
/// one column holding the right-most value.
pub fn decode_csv(bytes: &[u8]) -> DecodeResult<Dataset> {
    let text = std::str::from_utf8(bytes)?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(DecodeError::NoColumns);
    }

    // header position -> column slot
    let mut columns: Vec<String> = Vec::with_capacity(headers.len());
    let mut slots: Vec<usize> = Vec::with_capacity(headers.len());
    for h in headers.iter() {
        let name = h.trim().to_string();
        match columns.iter().position(|c| *c == name) {
            Some(existing) => slots.push(existing),
            None => {
                slots.push(columns.len());
                columns.push(name);
            }
        }
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut cells = vec![CellValue::Missing; columns.len()];
        for (pos, slot) in slots.iter().enumerate() {
            if let Some(field) = record.get(pos) {
                cells[*slot] = CellValue::from_field(field);
            }
        }
        rows.push(Row::new(cells));
    }

    Ok(Dataset { columns, rows })
}
