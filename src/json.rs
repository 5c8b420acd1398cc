//! JSON decoding and encoding
//!
//! Two shapes are understood: an array of arrays (one inner array per row)
//! and an array of objects keyed by the header row.

use crate::codec::{Decoder, Encoder};
use crate::error::{DecodeError, EncodeError};
use crate::types::{CellValue, TabularDocument};
use indexmap::IndexSet;
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Shape of JSON output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonLayout {
    /// Array of objects keyed by the first row
    #[default]
    Records,
    /// Array of arrays, `null` for blank cells
    Rows,
}

/// JSON options (builder pattern)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JsonOptions {
    pub layout: JsonLayout,
    pub pretty: bool,
}

impl JsonOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layout(mut self, layout: JsonLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

/// Decodes a JSON array into a [`TabularDocument`]
#[derive(Debug, Default)]
pub struct JsonDecoder;

impl JsonDecoder {
    pub fn new() -> Self {
        JsonDecoder
    }
}

impl Decoder for JsonDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<TabularDocument, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::EmptyInput);
        }

        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        let items = match value {
            Value::Array(items) => items,
            _ => {
                return Err(DecodeError::InvalidJson(
                    "top level must be an array".to_string(),
                ))
            }
        };

        let rows = if items.iter().all(Value::is_array) {
            debug!(rows = items.len(), "reading JSON rows");
            items
                .into_iter()
                .map(|item| match item {
                    Value::Array(cells) => cells.into_iter().map(json_to_cell).collect(),
                    _ => Vec::new(),
                })
                .collect()
        } else if items.iter().all(Value::is_object) {
            debug!(records = items.len(), "reading JSON records");
            records_to_rows(items)
        } else {
            return Err(DecodeError::InvalidJson(
                "array elements must be all arrays or all objects".to_string(),
            ));
        };

        let doc = TabularDocument::new(rows);
        if doc.is_empty() {
            return Err(DecodeError::NoPopulatedCells);
        }
        Ok(doc)
    }
}

/// Header row from the union of keys in first-seen order, then one row per record
fn records_to_rows(items: Vec<Value>) -> Vec<Vec<CellValue>> {
    let records: Vec<Map<String, Value>> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();

    let mut keys: IndexSet<String> = IndexSet::new();
    for record in &records {
        keys.extend(record.keys().cloned());
    }

    let mut rows = Vec::with_capacity(records.len() + 1);
    rows.push(keys.iter().map(|k| CellValue::text(k.as_str())).collect());
    for mut record in records {
        rows.push(
            keys.iter()
                .map(|k| record.remove(k).map_or(CellValue::Blank, json_to_cell))
                .collect(),
        );
    }
    rows
}

fn json_to_cell(value: Value) -> CellValue {
    match value {
        Value::Null => CellValue::Blank,
        Value::Bool(b) => CellValue::text(if b { "TRUE" } else { "FALSE" }),
        Value::Number(n) => match n.as_f64() {
            Some(f) => CellValue::number(f),
            None => CellValue::text(n.to_string()),
        },
        Value::String(s) => CellValue::text(s),
        nested => CellValue::text(nested.to_string()),
    }
}

/// Encodes a document as a JSON array
pub struct JsonEncoder {
    options: JsonOptions,
}

impl JsonEncoder {
    pub fn new(options: JsonOptions) -> Self {
        JsonEncoder { options }
    }
}

impl Default for JsonEncoder {
    fn default() -> Self {
        Self::new(JsonOptions::default())
    }
}

impl Encoder for JsonEncoder {
    fn encode(&self, doc: &TabularDocument) -> Result<Vec<u8>, EncodeError> {
        let value = match self.options.layout {
            JsonLayout::Records => records_value(doc),
            JsonLayout::Rows => rows_value(doc),
        };

        let result = if self.options.pretty {
            serde_json::to_vec_pretty(&value)
        } else {
            serde_json::to_vec(&value)
        };
        result.map_err(|e| EncodeError::Json(e.to_string()))
    }
}

fn rows_value(doc: &TabularDocument) -> Value {
    Value::Array(
        doc.rows()
            .iter()
            .map(|row| Value::Array(row.iter().map(cell_to_json).collect()))
            .collect(),
    )
}

fn records_value(doc: &TabularDocument) -> Value {
    let Some((header, body)) = doc.rows().split_first() else {
        return Value::Array(Vec::new());
    };
    let keys = header_keys(header);

    let records = body
        .iter()
        .filter(|row| !row.iter().all(CellValue::is_blank))
        .map(|row| {
            let record: Map<String, Value> = keys
                .iter()
                .zip(row)
                .filter(|(_, cell)| !cell.is_blank())
                .map(|(key, cell)| (key.clone(), cell_to_json(cell)))
                .collect();
            Value::Object(record)
        })
        .collect();

    Value::Array(records)
}

/// Object keys for the header row. Blank names become `__EMPTY`,
/// `__EMPTY_1`, ...; repeated names get `_1`, `_2`, ... suffixes.
pub fn header_keys(header: &[CellValue]) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::with_capacity(header.len());
    let mut suffixes: HashMap<String, usize> = HashMap::new();
    let mut keys = Vec::with_capacity(header.len());

    for cell in header {
        let base = if cell.is_blank() {
            "__EMPTY".to_string()
        } else {
            cell.as_string()
        };

        let key = if used.contains(&base) {
            let suffix = suffixes.entry(base.clone()).or_insert(0);
            loop {
                *suffix += 1;
                let candidate = format!("{}_{}", base, suffix);
                if !used.contains(&candidate) {
                    break candidate;
                }
            }
        } else {
            base
        };

        used.insert(key.clone());
        keys.push(key);
    }

    keys
}

fn cell_to_json(cell: &CellValue) -> Value {
    match cell {
        CellValue::Blank => Value::Null,
        CellValue::Text(s) => Value::String(s.clone()),
        CellValue::Number(n) => number_to_json(*n),
    }
}

/// Integral values that fit in `i64` are written without a fraction
fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}
