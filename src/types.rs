//! Type definitions for tabular data

use std::fmt;

/// A single cell value
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Empty cell
    Blank,
    /// Text value (never empty, see [`CellValue::text`])
    Text(String),
    /// Numeric value (always finite)
    Number(f64),
}

impl CellValue {
    /// Build a text cell, normalizing the empty string to `Blank`
    pub fn text<S: Into<String>>(s: S) -> Self {
        let s = s.into();
        if s.is_empty() {
            CellValue::Blank
        } else {
            CellValue::Text(s)
        }
    }

    /// Build a numeric cell; non-finite values fall back to their text form
    pub fn number(n: f64) -> Self {
        if n.is_finite() {
            CellValue::Number(n)
        } else {
            CellValue::Text(n.to_string())
        }
    }

    /// Convert cell value to string using canonical number formatting
    pub fn as_string(&self) -> String {
        match self {
            CellValue::Blank => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
        }
    }

    /// Check if cell is blank
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Blank)
    }

    /// Numeric value if this is a number cell
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Text value if this is a text cell
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Blank => Ok(()),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Number(n) => f.write_str(&format_number(*n)),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::text(s)
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::number(n)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::number(i as f64)
    }
}

/// Canonical decimal representation of a number.
///
/// Shortest form that parses back to the same `f64`, never in exponent
/// notation, no grouping separators. Negative zero prints as `0`.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    format!("{}", n)
}

/// Parse `s` as a number only when doing so is lossless, i.e. the canonical
/// formatting of the parsed value is exactly `s`.
pub fn parse_canonical_number(s: &str) -> Option<f64> {
    let n: f64 = s.parse().ok()?;
    if n.is_finite() && format_number(n) == s {
        Some(n)
    } else {
        None
    }
}

/// Convert a 0-based column index to Excel letters (0 -> A, 25 -> Z, 26 -> AA)
pub fn column_letter(col: u32) -> String {
    let mut result = String::new();
    let mut col = col + 1;

    while col > 0 {
        col -= 1;
        result.insert(0, (b'A' + (col % 26) as u8) as char);
        col /= 26;
    }

    result
}

/// Excel-style reference for a 0-based position (e.g. (0, 0) -> "A1")
pub fn cell_reference(row: u32, col: u32) -> String {
    format!("{}{}", column_letter(col), row + 1)
}

/// Parse an Excel-style reference ("B3") into a 0-based (row, col) pair
pub fn parse_cell_reference(reference: &str) -> Option<(u32, u32)> {
    let letters = reference
        .bytes()
        .take_while(|b| b.is_ascii_alphabetic())
        .count();
    if letters == 0 || letters > 3 {
        return None;
    }

    let mut col = 0u32;
    for b in reference[..letters].bytes() {
        col = col * 26 + (b.to_ascii_uppercase() - b'A') as u32 + 1;
    }

    let row: u32 = reference[letters..].parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}

/// In-memory grid of cells shared by every converter.
///
/// The grid always spans the bounding rectangle from A1 to the last row and
/// last column holding a non-blank cell. Every row has exactly
/// [`column_count`](Self::column_count) cells.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TabularDocument {
    rows: Vec<Vec<CellValue>>,
    column_count: usize,
}

impl TabularDocument {
    /// Build a document from ragged rows, trimming to the populated extent
    pub fn new(mut rows: Vec<Vec<CellValue>>) -> Self {
        for row in rows.iter_mut() {
            if let Some(last) = row.iter().rposition(|c| !c.is_blank()) {
                row.truncate(last + 1);
            } else {
                row.clear();
            }
        }

        let row_count = rows
            .iter()
            .rposition(|r| !r.is_empty())
            .map(|i| i + 1)
            .unwrap_or(0);
        rows.truncate(row_count);

        let column_count = rows.iter().map(Vec::len).max().unwrap_or(0);
        for row in rows.iter_mut() {
            row.resize(column_count, CellValue::Blank);
        }

        TabularDocument { rows, column_count }
    }

    /// Build a document from sparse `(row, col, value)` triples
    pub fn from_cells<I>(cells: I) -> Self
    where
        I: IntoIterator<Item = (u32, u32, CellValue)>,
    {
        let mut rows: Vec<Vec<CellValue>> = Vec::new();
        for (row, col, value) in cells {
            if value.is_blank() {
                continue;
            }
            let (row, col) = (row as usize, col as usize);
            if rows.len() <= row {
                rows.resize_with(row + 1, Vec::new);
            }
            let cells = &mut rows[row];
            if cells.len() <= col {
                cells.resize(col + 1, CellValue::Blank);
            }
            cells[col] = value;
        }
        Self::new(rows)
    }

    /// Number of rows in the extent
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns in the extent
    pub fn column_count(&self) -> usize {
        self.column_count
    }

    /// True when no cell is populated
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows of the document
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    /// Cell at 0-based position, `None` outside the extent
    pub fn get(&self, row: usize, col: usize) -> Option<&CellValue> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Convert a row to strings
    pub fn row_strings(&self, row: usize) -> Option<Vec<String>> {
        self.rows
            .get(row)
            .map(|r| r.iter().map(CellValue::as_string).collect())
    }
}
