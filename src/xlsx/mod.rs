//! OOXML spreadsheet (`.xlsx`) decoding and encoding
//!
//! Reading goes through `zip` + `quick-xml` and only ever touches the first
//! worksheet. Writing assembles a single-sheet package in memory.

mod reader;
mod writer;

pub use reader::XlsxDecoder;
pub use writer::XlsxEncoder;

use serde::Deserialize;

/// Excel's hard limits
pub(crate) const MAX_ROWS: u32 = 1_048_576;
pub(crate) const MAX_COLUMNS: u32 = 16_384;

const MAX_SHEET_NAME_LEN: usize = 31;

/// Spreadsheet options (builder pattern)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct XlsxOptions {
    /// Name of the single sheet written on output
    pub sheet_name: String,
    /// Deflate level for output (0-9)
    pub compression_level: u32,
    /// Maximum number of entries in an input archive
    pub max_entries: usize,
    /// Maximum uncompressed size of one XML part on input
    pub max_part_bytes: u64,
    /// Maximum number of cells (rows x columns) in the decoded extent.
    /// Blank padding counts, so one far-away cell can hit this on its own.
    pub max_cells: u64,
}

impl Default for XlsxOptions {
    fn default() -> Self {
        XlsxOptions {
            sheet_name: "Sheet1".to_string(),
            compression_level: 6,
            max_entries: 10_000,
            max_part_bytes: 256 * 1024 * 1024,
            max_cells: 5_000_000,
        }
    }
}

impl XlsxOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the output sheet name; characters Excel rejects are replaced
    pub fn with_sheet_name(mut self, name: &str) -> Self {
        self.sheet_name = sanitize_sheet_name(name);
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn with_max_part_bytes(mut self, max: u64) -> Self {
        self.max_part_bytes = max;
        self
    }

    pub fn with_max_cells(mut self, max: u64) -> Self {
        self.max_cells = max;
        self
    }
}

/// Make `name` a legal sheet name: no `[]:*?/\`, at most 31 characters,
/// not empty, not wrapped in apostrophes.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim_matches('\'');
    if cleaned.trim().is_empty() {
        "Sheet1".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Escape text for a `<t>` element: control characters (and `\r`, which XML
/// readers normalize away) become `_xHHHH_`, and a literal `_xHHHH_`
/// sequence gets its underscore escaped as `_x005F_`.
pub(crate) fn encode_ooxml_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, ch) in text.char_indices() {
        if ch == '_' && escape_at(&text[i..]).is_some() {
            out.push_str("_x005F_");
        } else if (ch as u32) < 0x20 && ch != '\t' && ch != '\n' {
            out.push_str(&format!("_x{:04X}_", ch as u32));
        } else {
            out.push(ch);
        }
    }
    out
}

/// Reverse of [`encode_ooxml_text`]
pub(crate) fn decode_ooxml_text(text: &str) -> String {
    if !text.contains("_x") {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        let rest = &text[i..];
        if let Some(ch) = escape_at(rest) {
            out.push(ch);
            i += 7;
        } else {
            let ch = rest.chars().next().unwrap_or_default();
            out.push(ch);
            i += ch.len_utf8().max(1);
        }
    }
    out
}

/// Character encoded by an `_xHHHH_` escape at the start of `s`
fn escape_at(s: &str) -> Option<char> {
    let b = s.as_bytes();
    if b.len() < 7 || &b[..2] != b"_x" || b[6] != b'_' {
        return None;
    }
    let hex = std::str::from_utf8(&b[2..6]).ok()?;
    if !hex.bytes().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    char::from_u32(u32::from_str_radix(hex, 16).ok()?)
}
