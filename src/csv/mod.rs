//! CSV decoding and encoding

mod encoder;
mod parser;

pub use encoder::CsvEncoder;
pub use parser::CsvParser;

use crate::codec::Decoder;
use crate::error::DecodeError;
use crate::types::{parse_canonical_number, CellValue, TabularDocument};
use serde::Deserialize;
use std::borrow::Cow;
use tracing::{debug, warn};

/// How the input delimiter is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelimiterMode {
    /// Sniff comma, semicolon or tab from the first record
    Auto,
    /// Always use this byte
    Fixed(u8),
}

/// CSV options (builder pattern)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    pub delimiter: DelimiterMode,
    pub quote_char: u8,
    /// Turn fields into numbers when that is lossless
    pub infer_numbers: bool,
    /// Delimiter written on output
    pub output_delimiter: u8,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            delimiter: DelimiterMode::Auto,
            quote_char: b'"',
            infer_numbers: true,
            output_delimiter: b',',
        }
    }
}

impl CsvOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the input delimiter mode
    pub fn with_delimiter(mut self, mode: DelimiterMode) -> Self {
        self.delimiter = mode;
        self
    }

    /// Set custom quote character
    pub fn with_quote_char(mut self, quote: u8) -> Self {
        self.quote_char = quote;
        self
    }

    /// Enable or disable number inference
    pub fn with_infer_numbers(mut self, infer: bool) -> Self {
        self.infer_numbers = infer;
        self
    }

    /// Set the delimiter used when writing CSV
    pub fn with_output_delimiter(mut self, delim: u8) -> Self {
        self.output_delimiter = delim;
        self
    }

    /// Encoder configured from these options
    pub fn encoder(&self) -> CsvEncoder {
        CsvEncoder::new(self.output_delimiter, self.quote_char)
    }
}

/// Decodes CSV bytes into a [`TabularDocument`]
pub struct CsvDecoder {
    options: CsvOptions,
}

impl CsvDecoder {
    pub fn new(options: CsvOptions) -> Self {
        CsvDecoder { options }
    }
}

impl Default for CsvDecoder {
    fn default() -> Self {
        Self::new(CsvOptions::default())
    }
}

impl Decoder for CsvDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<TabularDocument, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::EmptyInput);
        }

        let text = decode_text(bytes);
        let delimiter = match self.options.delimiter {
            DelimiterMode::Auto => sniff_delimiter(&text, self.options.quote_char),
            DelimiterMode::Fixed(d) => d,
        };
        debug!(delimiter = %(delimiter as char).escape_debug(), "parsing CSV");

        let records =
            CsvParser::new(delimiter, self.options.quote_char).parse_records(&text)?;
        let infer = self.options.infer_numbers;
        let rows = records
            .into_iter()
            .map(|record| {
                record
                    .into_iter()
                    .map(|field| field_to_cell(field, infer))
                    .collect()
            })
            .collect();

        let doc = TabularDocument::new(rows);
        if doc.is_empty() {
            return Err(DecodeError::NoPopulatedCells);
        }
        Ok(doc)
    }
}

fn field_to_cell(field: String, infer_numbers: bool) -> CellValue {
    if infer_numbers {
        if let Some(n) = parse_canonical_number(&field) {
            return CellValue::Number(n);
        }
    }
    CellValue::text(field)
}

/// Strip a UTF-8 BOM; fall back to Windows-1252 for non-UTF-8 input
fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(e) => {
            warn!(
                valid_up_to = e.valid_up_to(),
                "CSV is not valid UTF-8, decoding as Windows-1252"
            );
            let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
            text
        }
    }
}

/// Pick the delimiter from the first record.
///
/// A comma outside quotes wins outright. Otherwise the more frequent of
/// semicolon and tab is used; a tie (including none at all) means comma.
pub fn sniff_delimiter(text: &str, quote_char: u8) -> u8 {
    let quote = quote_char as char;
    let (mut commas, mut semicolons, mut tabs) = (0usize, 0usize, 0usize);
    let mut in_quotes = false;

    for ch in text.chars() {
        match ch {
            c if c == quote => in_quotes = !in_quotes,
            '\n' | '\r' if !in_quotes => break,
            ',' if !in_quotes => commas += 1,
            ';' if !in_quotes => semicolons += 1,
            '\t' if !in_quotes => tabs += 1,
            _ => {}
        }
    }

    if commas > 0 {
        return b',';
    }
    match semicolons.cmp(&tabs) {
        std::cmp::Ordering::Greater => b';',
        std::cmp::Ordering::Less => b'\t',
        std::cmp::Ordering::Equal => b',',
    }
}
