//! CSV encoding with RFC 4180-like behavior

use crate::codec::Encoder;
use crate::error::EncodeError;
use crate::types::{CellValue, TabularDocument};

/// Delimiters a reader may sniff from the first record
const SNIFFED_DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

/// CSV encoder for writing properly formatted CSV data
pub struct CsvEncoder {
    delimiter: u8,
    quote_char: u8,
}

impl CsvEncoder {
    /// Create a new CSV encoder with custom delimiter and quote character
    pub fn new(delimiter: u8, quote_char: u8) -> Self {
        Self {
            delimiter,
            quote_char,
        }
    }

    /// Encode entire row into buffer
    pub fn encode_row(&self, fields: &[&str], buffer: &mut Vec<u8>) {
        self.encode_fields(fields, false, buffer);
    }

    /// Encode the first row. Any field holding a sniffable delimiter is
    /// quoted so a reader detecting the delimiter only sees the real one.
    pub fn encode_header_row(&self, fields: &[&str], buffer: &mut Vec<u8>) {
        self.encode_fields(fields, true, buffer);
    }

    fn encode_fields(&self, fields: &[&str], header: bool, buffer: &mut Vec<u8>) {
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                buffer.push(self.delimiter);
            }
            let quote = self.needs_quoting(field)
                || (header && field.bytes().any(|b| SNIFFED_DELIMITERS.contains(&b)));
            self.encode_field(field, quote, buffer);
        }
    }

    /// Encode single field with proper quoting/escaping
    fn encode_field(&self, field: &str, quote: bool, buffer: &mut Vec<u8>) {
        if quote {
            buffer.push(self.quote_char);
            for byte in field.bytes() {
                if byte == self.quote_char {
                    // " -> ""
                    buffer.push(self.quote_char);
                    buffer.push(self.quote_char);
                } else {
                    buffer.push(byte);
                }
            }
            buffer.push(self.quote_char);
        } else {
            buffer.extend_from_slice(field.as_bytes());
        }
    }

    /// Check if field requires quoting
    fn needs_quoting(&self, field: &str) -> bool {
        field
            .bytes()
            .any(|b| b == self.delimiter || b == self.quote_char || b == b'\n' || b == b'\r')
    }
}

impl Encoder for CsvEncoder {
    /// One line per row, `\n`-terminated, every row padded to the full width
    fn encode(&self, doc: &TabularDocument) -> Result<Vec<u8>, EncodeError> {
        let mut buffer = Vec::with_capacity(doc.row_count() * doc.column_count() * 8);
        let mut fields: Vec<String> = Vec::with_capacity(doc.column_count());

        for (i, row) in doc.rows().iter().enumerate() {
            fields.clear();
            fields.extend(row.iter().map(CellValue::as_string));
            let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
            self.encode_fields(&refs, i == 0, &mut buffer);
            buffer.push(b'\n');
        }

        Ok(buffer)
    }
}
