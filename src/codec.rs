//! Decoder/encoder seam between the pipeline and the format libraries
//!
//! The pipeline only ever sees "bytes -> [`TabularDocument`]" and
//! "[`TabularDocument`] -> bytes"; everything format specific lives behind
//! these two traits.

use crate::csv::{CsvDecoder, CsvOptions};
use crate::error::{DecodeError, EncodeError};
use crate::format::TabularFormat;
use crate::json::{JsonDecoder, JsonEncoder, JsonOptions};
use crate::types::TabularDocument;
use crate::xlsx::{XlsxDecoder, XlsxEncoder, XlsxOptions};
use serde::Deserialize;

/// Parses a whole source payload into a document
pub trait Decoder {
    fn decode(&self, bytes: &[u8]) -> Result<TabularDocument, DecodeError>;
}

/// Serializes a document into the target format's bytes
pub trait Encoder {
    fn encode(&self, doc: &TabularDocument) -> Result<Vec<u8>, EncodeError>;
}

/// Per-format codec options
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    pub csv: CsvOptions,
    pub xlsx: XlsxOptions,
    pub json: JsonOptions,
}

impl ConvertOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_csv(mut self, csv: CsvOptions) -> Self {
        self.csv = csv;
        self
    }

    pub fn with_xlsx(mut self, xlsx: XlsxOptions) -> Self {
        self.xlsx = xlsx;
        self
    }

    pub fn with_json(mut self, json: JsonOptions) -> Self {
        self.json = json;
        self
    }

    /// Decoder for `format`
    pub fn decoder(&self, format: TabularFormat) -> Box<dyn Decoder> {
        match format {
            TabularFormat::Csv => Box::new(CsvDecoder::new(self.csv.clone())),
            TabularFormat::Xlsx => Box::new(XlsxDecoder::new(self.xlsx.clone())),
            TabularFormat::Json => Box::new(JsonDecoder::new()),
        }
    }

    /// Encoder for `format`
    pub fn encoder(&self, format: TabularFormat) -> Box<dyn Encoder> {
        match format {
            TabularFormat::Csv => Box::new(self.csv.encoder()),
            TabularFormat::Xlsx => Box::new(XlsxEncoder::new(self.xlsx.clone())),
            TabularFormat::Json => Box::new(JsonEncoder::new(self.json.clone())),
        }
    }
}
