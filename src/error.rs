//! Error types for the conversion pipeline
//!
//! Each pipeline stage has its own error enum so callers can tell a rejected
//! file (`ValidationError`) apart from a file that failed to parse
//! (`DecodeError`). `ConvertError` is what crosses the pipeline boundary.

use thiserror::Error;

/// The selected file violates the intake policy; raised before any decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// File is larger than the configured limit
    #[error("file is {size} bytes, which exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    /// File type is not one of the accepted formats
    #[error("unsupported file type for '{name}': expected {expected}")]
    UnsupportedType { name: String, expected: String },
}

/// Source bytes could not be turned into a tabular document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("file is empty")]
    EmptyInput,

    /// Quoted CSV field never closed; `line` is where the field started (1-based)
    #[error("unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },

    #[error("not a valid spreadsheet: {0}")]
    NotASpreadsheet(String),

    #[error("workbook part missing: {0}")]
    MissingPart(String),

    #[error("malformed workbook XML: {0}")]
    MalformedXml(String),

    #[error("workbook contains no sheets")]
    NoSheets,

    /// Archive entry count or part size over the configured limits
    #[error("workbook exceeds limits: {0}")]
    LimitExceeded(String),

    #[error("invalid JSON table: {0}")]
    InvalidJson(String),

    #[error("no populated cells found")]
    NoPopulatedCells,
}

/// Encoding failed. Documents produced by a decoder always encode, so this
/// only surfaces on an internal writer failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("failed to assemble workbook archive: {0}")]
    Archive(String),

    #[error("failed to serialize JSON: {0}")]
    Json(String),
}

/// Error returned at the pipeline boundary
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("conversion failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("conversion failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("no file selected")]
    NoFileSelected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, ConvertError>;
