//! # tabconv
//!
//! In-memory conversion between CSV, Excel (`.xlsx`) and JSON.
//!
//! A conversion decodes the whole source into a [`TabularDocument`], a
//! rectangular grid anchored at A1, then encodes that grid into the target
//! format. Excel input is read from its first worksheet only.
//!
//! ## Quick Start
//!
//! ```
//! use tabconv::{ConversionSession, Converter, SourceFile, StateKind, TabularFormat};
//!
//! let mut session = ConversionSession::new(Converter::new(TabularFormat::Xlsx));
//! session.select_file(SourceFile::new(
//!     "people.csv",
//!     b"name,age\n\"Smith, John\",40\n".to_vec(),
//! ))?;
//!
//! assert_eq!(session.convert()?, StateKind::Completed);
//! let result = session.result().unwrap();
//! assert_eq!(result.file_name(), "people.xlsx");
//! assert_eq!((result.rows(), result.columns()), (2, 2));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! The codecs can also be used directly through the [`Decoder`] and
//! [`Encoder`] traits:
//!
//! ```
//! use tabconv::{CsvDecoder, Decoder, Encoder, JsonEncoder};
//!
//! let doc = CsvDecoder::default().decode(b"id;total\n1;2.5\n")?;
//! let json = JsonEncoder::default().encode(&doc)?;
//! assert_eq!(json, br#"[{"id":1,"total":2.5}]"#);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod codec;
pub mod csv;
pub mod error;
pub mod format;
pub mod intake;
pub mod json;
pub mod package;
pub mod pipeline;
pub mod types;
pub mod xlsx;

pub use codec::{ConvertOptions, Decoder, Encoder};
pub use csv::{CsvDecoder, CsvEncoder, CsvOptions, DelimiterMode};
pub use error::{ConvertError, DecodeError, EncodeError, Result, ValidationError};
pub use format::TabularFormat;
pub use intake::{IntakePolicy, SourceFile};
pub use json::{JsonDecoder, JsonEncoder, JsonLayout, JsonOptions};
pub use package::{derive_file_name, ConversionResult};
pub use pipeline::{ConversionSession, ConversionState, Converter, StateKind};
pub use types::{CellValue, TabularDocument};
pub use xlsx::{XlsxDecoder, XlsxEncoder, XlsxOptions};
