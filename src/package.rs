//! Packaging encoded bytes into a downloadable result

use crate::error::Result;
use crate::format::TabularFormat;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Output file name: the source name with its extension swapped for the
/// target's. An unrecognized extension is kept and the target appended.
///
/// ```
/// use tabconv::{derive_file_name, TabularFormat};
///
/// let name = derive_file_name("report.CSV", TabularFormat::Csv, TabularFormat::Xlsx);
/// assert_eq!(name, "report.xlsx");
/// ```
pub fn derive_file_name(
    source_name: &str,
    source_format: TabularFormat,
    target_format: TabularFormat,
) -> String {
    let base = match source_name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && source_format
                    .known_extensions()
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known)) =>
        {
            stem
        }
        _ => source_name,
    };
    format!("{}.{}", base, target_format.extension())
}

/// Result of one successful conversion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult {
    #[serde(skip)]
    bytes: Vec<u8>,
    file_name: String,
    media_type: &'static str,
    format: TabularFormat,
    rows: usize,
    columns: usize,
    byte_size: usize,
}

impl ConversionResult {
    pub fn new(
        bytes: Vec<u8>,
        file_name: String,
        format: TabularFormat,
        rows: usize,
        columns: usize,
    ) -> Self {
        ConversionResult {
            byte_size: bytes.len(),
            bytes,
            file_name,
            media_type: format.media_type(),
            format,
            rows,
            columns,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn media_type(&self) -> &'static str {
        self.media_type
    }

    pub fn format(&self) -> TabularFormat {
        self.format
    }

    /// Rows in the converted extent
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Columns in the converted extent
    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Write the bytes to `dir/<file_name>` and return the full path
    pub fn save_in<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let path = dir.as_ref().join(&self.file_name);
        fs::write(&path, &self.bytes)?;
        info!(path = %path.display(), bytes = self.byte_size, "saved conversion result");
        Ok(path)
    }

    /// Write the bytes to any sink
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.bytes)?;
        writer.flush()?;
        Ok(())
    }
}
