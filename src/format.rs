//! Supported tabular file formats

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// OOXML spreadsheet media type
pub const XLSX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A file format the pipeline can decode from and encode to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabularFormat {
    Csv,
    Xlsx,
    Json,
}

impl TabularFormat {
    pub const ALL: [TabularFormat; 3] =
        [TabularFormat::Csv, TabularFormat::Xlsx, TabularFormat::Json];

    /// Extension written on output files
    pub fn extension(&self) -> &'static str {
        match self {
            TabularFormat::Csv => "csv",
            TabularFormat::Xlsx => "xlsx",
            TabularFormat::Json => "json",
        }
    }

    /// Extensions recognized on input files (lowercase)
    pub fn known_extensions(&self) -> &'static [&'static str] {
        match self {
            TabularFormat::Csv => &["csv", "tsv", "txt"],
            TabularFormat::Xlsx => &["xlsx", "xlsm"],
            TabularFormat::Json => &["json"],
        }
    }

    /// Media type of encoded output
    pub fn media_type(&self) -> &'static str {
        match self {
            TabularFormat::Csv => "text/csv;charset=utf-8",
            TabularFormat::Xlsx => XLSX_MEDIA_TYPE,
            TabularFormat::Json => "application/json",
        }
    }

    /// Resolve a format from a file name's extension (case-insensitive)
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (_, ext) = name.rsplit_once('.')?;
        Self::ALL.into_iter().find(|f| {
            f.known_extensions()
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
    }

    /// Resolve a format from a declared media type, ignoring parameters
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "text/csv" | "text/tab-separated-values" | "application/csv" => {
                Some(TabularFormat::Csv)
            }
            XLSX_MEDIA_TYPE | "application/vnd.ms-excel.sheet.macroenabled.12" => {
                Some(TabularFormat::Xlsx)
            }
            "application/json" | "text/json" => Some(TabularFormat::Json),
            _ => None,
        }
    }
}

impl fmt::Display for TabularFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TabularFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(TabularFormat::Csv),
            "xlsx" | "excel" => Ok(TabularFormat::Xlsx),
            "json" => Ok(TabularFormat::Json),
            other => Err(format!("unknown format '{}'", other)),
        }
    }
}
