//! Source file acquisition and validation

use crate::error::{Result, ValidationError};
use crate::format::TabularFormat;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Default upload limit: 10 MiB
pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// A file picked for conversion, held fully in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// File name as shown to the user, including the extension
    pub name: String,
    /// Declared media type, if the source supplied one
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new<S: Into<String>>(name: S, bytes: Vec<u8>) -> Self {
        SourceFile {
            name: name.into(),
            media_type: None,
            bytes,
        }
    }

    pub fn with_media_type<S: Into<String>>(mut self, media_type: S) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// Read a file from disk. The name is the path's final component.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        Ok(Self::from_disk(path, bytes))
    }

    /// Read a file from disk, refusing it before reading if it is larger
    /// than `max_bytes`.
    pub fn open_with_limit<P: AsRef<Path>>(path: P, max_bytes: u64) -> Result<Self> {
        let path = path.as_ref();
        let size = fs::metadata(path)?.len();
        if size > max_bytes {
            return Err(ValidationError::TooLarge {
                size,
                limit: max_bytes,
            }
            .into());
        }

        // The file may grow between the metadata call and the read
        let mut bytes = Vec::with_capacity(size as usize);
        File::open(path)?
            .take(max_bytes.saturating_add(1))
            .read_to_end(&mut bytes)?;
        if bytes.len() as u64 > max_bytes {
            return Err(ValidationError::TooLarge {
                size: bytes.len() as u64,
                limit: max_bytes,
            }
            .into());
        }
        Ok(Self::from_disk(path, bytes))
    }

    fn from_disk(path: &Path, bytes: Vec<u8>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        debug!(name = %name, bytes = bytes.len(), "opened source file");
        Self::new(name, bytes)
    }

    /// Size in bytes
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// What a converter accepts
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IntakePolicy {
    pub max_bytes: u64,
    pub accepted: Vec<TabularFormat>,
}

impl Default for IntakePolicy {
    fn default() -> Self {
        IntakePolicy {
            max_bytes: DEFAULT_MAX_BYTES,
            accepted: TabularFormat::ALL.to_vec(),
        }
    }
}

impl IntakePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy accepting only `formats`
    pub fn accepting(formats: &[TabularFormat]) -> Self {
        Self::default().with_accepted(formats)
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_accepted(mut self, formats: &[TabularFormat]) -> Self {
        self.accepted = formats.to_vec();
        self
    }

    /// Read `path` from disk, enforcing the size limit before reading
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<SourceFile> {
        SourceFile::open_with_limit(path, self.max_bytes)
    }

    /// Check `file` against this policy and resolve its format.
    ///
    /// Size is checked first, then the format: the file extension wins,
    /// the declared media type is the fallback.
    pub fn validate(&self, file: &SourceFile) -> std::result::Result<TabularFormat, ValidationError> {
        if file.size() > self.max_bytes {
            return Err(ValidationError::TooLarge {
                size: file.size(),
                limit: self.max_bytes,
            });
        }

        TabularFormat::from_file_name(&file.name)
            .or_else(|| file.media_type.as_deref().and_then(TabularFormat::from_media_type))
            .filter(|format| self.accepted.contains(format))
            .ok_or_else(|| ValidationError::UnsupportedType {
                name: file.name.clone(),
                expected: self.expected_extensions(),
            })
    }

    /// Accepted extensions for messages, e.g. `.csv, .tsv, .txt`
    pub fn expected_extensions(&self) -> String {
        self.accepted
            .iter()
            .flat_map(|f| f.known_extensions())
            .map(|ext| format!(".{}", ext))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConvertError;
    use std::io::Write;

    #[test]
    fn test_default_policy() {
        let policy = IntakePolicy::default();
        assert_eq!(policy.max_bytes, 10_485_760);
        assert_eq!(policy.accepted.len(), 3);
    }

    #[test]
    fn test_size_checked_first() {
        let policy = IntakePolicy::accepting(&[TabularFormat::Csv]).with_max_bytes(4);
        let file = SourceFile::new("photo.png", vec![0; 5]);
        assert_eq!(
            policy.validate(&file),
            Err(ValidationError::TooLarge { size: 5, limit: 4 })
        );
    }

    #[test]
    fn test_exact_limit_is_accepted() {
        let policy = IntakePolicy::new().with_max_bytes(4);
        let file = SourceFile::new("a.csv", b"a,b\n".to_vec());
        assert_eq!(policy.validate(&file), Ok(TabularFormat::Csv));
    }

    #[test]
    fn test_extension_then_media_type() {
        let policy = IntakePolicy::new();
        let by_ext = SourceFile::new("Book1.XLSX", vec![1]);
        assert_eq!(policy.validate(&by_ext), Ok(TabularFormat::Xlsx));

        let by_media = SourceFile::new("upload", vec![1]).with_media_type("text/csv; charset=utf-8");
        assert_eq!(policy.validate(&by_media), Ok(TabularFormat::Csv));

        let neither = SourceFile::new("upload", vec![1]);
        assert!(matches!(
            policy.validate(&neither),
            Err(ValidationError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_format_not_accepted() {
        let policy = IntakePolicy::accepting(&[TabularFormat::Xlsx]);
        let err = policy
            .validate(&SourceFile::new("data.csv", vec![1]))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedType {
                name: "data.csv".to_string(),
                expected: ".xlsx, .xlsm".to_string(),
            }
        );
    }

    #[test]
    fn test_open_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"name\nAnn\n").unwrap();

        let file = SourceFile::open(&path).unwrap();
        assert_eq!(file.name, "people.csv");
        assert_eq!(file.size(), 9);
        assert!(file.media_type.is_none());
    }

    #[test]
    fn test_open_refuses_oversize_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.csv");
        std::fs::write(&path, vec![b'a'; 64]).unwrap();

        let policy = IntakePolicy::new().with_max_bytes(16);
        assert!(matches!(
            policy.open(&path),
            Err(ConvertError::Validation(ValidationError::TooLarge {
                size: 64,
                limit: 16
            }))
        ));

        let file = IntakePolicy::new().with_max_bytes(64).open(&path).unwrap();
        assert_eq!(file.name, "big.csv");
        assert_eq!(file.size(), 64);
    }
}
