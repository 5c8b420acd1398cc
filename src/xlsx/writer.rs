//! In-memory XLSX writer
//!
//! Builds a single-sheet workbook straight into a `Vec<u8>` through
//! `s_zip::StreamingZipWriter`. Text cells go into a deduplicated shared
//! strings table, numbers are written as typed `<v>` values and blank cells
//! are left out entirely.

use super::{encode_ooxml_text, XlsxOptions, MAX_COLUMNS, MAX_ROWS};
use crate::codec::Encoder;
use crate::error::EncodeError;
use crate::types::{cell_reference, format_number, CellValue, TabularDocument};
use indexmap::IndexSet;
use s_zip::StreamingZipWriter;
use std::io::{Seek, SeekFrom, Write};
use tracing::debug;

/// In-memory buffer that implements Write + Seek traits
struct MemoryBuffer {
    buffer: Vec<u8>,
    position: u64,
}

impl MemoryBuffer {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            position: 0,
        }
    }

    fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

impl Write for MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let pos = self.position as usize;
        let end_pos = pos + buf.len();

        if end_pos > self.buffer.len() {
            self.buffer.resize(end_pos, 0);
        }

        self.buffer[pos..end_pos].copy_from_slice(buf);
        self.position = end_pos as u64;

        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryBuffer {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.buffer.len() as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };

        if new_pos < 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Invalid seek position",
            ));
        }

        self.position = new_pos as u64;
        Ok(self.position)
    }
}

/// Encodes a document as a single-sheet XLSX workbook
pub struct XlsxEncoder {
    options: XlsxOptions,
}

impl XlsxEncoder {
    pub fn new(options: XlsxOptions) -> Self {
        XlsxEncoder { options }
    }
}

impl Default for XlsxEncoder {
    fn default() -> Self {
        Self::new(XlsxOptions::default())
    }
}

impl Encoder for XlsxEncoder {
    fn encode(&self, doc: &TabularDocument) -> Result<Vec<u8>, EncodeError> {
        if doc.row_count() as u64 > MAX_ROWS as u64 || doc.column_count() as u64 > MAX_COLUMNS as u64
        {
            return Err(EncodeError::Archive(format!(
                "{} x {} cells do not fit in a worksheet",
                doc.row_count(),
                doc.column_count()
            )));
        }

        let mut strings = IndexSet::new();
        let sheet_xml = write_sheet(doc, &mut strings);
        debug!(
            rows = doc.row_count(),
            columns = doc.column_count(),
            shared_strings = strings.len(),
            "writing workbook"
        );

        let capacity = sheet_xml.len() / 4 + 4096;
        let mut package = Package::new(capacity, self.options.compression_level)?;
        package.write_part("[Content_Types].xml", CONTENT_TYPES.as_bytes())?;
        package.write_part("_rels/.rels", ROOT_RELS.as_bytes())?;
        package.write_part("docProps/app.xml", APP_PROPS.as_bytes())?;
        package.write_part("docProps/core.xml", core_props().as_bytes())?;
        package.write_part(
            "xl/workbook.xml",
            workbook_xml(&self.options.sheet_name).as_bytes(),
        )?;
        package.write_part("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.as_bytes())?;
        package.write_part("xl/styles.xml", STYLES.as_bytes())?;
        package.write_part("xl/worksheets/sheet1.xml", &sheet_xml)?;
        package.write_part(
            "xl/sharedStrings.xml",
            &shared_strings_xml(&strings, count_text_cells(doc)),
        )?;
        package.finish()
    }
}

/// Thin wrapper mapping `s_zip` failures into [`EncodeError`]
struct Package {
    zip: StreamingZipWriter<MemoryBuffer>,
}

impl Package {
    fn new(capacity: usize, compression_level: u32) -> Result<Self, EncodeError> {
        let zip = StreamingZipWriter::from_writer_with_compression(
            MemoryBuffer::with_capacity(capacity),
            compression_level.min(9),
        )
        .map_err(archive_error)?;
        Ok(Package { zip })
    }

    fn write_part(&mut self, name: &str, data: &[u8]) -> Result<(), EncodeError> {
        self.zip.start_entry(name).map_err(archive_error)?;
        self.zip.write_data(data).map_err(archive_error)?;
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, EncodeError> {
        let buffer = self.zip.finish().map_err(archive_error)?;
        Ok(buffer.into_inner())
    }
}

fn archive_error(e: impl std::fmt::Display) -> EncodeError {
    EncodeError::Archive(e.to_string())
}

/// Worksheet XML. Text is interned into `strings` as it is met.
fn write_sheet(doc: &TabularDocument, strings: &mut IndexSet<String>) -> Vec<u8> {
    let mut xml = Vec::with_capacity(doc.row_count() * doc.column_count() * 24 + 512);
    let mut row_buf = itoa::Buffer::new();
    let mut index_buf = itoa::Buffer::new();

    xml.extend_from_slice(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<dimension ref=""#,
    );
    xml.extend_from_slice(dimension(doc).as_bytes());
    xml.extend_from_slice(b"\"/>\n<sheetData>");

    for (row_idx, row) in doc.rows().iter().enumerate() {
        if row.iter().all(CellValue::is_blank) {
            continue;
        }

        xml.extend_from_slice(b"<row r=\"");
        xml.extend_from_slice(row_buf.format(row_idx + 1).as_bytes());
        xml.extend_from_slice(b"\">");

        for (col_idx, value) in row.iter().enumerate() {
            match value {
                CellValue::Blank => {}
                CellValue::Number(n) => {
                    xml.extend_from_slice(b"<c r=\"");
                    xml.extend_from_slice(cell_reference(row_idx as u32, col_idx as u32).as_bytes());
                    xml.extend_from_slice(b"\"><v>");
                    xml.extend_from_slice(format_number(*n).as_bytes());
                    xml.extend_from_slice(b"</v></c>");
                }
                CellValue::Text(s) => {
                    let (index, _) = strings.insert_full(s.clone());
                    xml.extend_from_slice(b"<c r=\"");
                    xml.extend_from_slice(cell_reference(row_idx as u32, col_idx as u32).as_bytes());
                    xml.extend_from_slice(b"\" t=\"s\"><v>");
                    xml.extend_from_slice(index_buf.format(index).as_bytes());
                    xml.extend_from_slice(b"</v></c>");
                }
            }
        }

        xml.extend_from_slice(b"</row>");
    }

    xml.extend_from_slice(b"</sheetData>\n</worksheet>");
    xml
}

/// `A1` for a single cell, `A1:C20` otherwise
fn dimension(doc: &TabularDocument) -> String {
    if doc.row_count() == 0 || doc.column_count() == 0 {
        return "A1".to_string();
    }
    let last = cell_reference(doc.row_count() as u32 - 1, doc.column_count() as u32 - 1);
    if last == "A1" {
        last
    } else {
        format!("A1:{}", last)
    }
}

fn count_text_cells(doc: &TabularDocument) -> usize {
    doc.rows()
        .iter()
        .flatten()
        .filter(|v| matches!(v, CellValue::Text(_)))
        .count()
}

fn shared_strings_xml(strings: &IndexSet<String>, count: usize) -> Vec<u8> {
    let mut xml = Vec::with_capacity(strings.iter().map(|s| s.len() + 16).sum::<usize>() + 256);
    xml.extend_from_slice(
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{}" uniqueCount="{}">"#,
            count,
            strings.len()
        )
        .as_bytes(),
    );

    for s in strings {
        let text = encode_ooxml_text(s);
        if text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) {
            xml.extend_from_slice(b"<si><t xml:space=\"preserve\">");
        } else {
            xml.extend_from_slice(b"<si><t>");
        }
        write_escaped(&mut xml, &text);
        xml.extend_from_slice(b"</t></si>");
    }

    xml.extend_from_slice(b"</sst>");
    xml
}

fn write_escaped(buffer: &mut Vec<u8>, s: &str) {
    for c in s.chars() {
        match c {
            '&' => buffer.extend_from_slice(b"&amp;"),
            '<' => buffer.extend_from_slice(b"&lt;"),
            '>' => buffer.extend_from_slice(b"&gt;"),
            '"' => buffer.extend_from_slice(b"&quot;"),
            '\'' => buffer.extend_from_slice(b"&apos;"),
            _ => {
                let mut buf = [0; 4];
                buffer.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
}

fn workbook_xml(sheet_name: &str) -> String {
    let mut name = Vec::new();
    write_escaped(&mut name, sheet_name);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets>
<sheet name="{}" sheetId="1" r:id="rId1"/>
</sheets>
</workbook>"#,
        String::from_utf8_lossy(&name)
    )
}

fn core_props() -> String {
    let created = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:dcmitype="http://purl.org/dc/dcmitype/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
<dc:creator>tabconv</dc:creator>
<dcterms:created xsi:type="dcterms:W3CDTF">{created}</dcterms:created>
<dcterms:modified xsi:type="dcterms:W3CDTF">{created}</dcterms:modified>
</cp:coreProperties>"#
    )
}

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
<Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
<Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>
<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>
</Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#;

const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
</Relationships>"#;

const APP_PROPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
<Application>tabconv</Application>
</Properties>"#;

const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<fonts count="1">
<font><sz val="11"/><name val="Calibri"/></font>
</fonts>
<fills count="2">
<fill><patternFill patternType="none"/></fill>
<fill><patternFill patternType="gray125"/></fill>
</fills>
<borders count="1">
<border><left/><right/><top/><bottom/><diagonal/></border>
</borders>
<cellStyleXfs count="1">
<xf numFmtId="0" fontId="0" fillId="0" borderId="0"/>
</cellStyleXfs>
<cellXfs count="1">
<xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/>
</cellXfs>
</styleSheet>"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Decoder;
    use crate::xlsx::XlsxDecoder;
    use std::io::{Cursor, Read};

    fn sample() -> TabularDocument {
        TabularDocument::new(vec![
            vec![CellValue::from("name"), CellValue::from("age")],
            vec![CellValue::from("Smith, John"), CellValue::Number(40.0)],
            vec![CellValue::Blank, CellValue::Blank],
            vec![CellValue::from("name"), CellValue::Number(2.5)],
        ])
    }

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut xml = String::new();
        archive
            .by_name(name)
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    #[test]
    fn test_package_parts() {
        let bytes = XlsxEncoder::default().encode(&sample()).unwrap();
        assert!(bytes.starts_with(b"PK"));

        let archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "docProps/core.xml",
            "docProps/app.xml",
            "xl/workbook.xml",
            "xl/_rels/workbook.xml.rels",
            "xl/styles.xml",
            "xl/worksheets/sheet1.xml",
            "xl/sharedStrings.xml",
        ] {
            assert!(names.contains(&part), "missing {}", part);
        }

        assert!(read_entry(&bytes, "docProps/core.xml").contains("<dcterms:created"));
        assert!(read_entry(&bytes, "xl/workbook.xml").contains(r#"name="Sheet1""#));
    }

    #[test]
    fn test_sheet_xml() {
        let bytes = XlsxEncoder::default().encode(&sample()).unwrap();
        let sheet = read_entry(&bytes, "xl/worksheets/sheet1.xml");

        assert!(sheet.contains(r#"<dimension ref="A1:B4"/>"#));
        assert!(sheet.contains(r#"<c r="B2"><v>40</v></c>"#));
        assert!(sheet.contains(r#"<c r="A4" t="s"><v>0</v></c>"#));
        assert!(!sheet.contains(r#"<row r="3""#));

        let sst = read_entry(&bytes, "xl/sharedStrings.xml");
        assert!(sst.contains(r#"count="4" uniqueCount="3""#));
        assert!(sst.contains("<si><t>Smith, John</t></si>"));
    }

    #[test]
    fn test_text_escaping() {
        let doc = TabularDocument::new(vec![vec![
            CellValue::from("a < b & \"c\""),
            CellValue::from(" padded "),
            CellValue::from("line\r\nbreak"),
        ]]);
        let bytes = XlsxEncoder::default().encode(&doc).unwrap();
        let sst = read_entry(&bytes, "xl/sharedStrings.xml");

        assert!(sst.contains("a &lt; b &amp; &quot;c&quot;"));
        assert!(sst.contains(r#"<t xml:space="preserve"> padded </t>"#));
        assert!(sst.contains("line_x000D_\nbreak"));

        let back = XlsxDecoder::default().decode(&bytes).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_custom_sheet_name() {
        let options = XlsxOptions::new().with_sheet_name("Q1 & Q2");
        let bytes = XlsxEncoder::new(options).encode(&sample()).unwrap();
        assert!(read_entry(&bytes, "xl/workbook.xml").contains(r#"name="Q1 &amp; Q2""#));
    }

    #[test]
    fn test_round_trip_through_decoder() {
        let doc = sample();
        let bytes = XlsxEncoder::default().encode(&doc).unwrap();
        assert_eq!(XlsxDecoder::default().decode(&bytes).unwrap(), doc);
    }

    #[test]
    fn test_dimension() {
        let single = TabularDocument::new(vec![vec![CellValue::Number(1.0)]]);
        assert_eq!(dimension(&single), "A1");
        assert_eq!(dimension(&sample()), "A1:B4");
    }
}
