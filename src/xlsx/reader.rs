//! First-sheet reader for XLSX workbooks
//!
//! **What is read:**
//! - `xl/workbook.xml` for the sheet order, `xl/_rels/workbook.xml.rels` to
//!   find the first sheet's part and the shared strings part
//! - Shared Strings Table (SST), loaded fully because cells reference it by index
//! - The first worksheet's XML; every other sheet is ignored
//!
//! Styles are not parsed, so date-formatted cells come through as their
//! serial numbers. Formula cells yield their cached value.

use super::{decode_ooxml_text, XlsxOptions, MAX_COLUMNS, MAX_ROWS};
use crate::codec::Decoder;
use crate::error::DecodeError;
use crate::types::{parse_cell_reference, CellValue, TabularDocument};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use tracing::debug;
use zip::result::ZipError;
use zip::ZipArchive;

const OLE_SIGNATURE: [u8; 4] = [0xD0, 0xCF, 0x11, 0xE0];
const ZIP_SIGNATURE: [u8; 2] = *b"PK";

const WORKBOOK_PATH: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PATH: &str = "xl/_rels/workbook.xml.rels";
const DEFAULT_SST_PATH: &str = "xl/sharedStrings.xml";

/// Decodes the first worksheet of an XLSX workbook
pub struct XlsxDecoder {
    options: XlsxOptions,
}

impl XlsxDecoder {
    pub fn new(options: XlsxOptions) -> Self {
        XlsxDecoder { options }
    }
}

impl Default for XlsxDecoder {
    fn default() -> Self {
        Self::new(XlsxOptions::default())
    }
}

impl Decoder for XlsxDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<TabularDocument, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::EmptyInput);
        }
        if bytes.starts_with(&OLE_SIGNATURE) {
            return Err(DecodeError::NotASpreadsheet(
                "legacy .xls workbooks are not supported".to_string(),
            ));
        }
        if !bytes.starts_with(&ZIP_SIGNATURE) {
            return Err(DecodeError::NotASpreadsheet(
                "missing ZIP signature".to_string(),
            ));
        }

        let mut package = Package::open(bytes, &self.options)?;

        let relationships = parse_relationships(&package.read_part(WORKBOOK_RELS_PATH)?, "xl")?;
        let sheets = parse_sheet_list(&package.read_part(WORKBOOK_PATH)?)?;
        let (sheet_name, sheet_rid) = sheets.first().ok_or(DecodeError::NoSheets)?;
        if sheets.len() > 1 {
            debug!(ignored = sheets.len() - 1, "reading first sheet only");
        }

        let sheet_path = relationships
            .get(sheet_rid)
            .map(|rel| rel.target.clone())
            .ok_or_else(|| {
                DecodeError::MissingPart(format!(
                    "relationship '{}' for sheet '{}'",
                    sheet_rid, sheet_name
                ))
            })?;

        let sst_path = relationships
            .values()
            .find(|rel| rel.kind.ends_with("/sharedStrings"))
            .map(|rel| rel.target.as_str())
            .unwrap_or(DEFAULT_SST_PATH)
            .to_string();
        let sst = match package.read_optional(&sst_path)? {
            Some(xml) => load_shared_strings(&xml)?,
            None => Vec::new(), // No SST = all cells are inline
        };
        debug!(sheet = %sheet_name, path = %sheet_path, shared_strings = sst.len(), "reading worksheet");

        let cells = parse_sheet(&package.read_part(&sheet_path)?, &sst)?;
        check_extent(&cells, self.options.max_cells)?;

        let doc = TabularDocument::from_cells(cells);
        if doc.is_empty() {
            return Err(DecodeError::NoPopulatedCells);
        }
        Ok(doc)
    }
}

/// ZIP archive with per-part size limits
struct Package<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
    max_part_bytes: u64,
}

impl<'a> Package<'a> {
    fn open(bytes: &'a [u8], options: &XlsxOptions) -> Result<Self, DecodeError> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| DecodeError::NotASpreadsheet(format!("failed to read ZIP: {}", e)))?;

        if archive.len() > options.max_entries {
            return Err(DecodeError::LimitExceeded(format!(
                "{} archive entries, limit is {}",
                archive.len(),
                options.max_entries
            )));
        }

        Ok(Package {
            archive,
            max_part_bytes: options.max_part_bytes,
        })
    }

    fn read_optional(&mut self, path: &str) -> Result<Option<String>, DecodeError> {
        let limit = self.max_part_bytes;
        let mut file = match self.archive.by_name(path) {
            Ok(f) => f,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => {
                return Err(DecodeError::NotASpreadsheet(format!(
                    "failed to open {}: {}",
                    path, e
                )))
            }
        };

        let too_large =
            || DecodeError::LimitExceeded(format!("{} is larger than {} bytes", path, limit));
        if file.size() > limit {
            return Err(too_large());
        }

        // The declared size can lie, so cap the actual read as well
        let mut xml = String::new();
        (&mut file)
            .take(limit + 1)
            .read_to_string(&mut xml)
            .map_err(|e| DecodeError::MalformedXml(format!("{}: {}", path, e)))?;
        if xml.len() as u64 > limit {
            return Err(too_large());
        }

        debug!(part = path, bytes = xml.len(), "loaded part");
        Ok(Some(xml))
    }

    fn read_part(&mut self, path: &str) -> Result<String, DecodeError> {
        self.read_optional(path)?
            .ok_or_else(|| DecodeError::MissingPart(path.to_string()))
    }
}

struct Relationship {
    kind: String,
    target: String,
}

fn xml_error(part: &str, e: impl std::fmt::Display) -> DecodeError {
    DecodeError::MalformedXml(format!("{}: {}", part, e))
}

/// Value of the attribute whose local name is `name`
fn attribute(e: &BytesStart<'_>, name: &[u8], part: &str) -> Result<Option<String>, DecodeError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| xml_error(part, err))?;
        if attr.key.local_name().as_ref() == name {
            let value = attr.unescape_value().map_err(|err| xml_error(part, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Parse a relationships part, resolving targets against `base_dir`
fn parse_relationships(
    xml: &str,
    base_dir: &str,
) -> Result<HashMap<String, Relationship>, DecodeError> {
    let mut relationships = HashMap::new();
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e))
                if e.local_name().as_ref() == b"Relationship" =>
            {
                let external = attribute(&e, b"TargetMode", WORKBOOK_RELS_PATH)?
                    .is_some_and(|mode| mode == "External");
                let id = attribute(&e, b"Id", WORKBOOK_RELS_PATH)?;
                let target = attribute(&e, b"Target", WORKBOOK_RELS_PATH)?;
                if let (false, Some(id), Some(target)) = (external, id, target) {
                    let kind = attribute(&e, b"Type", WORKBOOK_RELS_PATH)?.unwrap_or_default();
                    relationships.insert(
                        id,
                        Relationship {
                            kind,
                            target: resolve_target(base_dir, &target),
                        },
                    );
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(WORKBOOK_RELS_PATH, e)),
            _ => {}
        }
    }

    Ok(relationships)
}

/// Resolve a relationship target to a path inside the archive
fn resolve_target(base_dir: &str, target: &str) -> String {
    let joined = match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{}/{}", base_dir, target),
    };

    let mut parts: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}

/// Sheets in workbook order as (name, relationship id)
fn parse_sheet_list(xml: &str) -> Result<Vec<(String, String)>, DecodeError> {
    let mut sheets = Vec::new();
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"sheet" => {
                let name = attribute(&e, b"name", WORKBOOK_PATH)?.unwrap_or_default();
                // r:id, matched on local name
                if let Some(rid) = attribute(&e, b"id", WORKBOOK_PATH)? {
                    sheets.push((name, rid));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(WORKBOOK_PATH, e)),
            _ => {}
        }
    }

    Ok(sheets)
}

/// Load the Shared Strings Table. Rich-text runs are concatenated and
/// phonetic runs (`rPh`) skipped.
fn load_shared_strings(xml: &str) -> Result<Vec<String>, DecodeError> {
    let part = DEFAULT_SST_PATH;
    let mut sst = Vec::new();
    let mut reader = Reader::from_str(xml);
    let mut current = String::new();
    let mut in_phonetic = false;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"rPh" => in_phonetic = true,
                b"t" if !in_phonetic => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => sst.push(String::new()),
            Ok(Event::Text(e)) if in_text => {
                current.push_str(&e.unescape().map_err(|err| xml_error(part, err))?);
            }
            Ok(Event::CData(e)) if in_text => {
                current.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => sst.push(decode_ooxml_text(&current)),
                b"rPh" => in_phonetic = false,
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(part, e)),
            _ => {}
        }
    }

    Ok(sst)
}

/// Cell being assembled while its children are read
struct PendingCell {
    row: u32,
    col: u32,
    kind: Option<String>,
    value: String,
}

/// Parse worksheet XML into sparse (row, col, value) cells
fn parse_sheet(xml: &str, sst: &[String]) -> Result<Vec<(u32, u32, CellValue)>, DecodeError> {
    let part = "worksheet";
    let mut cells = Vec::new();
    let mut reader = Reader::from_str(xml);

    let mut current_row = 0u32;
    let mut next_row = 0u32;
    let mut next_col = 0u32;
    let mut pending: Option<PendingCell> = None;
    let mut in_value = false;
    let mut in_inline = false;
    let mut in_phonetic = false;
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    current_row = row_index(&e, next_row, part)?;
                    next_row = current_row + 1;
                    next_col = 0;
                }
                b"c" => {
                    let (row, col) = cell_position(&e, current_row, next_col, part)?;
                    next_col = col + 1;
                    pending = Some(PendingCell {
                        row,
                        col,
                        kind: attribute(&e, b"t", part)?,
                        value: String::new(),
                    });
                }
                b"v" => in_value = true,
                b"is" => in_inline = true,
                b"rPh" => in_phonetic = true,
                b"t" if in_inline && !in_phonetic => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"row" => {
                    current_row = row_index(&e, next_row, part)?;
                    next_row = current_row + 1;
                    next_col = 0;
                }
                b"c" => {
                    let (_, col) = cell_position(&e, current_row, next_col, part)?;
                    next_col = col + 1;
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_value || in_text => {
                if let Some(cell) = pending.as_mut() {
                    cell.value
                        .push_str(&e.unescape().map_err(|err| xml_error(part, err))?);
                }
            }
            Ok(Event::CData(e)) if in_value || in_text => {
                if let Some(cell) = pending.as_mut() {
                    cell.value.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"c" => {
                    if let Some(cell) = pending.take() {
                        let value = resolve_cell(cell.kind.as_deref(), cell.value, sst)?;
                        cells.push((cell.row, cell.col, value));
                    }
                }
                b"v" => in_value = false,
                b"is" => in_inline = false,
                b"rPh" => in_phonetic = false,
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(xml_error(part, e)),
            _ => {}
        }
    }

    Ok(cells)
}

fn row_index(e: &BytesStart<'_>, default: u32, part: &str) -> Result<u32, DecodeError> {
    match attribute(e, b"r", part)? {
        Some(r) => match r.trim().parse::<u32>() {
            Ok(n) if (1..=MAX_ROWS).contains(&n) => Ok(n - 1),
            _ => Err(xml_error(part, format!("invalid row number '{}'", r))),
        },
        None => Ok(default),
    }
}

fn cell_position(
    e: &BytesStart<'_>,
    row: u32,
    col: u32,
    part: &str,
) -> Result<(u32, u32), DecodeError> {
    let (row, col) = match attribute(e, b"r", part)? {
        Some(reference) => parse_cell_reference(&reference)
            .ok_or_else(|| xml_error(part, format!("invalid cell reference '{}'", reference)))?,
        None => (row, col),
    };
    if row >= MAX_ROWS || col >= MAX_COLUMNS {
        return Err(xml_error(part, "cell outside the sheet limits"));
    }
    Ok((row, col))
}

/// Turn a raw `<v>`/`<is>` payload into a cell according to the `t` attribute
fn resolve_cell(kind: Option<&str>, raw: String, sst: &[String]) -> Result<CellValue, DecodeError> {
    if raw.is_empty() {
        return Ok(CellValue::Blank);
    }

    let value = match kind {
        Some("s") => {
            let index: usize = raw.trim().parse().map_err(|_| {
                xml_error("worksheet", format!("invalid shared string index '{}'", raw))
            })?;
            let text = sst.get(index).ok_or_else(|| {
                xml_error(
                    "worksheet",
                    format!("shared string index {} out of range ({})", index, sst.len()),
                )
            })?;
            CellValue::text(text.clone())
        }
        Some("inlineStr") => CellValue::text(decode_ooxml_text(&raw)),
        Some("b") => CellValue::text(if raw.trim() == "1" { "TRUE" } else { "FALSE" }),
        Some("str") | Some("e") | Some("d") => CellValue::text(raw),
        _ => match raw.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => CellValue::Number(n),
            _ => CellValue::text(raw),
        },
    };
    Ok(value)
}

/// Reject extents whose cell count would exceed `max_cells`
fn check_extent(cells: &[(u32, u32, CellValue)], max_cells: u64) -> Result<(), DecodeError> {
    let (rows, cols) = cells
        .iter()
        .filter(|(_, _, v)| !v.is_blank())
        .fold((0u64, 0u64), |(r, c), (row, col, _)| {
            (r.max(*row as u64 + 1), c.max(*col as u64 + 1))
        });
    if rows * cols > max_cells {
        return Err(DecodeError::LimitExceeded(format!(
            "{} x {} cells, limit is {}",
            rows, cols, max_cells
        )));
    }
    Ok(())
}
