//! Integration tests for tabconv

use proptest::prelude::*;
use rust_xlsxwriter::{Formula, Workbook};
use std::io::{Cursor, Read};
use tabconv::{
    derive_file_name, CellValue, ConversionSession, ConvertError, Converter, CsvDecoder,
    CsvEncoder, CsvOptions, DecodeError, Decoder, DelimiterMode, Encoder, IntakePolicy,
    SourceFile, StateKind, TabularDocument, TabularFormat, ValidationError, XlsxDecoder,
};

/// Three-row sheet with 3.5 at [2][1], plus a second sheet that must be ignored
fn foreign_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Scores").unwrap();
        sheet.write_string(0, 0, "name").unwrap();
        sheet.write_string(0, 1, "score").unwrap();
        sheet.write_string(1, 0, "Alice").unwrap();
        sheet.write_number(1, 1, 40).unwrap();
        sheet.write_string(2, 0, "Bob").unwrap();
        sheet
            .write_formula(2, 1, Formula::new("=SUM(1,2.5)").set_result("3.5"))
            .unwrap();
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Ignored").unwrap();
        for row in 0..10 {
            sheet.write_string(row, 5, "noise").unwrap();
        }
    }
    workbook.save_to_buffer().unwrap()
}

fn archive_entry(bytes: &[u8], name: &str) -> String {
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
fn test_csv_to_excel_scenario() {
    let mut session = ConversionSession::new(Converter::new(TabularFormat::Xlsx));
    session
        .select_file(SourceFile::new(
            "people.csv",
            b"name,age\n\"Smith, John\",40\n".to_vec(),
        ))
        .unwrap();

    assert_eq!(session.convert().unwrap(), StateKind::Completed);
    let result = session.result().unwrap();
    assert_eq!(result.file_name(), "people.xlsx");
    assert_eq!(
        result.media_type(),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    );

    let workbook = archive_entry(result.bytes(), "xl/workbook.xml");
    assert_eq!(workbook.matches("<sheet ").count(), 1);
    let sheet = archive_entry(result.bytes(), "xl/worksheets/sheet1.xml");
    assert!(sheet.contains(r#"<dimension ref="A1:B2"/>"#));

    let doc = XlsxDecoder::default().decode(result.bytes()).unwrap();
    assert_eq!(doc.row_count(), 2);
    assert_eq!(doc.column_count(), 2);
    assert_eq!(doc.get(1, 0), Some(&CellValue::from("Smith, John")));
    assert_eq!(doc.get(1, 1), Some(&CellValue::Number(40.0)));
}

#[test]
fn test_excel_to_csv_scenario() {
    let file = SourceFile::new("scores.xlsx", foreign_workbook());
    let result = Converter::new(TabularFormat::Csv).convert(&file).unwrap();

    assert_eq!(result.file_name(), "scores.csv");
    let text = String::from_utf8(result.into_bytes()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, vec!["name,score", "Alice,40", "Bob,3.5"]);
    assert_eq!(lines[2].split(',').nth(1), Some("3.5"));
}

#[test]
fn test_single_column_sheet_reimports_as_one_column() {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "Name; Surname").unwrap();
        sheet.write_string(1, 0, "Ann; Lee").unwrap();
    }
    let file = SourceFile::new("names.xlsx", workbook.save_to_buffer().unwrap());
    let csv = Converter::new(TabularFormat::Csv).convert(&file).unwrap();
    assert_eq!(csv.bytes(), b"\"Name; Surname\"\nAnn; Lee\n");

    let doc = CsvDecoder::default().decode(csv.bytes()).unwrap();
    assert_eq!(doc.column_count(), 1);
    assert_eq!(doc.get(0, 0), Some(&CellValue::from("Name; Surname")));
    assert_eq!(doc.get(1, 0), Some(&CellValue::from("Ann; Lee")));
}

#[test]
fn test_far_away_cell_exceeds_default_limit() {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.write_number(48_827, 999, 1).unwrap();
    }
    let bytes = workbook.save_to_buffer().unwrap();
    assert!(bytes.len() < 10 * 1024);

    assert!(matches!(
        XlsxDecoder::default().decode(&bytes),
        Err(DecodeError::LimitExceeded(_))
    ));
}

#[test]
fn test_first_sheet_only() {
    let doc = XlsxDecoder::default().decode(&foreign_workbook()).unwrap();
    assert_eq!(doc.row_count(), 3);
    assert_eq!(doc.column_count(), 2);
    assert!(doc
        .rows()
        .iter()
        .flatten()
        .all(|cell| cell.as_text() != Some("noise")));
}

#[test]
fn test_foreign_workbook_cell_types() {
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.write_boolean(1, 1, true).unwrap();
        sheet.write_string(3, 2, "  spaced  ").unwrap();
        sheet
            .write_formula(3, 0, Formula::new("=\"a\"&\"b\"").set_result("ab"))
            .unwrap();
    }
    let bytes = workbook.save_to_buffer().unwrap();

    let doc = XlsxDecoder::default().decode(&bytes).unwrap();
    // Extent is anchored at A1 even though A1 is empty
    assert_eq!(doc.row_count(), 4);
    assert_eq!(doc.column_count(), 3);
    assert_eq!(doc.get(0, 0), Some(&CellValue::Blank));
    assert_eq!(doc.get(1, 1), Some(&CellValue::from("TRUE")));
    assert_eq!(doc.get(3, 2), Some(&CellValue::from("  spaced  ")));
}

#[test]
fn test_oversize_file_rejected_before_decoding() {
    // Not a valid workbook: decoding it would fail, so only validation can have run
    let file = SourceFile::new("big.xlsx", vec![b'x'; 11 * 1024 * 1024]);
    let mut session = ConversionSession::new(
        Converter::new(TabularFormat::Csv).with_policy(IntakePolicy::new()),
    );

    let err = session.select_file(file).unwrap_err();
    assert_eq!(
        err,
        ValidationError::TooLarge {
            size: 11_534_336,
            limit: 10_485_760,
        }
    );
    assert_eq!(session.state().kind(), StateKind::Idle);
    assert!(!session.can_convert());
    assert!(matches!(session.convert(), Err(ConvertError::NoFileSelected)));
}

#[test]
fn test_zero_byte_spreadsheet_fails() {
    let mut session = ConversionSession::new(Converter::new(TabularFormat::Csv));
    session
        .select_file(SourceFile::new("empty.xlsx", Vec::new()))
        .unwrap();

    assert_eq!(session.convert().unwrap(), StateKind::Failed);
    assert!(session.result().is_none());
    assert!(matches!(
        session.error(),
        Some(ConvertError::Decode(DecodeError::EmptyInput))
    ));
}

#[test]
fn test_legacy_xls_rejected() {
    let mut bytes = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    bytes.resize(512, 0);
    let err = Converter::new(TabularFormat::Csv)
        .with_policy(IntakePolicy::new())
        .convert(&SourceFile::new("old.xlsx", bytes))
        .unwrap_err();
    assert!(err.to_string().contains("legacy .xls"));
}

#[test]
fn test_derive_file_name_case_insensitive() {
    assert_eq!(
        derive_file_name("report.CSV", TabularFormat::Csv, TabularFormat::Xlsx),
        "report.xlsx"
    );
}

#[test]
fn test_quote_field_round_trip() {
    let doc = TabularDocument::new(vec![vec![CellValue::from("a,\"b")]]);
    let bytes = CsvEncoder::new(b',', b'"').encode(&doc).unwrap();
    assert_eq!(bytes, b"\"a,\"\"b\"\n");
    assert_eq!(CsvDecoder::default().decode(&bytes).unwrap(), doc);
}

#[test]
fn test_csv_round_trip_idempotent() {
    let input = b"id,name,score\n1,Ann,3.5\n2,,\n,Bob,007\n";
    let decoder = CsvDecoder::default();
    let encoder = CsvOptions::default().encoder();

    let first = decoder.decode(input).unwrap();
    let encoded = encoder.encode(&first).unwrap();
    let second = decoder.decode(&encoded).unwrap();

    assert_eq!(first, second);
    assert_eq!(encoded, input.to_vec());
}

#[test]
fn test_csv_json_excel_chain() {
    let csv = SourceFile::new("data.tsv", b"city\tpop\nHanoi\t8.05\nHue\t\n".to_vec());
    let json = Converter::new(TabularFormat::Json).convert(&csv).unwrap();
    assert_eq!(
        json.bytes(),
        br#"[{"city":"Hanoi","pop":8.05},{"city":"Hue"}]"#
    );

    let json_file = SourceFile::new(json.file_name().to_string(), json.into_bytes());
    assert_eq!(json_file.name, "data.json");
    let xlsx = Converter::new(TabularFormat::Xlsx).convert(&json_file).unwrap();
    let doc = XlsxDecoder::default().decode(xlsx.bytes()).unwrap();
    assert_eq!(doc.row_count(), 3);
    assert_eq!(doc.get(1, 1), Some(&CellValue::Number(8.05)));
    assert_eq!(doc.get(2, 1), Some(&CellValue::Blank));
}

#[test]
fn test_save_result_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Sales Q1.csv");
    std::fs::write(&input, "region;total\nnorth;12\n").unwrap();

    let file = SourceFile::open(&input).unwrap();
    let result = Converter::new(TabularFormat::Xlsx).convert(&file).unwrap();
    let saved = result.save_in(dir.path()).unwrap();

    assert_eq!(saved.file_name().unwrap(), "Sales Q1.xlsx");
    let bytes = std::fs::read(&saved).unwrap();
    let doc = XlsxDecoder::default().decode(&bytes).unwrap();
    assert_eq!(doc.get(1, 1), Some(&CellValue::Number(12.0)));
}

#[test]
fn test_unterminated_quote_line() {
    let file = SourceFile::new("bad.csv", b"a,b\n1,2\n3,\"oops\n".to_vec());
    let err = Converter::new(TabularFormat::Xlsx).convert(&file).unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Decode(DecodeError::UnterminatedQuote { line: 3 })
    ));
}

fn text_grid() -> impl Strategy<Value = Vec<Vec<String>>> {
    prop::collection::vec(
        prop::collection::vec("[a-z ,\"\n]{0,6}", 1..5),
        1..8,
    )
}

proptest! {
    #[test]
    fn prop_csv_round_trip(grid in text_grid()) {
        let doc = TabularDocument::new(
            grid.into_iter()
                .map(|row| row.into_iter().map(CellValue::text).collect())
                .collect(),
        );
        prop_assume!(!doc.is_empty());

        let options = CsvOptions::new()
            .with_delimiter(DelimiterMode::Fixed(b','))
            .with_infer_numbers(false);
        let bytes = options.encoder().encode(&doc).unwrap();
        let back = CsvDecoder::new(options).decode(&bytes).unwrap();
        prop_assert_eq!(back, doc);
    }

    #[test]
    fn prop_extent_invariant(grid in text_grid()) {
        let doc = TabularDocument::new(
            grid.into_iter()
                .map(|row| row.into_iter().map(CellValue::text).collect())
                .collect(),
        );
        for row in doc.rows() {
            prop_assert_eq!(row.len(), doc.column_count());
        }
        if let Some(last) = doc.rows().last() {
            prop_assert!(last.iter().any(|cell| !cell.is_blank()));
        }
        if doc.column_count() > 0 {
            let col = doc.column_count() - 1;
            prop_assert!(doc.rows().iter().any(|row| !row[col].is_blank()));
        }
    }
}
