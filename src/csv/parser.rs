//! CSV parsing with RFC 4180-like behavior

use crate::error::DecodeError;

/// CSV parser for reading whole CSV documents
pub struct CsvParser {
    delimiter: u8,
    quote_char: u8,
}

impl CsvParser {
    /// Create a new CSV parser with custom delimiter and quote character
    pub fn new(delimiter: u8, quote_char: u8) -> Self {
        Self {
            delimiter,
            quote_char,
        }
    }

    /// Parse CSV text into records of fields.
    ///
    /// Records end at `\n`, `\r\n` or a lone `\r` outside quotes. A quote only
    /// opens a quoted field at the start of a field; anywhere else it is kept
    /// as a literal character.
    pub fn parse_records(&self, text: &str) -> Result<Vec<Vec<String>>, DecodeError> {
        let quote = self.quote_char as char;
        let delimiter = self.delimiter as char;

        let mut records = Vec::new();
        let mut record = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;
        let mut field_quoted = false;
        let mut line = 1usize;
        let mut quote_line = 0usize;
        let mut chars = text.chars().peekable();

        while let Some(ch) = chars.next() {
            if in_quotes {
                if ch == quote {
                    if chars.peek() == Some(&quote) {
                        // Escaped quote ("")
                        field.push(quote);
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    if ch == '\n' || (ch == '\r' && chars.peek() != Some(&'\n')) {
                        line += 1;
                    }
                    field.push(ch);
                }
            } else if ch == quote && field.is_empty() && !field_quoted {
                in_quotes = true;
                field_quoted = true;
                quote_line = line;
            } else if ch == delimiter {
                record.push(std::mem::take(&mut field));
                field_quoted = false;
            } else if ch == '\n' || ch == '\r' {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                field_quoted = false;
                line += 1;
            } else {
                field.push(ch);
            }
        }

        if in_quotes {
            return Err(DecodeError::UnterminatedQuote { line: quote_line });
        }

        // A final terminator does not open another record
        if !record.is_empty() || !field.is_empty() || field_quoted {
            record.push(field);
            records.push(record);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<Vec<String>> {
        CsvParser::new(b',', b'"').parse_records(text).unwrap()
    }

    #[test]
    fn test_simple() {
        assert_eq!(parse("a,b,c"), vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_quoted() {
        assert_eq!(parse(r#""a,b",c"#), vec![vec!["a,b", "c"]]);
    }

    #[test]
    fn test_escaped_quotes() {
        assert_eq!(
            parse(r#""Say ""Hello""",world"#),
            vec![vec![r#"Say "Hello""#, "world"]]
        );
    }

    #[test]
    fn test_empty_fields() {
        assert_eq!(parse("a,,c"), vec![vec!["a", "", "c"]]);
        assert_eq!(parse(",,"), vec![vec!["", "", ""]]);
    }

    #[test]
    fn test_quoted_with_newline() {
        assert_eq!(
            parse("\"Line 1\nLine 2\",normal\nnext,row\n"),
            vec![vec!["Line 1\nLine 2", "normal"], vec!["next", "row"]]
        );
    }

    #[test]
    fn test_line_endings() {
        let expected = vec![vec!["a", "b"], vec!["c", "d"]];
        assert_eq!(parse("a,b\r\nc,d\r\n"), expected);
        assert_eq!(parse("a,b\rc,d"), expected);
        assert_eq!(parse("a,b\nc,d"), expected);
    }

    #[test]
    fn test_trailing_newline_adds_no_record() {
        assert_eq!(parse("x\n").len(), 1);
        assert_eq!(parse("x\n\n").len(), 2);
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_mid_field_quote_is_literal() {
        assert_eq!(parse(r#"ab"c,d"#), vec![vec![r#"ab"c"#, "d"]]);
        assert_eq!(parse(r#""ab"c,d"#), vec![vec!["abc", "d"]]);
    }

    #[test]
    fn test_quoted_empty() {
        assert_eq!(parse(r#""","""#), vec![vec!["", ""]]);
        assert_eq!(parse("\"\""), vec![vec![""]]);
    }

    #[test]
    fn test_custom_delimiter() {
        let parser = CsvParser::new(b';', b'"');
        assert_eq!(
            parser.parse_records("a;\"b;c\";d\ne,f;g\n").unwrap(),
            vec![vec!["a", "b;c", "d"], vec!["e,f", "g"]]
        );
    }

    #[test]
    fn test_unterminated_quote_reports_start_line() {
        let parser = CsvParser::new(b',', b'"');
        let err = parser
            .parse_records("a,b\nc,\"open\nstill open\n")
            .unwrap_err();
        assert_eq!(err, DecodeError::UnterminatedQuote { line: 2 });
    }

    #[test]
    fn test_empty_line() {
        let parser = CsvParser::new(b',', b'"');
        assert_eq!(parser.parse_records("\n").unwrap(), vec![vec![""]]);
        assert_eq!(
            parser.parse_records("a\n\nb").unwrap(),
            vec![vec!["a"], vec![""], vec!["b"]]
        );
    }
}
