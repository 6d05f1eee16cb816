//! Comma-separated ledger text: field escaping on the way in, row parsing on
//! the way out. Only what the ledger log needs, so no dialect options.

use std::mem::take;

pub const SEP: char = ',';

fn needs_quotes(field: &str) -> bool {
    field.contains(SEP) || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Quote a field when it carries a separator, quote or line break; inner
/// quotes are doubled.
pub fn escape_field(field: &str) -> String {
    if needs_quotes(field) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// One `\n`-terminated line built from already-unescaped fields.
pub fn format_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Parse CSV text into rows. Quoted fields may span lines; CRLF is accepted.
/// Blank lines are dropped.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut field = String::new();
    let mut row: Vec<String> = Vec::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if matches!(chars.peek(), Some('"')) {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if field.is_empty() => in_quotes = true,
            c if c == SEP && !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                row.push(take(&mut field));
                if row.len() == 1 && row[0].is_empty() {
                    row.clear();
                } else {
                    rows.push(take(&mut row));
                }
            }
            _ => field.push(ch),
        }
    }

    // Trailing row without a final newline, even with an unterminated quote.
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    rows
}

/// Data rows in a log that starts with a header line.
pub fn count_data_rows(text: &str) -> usize {
    parse_rows(text).len().saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields_pass_through() {
        assert_eq!(escape_field("jdoe"), "jdoe");
        assert_eq!(format_row(&["a", "b"]), "a,b\n");
    }

    #[test]
    fn comma_and_quote_are_quoted_and_doubled() {
        let original = r#"He said "hi", then left"#;
        let escaped = escape_field(original);
        assert_eq!(escaped, r#""He said ""hi"", then left""#);

        let rows = parse_rows(&format_row(&["x", original]));
        assert_eq!(rows, vec![vec!["x".to_string(), original.to_string()]]);
    }

    #[test]
    fn newline_inside_field_survives_parsing() {
        let original = "line one\nline two";
        let rows = parse_rows(&format_row(&[original, "tail"]));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], original);
        assert_eq!(rows[0][1], "tail");
    }

    #[test]
    fn crlf_and_blank_lines_are_tolerated() {
        let rows = parse_rows("a,b\r\n\r\nc,d");
        assert_eq!(
            rows,
            vec![
                vec!["a".to_string(), "b".to_string()],
                vec!["c".to_string(), "d".to_string()],
            ]
        );
    }

    #[test]
    fn empty_trailing_field_is_kept() {
        let rows = parse_rows("a,\n");
        assert_eq!(rows, vec![vec!["a".to_string(), String::new()]]);
    }

    #[test]
    fn counts_rows_below_header() {
        assert_eq!(count_data_rows("h1,h2\n"), 0);
        assert_eq!(count_data_rows("h1,h2\n1,2\n3,\"4\n5\"\n"), 2);
        assert_eq!(count_data_rows(""), 0);
    }

    #[test]
    fn escaped_rows_read_back_with_the_csv_crate() {
        let fields = ["plain", r#"quoted "word", comma"#, "two\nlines", ""];
        let text = format!("{}{}", format_row(&["a", "b", "c", "d"]), format_row(&fields));

        let mut reader = ::csv::Reader::from_reader(text.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(record.iter().collect::<Vec<_>>(), fields);
    }
}
