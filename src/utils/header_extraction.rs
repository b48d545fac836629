// src/utils/header_extraction.rs
use calamine::{open_workbook_auto_from_rs, Reader};
use derive_more::Display;
use std::io::Cursor;

#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[display(fmt = "No headers found")]
    NoHeaders,
    #[display(fmt = "Header extraction is not supported for .{} files", _0)]
    Unsupported(String),
    #[display(fmt = "File content could not be read: {}", _0)]
    Unreadable(String),
}

// extractHeaders(fileBytes) -> header names, or NoHeaders
pub trait HeaderExtractor: Send + Sync {
    fn extract_headers(&self, file_name: &str, bytes: &[u8]) -> Result<Vec<String>, HeaderError>;
}

/// Reads the header row of CSV, TSV and Excel (xlsx/xls) content.
///
/// The first non-blank row is the candidate; for workbooks that is the first
/// non-blank row of the first sheet. It counts as a header row only if at
/// least one cell is non-empty and no cell is purely numeric.
pub struct TabularHeaderExtractor;

impl HeaderExtractor for TabularHeaderExtractor {
    fn extract_headers(&self, file_name: &str, bytes: &[u8]) -> Result<Vec<String>, HeaderError> {
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();

        let cells = match extension.as_str() {
            "csv" => delimited_first_row(bytes, ',')?,
            "tsv" => delimited_first_row(bytes, '\t')?,
            "xlsx" | "xls" => workbook_first_row(bytes)?,
            other => return Err(HeaderError::Unsupported(other.to_string())),
        };

        if cells.iter().all(|cell| cell.is_empty()) || cells.iter().any(|cell| is_numeric(cell)) {
            return Err(HeaderError::NoHeaders);
        }
        Ok(cells)
    }
}

fn delimited_first_row(bytes: &[u8], delimiter: char) -> Result<Vec<String>, HeaderError> {
    let text = std::str::from_utf8(bytes).map_err(|e| HeaderError::Unreadable(e.to_string()))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let line = text
        .lines()
        .find(|line| !line.trim().is_empty())
        .ok_or(HeaderError::NoHeaders)?;

    Ok(split_row(line, delimiter)
        .into_iter()
        .map(|cell| cell.trim().to_string())
        .collect())
}

// calamine sniffs xls versus xlsx from the bytes, not the extension
fn workbook_first_row(bytes: &[u8]) -> Result<Vec<String>, HeaderError> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| HeaderError::Unreadable(e.to_string()))?;

    let sheet = workbook
        .worksheet_range_at(0)
        .ok_or(HeaderError::NoHeaders)?
        .map_err(|e| HeaderError::Unreadable(e.to_string()))?;

    let row = sheet
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string().trim().to_string()).collect::<Vec<_>>())
        .find(|cells| cells.iter().any(|cell| !cell.is_empty()))
        .ok_or(HeaderError::NoHeaders)?;

    Ok(row)
}

fn is_numeric(cell: &str) -> bool {
    // "nan" and "inf" parse as floats but are fine column names
    cell.chars().any(|c| c.is_ascii_digit()) && cell.parse::<f64>().is_ok()
}

// Splits one row, honouring double-quoted fields and "" escapes
fn split_row(line: &str, delimiter: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => cells.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    cells.push(current);
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::workbook;

    fn extract(name: &str, content: &str) -> Result<Vec<String>, HeaderError> {
        TabularHeaderExtractor.extract_headers(name, content.as_bytes())
    }

    #[test]
    fn test_csv_header_row() {
        assert_eq!(
            extract("sales.csv", "\n\nregion, \"units, sold\",price\nnorth,3,1.5\n").unwrap(),
            vec!["region", "units, sold", "price"]
        );
    }

    #[test]
    fn test_tsv_header_row() {
        assert_eq!(
            extract("DATA.TSV", "name\tage\nann\t3\n").unwrap(),
            vec!["name", "age"]
        );
    }

    #[test]
    fn test_numeric_first_row_has_no_headers() {
        assert_eq!(extract("a.csv", "1,2,3\n4,5,6\n"), Err(HeaderError::NoHeaders));
        assert_eq!(extract("a.csv", "name,2019\n"), Err(HeaderError::NoHeaders));
    }

    #[test]
    fn test_empty_content_has_no_headers() {
        assert_eq!(extract("a.csv", ""), Err(HeaderError::NoHeaders));
        assert_eq!(extract("a.csv", " , ,\n"), Err(HeaderError::NoHeaders));
    }

    #[test]
    fn test_xlsx_header_row() {
        let book = workbook(&[&["", ""], &["region", "units"], &["north", "3"]]);
        assert_eq!(
            TabularHeaderExtractor.extract_headers("Sales.XLSX", &book).unwrap(),
            vec!["region", "units"]
        );
    }

    #[test]
    fn test_xlsx_numeric_first_row_has_no_headers() {
        let book = workbook(&[&["2019", "2020"], &["1", "2"]]);
        assert_eq!(
            TabularHeaderExtractor.extract_headers("years.xlsx", &book),
            Err(HeaderError::NoHeaders)
        );
    }

    #[test]
    fn test_corrupt_workbooks_are_unreadable() {
        for name in ["book.xlsx", "book.xls"] {
            assert!(matches!(extract(name, "PK\u{3}\u{4}"), Err(HeaderError::Unreadable(_))), "{}", name);
        }
    }

    #[test]
    fn test_other_extensions_are_unsupported() {
        assert_eq!(extract("notes.txt", "a,b"), Err(HeaderError::Unsupported("txt".into())));
    }

    #[test]
    fn test_quoted_escape() {
        assert_eq!(split_row("\"a \"\"b\"\"\",c", ','), vec!["a \"b\"", "c"]);
    }
}
