//! Line/Table Loader.
//!
//! Decodes raw statement bytes into either an ordered sequence of text
//! lines or a tabular grid, based on the declared source type. The whole
//! file is loaded before parsing begins; nothing is streamed.

use calamine::{Data, Reader};
use std::io::Cursor;

use crate::error::{Error, Result};
use crate::SourceType;

/// A tabular grid of cell values with the first source row as header.
///
/// Row/column lookups are 1-based over the data rows (the header row is not
/// addressable), matching how field rules are configured.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Grid {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Grid { headers, rows }
    }

    /// Number of data rows (header excluded).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns, as declared by the header row.
    pub fn col_count(&self) -> usize {
        self.headers.len()
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows in source order.
    pub fn rows(&self) -> impl Iterator<Item = &[String]> {
        self.rows.iter().map(|r| r.as_slice())
    }

    /// 1-based cell lookup. Out of range yields `None`, never an error.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        if row == 0 || col == 0 {
            return None;
        }
        self.rows
            .get(row - 1)
            .and_then(|r| r.get(col - 1))
            .map(|s| s.as_str())
    }

    /// 1-based cell lookup within one already-selected row slice.
    pub fn row_cell<'a>(row: &'a [String], col: usize) -> Option<&'a str> {
        if col == 0 {
            return None;
        }
        row.get(col - 1).map(|s| s.as_str())
    }

    /// Locate the first cell whose trimmed value equals `needle`, scanning
    /// rows top to bottom. Returns 1-based (row, col).
    pub fn find_cell(&self, needle: &str) -> Option<(usize, usize)> {
        for (r, row) in self.rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                if value.trim() == needle {
                    return Some((r + 1, c + 1));
                }
            }
        }
        None
    }
}

/// The loaded source: raw text lines, or a grid with an optional
/// comma-joined line view for rule paths that expect line-like text.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedSource {
    Text { lines: Vec<String> },
    Table { grid: Grid, lines: Option<Vec<String>> },
}

impl LoadedSource {
    /// Decode raw bytes according to the declared source type.
    ///
    /// - `txt`: UTF-8 lines, blank/whitespace-only lines dropped, order
    ///   preserved, 1-indexed for line-number lookups.
    /// - `csv`: parsed into a grid (first row as header) plus a synthesized
    ///   comma-joined line view over the data rows.
    /// - `xls`/`xlsx`: first worksheet parsed into a grid, no line view.
    pub fn load(bytes: &[u8], source_type: SourceType) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::EmptyFile);
        }

        match source_type {
            SourceType::Txt => {
                let text = decode_utf8(bytes)?;
                let lines = text
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .map(str::to_string)
                    .collect();
                Ok(LoadedSource::Text { lines })
            }
            SourceType::Csv => {
                let text = decode_utf8(bytes)?;
                let mut reader = csv::ReaderBuilder::new()
                    .flexible(true)
                    .from_reader(text.as_bytes());

                let headers = reader
                    .headers()?
                    .iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>();

                let mut rows = Vec::new();
                for record in reader.records() {
                    let record = record?;
                    rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
                }

                let lines = rows.iter().map(|r| r.join(",")).collect();
                Ok(LoadedSource::Table {
                    grid: Grid::new(headers, rows),
                    lines: Some(lines),
                })
            }
            SourceType::Xls | SourceType::Xlsx => {
                let cursor = Cursor::new(bytes.to_vec());
                let mut workbook = calamine::open_workbook_auto_from_rs(cursor)?;
                let range = workbook
                    .worksheet_range_at(0)
                    .ok_or_else(|| Error::Spreadsheet("workbook has no sheets".to_string()))?
                    .map_err(|e| Error::Spreadsheet(e.to_string()))?;

                let mut iter = range.rows();
                let headers = iter
                    .next()
                    .map(|row| row.iter().map(cell_to_string).collect())
                    .unwrap_or_default();
                let rows = iter
                    .map(|row| row.iter().map(cell_to_string).collect())
                    .collect();

                Ok(LoadedSource::Table {
                    grid: Grid::new(headers, rows),
                    lines: None,
                })
            }
        }
    }

    /// The line view, if this source has one.
    pub fn lines(&self) -> Option<&[String]> {
        match self {
            LoadedSource::Text { lines } => Some(lines),
            LoadedSource::Table { lines, .. } => lines.as_deref(),
        }
    }

    /// The tabular grid, if this source has one.
    pub fn grid(&self) -> Option<&Grid> {
        match self {
            LoadedSource::Text { .. } => None,
            LoadedSource::Table { grid, .. } => Some(grid),
        }
    }
}

fn decode_utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| Error::Encoding(e.to_string()))
}

/// Render a spreadsheet cell as the string the rules slice and compare.
fn cell_to_string(data: &Data) -> String {
    match data {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Integral floats render without the trailing ".0" so that
            // prefix matches and key comparisons behave like cell text.
            if f.fract() == 0.0 && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{:?}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_txt_drops_blank_lines() {
        let bytes = b"1HEADER\n\n   \n2SETTLE\n";
        let source = LoadedSource::load(bytes, SourceType::Txt).unwrap();
        let lines = source.lines().unwrap();
        assert_eq!(lines, ["1HEADER", "2SETTLE"]);
        assert!(source.grid().is_none());
    }

    #[test]
    fn test_load_empty_is_data_error() {
        let err = LoadedSource::load(b"", SourceType::Txt).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_load_csv_grid_and_line_view() {
        let bytes = b"date,settlement,amount\n2024-01-05,0001234,10.50\n2024-01-06,0001235,20.00\n";
        let source = LoadedSource::load(bytes, SourceType::Csv).unwrap();

        let grid = source.grid().unwrap();
        assert_eq!(grid.row_count(), 2);
        assert_eq!(grid.col_count(), 3);
        assert_eq!(grid.cell(1, 2), Some("0001234"));
        assert_eq!(grid.cell(2, 3), Some("20.00"));
        // out of range is "no value", not an error
        assert_eq!(grid.cell(3, 1), None);
        assert_eq!(grid.cell(1, 9), None);
        assert_eq!(grid.cell(0, 1), None);

        let lines = source.lines().unwrap();
        assert_eq!(lines[0], "2024-01-05,0001234,10.50");
    }

    #[test]
    fn test_find_cell() {
        let grid = Grid::new(
            vec!["a".into(), "b".into()],
            vec![
                vec!["x".into(), "y".into()],
                vec!["IVA 21%".into(), "123,45".into()],
            ],
        );
        assert_eq!(grid.find_cell("IVA 21%"), Some((2, 1)));
        assert_eq!(grid.find_cell("missing"), None);
    }

    #[test]
    fn test_cell_to_string_floats() {
        assert_eq!(cell_to_string(&Data::Float(7.0)), "7");
        assert_eq!(cell_to_string(&Data::Float(7.5)), "7.5");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
