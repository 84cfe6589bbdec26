//! Minimal comma-delimited table reading and writing.
//!
//! Feature files, the aggregate feature file and the results table are small
//! header-bearing CSV files. Writing quotes a field only when it contains a
//! delimiter, a quote or a line break; reading understands the same quoting.

use crate::error::ClassifyError;
use std::path::Path;

/// Quote `s` for a CSV cell if needed.
pub fn csv_escape(s: &str) -> String {
    if s.contains('"') || s.contains(',') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Join cells into one CSV line (with trailing newline).
pub fn csv_line<S: AsRef<str>>(cells: &[S]) -> String {
    let mut line = cells
        .iter()
        .map(|c| csv_escape(c.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// One data row with its 1-based line number in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub line: usize,
    pub cells: Vec<String>,
}

/// A parsed CSV table: header plus data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl Table {
    /// Parse CSV text. The first record is the header; blank lines are skipped.
    pub fn parse(text: &str) -> Self {
        let mut records = parse_records(text).into_iter();
        let header = records.next().map(|r| r.cells).unwrap_or_default();
        Self {
            header,
            rows: records.collect(),
        }
    }

    /// Read and parse a CSV file.
    pub fn read(path: &Path) -> Result<Self, ClassifyError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ClassifyError::FileNotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ClassifyError::ReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        Ok(Self::parse(&text))
    }

    /// Position of a header column.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Cell lookup. `None` when the column does not exist or the row is too short.
    pub fn cell<'a>(&self, row: &'a TableRow, name: &str) -> Option<&'a str> {
        let idx = self.column(name)?;
        row.cells.get(idx).map(String::as_str)
    }
}

/// Split CSV text into records, honouring quoted fields.
fn parse_records(text: &str) -> Vec<TableRow> {
    let mut records = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut record_line = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => cells.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                cells.push(std::mem::take(&mut field));
                push_record(&mut records, std::mem::take(&mut cells), record_line);
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !cells.is_empty() {
        cells.push(field);
        push_record(&mut records, cells, record_line);
    }
    records
}

fn push_record(records: &mut Vec<TableRow>, cells: Vec<String>, line: usize) {
    let blank = cells.len() == 1 && cells[0].is_empty();
    if !blank {
        records.push(TableRow { line, cells });
    }
}
