// Primitives for reading the tabular files of all the formats.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;

use calamine::{DataType, Range, Reader, Xls, Xlsx};
use election_results::{ImportError, Issue};
use log::debug;

/// The sheet read first in workbooks.
const RESULTS_SHEET: &str = "Resultate";

const CSV_MIME_TYPES: [&str; 2] = ["text/plain", "text/csv"];
const XLS_MIME_TYPE: &str = "application/vnd.ms-excel";

/// A file of a batch, as submitted.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: &str, mime_type: &str, bytes: Vec<u8>) -> SourceFile {
        SourceFile {
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            bytes,
        }
    }

    pub fn csv(name: &str, text: &str) -> SourceFile {
        SourceFile::new(name, "text/csv", text.as_bytes().to_vec())
    }

    fn is_csv(&self) -> bool {
        CSV_MIME_TYPES.contains(&self.mime_type.as_str())
    }
}

/// Column names are compared without case and surrounding whitespace.
pub fn normalize_header(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Eq, PartialEq, Debug, Clone)]
struct TableLine {
    number: u64,
    cells: Vec<String>,
}

/// The data lines of a file whose header has been checked.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Table {
    pub file: String,
    headers: Vec<String>,
    index: HashMap<String, usize>,
    lines: Vec<TableLine>,
}

/// Reads a file and checks that all the required columns are present.
///
/// Nothing is read past a bad header.
pub fn load_table(file: &SourceFile, required: &[&str]) -> Result<Table, ImportError> {
    let rows = if file.is_csv() {
        read_csv_rows(&file.bytes)
    } else {
        read_excel_rows(&file.bytes, &file.mime_type)
    }
    .map_err(|issue| ImportError::in_file(&file.name, issue))?;

    let mut rows = rows.into_iter();
    let mut after_blank = false;
    let header = loop {
        match rows.next() {
            Some((_, cells)) if is_blank(&cells) => after_blank = true,
            Some(_) if after_blank => {
                return Err(ImportError::in_file(&file.name, Issue::EmptyLine))
            }
            Some((_, cells)) => break cells,
            None => return Err(ImportError::in_file(&file.name, Issue::EmptyFile)),
        }
    };
    let headers: Vec<String> = header.iter().map(|h| normalize_header(h)).collect();

    let mut index: HashMap<String, usize> = HashMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for (idx, h) in headers.iter().enumerate() {
        if h.is_empty() {
            continue;
        }
        if !seen.insert(h.as_str()) {
            return Err(ImportError::in_file(&file.name, Issue::DuplicateColumns));
        }
        index.insert(h.clone(), idx);
    }

    let missing: Vec<String> = required
        .iter()
        .filter(|c| !index.contains_key(&normalize_header(c)))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::in_file(
            &file.name,
            Issue::MissingColumns { columns: missing },
        ));
    }

    // Blank lines are only accepted at the end of a file.
    let mut lines: Vec<TableLine> = Vec::new();
    for (number, cells) in rows {
        if is_blank(&cells) {
            after_blank = true;
        } else if after_blank {
            return Err(ImportError::in_file(&file.name, Issue::EmptyLine));
        } else {
            lines.push(TableLine { number, cells });
        }
    }
    debug!(
        "load_table: {}: {} columns, {} lines",
        file.name,
        headers.len(),
        lines.len()
    );
    Ok(Table {
        file: file.name.clone(),
        headers,
        index,
        lines,
    })
}

fn is_blank(cells: &[String]) -> bool {
    cells.iter().all(|c| c.is_empty())
}

impl Table {
    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> {
        self.lines.iter().map(move |l| Row {
            line: l.number,
            cells: &l.cells,
            table: self,
        })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.index.contains_key(&normalize_header(column))
    }

    /// The columns whose (normalized) name is accepted by the matcher, with
    /// what the matcher extracted from the name.
    pub fn find_columns<F>(&self, matcher: F) -> Vec<(usize, String)>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.headers
            .iter()
            .enumerate()
            .filter_map(|(idx, h)| matcher(h).map(|m| (idx, m)))
            .collect()
    }

    pub fn header(&self, index: usize) -> &str {
        self.headers.get(index).map(|h| h.as_str()).unwrap_or("")
    }

    fn position(&self, column: &str) -> Option<usize> {
        self.index.get(&normalize_header(column)).cloned()
    }
}

/// One data line, with its cells accessed by column name.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    pub line: u64,
    cells: &'a [String],
    table: &'a Table,
}

impl<'a> Row<'a> {
    pub fn cell(&self, index: usize) -> &'a str {
        self.cells.get(index).map(|c| c.trim()).unwrap_or("")
    }

    /// The trimmed text of the column, empty if the column is absent.
    pub fn text(&self, column: &str) -> &'a str {
        match self.table.position(column) {
            Some(idx) => self.cell(idx),
            None => "",
        }
    }

    pub fn opt_text(&self, column: &str) -> Option<String> {
        Some(self.text(column))
            .filter(|t| !t.is_empty())
            .map(|t| t.to_string())
    }

    /// A count; empty cells count as 0.
    pub fn int(&self, column: &str) -> Result<u64, Issue> {
        Ok(self.opt_int(column)?.unwrap_or(0))
    }

    /// A count that must be given.
    pub fn required_int(&self, column: &str) -> Result<u64, Issue> {
        self.opt_int(column)?.ok_or_else(|| Issue::EmptyValue {
            column: column.to_string(),
        })
    }

    pub fn opt_int(&self, column: &str) -> Result<Option<u64>, Issue> {
        parse_count(self.text(column), column)
    }

    /// A BFS number, which must be given.
    pub fn entity_id(&self, column: &str) -> Result<u32, Issue> {
        let id = self.required_int(column)?;
        u32::try_from(id).map_err(|_| Issue::InvalidInteger {
            column: column.to_string(),
        })
    }

    pub fn int_at(&self, index: usize) -> Result<u64, Issue> {
        Ok(self.opt_int_at(index)?.unwrap_or(0))
    }

    pub fn opt_int_at(&self, index: usize) -> Result<Option<u64>, Issue> {
        parse_count(self.cell(index), self.table.header(index))
    }

    pub fn signed(&self, column: &str) -> Result<Option<i64>, Issue> {
        let text = self.text(column);
        if text.is_empty() {
            return Ok(None);
        }
        text.parse::<i64>()
            .map(Some)
            .map_err(|_| Issue::InvalidInteger {
                column: column.to_string(),
            })
    }

    /// An identifier made of letters, digits, underscores and dots.
    pub fn list_id(&self, column: &str) -> Result<String, Issue> {
        let text = self.text(column);
        if text.is_empty() {
            return Err(Issue::EmptyValue {
                column: column.to_string(),
            });
        }
        if is_alphanumeric_id(text) {
            Ok(text.to_string())
        } else {
            Err(Issue::NotAlphanumeric {
                column: column.to_string(),
            })
        }
    }

    /// A `#rrggbb` color, if given.
    pub fn color(&self, column: &str) -> Result<Option<String>, Issue> {
        let text = self.text(column);
        if text.is_empty() {
            return Ok(None);
        }
        let valid = text.len() == 7
            && text.starts_with('#')
            && text[1..].chars().all(|c| c.is_ascii_hexdigit());
        if valid {
            Ok(Some(text.to_string()))
        } else {
            Err(Issue::InvalidColor {
                column: column.to_string(),
            })
        }
    }

    pub fn flag(&self, column: &str) -> bool {
        matches!(
            self.text(column).to_lowercase().as_str(),
            "true" | "1" | "yes"
        )
    }
}

pub fn is_alphanumeric_id(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn parse_count(text: &str, column: &str) -> Result<Option<u64>, Issue> {
    if text.is_empty() {
        return Ok(None);
    }
    let invalid = || Issue::InvalidInteger {
        column: column.to_string(),
    };
    // Workbooks exported as text sometimes keep a decimal part.
    let digits = text.strip_suffix(".0").unwrap_or(text);
    digits.parse::<u64>().map(Some).map_err(|_| invalid())
}

// ******** CSV ********

fn decode(bytes: &[u8]) -> Result<String, Issue> {
    if let Some(rest) = bytes.strip_prefix(&[0xFFu8, 0xFE][..]) {
        return decode_utf16le(rest);
    }
    match std::str::from_utf8(bytes) {
        // UTF-16 files without byte order mark are valid UTF-8 full of zeros.
        Ok(text) if !text.contains('\0') => Ok(text.trim_start_matches('\u{feff}').to_string()),
        _ => {
            debug!("decode: not UTF-8, trying UTF-16LE");
            decode_utf16le(bytes)
        }
    }
}

fn decode_utf16le(bytes: &[u8]) -> Result<String, Issue> {
    if bytes.len() % 2 != 0 {
        return Err(Issue::InvalidFile);
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    String::from_utf16(&units)
        .map(|s| s.trim_start_matches('\u{feff}').to_string())
        .map_err(|_| Issue::InvalidFile)
}

fn sniff_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or("");
    [b',', b';', b'\t']
        .into_iter()
        .max_by_key(|d| first_line.matches(*d as char).count())
        .filter(|d| first_line.contains(*d as char))
        .unwrap_or(b',')
}

fn read_csv_rows(bytes: &[u8]) -> Result<Vec<(u64, Vec<String>)>, Issue> {
    let text = decode(bytes)?;
    let delimiter = sniff_delimiter(&text);
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());
    // The reader skips blank lines without counting them: the physical line
    // numbers come from the byte offsets, and the skipped lines are kept as
    // rows without cells.
    let mut rows = Vec::new();
    let mut offset = 0usize;
    let mut line = 1u64;
    for record in rdr.records() {
        let record = record.map_err(|e| {
            debug!("read_csv_rows: {:?}", e);
            Issue::InvalidFile
        })?;
        let start = record
            .position()
            .and_then(|p| usize::try_from(p.byte()).ok())
            .unwrap_or(offset)
            .max(offset);
        let skipped = text.get(offset..start).unwrap_or("");
        line += skipped.matches('\n').count() as u64;
        let blanks = if rows.is_empty() {
            line - 1
        } else {
            trailing_newlines(skipped).saturating_sub(1)
        };
        for blank in (line - blanks)..line {
            rows.push((blank, Vec::new()));
        }
        rows.push((line, record.iter().map(|c| c.trim().to_string()).collect()));
        offset = start;
    }
    Ok(rows)
}

/// The number of line breaks that end the text.
fn trailing_newlines(text: &str) -> u64 {
    let trimmed = text.trim_end_matches(|c: char| c == '\r' || c == '\n');
    text[trimmed.len()..].matches('\n').count() as u64
}

// ******** Excel ********

fn read_excel_rows(bytes: &[u8], mime_type: &str) -> Result<Vec<(u64, Vec<String>)>, Issue> {
    let range = if mime_type == XLS_MIME_TYPE {
        xls_range(bytes)?
    } else {
        xlsx_range(bytes)?
    };
    let first = range.start().map(|(row, _)| row as u64).unwrap_or(0);
    Ok(range
        .rows()
        .enumerate()
        .map(|(idx, row)| (first + idx as u64 + 1, row.iter().map(cell_text).collect()))
        .collect())
}

fn xlsx_range(bytes: &[u8]) -> Result<Range<DataType>, Issue> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes.to_vec())).map_err(|e| {
        debug!("xlsx_range: {:?}", e);
        Issue::InvalidFile
    })?;
    let range = match workbook.worksheet_range(RESULTS_SHEET) {
        Some(r) => Some(r),
        None => workbook.worksheet_range_at(0),
    };
    range.ok_or(Issue::EmptyFile)?.map_err(|_| Issue::InvalidFile)
}

fn xls_range(bytes: &[u8]) -> Result<Range<DataType>, Issue> {
    let mut workbook: Xls<_> = Xls::new(Cursor::new(bytes.to_vec())).map_err(|e| {
        debug!("xls_range: {:?}", e);
        Issue::InvalidFile
    })?;
    let range = match workbook.worksheet_range(RESULTS_SHEET) {
        Some(r) => Some(r),
        None => workbook.worksheet_range_at(0),
    };
    range.ok_or(Issue::EmptyFile)?.map_err(|_| Issue::InvalidFile)
}

fn cell_text(cell: &DataType) -> String {
    match cell {
        DataType::String(s) => s.trim().to_string(),
        DataType::Int(i) => i.to_string(),
        DataType::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        DataType::Float(f) => f.to_string(),
        DataType::Bool(b) => b.to_string(),
        DataType::Empty => String::new(),
        other => format!("{:?}", other),
    }
}
