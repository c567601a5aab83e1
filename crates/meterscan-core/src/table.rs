//! Raw tabular input as handed over by the file-loading side.
//!
//! Sheets arrive as CSV or as a spreadsheet workbook (`.xlsx`, `.xlsm`,
//! `.xls`, `.ods`); a workbook contributes its first worksheet. Cells stay
//! as optional strings here; typing happens in `preprocess`.

use crate::error::{IngestError, IngestResult};
use calamine::{Data, Range, Reader};
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::debug;

const WORKBOOK_EXTENSIONS: [&str; 4] = ["xlsx", "xlsm", "xls", "ods"];
/// Zip container (xlsx, xlsm, ods).
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// OLE2 compound document (legacy xls).
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// A header row plus string cells. Ragged rows are allowed: a missing
/// trailing cell reads back as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Append a row; blank cells are stored as `None`.
    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let row = cells.into_iter().map(|c| normalize_cell(c.as_ref())).collect();
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .and_then(|c| c.as_deref())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn normalize_cell(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Load a table from any reader. Workbook bytes are recognised by their
/// container signature, everything else is parsed as CSV with the first
/// record as header row.
pub fn load_table<R: Read>(mut reader: R) -> IngestResult<RawTable> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|source| IngestError::Io {
            path: "<input>".to_string(),
            source,
        })?;
    load_table_bytes(&bytes)
}

/// Load a table from an in-memory sheet, CSV or workbook.
pub fn load_table_bytes(bytes: &[u8]) -> IngestResult<RawTable> {
    if is_workbook(bytes) {
        load_workbook(Cursor::new(bytes))
    } else {
        load_csv(bytes)
    }
}

/// Load a table from a file path. Workbook extensions always go through the
/// workbook reader; other files are sniffed like [`load_table_bytes`].
pub fn load_table_file(path: impl AsRef<Path>) -> IngestResult<RawTable> {
    let path = path.as_ref();
    let io_err = |source| IngestError::Io {
        path: path.display().to_string(),
        source,
    };

    if has_workbook_extension(path) {
        let bytes = std::fs::read(path).map_err(io_err)?;
        return load_workbook(Cursor::new(bytes));
    }
    let bytes = std::fs::read(path).map_err(io_err)?;
    load_table_bytes(&bytes)
}

fn is_workbook(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC)
}

fn has_workbook_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            WORKBOOK_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn load_csv(bytes: &[u8]) -> IngestResult<RawTable> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers = csv_reader
        .headers()?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let mut table = RawTable::new(headers);

    for result in csv_reader.records() {
        let record = result?;
        table.push_row(record.iter());
    }

    Ok(table)
}

fn load_workbook<RS: Read + Seek + Clone>(reader: RS) -> IngestResult<RawTable> {
    let mut workbook = calamine::open_workbook_auto_from_rs(reader)?;
    let sheet = workbook
        .sheet_names()
        .into_iter()
        .next()
        .ok_or(IngestError::EmptyWorkbook)?;
    let range = workbook.worksheet_range(&sheet)?;
    debug!(sheet = %sheet, rows = range.height(), "Reading first worksheet.");
    Ok(table_from_range(&range))
}

fn table_from_range(range: &Range<Data>) -> RawTable {
    let mut rows = range.rows();
    let headers = rows
        .next()
        .map(|header| header.iter().map(|cell| cell_text(cell).trim().to_string()).collect())
        .unwrap_or_default();
    let mut table = RawTable::new(headers);
    for row in rows {
        table.push_row(row.iter().map(cell_text));
    }
    table
}

/// Numbers print without a trailing `.0`, so a meter id stored as the
/// number 1001 reads back as "1001".
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}
