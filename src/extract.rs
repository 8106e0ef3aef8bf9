//! Per-file text extraction.
//!
//! Dispatches on a [`RemoteFile`]'s content kind, downloads through the
//! chunked loop in [`crate::download`], and decodes the bytes:
//!
//! | Kind | Download | Decode |
//! |------|----------|--------|
//! | rich document | export as `text/plain` | UTF-8 |
//! | plain text | raw media | UTF-8 |
//! | PDF | raw media | page text, in page order |
//! | native spreadsheet | values API | rows of cells |
//! | xlsx | raw media | first worksheet as rows |
//! | anything else | none | empty text |
//!
//! Decoding is strict: invalid UTF-8 is an error, not a lossy conversion.
//! A leading byte-order mark is dropped.
//!
//! [`extract_or_empty`] is the ingestion policy: a failed file is logged and
//! contributes empty text instead of aborting the run.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{info, warn};

use crate::config::DriveConfig;
use crate::download::download_all;
use crate::drive_client::{DriveApi, MediaSource};
use crate::error::ExtractError;
use crate::models::{ContentKind, RemoteFile, MIME_PLAIN_TEXT};

/// Maximum decompressed bytes read from a single xlsx part.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum cells read from the worksheet.
const XLSX_MAX_CELLS: usize = 500_000;
/// Zero-based index of column `XFD`, the last one a worksheet may use.
const XLSX_MAX_COLUMN: usize = 16_383;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

const CELL_SEPARATOR: &str = ", ";

/// Decoded content of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Text(String),
    Rows(Vec<Vec<String>>),
}

impl Extracted {
    /// Flatten to plain text; rows become comma-separated lines.
    pub fn into_text(self) -> String {
        match self {
            Extracted::Text(text) => text,
            Extracted::Rows(rows) => render_rows(&rows),
        }
    }
}

/// Result of [`extract_or_empty`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Text(String),
    /// No decoder for the file's kind.
    Unsupported,
    /// Download or decode failed; already logged.
    Failed,
}

impl Outcome {
    pub fn into_text(self) -> String {
        match self {
            Outcome::Text(text) => text,
            Outcome::Unsupported | Outcome::Failed => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub chunk_size: u64,
    pub sheet_range: String,
}

impl ExtractOptions {
    pub fn from_config(config: &DriveConfig) -> Self {
        Self {
            chunk_size: config.download_chunk_bytes,
            sheet_range: config.sheet_range.clone(),
        }
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            chunk_size: 4 * 1024 * 1024,
            sheet_range: "A1:ZZZ1000".to_string(),
        }
    }
}

/// Download and decode one file.
pub async fn extract(
    api: &dyn DriveApi,
    file: &RemoteFile,
    opts: &ExtractOptions,
) -> Result<Extracted, ExtractError> {
    let raw = || MediaSource::Raw {
        file_id: file.id.clone(),
    };

    match file.kind {
        ContentKind::RichDocument => {
            let source = MediaSource::Export {
                file_id: file.id.clone(),
                mime_type: MIME_PLAIN_TEXT.to_string(),
            };
            let bytes = download_all(api, &source, opts.chunk_size).await?;
            Ok(Extracted::Text(decode_utf8(bytes)?))
        }
        ContentKind::PlainText => {
            let bytes = download_all(api, &raw(), opts.chunk_size).await?;
            Ok(Extracted::Text(decode_utf8(bytes)?))
        }
        ContentKind::Pdf => {
            let bytes = download_all(api, &raw(), opts.chunk_size).await?;
            Ok(Extracted::Text(pdf_text(bytes).await?))
        }
        ContentKind::SpreadsheetNative => {
            let rows = api.sheet_values(&file.id, &opts.sheet_range).await?;
            Ok(Extracted::Rows(rows))
        }
        ContentKind::SpreadsheetInterop => {
            let bytes = download_all(api, &raw(), opts.chunk_size).await?;
            Ok(Extracted::Rows(xlsx_to_rows(&bytes)?))
        }
        ContentKind::Folder | ContentKind::Other => Ok(Extracted::Text(String::new())),
    }
}

/// [`extract`], with failures logged and turned into [`Outcome::Failed`].
pub async fn extract_or_empty(
    api: &dyn DriveApi,
    file: &RemoteFile,
    opts: &ExtractOptions,
) -> Outcome {
    if !file.kind.is_supported() {
        info!(file_id = %file.id, name = %file.name, mime = %file.mime_type, "skipping unsupported file");
        return Outcome::Unsupported;
    }

    info!(file_id = %file.id, name = %file.name, "reading");
    match extract(api, file, opts).await {
        Ok(extracted) => {
            let text = extracted.into_text();
            info!(file_id = %file.id, name = %file.name, chars = text.len(), "done");
            Outcome::Text(text)
        }
        Err(e) => {
            warn!(file_id = %file.id, name = %file.name, error = %e, "extraction failed, using empty text");
            Outcome::Failed
        }
    }
}

/// Strict UTF-8 decode, dropping a leading byte-order mark.
pub fn decode_utf8(mut bytes: Vec<u8>) -> Result<String, ExtractError> {
    if bytes.starts_with(UTF8_BOM) {
        bytes.drain(..UTF8_BOM.len());
    }
    Ok(String::from_utf8(bytes)?)
}

/// Rows as lines of comma-separated cells.
pub fn render_rows(rows: &[Vec<String>]) -> String {
    rows.iter()
        .map(|row| row.join(CELL_SEPARATOR))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Page text of a PDF, pages separated by newlines.
///
/// The parser can panic on hostile input; running it on the blocking pool
/// turns that into a join error.
async fn pdf_text(bytes: Vec<u8>) -> Result<String, ExtractError> {
    let pages = tokio::task::spawn_blocking(move || {
        pdf_extract::extract_text_from_mem_by_pages(&bytes)
    })
    .await
    .map_err(|e| ExtractError::Pdf(format!("parser aborted: {}", e)))?
    .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    Ok(pages
        .iter()
        .map(|p| p.trim_end())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn spreadsheet_err(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::Spreadsheet(e.to_string())
}

/// Rows of the first worksheet of an xlsx workbook.
///
/// Cell values resolve shared strings, inline strings and booleans; numbers
/// and formula results are kept as written. Rows are padded to the widest
/// row so columns line up; rows without any value are dropped.
pub fn xlsx_to_rows(bytes: &[u8]) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(spreadsheet_err)?;

    let shared = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };
    let sheet_name = first_worksheet(&archive)
        .ok_or_else(|| ExtractError::Spreadsheet("workbook has no worksheets".to_string()))?;
    let sheet = read_entry(&mut archive, &sheet_name)?
        .ok_or_else(|| ExtractError::Spreadsheet(format!("{} missing", sheet_name)))?;

    let mut rows = parse_sheet(&sheet, &shared)?;
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    for row in &mut rows {
        row.resize(width, String::new());
    }
    Ok(rows)
}

fn read_entry(
    archive: &mut zip::ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<Vec<u8>>, ExtractError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(spreadsheet_err(e)),
    };
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(spreadsheet_err)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Spreadsheet(format!(
            "{} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(Some(out))
}

fn first_worksheet(archive: &zip::ZipArchive<Cursor<&[u8]>>) -> Option<String> {
    archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .min_by_key(|name| {
            name.trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        })
        .map(str::to_string)
}

/// One string per `<si>`, rich-text runs concatenated.
fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;

    loop {
        match reader.read_event_into(&mut buf).map_err(spreadsheet_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(te) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().map_err(spreadsheet_err)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.extend(current.take()),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

#[derive(Default)]
struct CellState {
    column: usize,
    kind: Option<String>,
    value: String,
}

fn parse_sheet(xml: &[u8], shared: &[String]) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut rows = Vec::new();
    let mut row: HashMap<usize, String> = HashMap::new();
    let mut next_column = 0usize;
    let mut cell: Option<CellState> = None;
    let mut in_value = false;
    let mut cells_read = 0usize;

    loop {
        match reader.read_event_into(&mut buf).map_err(spreadsheet_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row.clear();
                    next_column = 0;
                }
                b"c" => {
                    let state = cell_start(&e, next_column)?;
                    next_column = state.column + 1;
                    cell = Some(state);
                }
                b"v" | b"t" => in_value = cell.is_some(),
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                next_column = cell_start(&e, next_column)?.column + 1;
            }
            Event::Text(te) if in_value => {
                if let Some(state) = cell.as_mut() {
                    state.value.push_str(&te.unescape().map_err(spreadsheet_err)?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(state) = cell.take() {
                        let value = resolve_cell(state.kind.as_deref(), state.value, shared);
                        if !value.is_empty() {
                            row.insert(state.column, value);
                        }
                        cells_read += 1;
                    }
                }
                b"row" => {
                    if let Some(width) = row.keys().max().map(|m| m + 1) {
                        let mut cells = vec![String::new(); width];
                        for (col, value) in row.drain() {
                            cells[col] = value;
                        }
                        rows.push(cells);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
        if cells_read >= XLSX_MAX_CELLS {
            warn!(limit = XLSX_MAX_CELLS, "worksheet truncated at cell limit");
            break;
        }
    }
    Ok(rows)
}

fn cell_start(e: &BytesStart<'_>, fallback_column: usize) -> Result<CellState, ExtractError> {
    let mut state = CellState {
        column: fallback_column,
        ..CellState::default()
    };
    for attr in e.attributes() {
        let attr = attr.map_err(spreadsheet_err)?;
        match attr.key.as_ref() {
            b"r" => {
                let reference = attr.unescape_value().map_err(spreadsheet_err)?;
                match column_index(&reference) {
                    Some(col) if col <= XLSX_MAX_COLUMN => state.column = col,
                    Some(_) => {
                        return Err(ExtractError::Spreadsheet(format!(
                            "cell reference {} is beyond column XFD",
                            reference
                        )))
                    }
                    None => {}
                }
            }
            b"t" => {
                state.kind = Some(attr.unescape_value().map_err(spreadsheet_err)?.into_owned());
            }
            _ => {}
        }
    }
    if state.column > XLSX_MAX_COLUMN {
        return Err(ExtractError::Spreadsheet("row has more than 16384 columns".to_string()));
    }
    Ok(state)
}

fn resolve_cell(kind: Option<&str>, raw: String, shared: &[String]) -> String {
    match kind {
        Some("s") => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared.get(i).cloned())
            .unwrap_or_default(),
        Some("b") => match raw.trim() {
            "1" => "TRUE".to_string(),
            "0" => "FALSE".to_string(),
            other => other.to_string(),
        },
        _ => raw,
    }
}

/// Zero-based column of an A1-style reference (`"C7"` → 2). Saturates at
/// `usize::MAX` for absurdly long letter runs.
fn column_index(reference: &str) -> Option<usize> {
    let letters: Vec<u8> = reference
        .bytes()
        .take_while(u8::is_ascii_alphabetic)
        .collect();
    if letters.is_empty() {
        return None;
    }
    let mut col = 0usize;
    for b in letters {
        let digit = (b.to_ascii_uppercase() - b'A' + 1) as usize;
        col = col.saturating_mul(26).saturating_add(digit);
    }
    Some(col - 1)
}
