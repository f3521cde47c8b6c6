// PartitionReader - bounded-memory streaming over partition-level exports
//
// Instrument exports are delimited text:
//   sep=,                      <- optional format directive (skipped)
//   Well,Sample,RFU,Threshold  <- header
//   A1,PC,1523.4,812.0         <- one row per partition
//
// Fields may be double-quoted; a quoted field can hold the delimiter, a
// doubled `""` quote, or a line break.
//
// Rows are handed out in fixed-size batches so callers never hold more than
// one batch of raw records at a time.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::config::ExtractionConfig;
use crate::error::ExtractionError;

const DEFAULT_DELIMITER: char = ',';
const DIRECTIVE_MARKER: &str = "sep=";
const WELL_HEADER: &str = "Well";
const THRESHOLD_HEADER: &str = "Threshold";

/// One partition row
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRecord {
    pub well: String,
    /// Finite RFU reading; `None` when blank, non-numeric or NaN
    pub rfu: Option<f64>,
    /// Per-row instrument threshold, when the export carries one
    pub threshold: Option<f64>,
}

/// Column positions resolved from the header row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub well: usize,
    pub rfu: usize,
    pub threshold: Option<usize>,
    pub headers: Vec<String>,
}

impl ColumnLayout {
    /// Resolve column positions from header names
    ///
    /// The well column is `well_column` when given, else a column named `Well`
    /// (case-insensitive), else the first column. The RFU column must match
    /// `rfu_column` exactly.
    pub fn resolve(
        headers: Vec<String>,
        config: &ExtractionConfig,
    ) -> Result<Self, ExtractionError> {
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ExtractionError::UnrecognizedLayout {
                reason: "header row is empty".to_string(),
            });
        }

        let well = match &config.well_column {
            Some(name) => headers.iter().position(|h| h == name).ok_or_else(|| {
                ExtractionError::UnrecognizedLayout {
                    reason: format!("no well column named '{}'", name),
                }
            })?,
            None => headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(WELL_HEADER))
                .unwrap_or(0),
        };

        let rfu = headers
            .iter()
            .position(|h| *h == config.rfu_column)
            .ok_or_else(|| ExtractionError::UnrecognizedLayout {
                reason: format!("no '{}' column in header", config.rfu_column),
            })?;

        if rfu == well {
            return Err(ExtractionError::UnrecognizedLayout {
                reason: format!(
                    "well column and '{}' column are the same column",
                    config.rfu_column
                ),
            });
        }

        let threshold = headers.iter().position(|h| h == THRESHOLD_HEADER);

        Ok(Self {
            well,
            rfu,
            threshold,
            headers,
        })
    }
}

/// Streaming reader over a partition export
pub struct PartitionReader<R> {
    reader: R,
    source: String,
    delimiter: char,
    layout: ColumnLayout,
    line_no: usize,
    raw: Vec<u8>,
    eof: bool,
}

impl PartitionReader<BufReader<File>> {
    /// Open a partition export and parse its directive and header lines
    pub fn open<P: AsRef<Path>>(
        path: P,
        config: &ExtractionConfig,
    ) -> Result<Self, ExtractionError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| ExtractionError::FileOpen {
            path: path.display().to_string(),
            details: err.to_string(),
        })?;
        Self::from_reader(BufReader::new(file), path.display().to_string(), config)
    }
}

impl<R: BufRead> PartitionReader<R> {
    /// Wrap any buffered source; `source` names it in error messages
    pub fn from_reader(
        reader: R,
        source: impl Into<String>,
        config: &ExtractionConfig,
    ) -> Result<Self, ExtractionError> {
        let mut this = Self {
            reader,
            source: source.into(),
            delimiter: DEFAULT_DELIMITER,
            layout: ColumnLayout {
                well: 0,
                rfu: 0,
                threshold: None,
                headers: Vec::new(),
            },
            line_no: 0,
            raw: Vec::with_capacity(256),
            eof: false,
        };

        let mut first = this.next_record()?.ok_or_else(no_header)?;
        if first.contains(DIRECTIVE_MARKER) {
            if let Some(delimiter) = directive_delimiter(&first) {
                this.delimiter = delimiter;
            }
            tracing::debug!(
                "[Extractor] Skipping format directive in {}: {:?}",
                this.source,
                first
            );
            first = this.next_record()?.ok_or_else(no_header)?;
        }

        let headers = split_fields(&first, this.delimiter);
        this.layout = ColumnLayout::resolve(headers, config)?;
        Ok(this)
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// 1-based number of the last line read
    pub fn line_number(&self) -> usize {
        self.line_no
    }

    /// Read up to `max_rows` data rows into `batch` (cleared first)
    ///
    /// Returns the number of rows consumed, which may exceed the number of
    /// records pushed: blank rows and rows without a well identifier are
    /// dropped. Returns 0 only at end of input.
    pub fn next_batch(
        &mut self,
        batch: &mut Vec<PartitionRecord>,
        max_rows: usize,
    ) -> Result<usize, ExtractionError> {
        batch.clear();
        let max_rows = max_rows.max(1);
        let mut consumed = 0;

        while consumed < max_rows {
            let Some(row) = self.next_record()? else {
                break;
            };
            consumed += 1;
            if let Some(record) = self.parse_row(&row) {
                batch.push(record);
            }
        }
        Ok(consumed)
    }

    fn parse_row(&self, line: &str) -> Option<PartitionRecord> {
        if line.trim().is_empty() {
            return None;
        }

        let mut well = None;
        let mut rfu = None;
        let mut threshold = None;
        for (idx, field) in split_fields(line, self.delimiter).into_iter().enumerate() {
            if idx == self.layout.well {
                well = Some(field);
            } else if idx == self.layout.rfu {
                rfu = parse_reading(&field);
            } else if Some(idx) == self.layout.threshold {
                threshold = parse_reading(&field);
            }
        }

        let well = well.filter(|w| !w.is_empty())?;
        Some(PartitionRecord {
            well,
            rfu,
            threshold,
        })
    }

    /// Next logical row; physical lines are joined while a quote is open
    fn next_record(&mut self) -> Result<Option<String>, ExtractionError> {
        let Some(mut row) = self.next_line()? else {
            return Ok(None);
        };
        while quote_open(&row, self.delimiter) {
            let Some(more) = self.next_line()? else {
                tracing::debug!(
                    "[Extractor] Unterminated quote at end of {}",
                    self.source
                );
                break;
            };
            row.push('\n');
            row.push_str(&more);
        }
        Ok(Some(row))
    }

    fn next_line(&mut self) -> Result<Option<String>, ExtractionError> {
        if self.eof {
            return Ok(None);
        }
        self.raw.clear();
        let read = self
            .reader
            .read_until(b'\n', &mut self.raw)
            .map_err(|err| ExtractionError::Read {
                path: self.source.clone(),
                line: self.line_no + 1,
                details: err.to_string(),
            })?;
        if read == 0 {
            self.eof = true;
            return Ok(None);
        }
        self.line_no += 1;

        let mut line = String::from_utf8_lossy(&self.raw).into_owned();
        while line.ends_with(['\n', '\r']) {
            line.pop();
        }
        if self.line_no == 1 {
            if let Some(stripped) = line.strip_prefix('\u{feff}') {
                line = stripped.to_string();
            }
        }
        Ok(Some(line))
    }
}

fn no_header() -> ExtractionError {
    ExtractionError::UnrecognizedLayout {
        reason: "file has no header row".to_string(),
    }
}

/// Delimiter named by a `sep=X` directive, when X is a single character
fn directive_delimiter(line: &str) -> Option<char> {
    let start = line.find(DIRECTIVE_MARKER)? + DIRECTIVE_MARKER.len();
    let value = line[start..].trim_end_matches(['\r', '\n', '"']);
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

/// Split a row into trimmed, unquoted fields
///
/// A quote opens a quoted section only at the start of a field; inside it the
/// delimiter is literal and `""` stands for one quote. Text after the closing
/// quote is kept, as is a stray quote in the middle of an unquoted field.
fn split_fields(row: &str, delimiter: char) -> Vec<String> {
    scan_row(row, delimiter).0
}

/// Whether `row` ends inside a quoted field
fn quote_open(row: &str, delimiter: char) -> bool {
    row.contains('"') && scan_row(row, delimiter).1
}

fn scan_row(row: &str, delimiter: char) -> (Vec<String>, bool) {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = row.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
        } else if c == delimiter {
            fields.push(field.trim().to_string());
            field.clear();
        } else if c == '"' && field.trim().is_empty() {
            field.clear();
            in_quotes = true;
        } else {
            field.push(c);
        }
    }
    fields.push(field.trim().to_string());
    (fields, in_quotes)
}

/// Parse a numeric field, rejecting blanks, text and non-finite values
fn parse_reading(field: &str) -> Option<f64> {
    if field.is_empty() {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}
