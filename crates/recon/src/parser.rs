//! Import snapshot parsing.
//!
//! Turns raw `key, name, rank, level, power` rows into validated
//! [`MemberSnapshot`]s. Each row stands alone: a bad row becomes a
//! [`RowError`] and parsing carries on with the next one.

use std::collections::{HashMap, HashSet};
use std::io::Read;

use serde::Serialize;

use crate::config::ImportConfig;
use crate::error::{ConfigError, RowError, ValidationError};
use crate::model::{MemberKey, MemberSnapshot};

/// Fields per import row, in order: key, name, rank, level, power.
pub const FIELD_COUNT: usize = 5;

/// A validated row and the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRow {
    pub line: u64,
    pub snapshot: MemberSnapshot,
}

pub type RowResult = Result<ParsedRow, RowError>;

#[derive(Debug, Clone, Copy)]
pub struct SnapshotParser {
    has_header: bool,
    delimiter: u8,
}

impl Default for SnapshotParser {
    fn default() -> Self {
        Self {
            has_header: false,
            delimiter: b',',
        }
    }
}

impl SnapshotParser {
    pub fn new(config: &ImportConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            has_header: config.has_header,
            delimiter: config.delimiter_byte()?,
        })
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Lazily parse delimited text. Nothing is read until the iterator is driven.
    pub fn rows<R: Read>(&self, reader: R) -> SnapshotRows<R> {
        let records = csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(self.has_header)
            .flexible(true)
            .from_reader(reader)
            .into_records();
        SnapshotRows {
            records,
            last_line: if self.has_header { 1 } else { 0 },
            done: false,
        }
    }

    pub fn parse_str<'a>(&self, content: &'a str) -> SnapshotRows<&'a [u8]> {
        self.rows(content.as_bytes())
    }

    /// Validate one pre-split row.
    ///
    /// A rejected row still carries its key when the key field alone is valid.
    pub fn parse_record<S: AsRef<str>>(line: u64, fields: &[S]) -> RowResult {
        let row_key = || fields.first().and_then(|k| MemberKey::new(k.as_ref()).ok());
        let [key, name, rank, level, power] = fields else {
            return Err(RowError::new(
                line,
                ValidationError::FieldCount {
                    expected: FIELD_COUNT,
                    found: fields.len(),
                },
            )
            .with_key(row_key()));
        };
        MemberSnapshot::from_fields(
            key.as_ref(),
            name.as_ref(),
            rank.as_ref(),
            level.as_ref(),
            power.as_ref(),
        )
        .map(|snapshot| ParsedRow { line, snapshot })
        .map_err(|e| RowError::new(line, e).with_key(row_key()))
    }

    pub fn has_header(&self) -> bool {
        self.has_header
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }
}

/// Iterator over parsed rows of one import.
pub struct SnapshotRows<R> {
    records: csv::StringRecordsIntoIter<R>,
    last_line: u64,
    done: bool,
}

impl<R: Read> Iterator for SnapshotRows<R> {
    type Item = RowResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.records.next()? {
            Ok(record) => {
                let line = record
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(self.last_line + 1);
                self.last_line = line;
                let fields: Vec<&str> = record.iter().collect();
                Some(SnapshotParser::parse_record(line, &fields))
            }
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(self.last_line + 1);
                self.last_line = line;
                // The reader cannot resume after an IO failure.
                if e.is_io_error() {
                    self.done = true;
                }
                Some(Err(RowError::new(line, ValidationError::Malformed(e.to_string()))))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

/// A key seen more than once in one import. The later row wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateKeyWarning {
    pub key: MemberKey,
    /// Line of the row that was overridden.
    pub overridden_line: u64,
    /// Line of the row that now applies.
    pub line: u64,
}

/// Candidates with duplicates collapsed, plus everything that went wrong on the way.
#[derive(Debug, Default)]
pub struct CandidateSet {
    /// One row per key, ordered by the key's first appearance.
    pub rows: Vec<ParsedRow>,
    pub errors: Vec<RowError>,
    pub warnings: Vec<DuplicateKeyWarning>,
}

impl CandidateSet {
    pub fn contains(&self, key: &MemberKey) -> bool {
        self.rows.iter().any(|r| &r.snapshot.key == key)
    }

    /// Keys named by rows that failed validation.
    pub fn rejected_keys(&self) -> HashSet<&MemberKey> {
        self.errors.iter().filter_map(|e| e.key.as_ref()).collect()
    }
}

/// Collapse duplicate keys last-write-wins in file order.
pub fn dedupe<I>(rows: I) -> CandidateSet
where
    I: IntoIterator<Item = RowResult>,
{
    let mut set = CandidateSet::default();
    let mut index: HashMap<MemberKey, usize> = HashMap::new();

    for row in rows {
        match row {
            Ok(row) => match index.get(&row.snapshot.key) {
                Some(&slot) => {
                    let previous = &mut set.rows[slot];
                    log::debug!(
                        "duplicate key '{}' on line {} overrides line {}",
                        row.snapshot.key,
                        row.line,
                        previous.line
                    );
                    set.warnings.push(DuplicateKeyWarning {
                        key: row.snapshot.key.clone(),
                        overridden_line: previous.line,
                        line: row.line,
                    });
                    *previous = row;
                }
                None => {
                    index.insert(row.snapshot.key.clone(), set.rows.len());
                    set.rows.push(row);
                }
            },
            Err(e) => {
                log::debug!("rejected import row: {e}");
                set.errors.push(e);
            }
        }
    }

    set
}
