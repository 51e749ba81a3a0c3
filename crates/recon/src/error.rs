use std::fmt;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::model::MemberKey;

/// Why a single import row (or a single-member edit) was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field was empty after trimming.
    MissingField(&'static str),
    /// Rank outside R1..R5. Never coerced.
    InvalidRank(String),
    /// Negative, non-numeric or out-of-range numeric field.
    InvalidValue { field: &'static str, value: String },
    /// Row did not have exactly the expected number of fields.
    FieldCount { expected: usize, found: usize },
    /// Row could not be decoded at all (bad quoting, invalid UTF-8).
    Malformed(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing field '{field}'"),
            Self::InvalidRank(value) => {
                write!(f, "invalid rank '{value}' (expected R1, R2, R3, R4 or R5)")
            }
            Self::InvalidValue { field, value } => {
                write!(f, "invalid {field} '{value}': expected a non-negative integer")
            }
            Self::FieldCount { expected, found } => {
                write!(f, "expected {expected} fields, found {found}")
            }
            Self::Malformed(msg) => write!(f, "malformed row: {msg}"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// A rejected import row. Recorded in the report, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// 1-based physical line number in the import.
    pub line: u64,
    pub error: ValidationError,
    /// Key of the rejected row, when its key field was itself valid.
    pub key: Option<MemberKey>,
}

impl RowError {
    pub fn new(line: u64, error: ValidationError) -> Self {
        Self { line, error, key: None }
    }

    pub fn with_key(mut self, key: Option<MemberKey>) -> Self {
        self.key = key;
        self
    }

    pub fn reason(&self) -> String {
        self.error.to_string()
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.error)
    }
}

impl Serialize for RowError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("RowError", 3)?;
        s.serialize_field("line", &self.line)?;
        s.serialize_field("key", &self.key)?;
        s.serialize_field("reason", &self.reason())?;
        s.end()
    }
}

/// Typed failure from a [`crate::store::RosterStore`] operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No member with this key.
    NotFound(String),
    /// Insert-only put for a key that already exists.
    Conflict(String),
    /// Backend failure (unreachable, uninitialised schema, IO). Aborts the call.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "member '{key}' not found"),
            Self::Conflict(key) => write!(f, "member '{key}' already exists"),
            Self::Unavailable(msg) => write!(f, "roster store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Operation-level failure of a reconciliation. No partial counts survive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    Store(StoreError),
    /// The caller's deadline had already passed before the run started.
    DeadlineExceeded,
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "reconciliation aborted: {e}"),
            Self::DeadlineExceeded => write!(f, "reconciliation not started: deadline exceeded"),
        }
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::DeadlineExceeded => None,
        }
    }
}

impl From<StoreError> for ReconcileError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Import configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file exists but could not be read.
    Io(String),
    /// TOML parse / deserialization error.
    Parse(String),
    /// Parsed, but a value is out of range.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "config read error: {msg}"),
            Self::Parse(msg) => write!(f, "config parse error: {msg}"),
            Self::Validation(msg) => write!(f, "config validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
