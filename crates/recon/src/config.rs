use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// How an import treats members that are absent from the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Additive: absent members are left untouched.
    #[default]
    Merge,
    /// The snapshot is the full roster: absent members are deleted.
    Authoritative,
}

impl std::fmt::Display for ImportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Authoritative => write!(f, "authoritative"),
        }
    }
}

// ---------------------------------------------------------------------------
// Import config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportConfig {
    /// Skip the first record as a header. Headers are never sniffed.
    #[serde(default)]
    pub has_header: bool,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub mode: ImportMode,
    /// Append change log entries for updated members.
    #[serde(default)]
    pub record_changes: bool,
}

fn default_delimiter() -> char {
    ','
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            has_header: false,
            delimiter: default_delimiter(),
            mode: ImportMode::Merge,
            record_changes: false,
        }
    }
}

impl ImportConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: ImportConfig =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.delimiter_byte().map(|_| ())
    }

    /// The delimiter as the single byte the CSV reader expects.
    pub fn delimiter_byte(&self) -> Result<u8, ConfigError> {
        let d = self.delimiter;
        if !d.is_ascii() {
            return Err(ConfigError::Validation(format!(
                "delimiter must be a single ASCII character, got '{d}'"
            )));
        }
        if matches!(d, '"' | '\n' | '\r') {
            return Err(ConfigError::Validation(format!(
                "delimiter cannot be {d:?}"
            )));
        }
        Ok(d as u8)
    }
}
