use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Largest accepted power value. Keeps deltas and SQLite INTEGER storage lossless.
pub const MAX_POWER: u64 = i64::MAX as u64;

// ---------------------------------------------------------------------------
// Rank
// ---------------------------------------------------------------------------

/// Alliance rank. Declaration order is the natural order: R5 > R4 > R3 > R2 > R1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rank {
    R1,
    R2,
    R3,
    R4,
    R5,
}

impl Rank {
    pub const ALL: [Rank; 5] = [Rank::R1, Rank::R2, Rank::R3, Rank::R4, Rank::R5];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::R1 => "R1",
            Self::R2 => "R2",
            Self::R3 => "R3",
            Self::R4 => "R4",
            Self::R5 => "R5",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rank {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "R1" => Ok(Self::R1),
            "R2" => Ok(Self::R2),
            "R3" => Ok(Self::R3),
            "R4" => Ok(Self::R4),
            "R5" => Ok(Self::R5),
            other => Err(ValidationError::InvalidRank(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// Externally supplied member identifier. Never regenerated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberKey(String);

impl MemberKey {
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = clean_field(raw);
        if trimmed.is_empty() {
            return Err(ValidationError::MissingField("key"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip surrounding whitespace and any byte-order marks.
pub fn clean_field(raw: &str) -> &str {
    raw.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}')
}

fn required<'a>(field: &'static str, raw: &'a str) -> Result<&'a str, ValidationError> {
    let value = clean_field(raw);
    if value.is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(value)
    }
}

pub fn parse_level(raw: &str) -> Result<u32, ValidationError> {
    let value = required("level", raw)?;
    value.parse::<u32>().map_err(|_| ValidationError::InvalidValue {
        field: "level",
        value: value.to_string(),
    })
}

pub fn parse_power(raw: &str) -> Result<u64, ValidationError> {
    let value = required("power", raw)?;
    match value.parse::<u64>() {
        Ok(power) if power <= MAX_POWER => Ok(power),
        _ => Err(ValidationError::InvalidValue {
            field: "power",
            value: value.to_string(),
        }),
    }
}

pub fn parse_rank(raw: &str) -> Result<Rank, ValidationError> {
    required("rank", raw)?.parse()
}

pub fn parse_display_name(raw: &str) -> Result<String, ValidationError> {
    required("name", raw).map(str::to_string)
}

// ---------------------------------------------------------------------------
// Snapshot (one observation of a member)
// ---------------------------------------------------------------------------

/// A validated candidate record: one member as observed by an import or an add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberSnapshot {
    pub key: MemberKey,
    pub display_name: String,
    pub rank: Rank,
    pub level: u32,
    pub power: u64,
}

impl MemberSnapshot {
    /// Validate the five raw fields of an import row.
    ///
    /// Fields are checked in order, so the first offending field is reported.
    pub fn from_fields(
        key: &str,
        display_name: &str,
        rank: &str,
        level: &str,
        power: &str,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            key: MemberKey::new(key)?,
            display_name: parse_display_name(display_name)?,
            rank: parse_rank(rank)?,
            level: parse_level(level)?,
            power: parse_power(power)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Record (persisted member)
// ---------------------------------------------------------------------------

/// A persisted roster member.
///
/// `level_start` / `power_start` are fixed at first observation; there is no
/// way to change them on an existing record. Powers never exceed [`MAX_POWER`]:
/// every constructor and setter saturates at it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRecord {
    key: MemberKey,
    display_name: String,
    rank: Rank,
    level_start: u32,
    level_current: u32,
    power_start: u64,
    power_current: u64,
}

impl MemberRecord {
    /// Create a member from its first observation: baseline == current.
    pub fn first_observed(snapshot: &MemberSnapshot) -> Self {
        Self {
            key: snapshot.key.clone(),
            display_name: snapshot.display_name.clone(),
            rank: snapshot.rank,
            level_start: snapshot.level,
            level_current: snapshot.level,
            power_start: snapshot.power.min(MAX_POWER),
            power_current: snapshot.power.min(MAX_POWER),
        }
    }

    /// Rebuild a record exactly as persisted. For store implementations.
    pub fn restore(
        key: MemberKey,
        display_name: String,
        rank: Rank,
        level_start: u32,
        level_current: u32,
        power_start: u64,
        power_current: u64,
    ) -> Self {
        Self {
            key,
            display_name,
            rank,
            level_start,
            level_current,
            power_start: power_start.min(MAX_POWER),
            power_current: power_current.min(MAX_POWER),
        }
    }

    /// Apply a later observation of the same member. Baselines are kept.
    pub fn observe(&self, snapshot: &MemberSnapshot) -> Self {
        debug_assert_eq!(self.key, snapshot.key);
        Self {
            key: self.key.clone(),
            display_name: snapshot.display_name.clone(),
            rank: snapshot.rank,
            level_start: self.level_start,
            level_current: snapshot.level,
            power_start: self.power_start,
            power_current: snapshot.power.min(MAX_POWER),
        }
    }

    pub fn key(&self) -> &MemberKey {
        &self.key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn level_start(&self) -> u32 {
        self.level_start
    }

    pub fn level_current(&self) -> u32 {
        self.level_current
    }

    pub fn power_start(&self) -> u64 {
        self.power_start
    }

    pub fn power_current(&self) -> u64 {
        self.power_current
    }

    pub fn set_display_name(&mut self, display_name: String) {
        self.display_name = display_name;
    }

    pub fn set_rank(&mut self, rank: Rank) {
        self.rank = rank;
    }

    pub fn set_level_current(&mut self, level: u32) {
        self.level_current = level;
    }

    /// Saturates at [`MAX_POWER`].
    pub fn set_power_current(&mut self, power: u64) {
        if power > MAX_POWER {
            log::warn!("power {power} for '{}' capped at {MAX_POWER}", self.key);
        }
        self.power_current = power.min(MAX_POWER);
    }

    /// `level_current - level_start`. Negative when the member regressed.
    pub fn level_delta(&self) -> i64 {
        i64::from(self.level_current) - i64::from(self.level_start)
    }

    /// `power_current - power_start`. Negative when the member regressed.
    pub fn power_delta(&self) -> i64 {
        signed(self.power_current) - signed(self.power_start)
    }
}

/// Powers are capped at [`MAX_POWER`], so this never saturates for stored values.
pub(crate) fn signed(power: u64) -> i64 {
    i64::try_from(power).unwrap_or(i64::MAX)
}

/// Roster display order: rank descending, power descending, key ascending.
pub fn roster_order(a: &MemberRecord, b: &MemberRecord) -> std::cmp::Ordering {
    b.rank
        .cmp(&a.rank)
        .then_with(|| b.power_current.cmp(&a.power_current))
        .then_with(|| a.key.cmp(&b.key))
}
