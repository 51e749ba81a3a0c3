use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{signed, MemberKey, MemberRecord, Rank};

/// Before/after values of one observed change to a member.
///
/// Append-only. Entries go away only when their member is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub key: MemberKey,
    /// Display name after the change.
    pub display_name: String,
    pub display_name_old: String,
    pub rank_old: Rank,
    pub rank_new: Rank,
    pub level_old: u32,
    pub level_new: u32,
    pub power_old: u64,
    pub power_new: u64,
    pub recorded_at: DateTime<Utc>,
}

impl ChangeLogEntry {
    /// Entry for `old -> new`, or `None` when the two records are identical.
    pub fn between(old: &MemberRecord, new: &MemberRecord, recorded_at: DateTime<Utc>) -> Option<Self> {
        if old == new {
            return None;
        }
        Some(Self {
            key: new.key().clone(),
            display_name: new.display_name().to_string(),
            display_name_old: old.display_name().to_string(),
            rank_old: old.rank(),
            rank_new: new.rank(),
            level_old: old.level_current(),
            level_new: new.level_current(),
            power_old: old.power_current(),
            power_new: new.power_current(),
            recorded_at,
        })
    }

    pub fn level_delta(&self) -> i64 {
        i64::from(self.level_new) - i64::from(self.level_old)
    }

    pub fn power_delta(&self) -> i64 {
        signed(self.power_new) - signed(self.power_old)
    }

    pub fn renamed(&self) -> bool {
        self.display_name != self.display_name_old
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MemberSnapshot;

    fn record(level: &str, power: &str) -> MemberRecord {
        MemberRecord::first_observed(&MemberSnapshot::from_fields("m1", "Alice", "R3", level, power).unwrap())
    }

    #[test]
    fn no_entry_when_nothing_changed() {
        let a = record("10", "1000");
        assert!(ChangeLogEntry::between(&a, &a.clone(), Utc::now()).is_none());
    }

    #[test]
    fn rank_or_name_alone_is_logged() {
        let a = record("10", "1000");
        let b = a.observe(&MemberSnapshot::from_fields("m1", "Alicia", "R4", "10", "1000").unwrap());
        let entry = ChangeLogEntry::between(&a, &b, Utc::now()).unwrap();
        assert_eq!((entry.rank_old, entry.rank_new), (Rank::R3, Rank::R4));
        assert_eq!(entry.display_name_old, "Alice");
        assert_eq!(entry.display_name, "Alicia");
        assert!(entry.renamed());
        assert_eq!((entry.level_delta(), entry.power_delta()), (0, 0));

        let mut c = a.clone();
        c.set_display_name("Ally".into());
        let entry = ChangeLogEntry::between(&a, &c, Utc::now()).unwrap();
        assert_eq!(entry.rank_old, entry.rank_new);
        assert!(entry.renamed());
    }

    #[test]
    fn entry_records_old_and_new() {
        let a = record("10", "1000");
        let b = a.observe(&MemberSnapshot::from_fields("m1", "Alice", "R4", "12", "900").unwrap());
        let entry = ChangeLogEntry::between(&a, &b, Utc::now()).unwrap();
        assert_eq!((entry.level_old, entry.level_new), (10, 12));
        assert_eq!((entry.power_old, entry.power_new), (1000, 900));
        assert_eq!(entry.level_delta(), 2);
        assert_eq!(entry.power_delta(), -100);
        assert!(!entry.renamed());
    }
}
