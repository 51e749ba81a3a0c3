use serde::Serialize;

use crate::config::ImportMode;
use crate::error::RowError;
use crate::model::MemberKey;
use crate::parser::DuplicateKeyWarning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Inserted,
    /// Seen again with at least one differing field.
    Updated,
    /// Seen again, identical to the stored record. Reported as an update.
    Unchanged,
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inserted => write!(f, "inserted"),
            Self::Updated => write!(f, "updated"),
            Self::Unchanged => write!(f, "unchanged"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// What happened to one member during a reconciliation.
///
/// Deltas are import-relative (`new current - old current`); zero for
/// inserts, and for deletes they are the negated last current values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberChange {
    pub key: MemberKey,
    pub display_name: String,
    pub kind: ChangeKind,
    pub level_delta: i64,
    pub power_delta: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub mode: ImportMode,
    pub inserted: usize,
    /// Every key seen again, including `unchanged` ones.
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    /// Rows rejected by validation (`errors.len()`).
    pub skipped: usize,
    pub errors: Vec<RowError>,
    pub warnings: Vec<DuplicateKeyWarning>,
    pub change_log_entries: usize,
    pub changes: Vec<MemberChange>,
    pub run_at: String,
}

impl ReconciliationReport {
    /// Count the per-member changes into a report.
    pub fn tally(
        mode: ImportMode,
        changes: Vec<MemberChange>,
        errors: Vec<RowError>,
        warnings: Vec<DuplicateKeyWarning>,
        change_log_entries: usize,
    ) -> Self {
        let mut inserted = 0;
        let mut updated = 0;
        let mut unchanged = 0;
        let mut deleted = 0;

        for c in &changes {
            match c.kind {
                ChangeKind::Inserted => inserted += 1,
                ChangeKind::Updated => updated += 1,
                ChangeKind::Unchanged => {
                    updated += 1;
                    unchanged += 1;
                }
                ChangeKind::Deleted => deleted += 1,
            }
        }

        Self {
            mode,
            inserted,
            updated,
            unchanged,
            deleted,
            skipped: errors.len(),
            errors,
            warnings,
            change_log_entries,
            changes,
            run_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// No rejected rows and no duplicate keys.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} import: {} inserted, {} updated ({} unchanged), {} deleted, {} rows skipped",
            self.mode, self.inserted, self.updated, self.unchanged, self.deleted, self.skipped,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    fn change(kind: ChangeKind) -> MemberChange {
        MemberChange {
            key: MemberKey::new("k").unwrap(),
            display_name: "K".into(),
            kind,
            level_delta: 0,
            power_delta: 0,
        }
    }

    #[test]
    fn tally_counts_unchanged_as_updated() {
        let report = ReconciliationReport::tally(
            ImportMode::Authoritative,
            vec![
                change(ChangeKind::Inserted),
                change(ChangeKind::Updated),
                change(ChangeKind::Unchanged),
                change(ChangeKind::Deleted),
                change(ChangeKind::Deleted),
            ],
            vec![RowError::new(4, ValidationError::MissingField("key"))],
            vec![],
            1,
        );
        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 2);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.skipped, 1);
        assert!(!report.is_clean());
        assert_eq!(
            report.summary_line(),
            "authoritative import: 1 inserted, 2 updated (1 unchanged), 2 deleted, 1 rows skipped"
        );
    }

    #[test]
    fn errors_serialize_as_line_and_reason() {
        let report = ReconciliationReport::tally(
            ImportMode::Merge,
            vec![],
            vec![RowError::new(5, ValidationError::InvalidRank("R9".into()))],
            vec![],
            0,
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["errors"][0]["line"], 5);
        assert_eq!(
            json["errors"][0]["reason"],
            "invalid rank 'R9' (expected R1, R2, R3, R4 or R5)"
        );
        assert_eq!(json["mode"], "merge");
    }
}
