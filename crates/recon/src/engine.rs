use std::collections::HashMap;
use std::time::Instant;

use crate::changelog::ChangeLogEntry;
use crate::config::ImportMode;
use crate::error::ReconcileError;
use crate::model::{signed, MemberKey, MemberRecord};
use crate::parser::{dedupe, CandidateSet, RowResult};
use crate::report::{ChangeKind, MemberChange, ReconciliationReport};
use crate::store::{PutMode, RosterStore, RosterTxn};

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Append a change log entry for every updated member.
    pub record_changes: bool,
    /// Refuse to start after this instant. Never checked mid-run.
    pub deadline: Option<Instant>,
}

/// One step needed to bring the store in line with a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Insert(MemberRecord),
    Update { old: MemberRecord, new: MemberRecord },
    /// Seen again with nothing to write.
    Unchanged(MemberRecord),
    Delete(MemberRecord),
}

impl Mutation {
    fn change(&self) -> MemberChange {
        let (record, kind, level_delta, power_delta) = match self {
            Self::Insert(r) => (r, ChangeKind::Inserted, 0, 0),
            Self::Update { old, new } => (
                new,
                ChangeKind::Updated,
                i64::from(new.level_current()) - i64::from(old.level_current()),
                signed(new.power_current()) - signed(old.power_current()),
            ),
            Self::Unchanged(r) => (r, ChangeKind::Unchanged, 0, 0),
            Self::Delete(r) => (
                r,
                ChangeKind::Deleted,
                -i64::from(r.level_current()),
                -signed(r.power_current()),
            ),
        };
        MemberChange {
            key: record.key().clone(),
            display_name: record.display_name().to_string(),
            kind,
            level_delta,
            power_delta,
        }
    }
}

/// Diff candidates against the current roster. Pure; touches no store.
///
/// Inserts and updates come in candidate order, deletes in roster order.
/// Authoritative mode never deletes a member whose row was present but rejected.
pub fn plan(existing: Vec<MemberRecord>, candidates: &CandidateSet, mode: ImportMode) -> Vec<Mutation> {
    let order: Vec<MemberKey> = existing.iter().map(|r| r.key().clone()).collect();
    let mut current: HashMap<MemberKey, MemberRecord> =
        existing.into_iter().map(|r| (r.key().clone(), r)).collect();

    let mut mutations = Vec::with_capacity(candidates.rows.len());
    for row in &candidates.rows {
        let snapshot = &row.snapshot;
        let mutation = match current.remove(&snapshot.key) {
            None => Mutation::Insert(MemberRecord::first_observed(snapshot)),
            Some(old) => {
                let new = old.observe(snapshot);
                if new == old {
                    Mutation::Unchanged(old)
                } else {
                    Mutation::Update { old, new }
                }
            }
        };
        mutations.push(mutation);
    }

    if mode == ImportMode::Authoritative {
        let rejected = candidates.rejected_keys();
        for key in order {
            if rejected.contains(&key) {
                log::warn!("keeping '{key}': its import row was rejected");
                continue;
            }
            if let Some(absent) = current.remove(&key) {
                mutations.push(Mutation::Delete(absent));
            }
        }
    }

    mutations
}

/// Applies import snapshots to a roster store.
///
/// Each call runs in a single store transaction: either every mutation is
/// committed or none is.
pub struct Reconciler<'s, S: RosterStore + ?Sized> {
    store: &'s S,
    options: ReconcileOptions,
}

impl<'s, S: RosterStore + ?Sized> Reconciler<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self::with_options(store, ReconcileOptions::default())
    }

    pub fn with_options(store: &'s S, options: ReconcileOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    pub fn reconcile<I>(&self, rows: I, mode: ImportMode) -> Result<ReconciliationReport, ReconcileError>
    where
        I: IntoIterator<Item = RowResult>,
    {
        if let Some(deadline) = self.options.deadline {
            if Instant::now() >= deadline {
                return Err(ReconcileError::DeadlineExceeded);
            }
        }

        let candidates = dedupe(rows);
        log::info!(
            "reconciling {} candidates ({} rejected rows, mode={mode})",
            candidates.rows.len(),
            candidates.errors.len()
        );

        let mut txn = self.store.begin()?;
        let existing = txn.list_all()?;
        let mutations = plan(existing, &candidates, mode);
        let logged = self.apply(txn.as_mut(), &mutations)?;
        txn.commit()?;

        let changes = mutations.iter().map(Mutation::change).collect();
        let CandidateSet { errors, warnings, .. } = candidates;
        for e in &errors {
            log::warn!("skipped import row: {e}");
        }
        let report = ReconciliationReport::tally(mode, changes, errors, warnings, logged);
        log::info!("{}", report.summary_line());
        Ok(report)
    }

    /// Write the mutations. Returns the number of change log entries appended.
    fn apply(&self, txn: &mut (dyn RosterTxn + '_), mutations: &[Mutation]) -> Result<usize, ReconcileError> {
        let now = chrono::Utc::now();
        let mut logged = 0;

        for m in mutations {
            match m {
                Mutation::Insert(record) => txn.put(record, PutMode::Insert)?,
                Mutation::Update { old, new } => {
                    txn.put(new, PutMode::Replace)?;
                    if self.options.record_changes {
                        if let Some(entry) = ChangeLogEntry::between(old, new, now) {
                            txn.append_change(&entry)?;
                            logged += 1;
                        }
                    }
                }
                Mutation::Unchanged(_) => {}
                Mutation::Delete(record) => txn.delete_by_key(record.key())?,
            }
        }

        Ok(logged)
    }
}
