//! Single-member operations outside of an import.

use crate::changelog::ChangeLogEntry;
use crate::error::{StoreError, ValidationError};
use crate::model::{parse_display_name, parse_level, parse_power, parse_rank, MemberKey, MemberRecord, MemberSnapshot, Rank};
use crate::store::{PutMode, RosterStore};

/// Fields to change on an existing member. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberEdit {
    pub display_name: Option<String>,
    pub rank: Option<Rank>,
    pub level: Option<u32>,
    pub power: Option<u64>,
}

impl MemberEdit {
    /// Validate raw form values with the same rules as import rows.
    pub fn parse(
        display_name: Option<&str>,
        rank: Option<&str>,
        level: Option<&str>,
        power: Option<&str>,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            display_name: display_name.map(parse_display_name).transpose()?,
            rank: rank.map(parse_rank).transpose()?,
            level: level.map(parse_level).transpose()?,
            power: power.map(parse_power).transpose()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.rank.is_none() && self.level.is_none() && self.power.is_none()
    }

    fn apply(&self, record: &mut MemberRecord) {
        if let Some(name) = &self.display_name {
            record.set_display_name(name.clone());
        }
        if let Some(rank) = self.rank {
            record.set_rank(rank);
        }
        if let Some(level) = self.level {
            record.set_level_current(level);
        }
        if let Some(power) = self.power {
            record.set_power_current(power);
        }
    }
}

/// Create a member. Fails with `Conflict` if the key is taken.
pub fn add_member<S: RosterStore + ?Sized>(store: &S, snapshot: &MemberSnapshot) -> Result<MemberRecord, StoreError> {
    let record = MemberRecord::first_observed(snapshot);
    store.put(&record, PutMode::Insert)?;
    log::info!("added member '{}'", record.key());
    Ok(record)
}

/// Change a member's current values. Baselines are never touched.
pub fn edit_member<S: RosterStore + ?Sized>(
    store: &S,
    key: &MemberKey,
    edit: &MemberEdit,
    record_changes: bool,
) -> Result<MemberRecord, StoreError> {
    let mut txn = store.begin()?;
    let old = txn.get(key)?;
    let mut new = old.clone();
    edit.apply(&mut new);

    if new != old {
        txn.put(&new, PutMode::Replace)?;
        if record_changes {
            if let Some(entry) = ChangeLogEntry::between(&old, &new, chrono::Utc::now()) {
                txn.append_change(&entry)?;
            }
        }
        txn.commit()?;
        log::info!("edited member '{key}'");
    }
    Ok(new)
}

/// Delete a member and its change history. Returns the removed record.
pub fn remove_member<S: RosterStore + ?Sized>(store: &S, key: &MemberKey) -> Result<MemberRecord, StoreError> {
    let mut txn = store.begin()?;
    let record = txn.get(key)?;
    txn.delete_by_key(key)?;
    txn.commit()?;
    log::info!("removed member '{key}'");
    Ok(record)
}

/// Change log of an existing member, oldest first.
pub fn history<S: RosterStore + ?Sized>(store: &S, key: &MemberKey) -> Result<Vec<ChangeLogEntry>, StoreError> {
    store.get(key)?;
    store.changes_for(key)
}
