//! Roster persistence abstraction.
//!
//! Reads go through [`RosterRead`]. Writes happen inside a [`RosterTxn`]
//! obtained from [`RosterStore::begin`]: nothing a transaction does is
//! visible to readers until `commit`, and dropping it uncommitted rolls
//! everything back. One write transaction is open per store at a time.

use std::collections::BTreeMap;

use parking_lot::{Mutex, MutexGuard, RwLock};

use crate::changelog::ChangeLogEntry;
use crate::error::StoreError;
use crate::model::{roster_order, MemberKey, MemberRecord};

/// What `put` is allowed to do with an existing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutMode {
    /// Fail with `Conflict` if the key exists.
    Insert,
    /// Fail with `NotFound` if the key does not exist.
    Replace,
    /// Insert or replace.
    Upsert,
}

pub trait RosterRead {
    fn get(&self, key: &MemberKey) -> Result<MemberRecord, StoreError>;

    /// Every member, by rank desc, power desc, key asc.
    fn list_all(&self) -> Result<Vec<MemberRecord>, StoreError>;

    /// Change log entries for one member, oldest first.
    fn changes_for(&self, key: &MemberKey) -> Result<Vec<ChangeLogEntry>, StoreError>;
}

pub trait RosterTxn: RosterRead {
    fn put(&mut self, record: &MemberRecord, mode: PutMode) -> Result<(), StoreError>;

    /// Delete a member and its change log entries.
    fn delete_by_key(&mut self, key: &MemberKey) -> Result<(), StoreError>;

    fn append_change(&mut self, entry: &ChangeLogEntry) -> Result<(), StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

pub trait RosterStore: RosterRead {
    /// Start the write transaction. Blocks while another one is open.
    fn begin(&self) -> Result<Box<dyn RosterTxn + '_>, StoreError>;

    fn put(&self, record: &MemberRecord, mode: PutMode) -> Result<(), StoreError> {
        let mut txn = self.begin()?;
        txn.put(record, mode)?;
        txn.commit()
    }

    fn delete_by_key(&self, key: &MemberKey) -> Result<(), StoreError> {
        let mut txn = self.begin()?;
        txn.delete_by_key(key)?;
        txn.commit()
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct RosterState {
    members: BTreeMap<MemberKey, MemberRecord>,
    changes: Vec<ChangeLogEntry>,
}

impl RosterState {
    fn get(&self, key: &MemberKey) -> Result<MemberRecord, StoreError> {
        self.members
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn list_all(&self) -> Vec<MemberRecord> {
        let mut all: Vec<MemberRecord> = self.members.values().cloned().collect();
        all.sort_by(roster_order);
        all
    }

    fn changes_for(&self, key: &MemberKey) -> Vec<ChangeLogEntry> {
        self.changes.iter().filter(|e| &e.key == key).cloned().collect()
    }

    fn put(&mut self, record: &MemberRecord, mode: PutMode) -> Result<(), StoreError> {
        let exists = self.members.contains_key(record.key());
        match (mode, exists) {
            (PutMode::Insert, true) => Err(StoreError::Conflict(record.key().to_string())),
            (PutMode::Replace, false) => Err(StoreError::NotFound(record.key().to_string())),
            _ => {
                self.members.insert(record.key().clone(), record.clone());
                Ok(())
            }
        }
    }

    fn delete(&mut self, key: &MemberKey) -> Result<(), StoreError> {
        if self.members.remove(key).is_none() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        self.changes.retain(|e| &e.key != key);
        Ok(())
    }

    fn append_change(&mut self, entry: &ChangeLogEntry) -> Result<(), StoreError> {
        if !self.members.contains_key(&entry.key) {
            return Err(StoreError::NotFound(entry.key.to_string()));
        }
        self.changes.push(entry.clone());
        Ok(())
    }
}

/// Process-local roster. Readers never see a half-applied transaction:
/// writes are staged on a private copy and swapped in on commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<RosterState>,
    writer: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RosterRead for MemoryStore {
    fn get(&self, key: &MemberKey) -> Result<MemberRecord, StoreError> {
        self.state.read().get(key)
    }

    fn list_all(&self) -> Result<Vec<MemberRecord>, StoreError> {
        Ok(self.state.read().list_all())
    }

    fn changes_for(&self, key: &MemberKey) -> Result<Vec<ChangeLogEntry>, StoreError> {
        Ok(self.state.read().changes_for(key))
    }
}

impl RosterStore for MemoryStore {
    fn begin(&self) -> Result<Box<dyn RosterTxn + '_>, StoreError> {
        let writer = self.writer.lock();
        let staged = self.state.read().clone();
        Ok(Box::new(MemoryTxn {
            store: self,
            _writer: writer,
            staged,
        }))
    }
}

struct MemoryTxn<'a> {
    store: &'a MemoryStore,
    _writer: MutexGuard<'a, ()>,
    staged: RosterState,
}

impl RosterRead for MemoryTxn<'_> {
    fn get(&self, key: &MemberKey) -> Result<MemberRecord, StoreError> {
        self.staged.get(key)
    }

    fn list_all(&self) -> Result<Vec<MemberRecord>, StoreError> {
        Ok(self.staged.list_all())
    }

    fn changes_for(&self, key: &MemberKey) -> Result<Vec<ChangeLogEntry>, StoreError> {
        Ok(self.staged.changes_for(key))
    }
}

impl RosterTxn for MemoryTxn<'_> {
    fn put(&mut self, record: &MemberRecord, mode: PutMode) -> Result<(), StoreError> {
        self.staged.put(record, mode)
    }

    fn delete_by_key(&mut self, key: &MemberKey) -> Result<(), StoreError> {
        self.staged.delete(key)
    }

    fn append_change(&mut self, entry: &ChangeLogEntry) -> Result<(), StoreError> {
        self.staged.append_change(entry)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTxn { store, _writer, staged } = *self;
        *store.state.write() = staged;
        Ok(())
    }
}
