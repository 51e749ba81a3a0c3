// SQLite-backed roster store

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OptionalExtension};

use drg_recon::{
    ChangeLogEntry, MemberKey, MemberRecord, PutMode, Rank, RosterRead, RosterStore, RosterTxn, StoreError,
};

use crate::SCHEMA_VERSION;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS members (
    key TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    rank TEXT NOT NULL CHECK (rank IN ('R1', 'R2', 'R3', 'R4', 'R5')),
    level_start INTEGER NOT NULL CHECK (level_start >= 0),
    level_current INTEGER NOT NULL CHECK (level_current >= 0),
    power_start INTEGER NOT NULL CHECK (power_start >= 0),
    power_current INTEGER NOT NULL CHECK (power_current >= 0)
);

CREATE TABLE IF NOT EXISTS change_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    member_key TEXT NOT NULL REFERENCES members(key) ON DELETE CASCADE,
    display_name TEXT NOT NULL,
    display_name_old TEXT NOT NULL,
    rank_old TEXT NOT NULL,
    rank_new TEXT NOT NULL,
    level_old INTEGER NOT NULL,
    level_new INTEGER NOT NULL,
    power_old INTEGER NOT NULL,
    power_new INTEGER NOT NULL,
    recorded_at TEXT NOT NULL  -- RFC 3339, UTC
);

CREATE INDEX IF NOT EXISTS change_log_member ON change_log (member_key);
"#;

// Rank TEXT sorts R1 < ... < R5, so DESC gives the roster order directly.
const SELECT_MEMBERS: &str = "SELECT key, display_name, rank, level_start, level_current, power_start, power_current FROM members";

/// How long a writer waits on another process's lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

fn unavailable(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Roster stored in a SQLite database.
///
/// The schema is created once by [`SqliteStore::initialize`]; [`SqliteStore::open`]
/// refuses databases that were never initialised or carry another schema version.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open an initialised roster database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::Unavailable(format!(
                "roster database {} is not initialised",
                path.display()
            )));
        }
        let store = Self::connect(path)?;
        store.check_schema()?;
        Ok(store)
    }

    /// Open (creating if needed) and initialise the schema. For host setup only.
    pub fn create(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable(e.to_string()))?;
            }
        }
        let store = Self::connect(path)?;
        store.initialize()?;
        Ok(store)
    }

    /// Fresh, initialised in-memory roster.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        conn.pragma_update(None, "foreign_keys", true).map_err(unavailable)?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize()?;
        Ok(store)
    }

    fn connect(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(unavailable)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(unavailable)?;
        conn.pragma_update(None, "foreign_keys", true).map_err(unavailable)?;
        // WAL lets readers in other processes keep the last committed roster during an import
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(unavailable)?;
        log::debug!("opened {} (journal_mode={mode})", path.display());
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Create tables and stamp the schema version. Safe to repeat on the same version.
    pub fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE").map_err(unavailable)?;
        let result = (|| -> rusqlite::Result<Option<String>> {
            conn.execute_batch(SCHEMA)?;
            let existing: Option<String> = conn
                .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |row| row.get(0))
                .optional()?;
            if existing.is_none() {
                conn.execute(
                    "INSERT INTO meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION.to_string()],
                )?;
            }
            Ok(existing)
        })();

        match result {
            Ok(existing) => {
                if let Some(found) = existing.filter(|v| *v != SCHEMA_VERSION.to_string()) {
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(StoreError::Unavailable(format!(
                        "schema version {found} is not supported (expected {SCHEMA_VERSION})"
                    )));
                }
                conn.execute_batch("COMMIT").map_err(unavailable)?;
                log::info!("roster schema ready (version {SCHEMA_VERSION})");
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(unavailable(e))
            }
        }
    }

    fn check_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let version: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |row| row.get(0))
            .optional()
            .map_err(|_| StoreError::Unavailable("roster database is not initialised".into()))?;
        match version {
            Some(v) if v == SCHEMA_VERSION.to_string() => Ok(()),
            Some(v) => Err(StoreError::Unavailable(format!(
                "schema version {v} is not supported (expected {SCHEMA_VERSION})"
            ))),
            None => Err(StoreError::Unavailable("roster database is not initialised".into())),
        }
    }
}

impl RosterRead for SqliteStore {
    fn get(&self, key: &MemberKey) -> Result<MemberRecord, StoreError> {
        get(&self.conn.lock(), key)
    }

    fn list_all(&self) -> Result<Vec<MemberRecord>, StoreError> {
        list_all(&self.conn.lock())
    }

    fn changes_for(&self, key: &MemberKey) -> Result<Vec<ChangeLogEntry>, StoreError> {
        changes_for(&self.conn.lock(), key)
    }
}

impl RosterStore for SqliteStore {
    fn begin(&self) -> Result<Box<dyn RosterTxn + '_>, StoreError> {
        let conn = self.conn.lock();
        conn.execute_batch("BEGIN IMMEDIATE").map_err(unavailable)?;
        Ok(Box::new(SqliteTxn { conn, finished: false }))
    }
}

/// Open `BEGIN IMMEDIATE` transaction. Rolled back on drop unless committed.
struct SqliteTxn<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl Drop for SqliteTxn<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                log::error!("rollback failed: {e}");
            }
        }
    }
}

impl RosterRead for SqliteTxn<'_> {
    fn get(&self, key: &MemberKey) -> Result<MemberRecord, StoreError> {
        get(&self.conn, key)
    }

    fn list_all(&self) -> Result<Vec<MemberRecord>, StoreError> {
        list_all(&self.conn)
    }

    fn changes_for(&self, key: &MemberKey) -> Result<Vec<ChangeLogEntry>, StoreError> {
        changes_for(&self.conn, key)
    }
}

impl RosterTxn for SqliteTxn<'_> {
    fn put(&mut self, record: &MemberRecord, mode: PutMode) -> Result<(), StoreError> {
        let exists = exists(&self.conn, record.key())?;
        match (mode, exists) {
            (PutMode::Insert, true) => return Err(StoreError::Conflict(record.key().to_string())),
            (PutMode::Replace, false) => return Err(StoreError::NotFound(record.key().to_string())),
            _ => {}
        }

        if exists {
            // Baselines are deliberately absent from the UPDATE.
            self.conn
                .execute(
                    "UPDATE members SET display_name = ?2, rank = ?3, level_current = ?4, power_current = ?5 WHERE key = ?1",
                    params![
                        record.key().as_str(),
                        record.display_name(),
                        record.rank().as_str(),
                        record.level_current(),
                        to_sql_power(record.power_current())?,
                    ],
                )
                .map_err(unavailable)?;
        } else {
            self.conn
                .execute(
                    "INSERT INTO members (key, display_name, rank, level_start, level_current, power_start, power_current) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        record.key().as_str(),
                        record.display_name(),
                        record.rank().as_str(),
                        record.level_start(),
                        record.level_current(),
                        to_sql_power(record.power_start())?,
                        to_sql_power(record.power_current())?,
                    ],
                )
                .map_err(unavailable)?;
        }
        Ok(())
    }

    fn delete_by_key(&mut self, key: &MemberKey) -> Result<(), StoreError> {
        // change_log rows go with it (ON DELETE CASCADE)
        let deleted = self
            .conn
            .execute("DELETE FROM members WHERE key = ?1", params![key.as_str()])
            .map_err(unavailable)?;
        if deleted == 0 {
            return Err(StoreError::NotFound(key.to_string()));
        }
        Ok(())
    }

    fn append_change(&mut self, entry: &ChangeLogEntry) -> Result<(), StoreError> {
        if !exists(&self.conn, &entry.key)? {
            return Err(StoreError::NotFound(entry.key.to_string()));
        }
        self.conn
            .execute(
                "INSERT INTO change_log (member_key, display_name, display_name_old, rank_old, rank_new, level_old, level_new, power_old, power_new, recorded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    entry.key.as_str(),
                    entry.display_name,
                    entry.display_name_old,
                    entry.rank_old.as_str(),
                    entry.rank_new.as_str(),
                    entry.level_old,
                    entry.level_new,
                    to_sql_power(entry.power_old)?,
                    to_sql_power(entry.power_new)?,
                    entry.recorded_at.to_rfc3339(),
                ],
            )
            .map_err(unavailable)?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        self.conn.execute_batch("COMMIT").map_err(unavailable)?;
        self.finished = true;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn to_sql_power(power: u64) -> Result<i64, StoreError> {
    i64::try_from(power).map_err(|_| StoreError::Unavailable(format!("power {power} does not fit in SQLite INTEGER")))
}

fn corrupt(what: &str, value: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable(format!("corrupt roster row: {what} = {value}"))
}

struct MemberRow {
    key: String,
    display_name: String,
    rank: String,
    level_start: i64,
    level_current: i64,
    power_start: i64,
    power_current: i64,
}

impl MemberRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            display_name: row.get(1)?,
            rank: row.get(2)?,
            level_start: row.get(3)?,
            level_current: row.get(4)?,
            power_start: row.get(5)?,
            power_current: row.get(6)?,
        })
    }

    fn into_record(self) -> Result<MemberRecord, StoreError> {
        let level = |v: i64| u32::try_from(v).map_err(|_| corrupt("level", v));
        let power = |v: i64| u64::try_from(v).map_err(|_| corrupt("power", v));
        let rank: Rank = self.rank.parse().map_err(|_| corrupt("rank", &self.rank))?;
        let key = MemberKey::new(&self.key).map_err(|_| corrupt("key", &self.key))?;
        Ok(MemberRecord::restore(
            key,
            self.display_name,
            rank,
            level(self.level_start)?,
            level(self.level_current)?,
            power(self.power_start)?,
            power(self.power_current)?,
        ))
    }
}

fn exists(conn: &Connection, key: &MemberKey) -> Result<bool, StoreError> {
    conn.query_row("SELECT 1 FROM members WHERE key = ?1", params![key.as_str()], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
        .map_err(unavailable)
}

fn get(conn: &Connection, key: &MemberKey) -> Result<MemberRecord, StoreError> {
    let row = conn
        .query_row(
            &format!("{SELECT_MEMBERS} WHERE key = ?1"),
            params![key.as_str()],
            MemberRow::from_row,
        )
        .optional()
        .map_err(unavailable)?;
    match row {
        Some(row) => row.into_record(),
        None => Err(StoreError::NotFound(key.to_string())),
    }
}

fn list_all(conn: &Connection) -> Result<Vec<MemberRecord>, StoreError> {
    let mut stmt = conn
        .prepare(&format!("{SELECT_MEMBERS} ORDER BY rank DESC, power_current DESC, key ASC"))
        .map_err(unavailable)?;
    let rows = stmt.query_map([], MemberRow::from_row).map_err(unavailable)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row.map_err(unavailable)?.into_record()?);
    }
    Ok(records)
}

struct ChangeRow {
    display_name: String,
    display_name_old: String,
    rank_old: String,
    rank_new: String,
    level_old: i64,
    level_new: i64,
    power_old: i64,
    power_new: i64,
    recorded_at: String,
}

impl ChangeRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            display_name: row.get(0)?,
            display_name_old: row.get(1)?,
            rank_old: row.get(2)?,
            rank_new: row.get(3)?,
            level_old: row.get(4)?,
            level_new: row.get(5)?,
            power_old: row.get(6)?,
            power_new: row.get(7)?,
            recorded_at: row.get(8)?,
        })
    }

    fn into_entry(self, key: &MemberKey) -> Result<ChangeLogEntry, StoreError> {
        let level = |what, v: i64| u32::try_from(v).map_err(|_| corrupt(what, v));
        let power = |what, v: i64| u64::try_from(v).map_err(|_| corrupt(what, v));
        let rank = |what, v: &str| v.parse::<Rank>().map_err(|_| corrupt(what, v));
        let recorded_at = DateTime::parse_from_rfc3339(&self.recorded_at)
            .map_err(|_| corrupt("recorded_at", &self.recorded_at))?
            .with_timezone(&Utc);
        Ok(ChangeLogEntry {
            key: key.clone(),
            rank_old: rank("rank_old", &self.rank_old)?,
            rank_new: rank("rank_new", &self.rank_new)?,
            level_old: level("level_old", self.level_old)?,
            level_new: level("level_new", self.level_new)?,
            power_old: power("power_old", self.power_old)?,
            power_new: power("power_new", self.power_new)?,
            display_name: self.display_name,
            display_name_old: self.display_name_old,
            recorded_at,
        })
    }
}

fn changes_for(conn: &Connection, key: &MemberKey) -> Result<Vec<ChangeLogEntry>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT display_name, display_name_old, rank_old, rank_new, level_old, level_new, power_old, power_new, recorded_at \
             FROM change_log WHERE member_key = ?1 ORDER BY id",
        )
        .map_err(unavailable)?;
    let rows = stmt.query_map(params![key.as_str()], ChangeRow::from_row).map_err(unavailable)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row.map_err(unavailable)?.into_entry(key)?);
    }
    Ok(entries)
}
