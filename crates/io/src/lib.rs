// Roster I/O: SQLite store, import file decoding, CSV export

pub mod csv;
pub mod sqlite;

pub use sqlite::SqliteStore;

/// Roster database schema version
/// Increment when the schema changes in a way that old versions can't read
pub const SCHEMA_VERSION: u32 = 2;
