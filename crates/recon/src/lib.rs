//! `drg-recon`: alliance roster model and reconciliation engine.
//!
//! Pure engine crate: receives parsed import rows and a store handle, returns
//! a reconciliation report. No filesystem or database dependencies; the
//! SQLite store lives in `drg-io`.

pub mod changelog;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod report;
pub mod roster;
pub mod stats;
pub mod store;

pub use changelog::ChangeLogEntry;
pub use config::{ImportConfig, ImportMode};
pub use engine::{ReconcileOptions, Reconciler};
pub use error::{ReconcileError, RowError, StoreError, ValidationError};
pub use model::{MemberKey, MemberRecord, MemberSnapshot, Rank};
pub use parser::SnapshotParser;
pub use report::ReconciliationReport;
pub use store::{MemoryStore, PutMode, RosterRead, RosterStore, RosterTxn};
