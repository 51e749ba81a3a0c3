//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Meaning                                        |
//! |------|------------------------------------------------|
//! | 0    | Success                                        |
//! | 1    | General error (unspecified)                    |
//! | 2    | CLI usage error (bad args, invalid field, missing file) |
//! | 3    | Import committed, but some rows were rejected  |
//! | 4    | Member not found                               |
//! | 5    | Member key already exists                      |
//! | 6    | Roster database unavailable or not initialised |
//! | 7    | Settings file unreadable or invalid            |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use drg_recon::{ReconcileError, StoreError};

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, invalid member fields, unreadable input file.
/// Matches clap's own exit code for argument errors.
pub const EXIT_USAGE: u8 = 2;

/// Import ran and committed, but at least one row was skipped.
pub const EXIT_IMPORT_ROW_ERRORS: u8 = 3;

/// `StoreError::NotFound`.
pub const EXIT_NOT_FOUND: u8 = 4;

/// `StoreError::Conflict`.
pub const EXIT_CONFLICT: u8 = 5;

/// `StoreError::Unavailable`, including a database that was never initialised.
pub const EXIT_STORE_UNAVAILABLE: u8 = 6;

/// Settings file could not be read, parsed or validated.
pub const EXIT_CONFIG: u8 = 7;

/// Map a store error to its exit code.
pub fn store_exit_code(err: &StoreError) -> u8 {
    match err {
        StoreError::NotFound(_) => EXIT_NOT_FOUND,
        StoreError::Conflict(_) => EXIT_CONFLICT,
        StoreError::Unavailable(_) => EXIT_STORE_UNAVAILABLE,
    }
}

pub fn reconcile_exit_code(err: &ReconcileError) -> u8 {
    match err {
        ReconcileError::Store(e) => store_exit_code(e),
        ReconcileError::DeadlineExceeded => EXIT_ERROR,
    }
}
