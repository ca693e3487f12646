//! Embedded SQLite backing for persistence handles.
//!
//! # Responsibility
//! - Open the connection one handle works through.
//! - Bring the `records`/`store_meta` table layout up to date before use.
//!
//! # Invariants
//! - The layout version lives in `PRAGMA user_version` and only grows.
//! - A connection is handed out only after its layout is current.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Failure of the SQLite layer underneath a handle.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was written by a newer build with a layout this one cannot read.
    UnsupportedLayoutVersion { found: u32, supported: u32 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::UnsupportedLayoutVersion { found, supported } => write!(
                f,
                "record store layout v{found} is newer than this build supports (v{supported})"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedLayoutVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
