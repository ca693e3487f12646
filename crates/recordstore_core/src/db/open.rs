//! Connection bootstrap for a persistence handle.
//!
//! # Invariants
//! - Returned connections wait on a locked file instead of failing at once.
//! - Returned connections have a current table layout.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (creating if needed) the store file at `path`.
///
/// # Side effects
/// - Emits `db_open` events with mode, applied layout steps and duration.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    open_with("file", || Connection::open(path))
}

/// Opens a private in-memory store; its contents die with the connection.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with("memory", Connection::open_in_memory)
}

fn open_with<F>(mode: &str, open: F) -> DbResult<Connection>
where
    F: FnOnce() -> rusqlite::Result<Connection>,
{
    let started_at = Instant::now();

    let opened = open().map_err(DbError::from).and_then(|mut conn| {
        let applied = prepare(&mut conn)?;
        Ok((conn, applied))
    });

    match opened {
        Ok((conn, applied)) => {
            info!(
                "event=db_open module=db status=ok mode={mode} layout_steps={applied} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn prepare(conn: &mut Connection) -> DbResult<usize> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    apply_migrations(conn)
}
