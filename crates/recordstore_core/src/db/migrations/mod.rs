//! Table layout steps for the record store.
//!
//! # Responsibility
//! - List the layout steps that build `records` and `store_meta`.
//! - Run the steps a connection has not seen yet, all in one transaction.
//!
//! # Invariants
//! - Step versions start at 1 and grow by one.
//! - `PRAGMA user_version` equals the last applied step.
//! - Payload rewrites requested by applications belong to
//!   `store::migration`; layout steps never read payloads.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::{Connection, Transaction};

struct LayoutStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const LAYOUT_STEPS: &[LayoutStep] = &[
    LayoutStep {
        version: 1,
        name: "records",
        sql: include_str!("0001_init.sql"),
    },
    LayoutStep {
        version: 2,
        name: "store_meta",
        sql: include_str!("0002_store_meta.sql"),
    },
];

/// Layout version a fully migrated store reports.
pub fn latest_version() -> u32 {
    LAYOUT_STEPS.last().map_or(0, |step| step.version)
}

/// Brings the connection's table layout up to date.
///
/// Returns how many steps ran; `0` for an already current store.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<usize> {
    let found = layout_version(conn)?;
    let supported = latest_version();
    if found > supported {
        return Err(DbError::UnsupportedLayoutVersion { found, supported });
    }

    let pending: Vec<&LayoutStep> = LAYOUT_STEPS
        .iter()
        .filter(|step| step.version > found)
        .collect();
    if pending.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    for step in &pending {
        run_step(&tx, step)?;
    }
    tx.commit()?;

    Ok(pending.len())
}

fn run_step(tx: &Transaction<'_>, step: &LayoutStep) -> DbResult<()> {
    tx.execute_batch(step.sql)?;
    tx.pragma_update(None, "user_version", step.version)?;
    info!(
        "event=layout_migration module=db status=ok version={} step={}",
        step.version, step.name
    );
    Ok(())
}

fn layout_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::{apply_migrations, latest_version, LAYOUT_STEPS};
    use rusqlite::Connection;

    #[test]
    fn step_versions_are_contiguous() {
        for (index, step) in LAYOUT_STEPS.iter().enumerate() {
            assert_eq!(step.version as usize, index + 1, "step {}", step.name);
        }
        assert_eq!(latest_version() as usize, LAYOUT_STEPS.len());
    }

    #[test]
    fn second_run_applies_nothing() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(apply_migrations(&mut conn).unwrap(), LAYOUT_STEPS.len());
        assert_eq!(apply_migrations(&mut conn).unwrap(), 0);
    }
}
