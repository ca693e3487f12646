//! Application migration plans over stored record payloads.
//!
//! # Responsibility
//! - Let applications evolve stored payloads and entity names between
//!   releases of their record types.
//!
//! # Invariants
//! - Stage versions are strictly increasing and start above zero.
//! - The applied version lives in `store_meta.app_schema_version` and is
//!   independent from the layout version in `PRAGMA user_version`.
//! - Pending stages run in one transaction: all apply or none do.

use crate::store::error::ConfigurationError;
use log::info;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::fmt::{Debug, Formatter};

const APP_SCHEMA_VERSION_KEY: &str = "app_schema_version";

type PayloadTransform = Box<dyn Fn(&mut Value) -> Result<(), String> + Send + Sync>;

enum StageKind {
    Transform {
        entity: String,
        transform: PayloadTransform,
    },
    RenameEntity {
        from: String,
        to: String,
    },
}

/// One versioned step of a migration plan.
pub struct MigrationStage {
    version: u32,
    kind: StageKind,
}

impl MigrationStage {
    /// Rewrites every stored payload of `entity`.
    pub fn transform<F>(version: u32, entity: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&mut Value) -> Result<(), String> + Send + Sync + 'static,
    {
        Self {
            version,
            kind: StageKind::Transform {
                entity: entity.into(),
                transform: Box::new(transform),
            },
        }
    }

    /// Re-labels stored records of entity `from` as entity `to`.
    pub fn rename_entity(version: u32, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            version,
            kind: StageKind::RenameEntity {
                from: from.into(),
                to: to.into(),
            },
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl Debug for MigrationStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            StageKind::Transform { entity, .. } => f
                .debug_struct("Transform")
                .field("version", &self.version)
                .field("entity", entity)
                .finish_non_exhaustive(),
            StageKind::RenameEntity { from, to } => f
                .debug_struct("RenameEntity")
                .field("version", &self.version)
                .field("from", from)
                .field("to", to)
                .finish(),
        }
    }
}

/// Ordered list of migration stages.
#[derive(Debug, Default)]
pub struct MigrationPlan {
    stages: Vec<MigrationStage>,
}

impl MigrationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stage(mut self, stage: MigrationStage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stages(&self) -> &[MigrationStage] {
        &self.stages
    }

    pub fn latest_version(&self) -> u32 {
        self.stages.last().map_or(0, MigrationStage::version)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        let mut previous = 0;
        for stage in &self.stages {
            if stage.version <= previous {
                return Err(ConfigurationError::Migration {
                    version: stage.version,
                    message: format!(
                        "stage versions must be strictly increasing above zero (after {previous})"
                    ),
                });
            }
            previous = stage.version;
        }
        Ok(())
    }
}

/// Returns the applied application schema version, `0` when none ran yet.
pub fn applied_version(conn: &Connection) -> Result<u32, ConfigurationError> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = ?1;",
            [APP_SCHEMA_VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        None => Ok(0),
        Some(text) => text.parse().map_err(|_| ConfigurationError::Migration {
            version: 0,
            message: format!("stored application schema version `{text}` is not a number"),
        }),
    }
}

/// Applies every stage newer than the stored version.
pub(crate) fn apply_plan(
    conn: &mut Connection,
    plan: &MigrationPlan,
) -> Result<(), ConfigurationError> {
    plan.validate()?;

    let current = applied_version(conn)?;
    let latest = plan.latest_version();
    if current > latest {
        return Err(ConfigurationError::Migration {
            version: current,
            message: format!("stored version is newer than the plan's latest stage {latest}"),
        });
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for stage in plan.stages.iter().filter(|stage| stage.version > current) {
        match &stage.kind {
            StageKind::Transform { entity, transform } => {
                transform_payloads(&tx, stage.version, entity, transform)?;
            }
            StageKind::RenameEntity { from, to } => {
                tx.execute(
                    "UPDATE records SET entity = ?2 WHERE entity = ?1;",
                    params![from, to],
                )?;
            }
        }
        tx.execute(
            "INSERT INTO store_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value;",
            params![APP_SCHEMA_VERSION_KEY, stage.version.to_string()],
        )?;
        info!(
            "event=app_migration module=store status=ok version={}",
            stage.version
        );
    }
    tx.commit()?;

    Ok(())
}

fn transform_payloads(
    conn: &Connection,
    version: u32,
    entity: &str,
    transform: &PayloadTransform,
) -> Result<(), ConfigurationError> {
    let rows = {
        let mut stmt =
            conn.prepare("SELECT persistent_id, payload FROM records WHERE entity = ?1;")?;
        let mapped = stmt.query_map([entity], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        mapped.collect::<Result<Vec<_>, _>>()?
    };

    for (id, payload_text) in rows {
        let mut payload: Value =
            serde_json::from_str(&payload_text).map_err(|err| ConfigurationError::Migration {
                version,
                message: format!("record {id} has invalid payload: {err}"),
            })?;
        transform(&mut payload).map_err(|message| ConfigurationError::Migration {
            version,
            message: format!("record {id}: {message}"),
        })?;
        conn.execute(
            "UPDATE records
             SET payload = ?2, updated_at = (strftime('%s', 'now') * 1000)
             WHERE persistent_id = ?1;",
            params![id, payload.to_string()],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{MigrationPlan, MigrationStage};
    use crate::store::error::ConfigurationError;

    #[test]
    fn plan_requires_strictly_increasing_versions() {
        let plan = MigrationPlan::new()
            .stage(MigrationStage::rename_entity(2, "Task", "Todo"))
            .stage(MigrationStage::rename_entity(2, "Todo", "Item"));
        assert!(matches!(
            plan.validate(),
            Err(ConfigurationError::Migration { version: 2, .. })
        ));

        let zero = MigrationPlan::new().stage(MigrationStage::rename_entity(0, "A", "B"));
        assert!(zero.validate().is_err());
    }

    #[test]
    fn latest_version_tracks_last_stage() {
        let plan = MigrationPlan::new()
            .stage(MigrationStage::transform(1, "Todo", |_| Ok(())))
            .stage(MigrationStage::rename_entity(4, "Todo", "Item"));
        assert_eq!(plan.latest_version(), 4);
        assert_eq!(MigrationPlan::new().latest_version(), 0);
    }
}
