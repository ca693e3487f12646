//! Optional process-wide store container.
//!
//! # Responsibility
//! - Offer a configure-once global for programs that do not thread a
//!   `StoreContainer` through their call graph.
//!
//! # Invariants
//! - `configure` succeeds at most once until `reset`.
//! - Reading the container before `configure` panics: it is a startup
//!   ordering bug, not a runtime condition.

use crate::model::schema::Schema;
use crate::store::config::StorageConfig;
use crate::store::container::StoreContainer;
use crate::store::error::ConfigurationError;
use crate::store::handle::PersistenceHandle;
use crate::store::migration::MigrationPlan;
use crate::store::session::Session;
use once_cell::sync::Lazy;
use std::sync::{PoisonError, RwLock};

static SHARED_CONTAINER: Lazy<RwLock<Option<StoreContainer>>> = Lazy::new(|| RwLock::new(None));

const UNCONFIGURED_MESSAGE: &str =
    "recordstore shared container accessed before shared::configure";

/// Configures the shared container.
///
/// # Errors
/// - `AlreadyConfigured` when called again without `reset`.
/// - Any `StoreContainer::configure` error.
pub fn configure(
    schema: Schema,
    migration_plan: Option<MigrationPlan>,
    storage: StorageConfig,
) -> Result<(), ConfigurationError> {
    let mut slot = SHARED_CONTAINER
        .write()
        .unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        return Err(ConfigurationError::AlreadyConfigured);
    }

    *slot = Some(StoreContainer::configure(schema, migration_plan, storage)?);
    Ok(())
}

pub fn is_configured() -> bool {
    SHARED_CONTAINER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .is_some()
}

pub fn try_container() -> Option<StoreContainer> {
    SHARED_CONTAINER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// # Panics
/// Panics when the shared container is not configured.
pub fn container() -> StoreContainer {
    match try_container() {
        Some(container) => container,
        None => panic!("{UNCONFIGURED_MESSAGE}"),
    }
}

/// # Panics
/// Panics when the shared container is not configured.
pub fn handle() -> PersistenceHandle {
    container().handle().clone()
}

/// # Panics
/// Panics when the shared container is not configured.
pub fn main_session() -> Session {
    container().main_session().clone()
}

/// # Panics
/// Panics when the shared container is not configured.
pub fn new_background_session() -> Session {
    container().new_background_session()
}

/// Drops the shared container; intended for test teardown.
pub fn reset() {
    SHARED_CONTAINER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
}
