//! Explicit store configuration object.
//!
//! # Responsibility
//! - Build the one handle/main-session pair a program works with.
//! - Hand out background sessions and default-bound repositories.
//!
//! # Invariants
//! - The main session has autosave enabled.
//! - Every session handed out shares the container's handle.

use crate::model::record::Model;
use crate::model::schema::Schema;
use crate::query::descriptor::FetchDescriptor;
use crate::repo::observable_repo::ObservableRepository;
use crate::repo::record_repo::SessionRepository;
use crate::store::config::StorageConfig;
use crate::store::error::{ConfigurationError, StoreResult};
use crate::store::handle::PersistenceHandle;
use crate::store::migration::MigrationPlan;
use crate::store::session::Session;
use log::{error, info};
use std::time::Instant;

/// Configured handle plus its main session.
#[derive(Clone)]
pub struct StoreContainer {
    handle: PersistenceHandle,
    main_session: Session,
}

impl StoreContainer {
    /// Builds the schema handle, applies the optional migration plan and
    /// derives the main session.
    ///
    /// # Errors
    /// - `InvalidSchema` when the record types break naming/uniqueness rules.
    /// - `InvalidStorage`/`Io`/`Db` when the backing store cannot be opened.
    /// - `Migration` when a layout or application migration fails.
    pub fn configure(
        schema: Schema,
        migration_plan: Option<MigrationPlan>,
        storage: StorageConfig,
    ) -> Result<Self, ConfigurationError> {
        let started_at = Instant::now();
        let mode = if storage.in_memory_only { "memory" } else { "file" };
        let entity_count = schema.entities().len();
        info!("event=store_configure module=store status=start mode={mode} entities={entity_count}");

        match PersistenceHandle::open(schema, migration_plan.as_ref(), storage) {
            Ok(handle) => {
                let main_session = handle.new_session();
                main_session.set_autosave(true);
                info!(
                    "event=store_configure module=store status=ok mode={mode} entities={entity_count} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(Self {
                    handle,
                    main_session,
                })
            }
            Err(err) => {
                error!(
                    "event=store_configure module=store status=error mode={mode} duration_ms={} error={}",
                    started_at.elapsed().as_millis(),
                    err
                );
                Err(err)
            }
        }
    }

    pub fn handle(&self) -> &PersistenceHandle {
        &self.handle
    }

    pub fn main_session(&self) -> &Session {
        &self.main_session
    }

    /// Fresh session bound to the same handle, for work off the main context.
    pub fn new_background_session(&self) -> Session {
        self.handle.new_session()
    }

    /// Manual repository bound to the main session.
    pub fn repository<M: Model>(&self) -> StoreResult<SessionRepository<M>> {
        SessionRepository::try_new(self.main_session.clone())
    }

    /// Observable repository bound to the main session.
    pub fn observable_repository<M: Model>(
        &self,
        descriptor: FetchDescriptor<M>,
    ) -> StoreResult<ObservableRepository<M>> {
        ObservableRepository::new(self.main_session.clone(), descriptor)
    }
}
