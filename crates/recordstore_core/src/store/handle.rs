//! Persistence handle: schema, storage and the save signal for one store.
//!
//! # Responsibility
//! - Open the backing SQLite database for a validated schema.
//! - Run the application migration plan before any session exists.
//! - Derive sessions and hand out save-signal subscriptions.
//!
//! # Invariants
//! - All sessions of a handle share one connection, serialized by a mutex.
//! - Save events of a handle reach only subscribers of that handle.

use crate::db::{open_db, open_db_in_memory};
use crate::model::schema::Schema;
use crate::store::config::{StorageBacking, StorageConfig};
use crate::store::error::{ConfigurationError, StoreResult};
use crate::store::migration::{apply_plan, MigrationPlan};
use crate::store::notify::{SaveNotifier, SaveSubscription};
use crate::store::session::{Session, SessionId};
use rusqlite::Connection;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Cheap-clone reference to one opened store.
#[derive(Clone)]
pub struct PersistenceHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    conn: Mutex<Connection>,
    schema: Schema,
    storage: StorageConfig,
    notifier: Arc<SaveNotifier>,
    next_session_id: AtomicU64,
}

impl PersistenceHandle {
    /// Validates `schema`, opens the configured storage and applies
    /// `migration_plan` when given.
    pub fn open(
        schema: Schema,
        migration_plan: Option<&MigrationPlan>,
        storage: StorageConfig,
    ) -> Result<Self, ConfigurationError> {
        schema.validate()?;

        let mut conn = match storage.backing()? {
            StorageBacking::Memory => open_db_in_memory()?,
            StorageBacking::File(path) => {
                if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                open_db(&path)?
            }
        };

        if let Some(plan) = migration_plan {
            apply_plan(&mut conn, plan)?;
        }

        Ok(Self {
            inner: Arc::new(HandleInner {
                conn: Mutex::new(conn),
                schema,
                storage,
                notifier: SaveNotifier::new(),
                next_session_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    pub fn storage(&self) -> &StorageConfig {
        &self.inner.storage
    }

    /// Derives a fresh session with its own registry.
    pub fn new_session(&self) -> Session {
        let id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        Session::new(SessionId::from_raw(id), self.clone())
    }

    /// Subscribes to save events from every session of this handle.
    pub fn subscribe(&self) -> SaveSubscription {
        self.inner.notifier.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.notifier.subscriber_count()
    }

    /// Whether two values refer to the same opened store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn session_feed(&self) -> SaveSubscription {
        self.inner.notifier.subscribe_session_feed()
    }

    pub(crate) fn notifier(&self) -> &SaveNotifier {
        &self.inner.notifier
    }

    pub(crate) fn with_connection<T, F>(&self, work: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T>,
    {
        let mut conn = self
            .inner
            .conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        work(&mut *conn)
    }
}
