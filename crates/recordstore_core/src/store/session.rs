//! Work sessions derived from a persistence handle.
//!
//! # Responsibility
//! - Track records registered with one execution context and the snapshot
//!   each registration last saw in storage.
//! - Collect pending inserts, updates and deletes, and commit them in one
//!   atomic save that publishes the handle's save signal.
//!
//! # Invariants
//! - Every registry entry either has a persisted snapshot or a pending insert.
//! - Ids another session of the same handle updated or deleted are dropped
//!   from the registry on the next access, unless this session holds a
//!   pending change for them.
//! - A save with nothing pending neither writes nor signals.
//! - A failed save leaves storage untouched and keeps the pending changes.
//! - Lock order is session state, then connection; never the reverse.

use crate::model::record::{Model, PersistentId, Record};
use crate::store::error::{StoreError, StoreResult};
use crate::store::handle::PersistenceHandle;
use crate::store::notify::{SaveEvent, SaveSubscription};
use crate::store::records::{self, StoredRow};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Identifier of one session within its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn from_raw(value: u64) -> Self {
        Self(value)
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared handle to one execution context; clones refer to the same session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: SessionId,
    handle: PersistenceHandle,
    sibling_saves: SaveSubscription,
    state: Mutex<SessionState>,
}

#[derive(Default)]
struct SessionState {
    registry: HashMap<PersistentId, Registration>,
    deleted_elsewhere: HashSet<PersistentId>,
    pending: Vec<PendingChange>,
    autosave: bool,
}

struct Registration {
    entity: String,
    snapshot: Option<Value>,
}

#[derive(Debug, Clone)]
enum PendingChange {
    Insert {
        id: PersistentId,
        entity: String,
        payload: Value,
    },
    Update {
        id: PersistentId,
        entity: String,
        payload: Value,
    },
    Delete {
        id: PersistentId,
    },
}

impl SessionState {
    fn has_pending(&self, id: PersistentId) -> bool {
        self.pending.iter().any(|change| change.id() == id)
    }

    fn forget_changed_elsewhere(&mut self, event: &SaveEvent) {
        for id in &event.inserted {
            self.deleted_elsewhere.remove(id);
        }
        for id in &event.updated {
            if !self.has_pending(*id) {
                self.registry.remove(id);
            }
        }
        for id in &event.deleted {
            if !self.has_pending(*id) && self.registry.remove(id).is_some() {
                self.deleted_elsewhere.insert(*id);
            }
        }
    }
}

impl PendingChange {
    fn id(&self) -> PersistentId {
        match self {
            Self::Insert { id, .. } | Self::Update { id, .. } | Self::Delete { id } => *id,
        }
    }
}

/// What the session currently believes about one id.
pub(crate) enum RegistryLookup {
    Present { entity: String, payload: Value },
    PendingDelete,
    Absent,
}

impl Session {
    pub(crate) fn new(id: SessionId, handle: PersistenceHandle) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                sibling_saves: handle.session_feed(),
                handle,
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.inner.id
    }

    pub fn handle(&self) -> &PersistenceHandle {
        &self.inner.handle
    }

    /// Whether two values refer to the same session.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// With autosave on, changes still pending when the last clone of the
    /// session is dropped are saved.
    pub fn set_autosave(&self, enabled: bool) {
        self.inner.lock_state().autosave = enabled;
    }

    pub fn autosave(&self) -> bool {
        self.inner.lock_state().autosave
    }

    pub fn is_registered(&self, id: PersistentId) -> bool {
        self.inner.lock_state().registry.contains_key(&id)
    }

    pub fn has_changes(&self) -> bool {
        !self.inner.lock_state().pending.is_empty()
    }

    /// Registers a record created in memory as a pending insert.
    pub fn insert<M: Model>(&self, record: &Record<M>) -> StoreResult<()> {
        self.ensure_entity(M::ENTITY)?;
        let payload = serde_json::to_value(record.value())?;

        let mut state = self.inner.lock_state();
        if state.registry.contains_key(&record.id()) {
            return Err(StoreError::AlreadyRegistered(record.id()));
        }
        state.deleted_elsewhere.remove(&record.id());

        state.registry.insert(
            record.id(),
            Registration {
                entity: M::ENTITY.to_string(),
                snapshot: None,
            },
        );
        state.pending.push(PendingChange::Insert {
            id: record.id(),
            entity: M::ENTITY.to_string(),
            payload,
        });
        Ok(())
    }

    /// Ensures `record` is registered: records already in storage register
    /// with their persisted snapshot, unknown records become pending inserts.
    ///
    /// Fails with `NotFound` for a record this session had registered and
    /// another session has since deleted.
    pub fn register<M: Model>(&self, record: &Record<M>) -> StoreResult<()> {
        self.ensure_entity(M::ENTITY)?;

        let mut state = self.inner.lock_state();
        if state.registry.contains_key(&record.id()) {
            return Ok(());
        }
        if state.deleted_elsewhere.contains(&record.id()) {
            return Err(StoreError::NotFound(record.id()));
        }

        let stored = self
            .inner
            .handle
            .with_connection(|conn| records::select_by_id(conn, record.id()))?;
        match stored {
            Some(row) if row.entity == M::ENTITY => {
                state.registry.insert(
                    row.id,
                    Registration {
                        entity: row.entity,
                        snapshot: Some(row.payload),
                    },
                );
            }
            Some(row) => {
                return Err(StoreError::InvalidData(format!(
                    "record {} is stored as entity {}, not {}",
                    row.id,
                    row.entity,
                    M::ENTITY
                )));
            }
            None => {
                let payload = serde_json::to_value(record.value())?;
                state.registry.insert(
                    record.id(),
                    Registration {
                        entity: M::ENTITY.to_string(),
                        snapshot: None,
                    },
                );
                state.pending.push(PendingChange::Insert {
                    id: record.id(),
                    entity: M::ENTITY.to_string(),
                    payload,
                });
            }
        }

        Ok(())
    }

    /// Compares the in-memory record with what the session last saw and
    /// stages an update when they differ.
    ///
    /// Returns whether the record has a pending change afterwards.
    pub fn stage_update<M: Model>(&self, record: &Record<M>) -> StoreResult<bool> {
        self.register(record)?;
        let payload = serde_json::to_value(record.value())?;
        let id = record.id();

        let mut state = self.inner.lock_state();
        let position = state.pending.iter().position(|change| change.id() == id);

        if let Some(index) = position {
            match &mut state.pending[index] {
                PendingChange::Insert {
                    payload: pending, ..
                } => {
                    *pending = payload;
                    return Ok(true);
                }
                PendingChange::Delete { .. } => return Err(StoreError::NotFound(id)),
                PendingChange::Update { .. } => {}
            }
        }

        let unchanged = state
            .registry
            .get(&id)
            .and_then(|registration| registration.snapshot.as_ref())
            .is_some_and(|snapshot| *snapshot == payload);

        match (unchanged, position) {
            (true, Some(index)) => {
                state.pending.remove(index);
                Ok(false)
            }
            (true, None) => Ok(false),
            (false, Some(index)) => {
                state.pending[index] = PendingChange::Update {
                    id,
                    entity: M::ENTITY.to_string(),
                    payload,
                };
                Ok(true)
            }
            (false, None) => {
                state.pending.push(PendingChange::Update {
                    id,
                    entity: M::ENTITY.to_string(),
                    payload,
                });
                Ok(true)
            }
        }
    }

    /// Marks a record for deletion on the next save.
    pub fn delete<M: Model>(&self, record: &Record<M>) -> StoreResult<()> {
        self.ensure_entity(M::ENTITY)?;
        self.stage_delete(record.id());
        Ok(())
    }

    pub(crate) fn stage_delete(&self, id: PersistentId) {
        let mut state = self.inner.lock_state();
        let position = state.pending.iter().position(|change| change.id() == id);

        match position.map(|index| (index, state.pending[index].clone())) {
            Some((index, PendingChange::Insert { .. })) => {
                state.pending.remove(index);
                state.registry.remove(&id);
            }
            Some((_, PendingChange::Delete { .. })) => {}
            Some((index, PendingChange::Update { .. })) => {
                state.pending[index] = PendingChange::Delete { id };
            }
            None => state.pending.push(PendingChange::Delete { id }),
        }
    }

    /// Discards pending changes and unregisters never-saved records.
    pub fn rollback(&self) {
        let mut state = self.inner.lock_state();
        let discarded = state.pending.len();
        state.pending.clear();
        state
            .registry
            .retain(|_, registration| registration.snapshot.is_some());
        if discarded > 0 {
            debug!(
                "event=session_rollback module=session status=ok session={} discarded={}",
                self.inner.id, discarded
            );
        }
    }

    /// Commits every pending change atomically and publishes one save event.
    pub fn save(&self) -> StoreResult<()> {
        self.inner.save()
    }

    pub(crate) fn ensure_entity(&self, entity: &str) -> StoreResult<()> {
        if self.inner.handle.schema().contains(entity) {
            Ok(())
        } else {
            Err(StoreError::UnregisteredEntity(entity.to_string()))
        }
    }

    /// Runs a read against the handle's connection without touching the
    /// registry.
    pub(crate) fn read<T, F>(&self, read: F) -> StoreResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> StoreResult<T>,
    {
        self.inner.handle.with_connection(|conn| read(conn))
    }

    /// Records the persisted state of freshly read rows, leaving ids with
    /// pending changes alone.
    pub(crate) fn register_fetched<'a, I>(&self, rows: I)
    where
        I: IntoIterator<Item = &'a StoredRow>,
    {
        let mut state = self.inner.lock_state();
        for row in rows {
            if state.has_pending(row.id) {
                continue;
            }
            state.registry.insert(
                row.id,
                Registration {
                    entity: row.entity.clone(),
                    snapshot: Some(row.payload.clone()),
                },
            );
        }
    }

    pub(crate) fn lookup(&self, id: PersistentId) -> RegistryLookup {
        let state = self.inner.lock_state();
        let pending = state.pending.iter().find(|change| change.id() == id);

        match pending {
            Some(PendingChange::Delete { .. }) => RegistryLookup::PendingDelete,
            Some(
                PendingChange::Insert {
                    entity, payload, ..
                }
                | PendingChange::Update {
                    entity, payload, ..
                },
            ) => RegistryLookup::Present {
                entity: entity.clone(),
                payload: payload.clone(),
            },
            None => match state.registry.get(&id) {
                Some(Registration {
                    entity,
                    snapshot: Some(snapshot),
                }) => RegistryLookup::Present {
                    entity: entity.clone(),
                    payload: snapshot.clone(),
                },
                _ => RegistryLookup::Absent,
            },
        }
    }
}

impl SessionInner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        for event in self.sibling_saves.drain() {
            if event.session != self.id {
                state.forget_changed_elsewhere(&event);
            }
        }
        state
    }

    fn save(&self) -> StoreResult<()> {
        let started_at = Instant::now();
        let mut state = self.lock_state();
        if state.pending.is_empty() {
            return Ok(());
        }

        if !self.handle.storage().allows_save {
            warn!(
                "event=session_save module=session status=error session={} error_code=read_only pending={}",
                self.id,
                state.pending.len()
            );
            return Err(StoreError::ReadOnly);
        }

        let committed = self.handle.with_connection(|conn| {
            let tx = conn.transaction()?;
            for change in &state.pending {
                match change {
                    PendingChange::Insert {
                        id,
                        entity,
                        payload,
                    } => records::insert(&tx, *id, entity, payload)?,
                    PendingChange::Update {
                        id,
                        entity,
                        payload,
                    } => records::update(&tx, *id, entity, payload)?,
                    PendingChange::Delete { id } => records::delete(&tx, *id)?,
                }
            }
            tx.commit()?;
            Ok(())
        });

        if let Err(err) = committed {
            error!(
                "event=session_save module=session status=error session={} duration_ms={} error={}",
                self.id,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }

        let mut event = SaveEvent {
            session: self.id,
            inserted: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        };
        let pending = std::mem::take(&mut state.pending);
        for change in pending {
            match change {
                PendingChange::Insert {
                    id,
                    entity,
                    payload,
                } => {
                    state.registry.insert(
                        id,
                        Registration {
                            entity,
                            snapshot: Some(payload),
                        },
                    );
                    event.inserted.push(id);
                }
                PendingChange::Update {
                    id,
                    entity,
                    payload,
                } => {
                    state.registry.insert(
                        id,
                        Registration {
                            entity,
                            snapshot: Some(payload),
                        },
                    );
                    event.updated.push(id);
                }
                PendingChange::Delete { id } => {
                    state.registry.remove(&id);
                    event.deleted.push(id);
                }
            }
        }
        drop(state);

        info!(
            "event=session_save module=session status=ok session={} inserted={} updated={} deleted={} duration_ms={}",
            self.id,
            event.inserted.len(),
            event.updated.len(),
            event.deleted.len(),
            started_at.elapsed().as_millis()
        );
        self.handle.notifier().publish(&event);
        Ok(())
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.autosave || state.pending.is_empty() {
            return;
        }

        if let Err(err) = self.save() {
            warn!(
                "event=session_autosave module=session status=error session={} error={}",
                self.id, err
            );
        }
    }
}
