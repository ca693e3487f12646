//! Record repository contract and the session-bound manual store.
//!
//! # Responsibility
//! - Provide create/fetch/update/delete over one record type.
//! - Translate each call into one query or one atomic save on a session.
//!
//! # Invariants
//! - No query results are cached; every fetch reads storage.
//! - Every mutation ends in exactly one save, or none for no-op updates.
//! - A failed save rolls the session's pending changes back.

use crate::model::record::{Model, PersistentId, Record};
use crate::model::schema::EntityDescriptor;
use crate::query::descriptor::{FetchDescriptor, FetchWindow, Predicate, PropertySelection};
use crate::store::error::{StoreError, StoreResult};
use crate::store::records::{self, StoredRow};
use crate::store::session::{RegistryLookup, Session};
use log::{debug, error};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::time::Instant;

/// Capability interface over one record type.
pub trait RecordRepository<M: Model> {
    /// Registers `record` with the session and saves immediately.
    fn create(&self, record: &Record<M>) -> StoreResult<()>;
    /// Sorts, filters, applies fetch hints and finally the window.
    fn fetch(&self, descriptor: &FetchDescriptor<M>) -> StoreResult<Vec<Record<M>>>;
    /// Looks a record up by persistent id; `None` when unknown.
    fn fetch_by_id(&self, id: PersistentId) -> StoreResult<Option<Record<M>>>;
    /// Number of matches, without handing records to the caller.
    fn fetch_count(&self, predicate: Option<&Predicate<M>>) -> StoreResult<usize>;
    /// Applies `mutate` and saves only when the session reports changes.
    ///
    /// Returns whether a save happened.
    fn update<F>(&self, record: &mut Record<M>, mutate: F) -> StoreResult<bool>
    where
        F: FnOnce(&mut M);
    /// Removes `record` and saves immediately.
    fn delete(&self, record: &Record<M>) -> StoreResult<()>;
    /// Removes every match (every record of the type without a predicate)
    /// in one save and returns how many were removed.
    fn delete_all(&self, predicate: Option<&Predicate<M>>) -> StoreResult<usize>;

    /// Every record of the type, unsorted.
    fn fetch_all(&self) -> StoreResult<Vec<Record<M>>> {
        self.fetch(&FetchDescriptor::new())
    }
}

/// Stateless repository over one session.
pub struct SessionRepository<M: Model> {
    session: Session,
    entity: EntityDescriptor,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> SessionRepository<M> {
    /// Binds the repository to `session`.
    ///
    /// Fails with `UnregisteredEntity` when `M` is not part of the session
    /// handle's schema.
    pub fn try_new(session: Session) -> StoreResult<Self> {
        let entity = session
            .handle()
            .schema()
            .entity(M::ENTITY)
            .cloned()
            .ok_or_else(|| StoreError::UnregisteredEntity(M::ENTITY.to_string()))?;

        Ok(Self {
            session,
            entity,
            _model: PhantomData,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn check_fields(&self, descriptor: &FetchDescriptor<M>) -> StoreResult<()> {
        for field in descriptor.referenced_fields() {
            if !self.entity.has_field(field) {
                return Err(StoreError::UnknownField {
                    entity: self.entity.name.to_string(),
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }

    fn save_or_rollback(&self, operation: &str) -> StoreResult<()> {
        if let Err(err) = self.session.save() {
            self.session.rollback();
            error!(
                "event=repo_{operation} module=repo status=error entity={} error={}",
                self.entity.name, err
            );
            return Err(err);
        }
        Ok(())
    }

    fn load_matching(&self, predicate: Option<&Predicate<M>>) -> StoreResult<Vec<(StoredRow, M)>> {
        let rows = self.session.read(|conn| {
            records::select_entity(conn, M::ENTITY, &[], FetchWindow::All)
        })?;
        decode_matching(rows, predicate)
    }

    /// Loads records referenced by `fields` of the fetched rows into the
    /// session registry and returns how many were loaded.
    fn prefetch(&self, fields: &[String], rows: &[StoredRow]) -> StoreResult<usize> {
        let mut ids = BTreeSet::new();
        for row in rows {
            for field in fields {
                collect_referenced_ids(row.payload.get(field.as_str()), &mut ids);
            }
        }
        ids.retain(|id| !self.session.is_registered(*id));

        let ids: Vec<PersistentId> = ids.into_iter().collect();
        let related = self
            .session
            .read(|conn| records::select_by_ids(conn, &ids))?;
        self.session.register_fetched(&related);
        Ok(related.len())
    }
}

impl<M: Model> RecordRepository<M> for SessionRepository<M> {
    fn create(&self, record: &Record<M>) -> StoreResult<()> {
        self.session.insert(record)?;
        self.save_or_rollback("create")
    }

    fn fetch(&self, descriptor: &FetchDescriptor<M>) -> StoreResult<Vec<Record<M>>> {
        let started_at = Instant::now();
        self.check_fields(descriptor)?;

        let predicate = descriptor.predicate.as_ref();
        let sql_window = match predicate {
            None => descriptor.window,
            Some(_) => FetchWindow::All,
        };
        let rows = self.session.read(|conn| {
            records::select_entity(conn, M::ENTITY, &descriptor.sort, sql_window)
        })?;

        let mut matches = decode_matching(rows, predicate)?;
        if predicate.is_some() {
            matches = descriptor.window.apply(matches);
        }

        if let PropertySelection::Custom(fields) = &descriptor.properties {
            debug!(
                "event=repo_fetch module=repo status=hint entity={} properties={}",
                self.entity.name,
                fields.join(",")
            );
        }

        let (rows, values): (Vec<StoredRow>, Vec<M>) = matches.into_iter().unzip();
        self.session.register_fetched(&rows);
        let prefetched = if descriptor.prefetch.is_empty() {
            0
        } else {
            self.prefetch(&descriptor.prefetch, &rows)?
        };

        debug!(
            "event=repo_fetch module=repo status=ok entity={} returned={} prefetched={} duration_ms={}",
            self.entity.name,
            values.len(),
            prefetched,
            started_at.elapsed().as_millis()
        );

        Ok(rows
            .iter()
            .zip(values)
            .map(|(row, value)| Record::with_id(row.id, value))
            .collect())
    }

    fn fetch_by_id(&self, id: PersistentId) -> StoreResult<Option<Record<M>>> {
        match self.session.lookup(id) {
            RegistryLookup::PendingDelete => return Ok(None),
            RegistryLookup::Present { entity, payload } => {
                if entity != M::ENTITY {
                    return Ok(None);
                }
                let value = M::deserialize(&payload)?;
                return Ok(Some(Record::with_id(id, value)));
            }
            RegistryLookup::Absent => {}
        }

        let Some(row) = self.session.read(|conn| records::select_by_id(conn, id))? else {
            return Ok(None);
        };
        if row.entity != M::ENTITY {
            return Ok(None);
        }

        let value = M::deserialize(&row.payload)?;
        self.session.register_fetched([&row]);
        Ok(Some(Record::with_id(id, value)))
    }

    fn fetch_count(&self, predicate: Option<&Predicate<M>>) -> StoreResult<usize> {
        match predicate {
            None => self
                .session
                .read(|conn| records::count_entity(conn, M::ENTITY)),
            Some(_) => Ok(self.load_matching(predicate)?.len()),
        }
    }

    fn update<F>(&self, record: &mut Record<M>, mutate: F) -> StoreResult<bool>
    where
        F: FnOnce(&mut M),
    {
        self.session.register(record)?;
        mutate(record.value_mut());
        self.session.stage_update(record)?;

        if !self.session.has_changes() {
            debug!(
                "event=repo_update module=repo status=noop entity={} id={}",
                self.entity.name,
                record.id()
            );
            return Ok(false);
        }

        self.save_or_rollback("update")?;
        Ok(true)
    }

    fn delete(&self, record: &Record<M>) -> StoreResult<()> {
        self.session.delete(record)?;
        self.save_or_rollback("delete")
    }

    fn delete_all(&self, predicate: Option<&Predicate<M>>) -> StoreResult<usize> {
        let matches = self.load_matching(predicate)?;
        if matches.is_empty() {
            return Ok(0);
        }

        for (row, _) in &matches {
            self.session.stage_delete(row.id);
        }
        self.save_or_rollback("delete_all")?;
        Ok(matches.len())
    }
}

fn decode_matching<M: Model>(
    rows: Vec<StoredRow>,
    predicate: Option<&Predicate<M>>,
) -> StoreResult<Vec<(StoredRow, M)>> {
    let mut matches = Vec::with_capacity(rows.len());
    for row in rows {
        let value = M::deserialize(&row.payload)?;
        if predicate.map_or(true, |predicate| predicate.matches(&value)) {
            matches.push((row, value));
        }
    }
    Ok(matches)
}

/// Accepts a persistent id string or an array of them; anything else is
/// not a relationship and is skipped.
fn collect_referenced_ids(value: Option<&Value>, ids: &mut BTreeSet<PersistentId>) {
    match value {
        Some(Value::String(text)) => {
            if let Ok(id) = text.parse() {
                ids.insert(id);
            }
        }
        Some(Value::Array(items)) => {
            for item in items {
                collect_referenced_ids(Some(item), ids);
            }
        }
        _ => {}
    }
}
