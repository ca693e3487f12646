//! Observable repository: a cached result list kept current by save signals.
//!
//! # Responsibility
//! - Hold the result of one fixed fetch descriptor.
//! - Re-run that descriptor after any save on the handle and publish the new
//!   list to registered observers.
//!
//! # Invariants
//! - The cache is only ever replaced wholesale: by the initial fetch or by a
//!   successful refresh. Mutations never patch it.
//! - A failed refresh keeps the previous cache visible.
//! - Signals are consumed on the caller's context through `process_signals`
//!   or `wait_for_signal`, so refreshes never run concurrently.

use crate::model::record::{Model, PersistentId, Record};
use crate::query::descriptor::{FetchDescriptor, Predicate};
use crate::repo::record_repo::{RecordRepository, SessionRepository};
use crate::store::error::StoreResult;
use crate::store::notify::SaveSubscription;
use crate::store::session::Session;
use log::{debug, warn};
use std::time::{Duration, Instant};

/// Identifier returned by `observe`, used to stop observing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer<M> = Box<dyn FnMut(&[Record<M>])>;

/// Repository whose `items` track one descriptor across saves.
pub struct ObservableRepository<M: Model> {
    repo: SessionRepository<M>,
    descriptor: FetchDescriptor<M>,
    subscription: SaveSubscription,
    cache: Vec<Record<M>>,
    generation: u64,
    observers: Vec<(ObserverId, Observer<M>)>,
    next_observer_id: u64,
}

impl<M: Model> ObservableRepository<M> {
    /// Subscribes to saves and performs the initial fetch.
    ///
    /// An initial-fetch failure is logged and the cache starts empty; use
    /// `try_new` to receive the failure instead. Fails only when `M` is not
    /// part of the session's schema.
    pub fn new(session: Session, descriptor: FetchDescriptor<M>) -> StoreResult<Self> {
        let mut observable = Self::subscribe(session, descriptor)?;
        observable.refresh();
        Ok(observable)
    }

    /// Like `new`, but returns the initial-fetch failure to the caller.
    pub fn try_new(session: Session, descriptor: FetchDescriptor<M>) -> StoreResult<Self> {
        let mut observable = Self::subscribe(session, descriptor)?;
        observable.cache = observable.repo.fetch(&observable.descriptor)?;
        observable.generation = 1;
        Ok(observable)
    }

    fn subscribe(session: Session, descriptor: FetchDescriptor<M>) -> StoreResult<Self> {
        let repo = SessionRepository::try_new(session)?;
        let subscription = repo.session().handle().subscribe();
        Ok(Self {
            repo,
            descriptor,
            subscription,
            cache: Vec::new(),
            generation: 0,
            observers: Vec::new(),
            next_observer_id: 0,
        })
    }

    /// Records currently believed current for the descriptor.
    pub fn items(&self) -> &[Record<M>] {
        &self.cache
    }

    pub fn descriptor(&self) -> &FetchDescriptor<M> {
        &self.descriptor
    }

    pub fn session(&self) -> &Session {
        self.repo.session()
    }

    /// Number of successful cache replacements so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Registers `observer`; it is called with the new list after every
    /// successful refresh.
    pub fn observe<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&[Record<M>]) + 'static,
    {
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns whether `id` was registered.
    pub fn remove_observer(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    /// Consumes every queued save signal and refreshes once if any arrived.
    ///
    /// Returns whether a refresh was attempted.
    pub fn process_signals(&mut self) -> bool {
        let signals = self.subscription.drain();
        if signals.is_empty() {
            return false;
        }

        debug!(
            "event=observable_signal module=repo status=ok entity={} signals={}",
            M::ENTITY,
            signals.len()
        );
        self.refresh();
        true
    }

    /// Blocks up to `timeout` for a save signal, then refreshes.
    ///
    /// Returns whether a signal arrived.
    pub fn wait_for_signal(&mut self, timeout: Duration) -> bool {
        if self.subscription.recv_timeout(timeout).is_none() {
            return false;
        }

        self.subscription.drain();
        self.refresh();
        true
    }

    /// Re-runs the descriptor and replaces the cache on success.
    ///
    /// Returns whether the cache was replaced.
    pub fn refresh(&mut self) -> bool {
        let started_at = Instant::now();
        match self.repo.fetch(&self.descriptor) {
            Ok(records) => {
                self.cache = records;
                self.generation += 1;
                debug!(
                    "event=observable_refresh module=repo status=ok entity={} items={} generation={} duration_ms={}",
                    M::ENTITY,
                    self.cache.len(),
                    self.generation,
                    started_at.elapsed().as_millis()
                );
                for (_, observer) in &mut self.observers {
                    observer(&self.cache);
                }
                true
            }
            Err(err) => {
                warn!(
                    "event=observable_refresh module=repo status=error entity={} generation={} duration_ms={} error={}",
                    M::ENTITY,
                    self.generation,
                    started_at.elapsed().as_millis(),
                    err
                );
                false
            }
        }
    }
}

impl<M: Model> RecordRepository<M> for ObservableRepository<M> {
    fn create(&self, record: &Record<M>) -> StoreResult<()> {
        self.repo.create(record)
    }

    fn fetch(&self, descriptor: &FetchDescriptor<M>) -> StoreResult<Vec<Record<M>>> {
        self.repo.fetch(descriptor)
    }

    fn fetch_by_id(&self, id: PersistentId) -> StoreResult<Option<Record<M>>> {
        self.repo.fetch_by_id(id)
    }

    fn fetch_count(&self, predicate: Option<&Predicate<M>>) -> StoreResult<usize> {
        self.repo.fetch_count(predicate)
    }

    fn update<F>(&self, record: &mut Record<M>, mutate: F) -> StoreResult<bool>
    where
        F: FnOnce(&mut M),
    {
        self.repo.update(record, mutate)
    }

    fn delete(&self, record: &Record<M>) -> StoreResult<()> {
        self.repo.delete(record)
    }

    fn delete_all(&self, predicate: Option<&Predicate<M>>) -> StoreResult<usize> {
        self.repo.delete_all(predicate)
    }
}
