//! Record model: application types, persistent identity and the in-memory
//! record wrapper.
//!
//! # Responsibility
//! - Define the contract application types implement to be persisted.
//! - Issue stable persistent identifiers, separate from any user id field.
//!
//! # Invariants
//! - A `PersistentId` is issued once, when the record is created in memory,
//!   and stays stable across saves.
//! - `Record` equality compares identity and value.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::str::FromStr;
use uuid::Uuid;

/// An application-defined persisted type.
///
/// `ENTITY` names the type in storage and in the schema. `FIELDS` lists the
/// serialized field names that sort descriptors, property selections and
/// prefetch lists may address.
pub trait Model: Serialize + DeserializeOwned + Send + 'static {
    const ENTITY: &'static str;
    const FIELDS: &'static [&'static str];
}

/// Framework-issued identifier of one persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistentId(Uuid);

impl PersistentId {
    /// Issues a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for PersistentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for PersistentId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl Display for PersistentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PersistentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// In-memory instance of a persisted type together with its identity.
///
/// A record fetched through two sessions yields two distinct `Record`
/// values; mutating one never affects the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<M> {
    id: PersistentId,
    value: M,
}

impl<M> Record<M> {
    /// Wraps a freshly created value and issues its persistent id.
    pub fn new(value: M) -> Self {
        Self::with_id(PersistentId::new(), value)
    }

    /// Wraps a value whose identity already exists, e.g. one decoded from
    /// storage.
    pub fn with_id(id: PersistentId, value: M) -> Self {
        Self { id, value }
    }

    pub fn id(&self) -> PersistentId {
        self.id
    }

    pub fn value(&self) -> &M {
        &self.value
    }

    /// Mutable access outside of `update`; changes become pending for the
    /// session the record is registered with on the next `update`.
    pub fn value_mut(&mut self) -> &mut M {
        &mut self.value
    }

    pub fn into_value(self) -> M {
        self.value
    }
}

impl<M> Deref for Record<M> {
    type Target = M;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::{PersistentId, Record};

    #[test]
    fn persistent_id_parses_its_display_form() {
        let id = PersistentId::new();
        let parsed: PersistentId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn new_records_get_distinct_ids() {
        let first = Record::new("a");
        let second = Record::new("a");
        assert_ne!(first.id(), second.id());
        assert_ne!(first, second);
    }

    #[test]
    fn deref_exposes_the_value() {
        let record = Record::new(String::from("body"));
        assert_eq!(record.len(), 4);
        assert_eq!(record.into_value(), "body");
    }
}
