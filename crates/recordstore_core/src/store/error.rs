//! Error taxonomy for configuration and store operations.
//!
//! # Invariants
//! - `ConfigurationError` only comes out of handle/container creation.
//! - `StoreError` only comes out of per-call session and repository work.
//! - Touching the shared container before it is configured is a panic, never
//!   one of these errors.

use crate::db::DbError;
use crate::model::record::PersistentId;
use crate::model::schema::SchemaError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure while creating a persistence handle or store container.
#[derive(Debug)]
pub enum ConfigurationError {
    InvalidSchema(SchemaError),
    InvalidStorage(String),
    AlreadyConfigured,
    Io(std::io::Error),
    Db(DbError),
    Migration { version: u32, message: String },
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSchema(err) => write!(f, "invalid schema: {err}"),
            Self::InvalidStorage(message) => write!(f, "invalid storage configuration: {message}"),
            Self::AlreadyConfigured => write!(f, "shared store is already configured"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Migration { version, message } => {
                write!(f, "migration stage {version} failed: {message}")
            }
        }
    }
}

impl Error for ConfigurationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidSchema(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::InvalidStorage(_) | Self::AlreadyConfigured | Self::Migration { .. } => None,
        }
    }
}

impl From<SchemaError> for ConfigurationError {
    fn from(value: SchemaError) -> Self {
        Self::InvalidSchema(value)
    }
}

impl From<std::io::Error> for ConfigurationError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<DbError> for ConfigurationError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ConfigurationError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Failure of one create/fetch/update/delete call against a session.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
    Serialization(serde_json::Error),
    UnregisteredEntity(String),
    UnknownField { entity: String, field: String },
    AlreadyRegistered(PersistentId),
    NotFound(PersistentId),
    ReadOnly,
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "record (de)serialization failed: {err}"),
            Self::UnregisteredEntity(entity) => {
                write!(f, "entity {entity} is not part of the store schema")
            }
            Self::UnknownField { entity, field } => {
                write!(f, "entity {entity} declares no field `{field}`")
            }
            Self::AlreadyRegistered(id) => {
                write!(f, "record {id} is already registered with the session")
            }
            Self::NotFound(id) => write!(f, "record not found: {id}"),
            Self::ReadOnly => write!(f, "store is configured without save permission"),
            Self::InvalidData(message) => write!(f, "invalid persisted record data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::UnregisteredEntity(_)
            | Self::UnknownField { .. }
            | Self::AlreadyRegistered(_)
            | Self::NotFound(_)
            | Self::ReadOnly
            | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}
