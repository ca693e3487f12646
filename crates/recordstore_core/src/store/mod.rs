//! Persistence handles, sessions and store configuration.
//!
//! # Responsibility
//! - Open the backing store for a schema and derive work sessions from it.
//! - Commit pending session changes atomically and publish save signals.
//! - Provide the explicit `StoreContainer` configuration object and an
//!   optional process-wide wrapper around it.
//!
//! # Invariants
//! - Sessions never cache query results; they only track registrations and
//!   pending changes.

pub mod config;
pub mod container;
pub mod error;
pub mod handle;
pub mod migration;
pub mod notify;
pub(crate) mod records;
pub mod session;
pub mod shared;
