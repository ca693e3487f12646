//! Record model shared by every store component.
//!
//! # Responsibility
//! - Define the contract application record types implement.
//! - Describe the schema a persistence handle is opened with.
//!
//! # Invariants
//! - Every persisted record is identified by a stable `PersistentId`.

pub mod record;
pub mod schema;
