//! Repository layer over store sessions.
//!
//! # Responsibility
//! - Define the record-type-generic repository contract.
//! - Provide the manual repository and the signal-driven observable one.
//!
//! # Invariants
//! - Manual repository calls surface every failure to the caller.
//! - Observable refreshes log failures and keep their last good list.

pub mod observable_repo;
pub mod record_repo;
