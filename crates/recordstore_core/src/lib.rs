//! Repository layer over an embedded record store.
//!
//! Application types implement [`Model`], a [`StoreContainer`] opens the
//! store for a [`Schema`], and [`SessionRepository`] /
//! [`ObservableRepository`] provide CRUD plus a result list that follows
//! every save on the store.

pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod store;

pub use logging::{init_logging, logging_status, LogLevel};
pub use model::record::{Model, PersistentId, Record};
pub use model::schema::{EntityDescriptor, Schema, SchemaError};
pub use query::descriptor::{
    FetchDescriptor, FetchWindow, Predicate, PropertySelection, SortDescriptor, SortDirection,
};
pub use repo::observable_repo::{ObservableRepository, ObserverId};
pub use repo::record_repo::{RecordRepository, SessionRepository};
pub use store::config::StorageConfig;
pub use store::container::StoreContainer;
pub use store::error::{ConfigurationError, StoreError, StoreResult};
pub use store::handle::PersistenceHandle;
pub use store::migration::{MigrationPlan, MigrationStage};
pub use store::notify::{SaveEvent, SaveSubscription};
pub use store::session::{Session, SessionId};
