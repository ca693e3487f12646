mod common;

use common::{schema, todo, Priority, Todo};
use recordstore_core::store::shared;
use recordstore_core::{ConfigurationError, Record, RecordRepository, SessionRepository, StorageConfig};

// One test per binary: the shared container is process-wide state.
#[test]
fn shared_container_configures_once_until_reset() {
    assert!(!shared::is_configured());
    assert!(shared::try_container().is_none());

    shared::configure(schema(), None, StorageConfig::in_memory()).unwrap();
    assert!(shared::is_configured());

    let err = shared::configure(schema(), None, StorageConfig::in_memory()).unwrap_err();
    assert!(matches!(err, ConfigurationError::AlreadyConfigured));

    let main = shared::main_session();
    assert!(main.autosave());
    assert!(main.ptr_eq(&shared::main_session()));
    assert!(main.handle().ptr_eq(&shared::handle()));

    let record = Record::new(todo("global", Priority::High, 1));
    SessionRepository::<Todo>::try_new(main)
        .unwrap()
        .create(&record)
        .unwrap();

    let background = SessionRepository::<Todo>::try_new(shared::new_background_session()).unwrap();
    assert_eq!(background.fetch_by_id(record.id()).unwrap(), Some(record));

    shared::reset();
    assert!(!shared::is_configured());

    shared::configure(schema(), None, StorageConfig::in_memory()).unwrap();
    let fresh = shared::container().repository::<Todo>().unwrap();
    assert_eq!(fresh.fetch_count(None).unwrap(), 0);
    shared::reset();
}
