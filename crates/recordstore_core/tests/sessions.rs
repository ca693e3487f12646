mod common;

use common::{in_memory_container, todo, Priority, Todo};
use recordstore_core::{Record, RecordRepository, SessionRepository, StoreError};

#[test]
fn sessions_hold_independent_instances() {
    let container = in_memory_container();
    let main = container.repository::<Todo>().unwrap();
    let record = Record::new(todo("shared", Priority::Low, 1));
    main.create(&record).unwrap();

    let background = SessionRepository::<Todo>::try_new(container.new_background_session()).unwrap();
    let mut main_copy = main.fetch_by_id(record.id()).unwrap().unwrap();
    let background_copy = background.fetch_by_id(record.id()).unwrap().unwrap();

    main.update(&mut main_copy, |value| value.title = "edited".to_string())
        .unwrap();

    assert_eq!(background_copy.title, "shared");
    assert_eq!(main_copy.title, "edited");
    assert_eq!(
        background.fetch_by_id(record.id()).unwrap().unwrap().title,
        "edited"
    );
}

#[test]
fn sibling_update_replaces_the_registered_snapshot() {
    let container = in_memory_container();
    let main = container.repository::<Todo>().unwrap();
    let record = Record::new(todo("draft", Priority::Low, 1));
    main.create(&record).unwrap();

    let background = SessionRepository::<Todo>::try_new(container.new_background_session()).unwrap();
    let mut background_copy = background.fetch_by_id(record.id()).unwrap().unwrap();
    background
        .update(&mut background_copy, |value| value.is_completed = true)
        .unwrap();

    let mut fresh = main.fetch_by_id(record.id()).unwrap().unwrap();
    assert!(fresh.is_completed);

    let subscription = container.handle().subscribe();
    assert!(!main.update(&mut fresh, |value| value.is_completed = true).unwrap());
    assert!(subscription.try_next().is_none());
}

#[test]
fn sibling_delete_evicts_the_registration() {
    let container = in_memory_container();
    let main_session = container.main_session().clone();
    let main = container.repository::<Todo>().unwrap();
    let mut record = Record::new(todo("doomed", Priority::Low, 1));
    main.create(&record).unwrap();
    assert!(main_session.is_registered(record.id()));

    let background = SessionRepository::<Todo>::try_new(container.new_background_session()).unwrap();
    background.delete(&record).unwrap();

    assert!(!main_session.is_registered(record.id()));
    assert!(main.fetch_by_id(record.id()).unwrap().is_none());

    let err = main
        .update(&mut record, |value| value.is_completed = true)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(id) if id == record.id()));
    assert!(!main_session.has_changes());

    main.create(&record).unwrap();
    assert!(main.fetch_by_id(record.id()).unwrap().is_some());
}

#[test]
fn save_event_lists_changed_ids_and_session() {
    let container = in_memory_container();
    let session = container.main_session().clone();
    let repo = container.repository::<Todo>().unwrap();
    let subscription = container.handle().subscribe();

    let mut record = Record::new(todo("tracked", Priority::High, 1));
    repo.create(&record).unwrap();
    repo.update(&mut record, |value| value.is_completed = true)
        .unwrap();
    repo.delete(&record).unwrap();

    let events = subscription.drain();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|event| event.session == session.id()));
    assert_eq!(events[0].inserted, vec![record.id()]);
    assert_eq!(events[1].updated, vec![record.id()]);
    assert_eq!(events[2].deleted, vec![record.id()]);
}

#[test]
fn pending_changes_commit_in_one_save() {
    let container = in_memory_container();
    let session = container.new_background_session();
    let subscription = container.handle().subscribe();

    let first = Record::new(todo("first", Priority::Low, 1));
    let second = Record::new(todo("second", Priority::Low, 2));
    session.insert(&first).unwrap();
    session.insert(&second).unwrap();
    assert!(session.has_changes());

    session.save().unwrap();
    assert!(!session.has_changes());

    let events = subscription.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].inserted, vec![first.id(), second.id()]);
}

#[test]
fn failed_save_is_atomic() {
    let container = in_memory_container();
    let repo = container.repository::<Todo>().unwrap();
    let existing = Record::new(todo("existing", Priority::Low, 1));
    repo.create(&existing).unwrap();

    let session = container.new_background_session();
    session
        .insert(&Record::new(todo("new", Priority::Low, 2)))
        .unwrap();
    session.delete(&Record::new(todo("missing", Priority::Low, 3))).unwrap();

    assert!(session.save().is_err());
    assert!(session.has_changes());
    assert_eq!(repo.fetch_count(None).unwrap(), 1);

    session.rollback();
    assert!(!session.has_changes());
}

#[test]
fn saving_without_changes_is_silent() {
    let container = in_memory_container();
    let subscription = container.handle().subscribe();

    container.main_session().save().unwrap();
    assert!(subscription.try_next().is_none());
}

#[test]
fn rollback_forgets_unsaved_inserts() {
    let container = in_memory_container();
    let session = container.new_background_session();
    let record = Record::new(todo("draft", Priority::Low, 1));

    session.insert(&record).unwrap();
    assert!(session.is_registered(record.id()));

    session.rollback();
    assert!(!session.is_registered(record.id()));
    assert!(!session.has_changes());
}

#[test]
fn deleting_an_unsaved_insert_cancels_it() {
    let container = in_memory_container();
    let session = container.new_background_session();
    let record = Record::new(todo("short-lived", Priority::Low, 1));

    session.insert(&record).unwrap();
    session.delete(&record).unwrap();

    assert!(!session.has_changes());
    assert!(!session.is_registered(record.id()));
}

#[test]
fn autosave_flushes_pending_changes_on_drop() {
    let container = in_memory_container();
    assert!(container.main_session().autosave());

    let session = container.new_background_session();
    assert!(!session.autosave());
    session.set_autosave(true);

    let record = Record::new(todo("autosaved", Priority::Low, 1));
    session.insert(&record).unwrap();
    drop(session);

    let repo = container.repository::<Todo>().unwrap();
    assert!(repo.fetch_by_id(record.id()).unwrap().is_some());
}

#[test]
fn dropping_without_autosave_discards_pending_changes() {
    let container = in_memory_container();
    let session = container.new_background_session();
    session
        .insert(&Record::new(todo("discarded", Priority::Low, 1)))
        .unwrap();
    drop(session);

    let repo = container.repository::<Todo>().unwrap();
    assert_eq!(repo.fetch_count(None).unwrap(), 0);
}

#[test]
fn background_sessions_share_the_handle() {
    let container = in_memory_container();
    let first = container.new_background_session();
    let second = container.new_background_session();

    assert!(first.handle().ptr_eq(container.handle()));
    assert!(second.handle().ptr_eq(container.handle()));
    assert_ne!(first.id(), second.id());
    assert_ne!(first.id(), container.main_session().id());
    assert!(!first.ptr_eq(&second));
}
