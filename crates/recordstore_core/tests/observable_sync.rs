mod common;

use common::{in_memory_container, titles, todo, MalformedTodo, Priority, Todo};
use recordstore_core::{
    FetchDescriptor, ObservableRepository, Predicate, Record, RecordRepository, SessionRepository,
    SortDescriptor, StoreError,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

fn open_todos() -> FetchDescriptor<Todo> {
    FetchDescriptor::new()
        .sorted_by(SortDescriptor::asc("created"))
        .filter_by(|todo: &Todo| !todo.is_completed)
}

#[test]
fn initial_fetch_populates_cache() {
    let container = in_memory_container();
    let repo = container.repository::<Todo>().unwrap();
    repo.create(&Record::new(todo("A", Priority::High, 0)))
        .unwrap();

    let observable = container.observable_repository(open_todos()).unwrap();
    assert_eq!(titles(observable.items()), vec!["A"]);
    assert_eq!(observable.generation(), 1);
}

#[test]
fn external_completion_empties_filtered_cache() {
    let container = in_memory_container();
    let tracked = Record::new(todo("only", Priority::High, 0));
    container.repository::<Todo>().unwrap().create(&tracked).unwrap();

    let mut observable = container.observable_repository(open_todos()).unwrap();
    assert_eq!(observable.items().len(), 1);

    let other = SessionRepository::<Todo>::try_new(container.new_background_session()).unwrap();
    let mut copy = other.fetch_by_id(tracked.id()).unwrap().unwrap();
    other
        .update(&mut copy, |value| value.is_completed = true)
        .unwrap();

    assert!(observable.process_signals());
    assert!(observable.items().is_empty());
}

#[test]
fn own_mutations_refresh_only_after_signal_delivery() {
    let container = in_memory_container();
    let mut observable = container.observable_repository(open_todos()).unwrap();

    observable
        .create(&Record::new(todo("queued", Priority::Low, 1)))
        .unwrap();
    assert!(observable.items().is_empty());

    assert!(observable.process_signals());
    assert_eq!(titles(observable.items()), vec!["queued"]);
    assert!(!observable.process_signals());
}

#[test]
fn cache_converges_after_every_kind_of_mutation() {
    let container = in_memory_container();
    let descriptor = open_todos();
    let mut observable = container.observable_repository(descriptor.clone()).unwrap();
    let manual = container.repository::<Todo>().unwrap();
    let background =
        SessionRepository::<Todo>::try_new(container.new_background_session()).unwrap();

    let converged = |observable: &ObservableRepository<Todo>| {
        let fresh = manual.fetch(&descriptor).unwrap();
        observable.items() == fresh.as_slice()
    };

    let mut first = Record::new(todo("first", Priority::High, 1));
    manual.create(&first).unwrap();
    observable.process_signals();
    assert!(converged(&observable));

    background
        .create(&Record::new(todo("second", Priority::Low, 2)))
        .unwrap();
    background
        .create(&Record::new(todo("third", Priority::Low, 3)))
        .unwrap();
    observable.process_signals();
    assert!(converged(&observable));
    assert_eq!(observable.items().len(), 3);

    manual
        .update(&mut first, |value| value.title = "first-renamed".to_string())
        .unwrap();
    observable.process_signals();
    assert!(converged(&observable));

    manual.delete(&first).unwrap();
    observable.process_signals();
    assert!(converged(&observable));

    background
        .delete_all(Some(&Predicate::new(|todo: &Todo| todo.created == 2)))
        .unwrap();
    observable.process_signals();
    assert!(converged(&observable));
    assert_eq!(titles(observable.items()), vec!["third"]);
}

#[test]
fn fetch_by_id_agrees_with_refreshed_cache_after_external_delete() {
    let container = in_memory_container();
    let repo = container.repository::<Todo>().unwrap();
    let record = Record::new(todo("doomed", Priority::Low, 1));
    repo.create(&record).unwrap();

    let mut observable = container
        .observable_repository(FetchDescriptor::<Todo>::new())
        .unwrap();
    assert_eq!(observable.items().len(), 1);

    let background = SessionRepository::<Todo>::try_new(container.new_background_session()).unwrap();
    background.delete(&record).unwrap();

    assert!(observable.process_signals());
    assert!(observable.items().is_empty());
    assert_eq!(observable.fetch_count(None).unwrap(), 0);
    assert!(observable.fetch_by_id(record.id()).unwrap().is_none());
    assert!(!observable.session().is_registered(record.id()));
}

#[test]
fn observers_receive_each_refreshed_list() {
    let container = in_memory_container();
    let mut observable = container.observable_repository(open_todos()).unwrap();
    let seen: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&seen);
    let observer = observable.observe(move |items| sink.borrow_mut().push(items.len()));

    observable
        .create(&Record::new(todo("one", Priority::Low, 1)))
        .unwrap();
    observable.process_signals();
    observable
        .create(&Record::new(todo("two", Priority::Low, 2)))
        .unwrap();
    observable.process_signals();

    assert!(observable.remove_observer(observer));
    assert!(!observable.remove_observer(observer));
    observable
        .create(&Record::new(todo("three", Priority::Low, 3)))
        .unwrap();
    observable.process_signals();

    assert_eq!(*seen.borrow(), vec![1, 2]);
}

#[test]
fn queued_signals_coalesce_into_one_refresh() {
    let container = in_memory_container();
    let mut observable = container.observable_repository(open_todos()).unwrap();
    let repo = container.repository::<Todo>().unwrap();

    for created in 0..3 {
        repo.create(&Record::new(todo("bulk", Priority::Low, created)))
            .unwrap();
    }
    let before = observable.generation();

    assert!(observable.process_signals());
    assert_eq!(observable.generation(), before + 1);
    assert_eq!(observable.items().len(), 3);
}

#[test]
fn failed_refresh_keeps_previous_cache() {
    let container = in_memory_container();
    let repo = container.repository::<Todo>().unwrap();
    repo.create(&Record::new(todo("good", Priority::High, 0)))
        .unwrap();
    let mut observable = container.observable_repository(open_todos()).unwrap();
    let generation = observable.generation();

    let malformed = SessionRepository::<MalformedTodo>::try_new(container.new_background_session())
        .unwrap();
    malformed
        .create(&Record::new(MalformedTodo { title: 42 }))
        .unwrap();

    assert!(observable.process_signals());
    assert_eq!(titles(observable.items()), vec!["good"]);
    assert_eq!(observable.generation(), generation);
}

#[test]
fn lenient_construction_starts_empty_when_initial_fetch_fails() {
    let container = in_memory_container();
    SessionRepository::<MalformedTodo>::try_new(container.main_session().clone())
        .unwrap()
        .create(&Record::new(MalformedTodo { title: 1 }))
        .unwrap();

    let observable = container.observable_repository(open_todos()).unwrap();
    assert!(observable.items().is_empty());
    assert_eq!(observable.generation(), 0);
}

#[test]
fn strict_construction_propagates_initial_fetch_failure() {
    let container = in_memory_container();
    SessionRepository::<MalformedTodo>::try_new(container.main_session().clone())
        .unwrap()
        .create(&Record::new(MalformedTodo { title: 1 }))
        .unwrap();

    let err = ObservableRepository::try_new(container.main_session().clone(), open_todos()).err();
    assert!(matches!(err, Some(StoreError::Serialization(_))));
}

#[test]
fn background_thread_saves_wake_the_observer() {
    let container = in_memory_container();
    let mut observable = container.observable_repository(open_todos()).unwrap();
    let background = container.new_background_session();

    let worker = std::thread::spawn(move || {
        let repo = SessionRepository::<Todo>::try_new(background).unwrap();
        repo.create(&Record::new(todo("from worker", Priority::Low, 5)))
            .unwrap();
    });

    assert!(observable.wait_for_signal(Duration::from_secs(5)));
    worker.join().unwrap();
    assert_eq!(titles(observable.items()), vec!["from worker"]);
}

#[test]
fn saves_on_another_store_are_not_observed() {
    let container = in_memory_container();
    let unrelated = in_memory_container();
    let mut observable = container.observable_repository(open_todos()).unwrap();

    unrelated
        .repository::<Todo>()
        .unwrap()
        .create(&Record::new(todo("elsewhere", Priority::Low, 1)))
        .unwrap();

    assert!(!observable.process_signals());
    assert!(!observable.wait_for_signal(Duration::from_millis(20)));
    assert!(observable.items().is_empty());
}

#[test]
fn dropping_the_observable_unsubscribes() {
    let container = in_memory_container();
    let observable = container.observable_repository(open_todos()).unwrap();
    assert_eq!(container.handle().subscriber_count(), 1);

    drop(observable);
    assert_eq!(container.handle().subscriber_count(), 0);
}
