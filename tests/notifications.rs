//! Change notification delivery tests.

use collection_bridge::{
    subscribe, subscribe_channel, subscribe_channel_default, BridgeError, ClassInfo,
    CollectionNotification, DynamicObject, Immediate, List, LiveCollection, Object, PropertyKind,
    Realm, RealmConfig, SerialQueue, SortDescriptor, TokenState, Version,
};
use crossbeam_channel::TryRecvError;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::thread;

fn test_realm() -> Realm {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    Realm::open(RealmConfig {
        name: "notifications".to_string(),
        ..Default::default()
    })
    .unwrap()
}

fn items(realm: &Realm, count: u64) -> List<DynamicObject> {
    let list = realm.create_list(ClassInfo::new("Item")).unwrap();
    list.write(|w| {
        for key in 0..count {
            w.push(DynamicObject::new(key));
        }
        Ok(())
    })
    .unwrap();
    list
}

/// What a test subscriber observed.
#[derive(Clone, Debug, PartialEq)]
enum Seen {
    Initial { version: Version, len: usize },
    Update {
        version: Version,
        deletions: Vec<usize>,
        insertions: Vec<usize>,
        modifications: Vec<usize>,
    },
    Error(String),
}

type Log = Arc<Mutex<Vec<Seen>>>;

fn record(log: &Log) -> impl Fn(CollectionNotification<DynamicObject>) + Send + Sync + 'static {
    let log = Arc::clone(log);
    move |notification| {
        let seen = match &notification {
            CollectionNotification::Initial(snapshot) => Seen::Initial {
                version: snapshot.version(),
                len: snapshot.len(),
            },
            CollectionNotification::Update { snapshot, changes } => Seen::Update {
                version: snapshot.version(),
                deletions: changes.deletions.as_slice().to_vec(),
                insertions: changes.insertions.as_slice().to_vec(),
                modifications: changes.modifications.as_slice().to_vec(),
            },
            CollectionNotification::Error(error) => Seen::Error(error.to_string()),
        };
        log.lock().push(seen);
    }
}

fn versions(log: &Log) -> Vec<u64> {
    log.lock()
        .iter()
        .filter_map(|seen| match seen {
            Seen::Initial { version, .. } | Seen::Update { version, .. } => Some(version.0),
            Seen::Error(_) => None,
        })
        .collect()
}

// --- Delivery ---

#[test]
fn test_initial_then_changes() {
    let realm = test_realm();
    let list = items(&realm, 3);
    let log = Log::default();

    let token = subscribe(&list, record(&log), Arc::new(Immediate)).unwrap();
    assert_eq!(token.state(), TokenState::Subscribed);

    list.write(|w| {
        w.push(DynamicObject::new(3));
        Ok(())
    })
    .unwrap();
    list.write(|w| {
        w.remove(0)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            Seen::Initial {
                version: Version(1),
                len: 3
            },
            Seen::Update {
                version: Version(2),
                deletions: vec![],
                insertions: vec![3],
                modifications: vec![],
            },
            Seen::Update {
                version: Version(3),
                deletions: vec![0],
                insertions: vec![],
                modifications: vec![],
            },
        ]
    );
}

#[test]
fn test_write_coalesces_into_one_notification() {
    let realm = test_realm();
    let list = items(&realm, 4);
    let log = Log::default();
    let _token = subscribe(&list, record(&log), Arc::new(Immediate)).unwrap();

    list.write(|w| {
        w.set(1, DynamicObject::new(1).with("touched", true))?;
        w.remove(3)?;
        w.insert(0, DynamicObject::new(10))?;
        w.push(DynamicObject::new(11));
        Ok(())
    })
    .unwrap();

    let log = log.lock();
    assert_eq!(log.len(), 2);
    assert_eq!(
        log[1],
        Seen::Update {
            version: Version(2),
            deletions: vec![3],
            insertions: vec![0, 4],
            modifications: vec![1],
        }
    );
}

#[test]
fn test_noop_write_does_not_notify() {
    let realm = test_realm();
    let list = items(&realm, 2);
    let log = Log::default();
    let _token = subscribe(&list, record(&log), Arc::new(Immediate)).unwrap();

    list.write(|_| Ok(())).unwrap();
    let _ = list.write(|w| {
        w.push(DynamicObject::new(5));
        Err::<(), _>(BridgeError::Engine("aborted".into()))
    });

    assert_eq!(log.lock().len(), 1);
}

#[test]
fn test_subscribers_are_independent() {
    let realm = test_realm();
    let list = items(&realm, 1);
    let first = Log::default();
    let second = Log::default();

    let first_token = subscribe(&list, record(&first), Arc::new(Immediate)).unwrap();
    list.write(|w| {
        w.push(DynamicObject::new(1));
        Ok(())
    })
    .unwrap();

    let _second_token = subscribe(&list, record(&second), Arc::new(Immediate)).unwrap();
    drop(first_token);
    list.write(|w| {
        w.push(DynamicObject::new(2));
        Ok(())
    })
    .unwrap();

    assert_eq!(versions(&first), vec![1, 2]);
    assert_eq!(versions(&second), vec![2, 3]);
}

// --- Token Lifecycle ---

#[test]
fn test_suppress_skips_exactly_one_delivery() {
    let realm = test_realm();
    let list = items(&realm, 0);
    let log = Log::default();
    let token = subscribe(&list, record(&log), Arc::new(Immediate)).unwrap();

    token.suppress_next_notification();
    assert_eq!(token.state(), TokenState::Suppressed);

    for key in 0..3 {
        list.write(|w| {
            w.push(DynamicObject::new(key));
            Ok(())
        })
        .unwrap();
    }

    // version 1 was suppressed
    assert_eq!(versions(&log), vec![0, 2, 3]);
    assert_eq!(token.state(), TokenState::Subscribed);
}

#[test]
fn test_cancel_stops_delivery() {
    let realm = test_realm();
    let list = items(&realm, 0);
    let log = Log::default();
    let token = subscribe(&list, record(&log), Arc::new(Immediate)).unwrap();

    token.cancel();
    token.cancel();
    assert_eq!(token.state(), TokenState::Cancelled);
    assert!(!list.registrar().has_subscribers());

    list.write(|w| {
        w.push(DynamicObject::new(1));
        Ok(())
    })
    .unwrap();

    assert_eq!(versions(&log), vec![0]);

    token.suppress_next_notification();
    assert_eq!(token.state(), TokenState::Cancelled);
}

#[test]
fn test_token_is_scoped_to_realm() {
    let realm = test_realm();
    let list = items(&realm, 0);
    let token = subscribe(&list, |_| {}, Arc::new(Immediate)).unwrap();
    assert_eq!(token.realm(), &realm);
}

// --- Ordering and Threads ---

#[test]
fn test_serial_queue_receives_versions_in_order() {
    let realm = test_realm();
    let list = items(&realm, 0);
    let queue = Arc::new(SerialQueue::new("notifications-test").unwrap());
    let log = Log::default();

    let _token = subscribe(&list, record(&log), queue.clone()).unwrap();

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let list = list.clone();
            thread::spawn(move || {
                for i in 0..25 {
                    list.write(|w| {
                        w.push(DynamicObject::new(t * 100 + i));
                        Ok(())
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    queue.flush();

    assert_eq!(list.version().unwrap(), Version(100));
    assert_eq!(versions(&log), (0..=100).collect::<Vec<_>>());
}

#[test]
fn test_callback_may_write_to_observed_collection() {
    let realm = test_realm();
    let list = items(&realm, 0);
    let log = Log::default();

    let writer = list.clone();
    let sink = record(&log);
    let token = subscribe(
        &list,
        move |notification| {
            let len = notification.snapshot().map(|s| s.len());
            sink(notification);
            if let Some(len) = len {
                if (1..3).contains(&len) {
                    writer
                        .write(|w| {
                            w.push(DynamicObject::new(len as u64));
                            Ok(())
                        })
                        .unwrap();
                }
            }
        },
        Arc::new(Immediate),
    )
    .unwrap();

    list.write(|w| {
        w.push(DynamicObject::new(0));
        Ok(())
    })
    .unwrap();

    assert_eq!(list.count().unwrap(), 3);
    assert_eq!(versions(&log), vec![0, 1, 2, 3]);

    // the callback holds a handle to the list
    drop(token);
}

// --- Channel Subscriptions ---

#[test]
fn test_channel_subscription() {
    let realm = test_realm();
    let list = items(&realm, 2);
    let handle = subscribe_channel(&list, 8).unwrap();

    let initial = handle.recv().unwrap();
    assert_eq!(initial.snapshot().unwrap().len(), 2);
    assert!(initial.changes().is_none());

    list.write(|w| {
        w.set(0, DynamicObject::new(0).with("name", "first"))?;
        Ok(())
    })
    .unwrap();

    let update = handle.try_recv().unwrap();
    assert_eq!(update.changes().unwrap().modifications.as_slice(), &[0]);
    assert_eq!(
        update.snapshot().unwrap().get(0).unwrap().value_for_key("name"),
        Some(json!("first"))
    );
    assert!(matches!(handle.try_recv(), Err(TryRecvError::Empty)));
}

#[test]
fn test_channel_overflow_disconnects() {
    let realm = test_realm();
    let list = items(&realm, 0);
    let handle = subscribe_channel(&list, 2).unwrap();

    for key in 0..3 {
        list.write(|w| {
            w.push(DynamicObject::new(key));
            Ok(())
        })
        .unwrap();
    }

    assert!(handle.try_recv().unwrap().changes().is_none());
    assert_eq!(handle.try_recv().unwrap().version(), Some(Version(1)));
    assert!(matches!(handle.try_recv(), Err(TryRecvError::Disconnected)));
}

#[test]
fn test_default_channel_uses_configured_capacity() {
    let realm = Realm::open(RealmConfig {
        notification_buffer_size: 1,
        ..Default::default()
    })
    .unwrap();
    let list = items(&realm, 0);
    let handle = subscribe_channel_default(&list).unwrap();

    // the initial delivery fills the buffer
    list.write(|w| {
        w.push(DynamicObject::new(1));
        Ok(())
    })
    .unwrap();

    assert!(handle.recv().unwrap().changes().is_none());
    assert!(matches!(handle.try_recv(), Err(TryRecvError::Disconnected)));
}

#[test]
fn test_channel_zero_buffer_rejected() {
    let realm = test_realm();
    let list = items(&realm, 0);
    assert!(matches!(
        subscribe_channel(&list, 0).err(),
        Some(BridgeError::PreconditionViolation(_))
    ));
}

// --- Engine Errors ---

#[test]
fn test_invalidate_delivers_error_and_cancels() {
    let realm = test_realm();
    let list = items(&realm, 2);
    let first = Log::default();
    let second = Log::default();
    let first_token = subscribe(&list, record(&first), Arc::new(Immediate)).unwrap();
    let second_token = subscribe(&list, record(&second), Arc::new(Immediate)).unwrap();

    // errors are never suppressed
    second_token.suppress_next_notification();
    realm.invalidate("file deleted");

    for log in [&first, &second] {
        let log = log.lock();
        assert_eq!(log.len(), 2);
        assert!(matches!(&log[1], Seen::Error(message) if message.contains("file deleted")));
    }
    assert_eq!(first_token.state(), TokenState::Cancelled);
    assert_eq!(second_token.state(), TokenState::Cancelled);

    let result = list.write(|w| {
        w.push(DynamicObject::new(9));
        Ok(())
    });
    assert!(matches!(result, Err(BridgeError::Invalidated(_))));
    assert!(matches!(
        subscribe(&list, |_| {}, Arc::new(Immediate)).err(),
        Some(BridgeError::Invalidated(_))
    ));

    // a second invalidation is a no-op
    realm.invalidate("again");
    assert_eq!(first.lock().len(), 2);
}

// --- Results ---

fn people(realm: &Realm) -> List<DynamicObject> {
    let info = ClassInfo::new("Person")
        .with_property("name", PropertyKind::String)
        .with_property("age", PropertyKind::Int);
    let list = realm.create_list(info).unwrap();
    list.write(|w| {
        w.push(DynamicObject::from_json(1, json!({"name": "Cy", "age": 40})));
        w.push(DynamicObject::from_json(2, json!({"name": "Al", "age": 17})));
        w.push(DynamicObject::from_json(3, json!({"name": "Bo", "age": 25})));
        Ok(())
    })
    .unwrap();
    list
}

fn person(key: u64, name: &str, age: i64) -> DynamicObject {
    DynamicObject::from_json(key, json!({"name": name, "age": age}))
}

fn is_adult(person: &DynamicObject) -> bool {
    person
        .value_for_key("age")
        .and_then(|age| age.as_i64())
        .map_or(false, |age| age >= 18)
}

#[test]
fn test_results_notify_only_relevant_changes() {
    let realm = test_realm();
    let list = people(&realm);
    let adults = list.filter(is_adult).unwrap();
    let log = Log::default();
    let _token = subscribe(&adults, record(&log), Arc::new(Immediate)).unwrap();

    // a minor joins: the view is unchanged
    list.write(|w| {
        w.push(person(4, "Ed", 10));
        Ok(())
    })
    .unwrap();
    assert_eq!(log.lock().len(), 1);

    // Al comes of age
    list.write(|w| {
        w.set(1, person(2, "Al", 30))?;
        Ok(())
    })
    .unwrap();

    // Cy has a birthday
    list.write(|w| {
        w.set(0, person(1, "Cy", 41))?;
        Ok(())
    })
    .unwrap();

    // Bo drops out of the view
    list.write(|w| {
        w.remove(2)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(
        *log.lock(),
        vec![
            Seen::Initial {
                version: Version(1),
                len: 2
            },
            Seen::Update {
                version: Version(3),
                deletions: vec![],
                insertions: vec![1],
                modifications: vec![],
            },
            Seen::Update {
                version: Version(4),
                deletions: vec![],
                insertions: vec![],
                modifications: vec![0],
            },
            Seen::Update {
                version: Version(5),
                deletions: vec![2],
                insertions: vec![],
                modifications: vec![],
            },
        ]
    );
    assert_eq!(adults.count().unwrap(), 2);
}

#[test]
fn test_sorted_results_report_reorder_as_move() {
    let realm = test_realm();
    let list = people(&realm);
    let by_age = list.sorted(&[SortDescriptor::ascending("age")]).unwrap();
    let log = Log::default();
    let _token = subscribe(&by_age, record(&log), Arc::new(Immediate)).unwrap();

    // Al: 17 -> 50, moves from first to last
    list.write(|w| {
        w.set(1, person(2, "Al", 50))?;
        Ok(())
    })
    .unwrap();

    assert_eq!(
        log.lock()[1],
        Seen::Update {
            version: Version(2),
            deletions: vec![0],
            insertions: vec![2],
            modifications: vec![],
        }
    );

    let names: Vec<String> = by_age
        .snapshot()
        .unwrap()
        .iter()
        .map(|p| p.value_for_key("name").unwrap().as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["Bo", "Cy", "Al"]);
}

#[test]
fn test_results_with_repeated_objects_stay_quiet() {
    let realm = test_realm();
    let list: List<DynamicObject> = realm.create_list(ClassInfo::new("Item")).unwrap();
    list.write(|w| {
        w.push(DynamicObject::new(1));
        w.push(DynamicObject::new(1));
        w.push(DynamicObject::new(2));
        Ok(())
    })
    .unwrap();
    let visible = list.filter(|o| o.key.0 != 3).unwrap();
    let log = Log::default();
    let _token = subscribe(&visible, record(&log), Arc::new(Immediate)).unwrap();

    // filtered out, so the results are untouched
    list.write(|w| {
        w.push(DynamicObject::new(3));
        Ok(())
    })
    .unwrap();
    assert_eq!(log.lock().len(), 1);

    list.write(|w| {
        w.remove(1)?;
        Ok(())
    })
    .unwrap();
    let log = log.lock();
    assert_eq!(log.len(), 2);
    assert!(matches!(
        &log[1],
        Seen::Update { deletions, insertions, .. } if deletions == &vec![1] && insertions.is_empty()
    ));
}

#[test]
fn test_results_forward_invalidation() {
    let realm = test_realm();
    let list = people(&realm);
    let adults = list.filter(is_adult).unwrap();
    let log = Log::default();
    let token = subscribe(&adults, record(&log), Arc::new(Immediate)).unwrap();

    realm.invalidate("closed");

    assert!(matches!(log.lock().last(), Some(Seen::Error(_))));
    assert_eq!(token.state(), TokenState::Cancelled);
    assert!(matches!(adults.count(), Err(BridgeError::Invalidated(_))));
}
