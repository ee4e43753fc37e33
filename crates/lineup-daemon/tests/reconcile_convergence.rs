//! Watcher-driven reconciliation over the durable backend.
//!
//! The same shift-and-promote behavior the unit tests pin down, observed
//! end to end: store commit, change event, corrective write, quiescence.

use std::sync::Arc;
use std::time::Duration;

use lineup_core::list::ListDoc;
use lineup_core::signup::{SignupError, SpotAction, SpotSignupRequest, execute};
use lineup_core::slot::{Entry, SlotKey, SlotValue};
use lineup_core::store::ListStore;
use lineup_daemon::store::SqliteListStore;
use lineup_daemon::watcher;

fn occupied(user: &str) -> SlotValue {
    SlotValue::Occupied(Entry::new(user, user.to_uppercase()))
}

fn seeded() -> Arc<SqliteListStore> {
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let store = Arc::new(
        SqliteListStore::open_in_memory()
            .expect("in-memory store")
            .with_events(events_tx),
    );

    let mut doc = ListDoc {
        number_of_spots: 3,
        number_of_waitlist_spots: 2,
        ..ListDoc::default()
    };
    for (key, user) in [
        (SlotKey::Main(1), "alice"),
        (SlotKey::Main(2), "bob"),
        (SlotKey::Main(3), "carol"),
        (SlotKey::Wait(1), "dave"),
    ] {
        doc.spots.insert(key, occupied(user));
        doc.signed_up_user_ids.insert(user.to_string());
    }
    store.put_list("open-mic", &doc).unwrap();

    let _ = watcher::spawn(Arc::clone(&store) as Arc<dyn ListStore>, 100, events_rx);
    store
}

fn release(store: &SqliteListStore, user: &str, key: SlotKey) {
    let request = SpotSignupRequest {
        list_id: "open-mic".to_string(),
        spot_key: key,
        action: SpotAction::Remove,
        performer_id: user.to_string(),
    };
    execute(store, &request, 5).expect("release should succeed");
}

async fn wait_until(store: &SqliteListStore, predicate: impl Fn(&ListDoc) -> bool) -> ListDoc {
    for _ in 0..100 {
        let doc = store.load_list("open-mic").unwrap().unwrap().doc;
        if predicate(&doc) {
            return doc;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("list did not reach the expected state in time");
}

#[tokio::test]
async fn head_release_promotes_the_waitlist() {
    let store = seeded();

    release(&store, "alice", SlotKey::Main(1));

    let doc = wait_until(&store, |doc| {
        doc.slot(SlotKey::Main(1)) == Some(&occupied("bob"))
            && doc.slot(SlotKey::Main(2)) == Some(&occupied("carol"))
            && doc.slot(SlotKey::Main(3)) == Some(&occupied("dave"))
            && doc.is_vacant(SlotKey::Wait(1))
    })
    .await;

    // No stragglers: every main slot is filled, the waitlist is empty.
    assert!(doc.is_vacant(SlotKey::Wait(2)));
}

#[tokio::test]
async fn top_slot_release_promotes_straight_into_it() {
    let store = seeded();

    release(&store, "carol", SlotKey::Main(3));

    wait_until(&store, |doc| {
        doc.slot(SlotKey::Main(1)) == Some(&occupied("alice"))
            && doc.slot(SlotKey::Main(2)) == Some(&occupied("bob"))
            && doc.slot(SlotKey::Main(3)) == Some(&occupied("dave"))
            && doc.is_vacant(SlotKey::Wait(1))
    })
    .await;
}

#[tokio::test]
async fn vacated_slot_can_be_retaken_after_convergence() {
    let store = seeded();

    release(&store, "alice", SlotKey::Main(1));
    wait_until(&store, |doc| doc.is_vacant(SlotKey::Wait(1))).await;

    // After dave's promotion the waitlist head is free again.
    let request = SpotSignupRequest {
        list_id: "open-mic".to_string(),
        spot_key: SlotKey::Wait(1),
        action: SpotAction::Signup,
        performer_id: "erin".to_string(),
    };
    execute(store.as_ref(), &request, 5).expect("waitlist signup should succeed");

    let doc = store.load_list("open-mic").unwrap().unwrap().doc;
    assert_eq!(
        doc.slot(SlotKey::Wait(1)).and_then(SlotValue::entry).map(|e| e.user_id.as_str()),
        Some("erin")
    );
}

#[tokio::test]
async fn alice_cannot_release_twice() {
    let store = seeded();

    release(&store, "alice", SlotKey::Main(1));
    wait_until(&store, |doc| doc.is_vacant(SlotKey::Wait(1))).await;

    let request = SpotSignupRequest {
        list_id: "open-mic".to_string(),
        spot_key: SlotKey::Main(1),
        action: SpotAction::Remove,
        performer_id: "alice".to_string(),
    };
    let err = execute(store.as_ref(), &request, 5).unwrap_err();
    assert!(matches!(err, SignupError::NotOccupant { .. }), "{err:?}");
}
