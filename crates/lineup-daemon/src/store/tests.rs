//! Backend contract tests, run against both store implementations.

use lineup_core::list::{ListDoc, UserProfile};
use lineup_core::reconcile::SpotUpdates;
use lineup_core::signup::{ListMutation, SpotWrite};
use lineup_core::slot::{Entry, SlotKey, SlotValue};
use lineup_core::store::{CommitOutcome, DocVersion, ListStore};

use super::{MemoryListStore, SqliteListStore};

fn sample_doc() -> ListDoc {
    let mut doc = ListDoc {
        number_of_spots: 3,
        number_of_waitlist_spots: 1,
        ..ListDoc::default()
    };
    doc.spots.insert(
        SlotKey::Main(1),
        SlotValue::Occupied(Entry::new("alice", "Alice")),
    );
    doc.spots.insert(SlotKey::Main(2), SlotValue::Reserved);
    doc.signed_up_user_ids.insert("alice".to_string());
    doc
}

fn signup_mutation(user: &str, key: SlotKey) -> ListMutation {
    ListMutation {
        writes: vec![SpotWrite::Assign {
            key,
            value: SlotValue::Occupied(Entry::new(user, user.to_uppercase())),
        }],
        add_user: Some(user.to_string()),
        remove_user: None,
    }
}

/// Runs the shared backend contract against one store.
fn check_backend_contract(store: &dyn ListStore, seed: &dyn Fn(&str, &ListDoc)) {
    seed("list-a", &sample_doc());

    // Round trip preserves the document and assigns an initial version.
    let loaded = store.load_list("list-a").unwrap().expect("list should exist");
    assert_eq!(loaded.doc, sample_doc());
    assert_eq!(loaded.version, DocVersion(1));
    assert!(store.load_list("list-missing").unwrap().is_none());

    // A conditional commit at the current version lands and stamps times.
    let outcome = store
        .commit_mutation("list-a", loaded.version, &signup_mutation("bob", SlotKey::Main(3)))
        .unwrap();
    let CommitOutcome::Committed { at } = outcome else {
        panic!("expected commit, got {outcome:?}");
    };

    let current = store.load_list("list-a").unwrap().unwrap();
    assert_eq!(current.version, DocVersion(2));
    assert_eq!(current.doc.updated_at, Some(at));
    let entry = current
        .doc
        .slot(SlotKey::Main(3))
        .and_then(SlotValue::entry)
        .expect("bob should hold slot 3");
    assert_eq!(entry.signed_up_at, Some(at));
    assert!(current.doc.signed_up_user_ids.contains("bob"));

    // The same commit replayed at the stale version conflicts.
    let outcome = store
        .commit_mutation("list-a", loaded.version, &signup_mutation("carol", SlotKey::Main(3)))
        .unwrap();
    assert_eq!(outcome, CommitOutcome::Conflict);
    let unchanged = store.load_list("list-a").unwrap().unwrap();
    assert_eq!(unchanged.version, DocVersion(2), "conflict writes nothing");
    assert!(!unchanged.doc.signed_up_user_ids.contains("carol"));

    // Commits against unknown lists report Missing.
    let outcome = store
        .commit_mutation("list-missing", DocVersion(1), &signup_mutation("dave", SlotKey::Main(1)))
        .unwrap();
    assert_eq!(outcome, CommitOutcome::Missing);

    // Field-level updates move values without touching updated_at.
    let mut updates = SpotUpdates::new();
    updates.insert(SlotKey::Main(1), None);
    updates.insert(
        SlotKey::Main(3),
        Some(SlotValue::Occupied(Entry::new("bob", "BOB"))),
    );
    let outcome = store
        .apply_spot_updates("list-a", DocVersion(2), &updates)
        .unwrap();
    assert!(matches!(outcome, CommitOutcome::Committed { .. }));
    let fixed = store.load_list("list-a").unwrap().unwrap();
    assert!(fixed.doc.is_vacant(SlotKey::Main(1)));
    assert_eq!(fixed.doc.updated_at, Some(at), "field update keeps updated_at");
    assert_eq!(fixed.version, DocVersion(3));

    // Stale field-level updates conflict too.
    let outcome = store
        .apply_spot_updates("list-a", DocVersion(2), &updates)
        .unwrap();
    assert_eq!(outcome, CommitOutcome::Conflict);

    // Deletion removes the document.
    store.delete_list("list-a").unwrap();
    assert!(store.load_list("list-a").unwrap().is_none());
    store.delete_list("list-a").unwrap(); // idempotent
}

/// Runs the bucket pagination contract against one store.
fn check_bucket_pagination(
    store: &dyn ListStore,
    add: &dyn Fn(&str, &str),
    total: usize,
    batch: usize,
) {
    for i in 0..total {
        add("list-b", &format!("signup-{i:04}"));
    }

    // Pages come back in id order, each bounded by the batch size, and a
    // cursor never revisits earlier ids.
    let mut seen = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store
            .bucket_signup_page("list-b", cursor.as_deref(), batch)
            .unwrap();
        assert!(page.len() <= batch);
        if page.is_empty() {
            break;
        }
        store.delete_bucket_signups("list-b", &page).unwrap();
        cursor = page.last().cloned();
        let short = page.len() < batch;
        seen.extend(page);
        if short {
            break;
        }
    }

    assert_eq!(seen.len(), total);
    let mut sorted = seen.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted, seen, "pages must be ordered and disjoint");
    assert!(
        store
            .bucket_signup_page("list-b", None, batch)
            .unwrap()
            .is_empty()
    );
}

mod memory_backend {
    use super::*;

    #[test]
    fn satisfies_the_backend_contract() {
        let store = MemoryListStore::new();
        check_backend_contract(&store, &|id, doc| store.put_list(id, doc.clone()));
    }

    #[test]
    fn paginates_and_deletes_buckets() {
        for (total, batch) in [(0, 100), (7, 100), (100, 100), (250, 100)] {
            let store = MemoryListStore::new();
            check_bucket_pagination(
                &store,
                &|id, signup| store.add_bucket_signup(id, signup),
                total,
                batch,
            );
        }
    }

    #[test]
    fn loads_profiles() {
        let store = MemoryListStore::new();
        assert!(store.load_profile("nobody").unwrap().is_none());
        store.put_profile("uid-1", UserProfile {
            stage_name: Some("MC Ada".to_string()),
            name: None,
        });
        let profile = store.load_profile("uid-1").unwrap().unwrap();
        assert_eq!(profile.stage_name.as_deref(), Some("MC Ada"));
    }
}

mod sqlite_backend {
    use super::*;

    #[test]
    fn satisfies_the_backend_contract() {
        let store = SqliteListStore::open_in_memory().unwrap();
        check_backend_contract(&store, &|id, doc| store.put_list(id, doc).unwrap());
    }

    #[test]
    fn paginates_and_deletes_buckets() {
        for (total, batch) in [(0, 100), (7, 100), (100, 100), (250, 100)] {
            let store = SqliteListStore::open_in_memory().unwrap();
            check_bucket_pagination(
                &store,
                &|id, signup| store.add_bucket_signup(id, signup).unwrap(),
                total,
                batch,
            );
        }
    }

    #[test]
    fn loads_profiles() {
        let store = SqliteListStore::open_in_memory().unwrap();
        assert!(store.load_profile("nobody").unwrap().is_none());
        store
            .put_profile("uid-1", &UserProfile {
                stage_name: None,
                name: Some("Ada".to_string()),
            })
            .unwrap();
        let profile = store.load_profile("uid-1").unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lists.db");

        {
            let store = SqliteListStore::open(&path).unwrap();
            store.put_list("list-a", &sample_doc()).unwrap();
        }

        let store = SqliteListStore::open(&path).unwrap();
        let loaded = store.load_list("list-a").unwrap().unwrap();
        assert_eq!(loaded.doc, sample_doc());
        assert_eq!(loaded.version, DocVersion(1));
    }
}
