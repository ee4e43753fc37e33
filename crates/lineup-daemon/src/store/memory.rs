// Mutex poisoning indicates a panic in another thread, which is unrecoverable.
#![allow(clippy::missing_panics_doc)]

//! In-memory store backend.

use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Mutex;

use chrono::Utc;
use lineup_core::list::{ListDoc, UserProfile};
use lineup_core::reconcile::{self, SpotUpdates};
use lineup_core::signup::ListMutation;
use lineup_core::store::{
    CommitOutcome, DocVersion, ListChange, ListStore, StoreError, VersionedList,
};
use tokio::sync::mpsc;

/// HashMap-backed document store.
///
/// Atomicity of each read-check-write comes from holding the map mutex
/// across the version check and the apply; the conditional commit surface
/// is the same as the durable backend's.
pub struct MemoryListStore {
    inner: Mutex<Inner>,
    events: Option<mpsc::UnboundedSender<ListChange>>,
}

#[derive(Default)]
struct Inner {
    lists: HashMap<String, (DocVersion, ListDoc)>,
    profiles: HashMap<String, UserProfile>,
    buckets: HashMap<String, BTreeSet<String>>,
}

impl Default for MemoryListStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryListStore {
    /// Creates an empty store with no event subscriber.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            events: None,
        }
    }

    /// Attaches the change-event sender. Every subsequent List mutation
    /// emits a [`ListChange`] on it.
    #[must_use]
    pub fn with_events(mut self, events: mpsc::UnboundedSender<ListChange>) -> Self {
        self.events = Some(events);
        self
    }

    /// Creates or replaces a list document. List provisioning happens
    /// outside the consistency logic; this is its entry point.
    pub fn put_list(&self, list_id: &str, doc: ListDoc) {
        let change = {
            let mut inner = self.inner.lock().expect("store mutex poisoned");
            let previous = inner.lists.get(list_id).cloned();
            let version = previous.as_ref().map_or(DocVersion(1), |(v, _)| v.next());
            inner
                .lists
                .insert(list_id.to_string(), (version, doc.clone()));
            ListChange {
                list_id: list_id.to_string(),
                before: previous.map(|(_, doc)| doc),
                after: Some(doc),
                version,
            }
        };
        self.emit(change);
    }

    /// Stores a user profile.
    pub fn put_profile(&self, user_id: &str, profile: UserProfile) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner.profiles.insert(user_id.to_string(), profile);
    }

    /// Adds a bucket signup record under a list.
    pub fn add_bucket_signup(&self, list_id: &str, signup_id: &str) {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        inner
            .buckets
            .entry(list_id.to_string())
            .or_default()
            .insert(signup_id.to_string());
    }

    /// Number of bucket signups currently held for a list.
    #[must_use]
    pub fn bucket_len(&self, list_id: &str) -> usize {
        let inner = self.inner.lock().expect("store mutex poisoned");
        inner.buckets.get(list_id).map_or(0, BTreeSet::len)
    }

    fn emit(&self, change: ListChange) {
        if let Some(events) = &self.events {
            // A dropped receiver just means nobody is watching anymore.
            let _ = events.send(change);
        }
    }
}

impl ListStore for MemoryListStore {
    fn load_list(&self, list_id: &str) -> Result<Option<VersionedList>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.lists.get(list_id).map(|(version, doc)| VersionedList {
            doc: doc.clone(),
            version: *version,
        }))
    }

    fn load_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        Ok(inner.profiles.get(user_id).cloned())
    }

    fn commit_mutation(
        &self,
        list_id: &str,
        expected: DocVersion,
        mutation: &ListMutation,
    ) -> Result<CommitOutcome, StoreError> {
        let (change, now) = {
            let mut inner = self.inner.lock().expect("store mutex poisoned");
            let Some((version, doc)) = inner.lists.get_mut(list_id) else {
                return Ok(CommitOutcome::Missing);
            };
            if *version != expected {
                return Ok(CommitOutcome::Conflict);
            }

            let before = doc.clone();
            let now = Utc::now();
            mutation.apply_to(doc, now);
            *version = version.next();
            let change = ListChange {
                list_id: list_id.to_string(),
                before: Some(before),
                after: Some(doc.clone()),
                version: *version,
            };
            (change, now)
        };
        self.emit(change);
        Ok(CommitOutcome::Committed { at: now })
    }

    fn apply_spot_updates(
        &self,
        list_id: &str,
        expected: DocVersion,
        updates: &SpotUpdates,
    ) -> Result<CommitOutcome, StoreError> {
        let (change, now) = {
            let mut inner = self.inner.lock().expect("store mutex poisoned");
            let Some((version, doc)) = inner.lists.get_mut(list_id) else {
                return Ok(CommitOutcome::Missing);
            };
            if *version != expected {
                return Ok(CommitOutcome::Conflict);
            }

            let before = doc.clone();
            let now = Utc::now();
            reconcile::apply_updates(doc, updates);
            *version = version.next();
            let change = ListChange {
                list_id: list_id.to_string(),
                before: Some(before),
                after: Some(doc.clone()),
                version: *version,
            };
            (change, now)
        };
        self.emit(change);
        Ok(CommitOutcome::Committed { at: now })
    }

    fn delete_list(&self, list_id: &str) -> Result<(), StoreError> {
        let change = {
            let mut inner = self.inner.lock().expect("store mutex poisoned");
            let Some((version, doc)) = inner.lists.remove(list_id) else {
                return Ok(());
            };
            ListChange {
                list_id: list_id.to_string(),
                before: Some(doc),
                after: None,
                version,
            }
        };
        self.emit(change);
        Ok(())
    }

    fn bucket_signup_page(
        &self,
        list_id: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().expect("store mutex poisoned");
        let Some(ids) = inner.buckets.get(list_id) else {
            return Ok(Vec::new());
        };
        let page = match start_after {
            Some(after) => ids
                .range::<str, _>((Bound::Excluded(after), Bound::Unbounded))
                .take(limit)
                .cloned()
                .collect(),
            None => ids.iter().take(limit).cloned().collect(),
        };
        Ok(page)
    }

    fn delete_bucket_signups(&self, list_id: &str, ids: &[String]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store mutex poisoned");
        let drained = match inner.buckets.get_mut(list_id) {
            Some(bucket) => {
                for id in ids {
                    bucket.remove(id);
                }
                bucket.is_empty()
            },
            None => false,
        };
        if drained {
            inner.buckets.remove(list_id);
        }
        Ok(())
    }
}
