//! Document store abstraction.
//!
//! The consistency logic never talks to a concrete database. It sees this
//! trait: versioned point reads, conditional commits, field-level spot
//! updates, and bucket-signup pagination. Concurrency control is
//! optimistic: every committed write bumps the document's [`DocVersion`],
//! and a commit pinned to a stale version returns
//! [`CommitOutcome::Conflict`] instead of writing.
//!
//! Change notification is explicit rather than implicit: backends emit a
//! [`ListChange`] carrying before/after snapshots for every List mutation
//! or deletion, and the daemon routes those events to the reconciler and
//! the teardown sweep.

pub mod txn;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::list::{ListDoc, UserProfile};
use crate::reconcile::SpotUpdates;
use crate::signup::ListMutation;

/// Monotonic per-document version, the optimistic-concurrency token.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct DocVersion(pub u64);

impl DocVersion {
    /// The version after one more committed write.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for DocVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A list snapshot together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedList {
    /// The document snapshot.
    pub doc: ListDoc,
    /// Version the snapshot was read at.
    pub version: DocVersion,
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The write landed; `at` is the store-assigned commit timestamp.
    Committed {
        /// Commit timestamp.
        at: DateTime<Utc>,
    },
    /// The document moved past the expected version; nothing was written.
    Conflict,
    /// The document no longer exists; nothing was written.
    Missing,
}

/// A change event for one List document.
///
/// `before`/`after` encode the kind of change: both present for an update,
/// `after` absent for a deletion, `before` absent for a creation.
#[derive(Debug, Clone)]
pub struct ListChange {
    /// The changed list.
    pub list_id: String,
    /// Snapshot before the write, if the document existed.
    pub before: Option<ListDoc>,
    /// Snapshot after the write, if the document still exists.
    pub after: Option<ListDoc>,
    /// Version of the `after` state (the last version, for deletions).
    pub version: DocVersion,
}

impl ListChange {
    /// Returns `true` when both snapshots are present.
    #[must_use]
    pub const fn is_update(&self) -> bool {
        self.before.is_some() && self.after.is_some()
    }

    /// Returns `true` when the document was deleted.
    #[must_use]
    pub const fn is_deletion(&self) -> bool {
        self.before.is_some() && self.after.is_none()
    }
}

/// Store failures. Backend specifics are flattened to a message; callers
/// only ever log these or wrap them as internal errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// Failure inside the backing database.
    #[error("backend error: {message}")]
    Backend {
        /// Backend-specific description.
        message: String,
    },

    /// Document payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure reaching the backing database.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Wraps a backend-specific failure.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// The document store as seen by the consistency logic.
///
/// One document is the unit of atomicity: `commit_mutation` and
/// `apply_spot_updates` each perform one atomic read-check-write on a
/// single List. Nothing here coordinates across documents.
pub trait ListStore: Send + Sync {
    /// Reads a list snapshot with its current version.
    fn load_list(&self, list_id: &str) -> Result<Option<VersionedList>, StoreError>;

    /// Reads a user profile. Missing profiles are not an error; the caller
    /// falls back to the raw user id for display.
    fn load_profile(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Applies a planned mutation iff the document is still at `expected`.
    /// On success the store stamps the commit timestamp into new entries
    /// and the document's `updated_at`, bumps the version, and emits a
    /// change event.
    fn commit_mutation(
        &self,
        list_id: &str,
        expected: DocVersion,
        mutation: &ListMutation,
    ) -> Result<CommitOutcome, StoreError>;

    /// Applies a reconciliation update map iff the document is still at
    /// `expected`. Field-level: touches only the listed slot keys, bumps
    /// the version, and emits a change event.
    fn apply_spot_updates(
        &self,
        list_id: &str,
        expected: DocVersion,
        updates: &SpotUpdates,
    ) -> Result<CommitOutcome, StoreError>;

    /// Deletes a list document, emitting a deletion event. Dependent
    /// bucket signups are left for the teardown sweep.
    fn delete_list(&self, list_id: &str) -> Result<(), StoreError>;

    /// Bucket signup ids for `list_id` in ascending id order, strictly
    /// after `start_after` when given, at most `limit` of them.
    fn bucket_signup_page(
        &self,
        list_id: &str,
        start_after: Option<&str>,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Deletes the given bucket signups as one atomic batch.
    fn delete_bucket_signups(&self, list_id: &str, ids: &[String]) -> Result<(), StoreError>;
}
