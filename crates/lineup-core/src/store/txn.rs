//! Optimistic read-plan-commit loop.
//!
//! The store only offers conditional commits, so the transactional shape
//! of a spot request lives here: read fresh snapshots, run the pure
//! planner, commit pinned to the version that was read. A conflict means
//! another transaction landed in between; the loop starts over from a
//! fresh read, and the planner re-checks its preconditions against the new
//! state. Application-level rejections are final and never retried.

use tracing::debug;

use super::{CommitOutcome, ListStore};
use crate::list::{ListDoc, UserProfile};
use crate::signup::{ListMutation, SignupError};

/// Default bound on commit attempts before giving up as internal.
pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 5;

/// Runs one spot transaction against `list_id`.
///
/// `plan` receives the freshly read list snapshot and the performer's
/// profile (if one exists) on every attempt; it must be pure so that a
/// retry re-evaluates every precondition against current state.
///
/// # Errors
///
/// Propagates the planner's rejection unchanged. Store failures and
/// exhausted retries surface as [`SignupError::Internal`].
pub fn run_list_txn<F>(
    store: &dyn ListStore,
    list_id: &str,
    performer_id: &str,
    max_attempts: u32,
    plan: F,
) -> Result<chrono::DateTime<chrono::Utc>, SignupError>
where
    F: Fn(&ListDoc, Option<&UserProfile>) -> Result<ListMutation, SignupError>,
{
    let internal = |e: super::StoreError| SignupError::Internal {
        message: e.to_string(),
    };

    for attempt in 1..=max_attempts.max(1) {
        let Some(snapshot) = store.load_list(list_id).map_err(internal)? else {
            return Err(SignupError::ListNotFound {
                list_id: list_id.to_string(),
            });
        };
        let profile = store.load_profile(performer_id).map_err(internal)?;

        let mutation = plan(&snapshot.doc, profile.as_ref())?;

        match store
            .commit_mutation(list_id, snapshot.version, &mutation)
            .map_err(internal)?
        {
            CommitOutcome::Committed { at } => return Ok(at),
            CommitOutcome::Conflict => {
                debug!(list_id, attempt, "commit conflict; rereading");
            },
            CommitOutcome::Missing => {
                return Err(SignupError::ListNotFound {
                    list_id: list_id.to_string(),
                });
            },
        }
    }

    Err(SignupError::Internal {
        message: format!("commit conflict persisted after {max_attempts} attempts"),
    })
}
