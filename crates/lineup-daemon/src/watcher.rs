//! Change-event watcher.
//!
//! Consumes the store's [`ListChange`] stream and routes each event:
//! updates go through the shift-and-promote planner and, when it produces
//! work, a version-pinned corrective write; deletions trigger the bucket
//! teardown sweep. Nobody awaits these effects, so every failure ends
//! here in the log and the next qualifying event is the retry mechanism.

use std::sync::Arc;

use lineup_core::reconcile::plan_shift;
use lineup_core::store::{CommitOutcome, ListChange, ListStore};
use lineup_core::teardown::sweep_bucket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Spawns the watcher task. It runs until the event channel closes, which
/// happens when the last store handle is dropped.
pub fn spawn(
    store: Arc<dyn ListStore>,
    teardown_batch_size: usize,
    mut events: mpsc::UnboundedReceiver<ListChange>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(change) = events.recv().await {
            handle_change(store.as_ref(), teardown_batch_size, &change);
        }
        debug!("change stream closed; watcher exiting");
    })
}

/// Routes one change event. Creations need no correction; the other two
/// kinds each have a handler.
pub fn handle_change(store: &dyn ListStore, teardown_batch_size: usize, change: &ListChange) {
    if change.is_update() {
        on_list_update(store, change);
    } else if change.is_deletion() {
        on_list_delete(store, &change.list_id, teardown_batch_size);
    }
}

/// Closes the gap left by a vacated main slot, if the update left one.
///
/// The corrective write is pinned to the version of the snapshot that
/// triggered it. A conflict means a newer write (most likely a fresh
/// signup) landed first; that write's own event re-runs the planner over
/// current state, so the pass is simply abandoned rather than retried.
fn on_list_update(store: &dyn ListStore, change: &ListChange) {
    let (Some(before), Some(after)) = (&change.before, &change.after) else {
        return;
    };

    let updates = plan_shift(before, after);
    if updates.is_empty() {
        return;
    }

    match store.apply_spot_updates(&change.list_id, change.version, &updates) {
        Ok(CommitOutcome::Committed { .. }) => {
            info!(
                list_id = %change.list_id,
                keys = updates.len(),
                "slot table reconciled"
            );
        },
        Ok(CommitOutcome::Conflict) => {
            warn!(
                list_id = %change.list_id,
                version = %change.version,
                "list changed since the triggering update; abandoning this pass"
            );
        },
        Ok(CommitOutcome::Missing) => {
            warn!(
                list_id = %change.list_id,
                "list deleted before reconciliation could commit"
            );
        },
        Err(err) => {
            error!(list_id = %change.list_id, %err, "failed to commit reconciliation");
        },
    }
}

/// Purges the deleted list's bucket signups.
fn on_list_delete(store: &dyn ListStore, list_id: &str, batch_size: usize) {
    match sweep_bucket(store, list_id, batch_size) {
        Ok(deleted) => info!(list_id, deleted, "bucket signups cleared"),
        Err(err) => error!(list_id, %err, "bucket teardown failed"),
    }
}
