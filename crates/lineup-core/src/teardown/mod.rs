//! Bucket signup teardown.
//!
//! When a list is deleted its dependent bucket signups are purged in
//! bounded batches. Best effort only: the sweep is not transactionally
//! tied to the deletion that triggered it, and a failure part way through
//! leaves the remainder for a future deletion event.

use tracing::debug;

use crate::store::{ListStore, StoreError};

/// Default number of bucket signups deleted per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Deletes every bucket signup under `list_id`.
///
/// Pages ids in ascending order, deletes each page as one atomic batch,
/// and stops after the first page shorter than `batch_size`. Returns the
/// number of records deleted.
pub fn sweep_bucket(
    store: &dyn ListStore,
    list_id: &str,
    batch_size: usize,
) -> Result<u64, StoreError> {
    let mut cursor: Option<String> = None;
    let mut total: u64 = 0;

    loop {
        let page = store.bucket_signup_page(list_id, cursor.as_deref(), batch_size)?;
        if page.is_empty() {
            break;
        }

        store.delete_bucket_signups(list_id, &page)?;
        total += page.len() as u64;
        debug!(list_id, deleted = page.len(), total, "bucket batch deleted");

        if page.len() < batch_size {
            break;
        }
        cursor = page.last().cloned();
    }

    Ok(total)
}
