//! Shift-and-promote reconciliation.
//!
//! When a main-roster slot is vacated, the slot table briefly shows a gap:
//! the releasing transaction only deletes the occupant's own slot. This
//! module computes the corrective write that closes the gap. It is a pure
//! function over a before/after snapshot pair; committing the result (and
//! deciding what to do on a version conflict) belongs to the caller.
//!
//! # Algorithm
//!
//! 1. **Detect**: scan main keys in ascending order for the first key that
//!    held a non-reserved value in the before snapshot and holds nothing in
//!    the after snapshot. No such key means nothing to do.
//! 2. **Shift**: walk upward from the vacated key, pulling each successor's
//!    value down one slot, and stop at the first vacancy, clearing the key
//!    the walk lands on. Reserved values move like any other; only
//!    detection treats them specially.
//! 3. **Promote**: if `W1` holds a value, move it into the landing key and
//!    shift the waitlist down the same way.
//!
//! Each touched key appears exactly once in the resulting update map, so
//! the whole correction commits as one field-level write. An empty map
//! means no write at all.
//!
//! Exactly one contiguous vacated slot per triggering write is the
//! supported case. When an update vacates several main slots at once the
//! first gap is handled and a warning names the rest; the corrective write
//! triggers one follow-up pass, but occupants stranded beyond a second gap
//! stay where they are until further list activity. The planner always
//! reaches quiescence: a pass over identical snapshots detects nothing.

use std::collections::BTreeMap;

use tracing::warn;

use crate::list::ListDoc;
use crate::slot::{SlotKey, SlotValue};

/// Per-key changes of one corrective write: `Some` assigns, `None` deletes.
pub type SpotUpdates = BTreeMap<SlotKey, Option<SlotValue>>;

/// Computes the corrective write for one vacated main-roster slot.
///
/// Returns an empty map when no main slot was vacated between the
/// snapshots, in which case no write should be issued.
#[must_use]
pub fn plan_shift(before: &ListDoc, after: &ListDoc) -> SpotUpdates {
    let n = after.number_of_spots;
    let m = after.number_of_waitlist_spots;

    let vacated: Vec<u32> = (1..=n)
        .filter(|&i| {
            let key = SlotKey::Main(i);
            let was_present = before.slot(key).is_some_and(|v| !v.is_reserved());
            was_present && after.is_vacant(key)
        })
        .collect();
    let Some(&removed) = vacated.first() else {
        return SpotUpdates::new();
    };
    if vacated.len() > 1 {
        // One removal per triggering write is the supported case.
        warn!(
            removed,
            additional = ?&vacated[1..],
            "multiple vacated slots in one update; handling the first"
        );
    }

    let mut updates = SpotUpdates::new();

    // Shift the main roster down. The walk always terminates by clearing
    // the key it lands on: either the first vacancy above the gap or the
    // top slot.
    let mut landing = removed;
    for i in removed..=n {
        landing = i;
        let successor = (i < n).then(|| after.slot(SlotKey::Main(i + 1))).flatten();
        match successor {
            Some(value) => {
                updates.insert(SlotKey::Main(i), Some(value.clone()));
            },
            None => {
                updates.insert(SlotKey::Main(i), None);
                break;
            },
        }
    }

    // Promote the head of the waitlist into the landing key, shifting the
    // rest of the waitlist down behind it.
    if m > 0 {
        if let Some(promoted) = after.slot(SlotKey::Wait(1)) {
            updates.insert(SlotKey::Main(landing), Some(promoted.clone()));
            for j in 1..=m {
                let successor = (j < m).then(|| after.slot(SlotKey::Wait(j + 1))).flatten();
                match successor {
                    Some(value) => {
                        updates.insert(SlotKey::Wait(j), Some(value.clone()));
                    },
                    None => {
                        updates.insert(SlotKey::Wait(j), None);
                        break;
                    },
                }
            }
        }
    }

    updates
}

/// Applies an update map to a document in place.
///
/// Shared by store backends so the committed state always matches what
/// [`plan_shift`] computed. Deliberately leaves `updated_at` untouched;
/// the corrective write is field-level, not a transactional update.
pub fn apply_updates(doc: &mut ListDoc, updates: &SpotUpdates) {
    for (key, change) in updates {
        match change {
            Some(value) => {
                doc.spots.insert(*key, value.clone());
            },
            None => {
                doc.spots.remove(key);
            },
        }
    }
}
