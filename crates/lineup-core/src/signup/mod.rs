//! Signup and release transaction logic.
//!
//! The check-then-write rules live here as pure planners: given a fresh
//! list snapshot (and the performer's profile, for signups) they either
//! reject with a [`SignupError`] or produce a [`ListMutation`] describing
//! the atomic write. Executing a plan against the store, including the
//! optimistic retry loop, is [`execute`]'s job via
//! [`crate::store::txn::run_list_txn`].

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use crate::list::{ListDoc, UserProfile};
use crate::slot::{Entry, SlotKey, SlotValue};
use crate::store::ListStore;
use crate::store::txn::run_list_txn;

/// The two recognized spot operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotAction {
    /// Take a vacant spot.
    Signup,
    /// Give up a held spot.
    Remove,
}

impl fmt::Display for SpotAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signup => write!(f, "signup"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

impl SpotAction {
    /// Parses the wire form, `"signup"` or `"remove"`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "signup" => Some(Self::Signup),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }
}

/// Caller-facing failures of the signup/release transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SignupError {
    /// No authenticated caller identity was supplied.
    #[error("the request must carry an authenticated caller identity")]
    Unauthenticated,

    /// A request field is missing or malformed.
    #[error("invalid {field}: {reason}")]
    InvalidArgument {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The referenced list does not exist.
    #[error("list not found: {list_id}")]
    ListNotFound {
        /// The missing list id.
        list_id: String,
    },

    /// The caller already holds a spot on this list.
    #[error("you are already signed up for a spot on this list")]
    AlreadySignedUp,

    /// The target slot already holds an occupant.
    #[error("spot {key} is already taken")]
    SpotTaken {
        /// The contested slot.
        key: SlotKey,
    },

    /// The caller tried to release a slot they do not occupy.
    #[error("you are not signed up for this spot or the spot is empty")]
    NotOccupant {
        /// The targeted slot.
        key: SlotKey,
    },

    /// Store failure or exhausted commit retries.
    #[error("internal error: {message}")]
    Internal {
        /// The underlying failure.
        message: String,
    },
}

/// One slot write within a planned mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotWrite {
    /// Assign `value` to `key`, replacing whatever is there.
    Assign {
        /// Target slot.
        key: SlotKey,
        /// Value to store.
        value: SlotValue,
    },
    /// Delete the value at `key`, leaving it vacant.
    Clear {
        /// Target slot.
        key: SlotKey,
    },
}

/// The atomic write produced by a planner.
///
/// The store applies all parts as one conditional commit, stamping the
/// commit timestamp into any new entry and into the document's
/// `updated_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListMutation {
    /// Slot writes, applied in order.
    pub writes: Vec<SpotWrite>,
    /// User id to add to the signed-up set.
    pub add_user: Option<String>,
    /// User id to remove from the signed-up set.
    pub remove_user: Option<String>,
}

impl ListMutation {
    /// Applies this mutation to a document, stamping `now` as the commit
    /// timestamp. Store backends share this so both have identical
    /// semantics.
    pub fn apply_to(&self, doc: &mut ListDoc, now: DateTime<Utc>) {
        for write in &self.writes {
            match write {
                SpotWrite::Assign { key, value } => {
                    let mut value = value.clone();
                    if let SlotValue::Occupied(entry) = &mut value {
                        if entry.signed_up_at.is_none() {
                            entry.signed_up_at = Some(now);
                        }
                    }
                    doc.spots.insert(*key, value);
                },
                SpotWrite::Clear { key } => {
                    doc.spots.remove(key);
                },
            }
        }
        if let Some(user_id) = &self.add_user {
            doc.signed_up_user_ids.insert(user_id.clone());
        }
        if let Some(user_id) = &self.remove_user {
            doc.signed_up_user_ids.remove(user_id);
        }
        doc.updated_at = Some(now);
    }
}

/// Plans taking `key` for `performer_id`.
///
/// Preconditions, checked against the snapshot in this order: the key must
/// address a slot within the list's capacity, the performer must not
/// already hold a spot anywhere on the list, and the target slot must not
/// hold an occupant. A reserved target is overwritten; reservations gate
/// reconciliation, not signup.
pub fn plan_signup(
    list: &ListDoc,
    profile: Option<&UserProfile>,
    performer_id: &str,
    key: SlotKey,
) -> Result<ListMutation, SignupError> {
    if !list.in_capacity(key) {
        return Err(SignupError::InvalidArgument {
            field: "spotKey",
            reason: format!("slot {key} is outside this list's capacity"),
        });
    }
    if list.signed_up_user_ids.contains(performer_id) {
        return Err(SignupError::AlreadySignedUp);
    }
    if list.slot(key).is_some_and(|value| value.entry().is_some()) {
        return Err(SignupError::SpotTaken { key });
    }

    let name = profile.map_or_else(
        || performer_id.to_string(),
        |profile| profile.display_name(performer_id),
    );

    Ok(ListMutation {
        writes: vec![SpotWrite::Assign {
            key,
            value: SlotValue::Occupied(Entry::new(performer_id, name)),
        }],
        add_user: Some(performer_id.to_string()),
        remove_user: None,
    })
}

/// Plans releasing `key` held by `performer_id`.
///
/// Rejects with [`SignupError::NotOccupant`] when the slot is vacant,
/// reserved, or occupied by someone else.
pub fn plan_release(
    list: &ListDoc,
    performer_id: &str,
    key: SlotKey,
) -> Result<ListMutation, SignupError> {
    let holds_spot = list
        .slot(key)
        .and_then(SlotValue::entry)
        .is_some_and(|entry| entry.user_id == performer_id);
    if !holds_spot {
        return Err(SignupError::NotOccupant { key });
    }

    Ok(ListMutation {
        writes: vec![SpotWrite::Clear { key }],
        add_user: None,
        remove_user: Some(performer_id.to_string()),
    })
}

/// A validated spot request, ready to run against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotSignupRequest {
    /// Target list.
    pub list_id: String,
    /// Target slot.
    pub spot_key: SlotKey,
    /// What to do with it.
    pub action: SpotAction,
    /// Authenticated caller identity.
    pub performer_id: String,
}

/// Runs a spot request as one atomic read-check-write transaction and
/// returns the success message for the caller.
pub fn execute(
    store: &dyn ListStore,
    request: &SpotSignupRequest,
    max_attempts: u32,
) -> Result<String, SignupError> {
    let SpotSignupRequest {
        list_id,
        spot_key,
        action,
        performer_id,
    } = request;

    run_list_txn(store, list_id, performer_id, max_attempts, |list, profile| {
        match action {
            SpotAction::Signup => plan_signup(list, profile, performer_id, *spot_key),
            SpotAction::Remove => plan_release(list, performer_id, *spot_key),
        }
    })?;

    info!(
        list_id = %list_id,
        spot_key = %spot_key,
        action = %action,
        performer_id = %performer_id,
        "spot request committed"
    );
    Ok(match action {
        SpotAction::Signup => "Successfully signed up!".to_string(),
        SpotAction::Remove => "Successfully removed from spot.".to_string(),
    })
}
