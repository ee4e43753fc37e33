//! List documents and user profiles.
//!
//! [`ListDoc`] is the in-memory form of one sign-up sheet as stored by the
//! document store. It carries no derived state; every consumer re-reads a
//! fresh snapshot and derives what it needs through the accessors here, so
//! there is no cached view to go stale.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::slot::{SlotKey, SlotValue};

/// One sign-up sheet.
///
/// The wire form keeps the original field names (`numberOfSpots`,
/// `signedUpUserIds`, ...) with spot keys as strings, so documents written
/// by other clients of the same store deserialize unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDoc {
    /// Slot assignments. Absent key means vacant.
    #[serde(default)]
    pub spots: BTreeMap<SlotKey, SlotValue>,

    /// Main roster capacity (`N`). Fixed per list.
    #[serde(default)]
    pub number_of_spots: u32,

    /// Waitlist capacity (`M`). Fixed per list.
    #[serde(default)]
    pub number_of_waitlist_spots: u32,

    /// Users currently holding any spot. Kept in lockstep with `spots` by
    /// the transaction logic; allows an O(1) "already signed up" check.
    #[serde(default)]
    pub signed_up_user_ids: BTreeSet<String>,

    /// Timestamp of the last committed transactional write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ListDoc {
    /// The value at `key`, or `None` when the slot is vacant.
    #[must_use]
    pub fn slot(&self, key: SlotKey) -> Option<&SlotValue> {
        self.spots.get(&key)
    }

    /// Returns `true` when `key` holds no value at all.
    #[must_use]
    pub fn is_vacant(&self, key: SlotKey) -> bool {
        !self.spots.contains_key(&key)
    }

    /// Main roster keys `1..=N` in ascending order.
    pub fn main_keys(&self) -> impl Iterator<Item = SlotKey> + use<> {
        (1..=self.number_of_spots).map(SlotKey::Main)
    }

    /// Waitlist keys `W1..=WM` in ascending order.
    pub fn waitlist_keys(&self) -> impl Iterator<Item = SlotKey> + use<> {
        (1..=self.number_of_waitlist_spots).map(SlotKey::Wait)
    }

    /// The slot occupied by `user_id`, if any.
    #[must_use]
    pub fn occupant_of(&self, user_id: &str) -> Option<SlotKey> {
        self.spots.iter().find_map(|(key, value)| {
            value
                .entry()
                .filter(|entry| entry.user_id == user_id)
                .map(|_| *key)
        })
    }

    /// Returns `true` when `key` addresses a slot within this list's
    /// capacity (either band).
    #[must_use]
    pub const fn in_capacity(&self, key: SlotKey) -> bool {
        match key {
            SlotKey::Main(i) => i >= 1 && i <= self.number_of_spots,
            SlotKey::Wait(i) => i >= 1 && i <= self.number_of_waitlist_spots,
        }
    }
}

/// External user record, read-only from this crate's perspective.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Preferred stage name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_name: Option<String>,

    /// Plain display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl UserProfile {
    /// Display name for a new entry: stage name, then plain name, then the
    /// raw user id.
    #[must_use]
    pub fn display_name(&self, user_id: &str) -> String {
        self.stage_name
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(user_id)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::Entry;

    fn occupied(user_id: &str) -> SlotValue {
        SlotValue::Occupied(Entry::new(user_id, user_id.to_uppercase()))
    }

    fn three_spot_list() -> ListDoc {
        let mut doc = ListDoc {
            number_of_spots: 3,
            number_of_waitlist_spots: 2,
            ..ListDoc::default()
        };
        doc.spots.insert(SlotKey::Main(1), occupied("alice"));
        doc.spots.insert(SlotKey::Main(2), SlotValue::Reserved);
        doc.signed_up_user_ids.insert("alice".to_string());
        doc
    }

    #[test]
    fn vacancy_and_lookup() {
        let doc = three_spot_list();
        assert!(doc.slot(SlotKey::Main(1)).is_some());
        assert!(!doc.is_vacant(SlotKey::Main(2)));
        assert!(doc.is_vacant(SlotKey::Main(3)));
        assert!(doc.is_vacant(SlotKey::Wait(1)));
    }

    #[test]
    fn key_enumeration_matches_capacities() {
        let doc = three_spot_list();
        let mains: Vec<_> = doc.main_keys().collect();
        assert_eq!(
            mains,
            vec![SlotKey::Main(1), SlotKey::Main(2), SlotKey::Main(3)]
        );
        let waits: Vec<_> = doc.waitlist_keys().collect();
        assert_eq!(waits, vec![SlotKey::Wait(1), SlotKey::Wait(2)]);
    }

    #[test]
    fn occupant_lookup_skips_reserved_slots() {
        let doc = three_spot_list();
        assert_eq!(doc.occupant_of("alice"), Some(SlotKey::Main(1)));
        assert_eq!(doc.occupant_of("bob"), None);
    }

    #[test]
    fn capacity_check_covers_both_bands() {
        let doc = three_spot_list();
        assert!(doc.in_capacity(SlotKey::Main(3)));
        assert!(!doc.in_capacity(SlotKey::Main(4)));
        assert!(doc.in_capacity(SlotKey::Wait(2)));
        assert!(!doc.in_capacity(SlotKey::Wait(3)));
    }

    #[test]
    fn wire_form_uses_original_field_names() {
        let doc = three_spot_list();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["numberOfSpots"], 3);
        assert_eq!(json["numberOfWaitlistSpots"], 2);
        assert_eq!(json["spots"]["2"], "RESERVED");
        assert_eq!(json["spots"]["1"]["userId"], "alice");
        assert_eq!(json["signedUpUserIds"][0], "alice");

        let back: ListDoc = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn display_name_falls_back_in_order() {
        let full = UserProfile {
            stage_name: Some("MC Ada".to_string()),
            name: Some("Ada".to_string()),
        };
        assert_eq!(full.display_name("uid-9"), "MC Ada");

        let plain = UserProfile {
            stage_name: None,
            name: Some("Ada".to_string()),
        };
        assert_eq!(plain.display_name("uid-9"), "Ada");

        assert_eq!(UserProfile::default().display_name("uid-9"), "uid-9");
    }
}
