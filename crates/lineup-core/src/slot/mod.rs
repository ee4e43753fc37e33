//! Slot identifiers and slot values.
//!
//! A list exposes two bands of slots: the main roster (`"1"`..`"N"` on the
//! wire) and the waitlist (`"W1"`..`"WM"`). A slot is vacant when its key is
//! absent from the document's spot map; a present slot holds either the
//! reserved marker or an occupant entry. The discrimination happens here, at
//! the wire boundary, so the rest of the crate never touches untyped slot
//! data.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Wire marker for a permanently held-back slot (e.g. a host slot).
pub const RESERVED_MARKER: &str = "RESERVED";

/// Identifies one slot on a list.
///
/// Ordering puts the whole main band before the waitlist band, numeric
/// within a band, which matches the order slots are scanned during
/// reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotKey {
    /// Main roster slot, 1-based.
    Main(u32),
    /// Waitlist slot, 1-based.
    Wait(u32),
}

impl SlotKey {
    /// The 1-based index within the key's band.
    #[must_use]
    pub const fn index(self) -> u32 {
        match self {
            Self::Main(i) | Self::Wait(i) => i,
        }
    }

    /// Returns `true` for main-roster keys.
    #[must_use]
    pub const fn is_main(self) -> bool {
        matches!(self, Self::Main(_))
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main(i) => write!(f, "{i}"),
            Self::Wait(i) => write!(f, "W{i}"),
        }
    }
}

/// Error produced when a wire string is not a valid slot key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid slot key: {key:?}")]
pub struct SlotKeyError {
    /// The rejected input.
    pub key: String,
}

impl FromStr for SlotKey {
    type Err = SlotKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let reject = || SlotKeyError { key: s.to_string() };
        let (digits, wait) = match s.strip_prefix('W') {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        // Canonical form only: ascii digits, no leading zero, index >= 1.
        if digits.is_empty()
            || !digits.bytes().all(|b| b.is_ascii_digit())
            || digits.starts_with('0')
        {
            return Err(reject());
        }
        let index: u32 = digits.parse().map_err(|_| reject())?;
        Ok(if wait {
            Self::Wait(index)
        } else {
            Self::Main(index)
        })
    }
}

impl Serialize for SlotKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// A user's occupancy of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Identifier of the occupying user.
    pub user_id: String,

    /// Display name shown on the list.
    pub name: String,

    /// Set once the performer's turn is over. Opaque to the consistency
    /// logic; carried through unchanged.
    #[serde(default)]
    pub is_over: bool,

    /// Commit timestamp assigned by the store. `None` on a freshly planned
    /// entry that has not been committed yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_up_at: Option<DateTime<Utc>>,
}

impl Entry {
    /// Creates an entry awaiting its commit timestamp.
    #[must_use]
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            name: name.into(),
            is_over: false,
            signed_up_at: None,
        }
    }
}

/// The value held by a present slot. Vacancy is absence from the spot map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    /// Permanently held back; never occupied and never treated as a gap.
    Reserved,
    /// Occupied by a signed-up user.
    Occupied(Entry),
}

impl SlotValue {
    /// The occupant entry, if any.
    #[must_use]
    pub const fn entry(&self) -> Option<&Entry> {
        match self {
            Self::Reserved => None,
            Self::Occupied(entry) => Some(entry),
        }
    }

    /// Returns `true` for the reserved marker.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved)
    }
}

impl Serialize for SlotValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Reserved => serializer.serialize_str(RESERVED_MARKER),
            Self::Occupied(entry) => entry.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SlotValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Marker(String),
            Entry(Entry),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Marker(s) if s == RESERVED_MARKER => Ok(Self::Reserved),
            Wire::Marker(s) => Err(D::Error::custom(format!("unknown slot marker: {s:?}"))),
            Wire::Entry(entry) => Ok(Self::Occupied(entry)),
        }
    }
}
