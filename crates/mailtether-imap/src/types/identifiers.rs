//! Message and mailbox identifiers.
//!
//! The engine tracks messages in two identifier spaces: session-local
//! sequence numbers ([`SeqNum`]), which shift when messages are expunged,
//! and server-stable unique identifiers ([`Uid`]), which stay valid for as
//! long as the mailbox keeps its [`UidValidity`] epoch.

use std::num::{NonZeroU32, NonZeroU64};

use serde::{Deserialize, Serialize};

/// Message sequence number: the 1-based position of a message within the
/// currently selected mailbox. Ephemeral; every EXPUNGE of a lower-numbered
/// message shifts it down by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(NonZeroU32);

impl SeqNum {
    /// Creates a sequence number, rejecting 0.
    #[must_use]
    pub const fn new(n: u32) -> Option<Self> {
        match NonZeroU32::new(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// The zero-based slot this sequence number occupies in a
    /// sequence-number index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

impl std::fmt::Display for SeqNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique message identifier, stable for the lifetime of a
/// [`UidValidity`] epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Uid(NonZeroU32);

impl Uid {
    /// Creates a UID, rejecting 0.
    #[must_use]
    pub const fn new(n: u32) -> Option<Self> {
        match NonZeroU32::new(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mailbox validity epoch. When the server reports a different value for a
/// mailbox, every UID previously issued for it is invalid, along with
/// everything cached under those UIDs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct UidValidity(NonZeroU32);

impl UidValidity {
    /// Creates a validity epoch value, rejecting 0.
    #[must_use]
    pub const fn new(n: u32) -> Option<Self> {
        match NonZeroU32::new(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for UidValidity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Modification sequence (CONDSTORE/QRESYNC change counter). Monotonically
/// non-decreasing per mailbox; used to fetch only what changed since a
/// prior checkpoint.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ModSeq(NonZeroU64);

impl ModSeq {
    /// Creates a mod-sequence value, rejecting 0.
    #[must_use]
    pub const fn new(n: u64) -> Option<Self> {
        match NonZeroU64::new(n) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Returns the underlying value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for ModSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_rejected_everywhere() {
        assert!(SeqNum::new(0).is_none());
        assert!(Uid::new(0).is_none());
        assert!(UidValidity::new(0).is_none());
        assert!(ModSeq::new(0).is_none());
    }

    #[test]
    fn seq_num_index_is_zero_based() {
        assert_eq!(SeqNum::new(1).unwrap().index(), 0);
        assert_eq!(SeqNum::new(17).unwrap().index(), 16);
    }

    #[test]
    fn uid_ordering_follows_value() {
        let a = Uid::new(100).unwrap();
        let b = Uid::new(200).unwrap();
        assert!(a < b);
        assert_eq!(a, Uid::new(100).unwrap());
    }

    #[test]
    fn modseq_holds_64_bit_values() {
        let m = ModSeq::new(u64::from(u32::MAX) + 10).unwrap();
        assert_eq!(m.get(), u64::from(u32::MAX) + 10);
    }

    #[test]
    fn uid_serde_round_trip() {
        let uid = Uid::new(4242).unwrap();
        let json = serde_json::to_string(&uid).unwrap();
        assert_eq!(json, "4242");
        let back: Uid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, uid);
    }

    #[test]
    fn display_renders_plain_numbers() {
        assert_eq!(SeqNum::new(3).unwrap().to_string(), "3");
        assert_eq!(Uid::new(42).unwrap().to_string(), "42");
        assert_eq!(UidValidity::new(7).unwrap().to_string(), "7");
        assert_eq!(ModSeq::new(900).unwrap().to_string(), "900");
    }
}
