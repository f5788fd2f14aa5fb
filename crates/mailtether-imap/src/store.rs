//! Message records and the store that owns them.
//!
//! The sequence-number index in [`crate::sync`] never owns message data;
//! it holds UIDs pointing into a [`RecordStore`]. Records carry only the
//! metadata the engine itself tracks. Header and body bytes go to the
//! caller through fetch results and to disk through [`crate::cache`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::parser::FetchData;
use crate::types::{Flag, Flags, ModSeq, Uid};

/// Per-message metadata, keyed by UID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Stable identifier within the current validity epoch.
    pub uid: Uid,
    /// Last flag set the server reported.
    #[serde(default)]
    pub flags: Flags,
    /// Mod-sequence of the last change folded in, when the server
    /// reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modseq: Option<ModSeq>,
    /// Message size in octets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    /// Server-assigned arrival date, verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_date: Option<String>,
}

impl MessageRecord {
    /// Builds a record from the first fetch response for a message.
    #[must_use]
    pub fn from_fetch(uid: Uid, data: &FetchData) -> Self {
        Self {
            uid,
            flags: data.flags.clone().unwrap_or_default(),
            modseq: data.modseq,
            size: data.size,
            internal_date: data.internal_date.clone(),
        }
    }

    /// Folds later fetch data into the record.
    ///
    /// Responses can arrive out of order; one carrying a mod-sequence
    /// lower than what the record already reflects is stale and ignored.
    /// Returns whether the data was applied.
    pub fn apply(&mut self, data: &FetchData) -> bool {
        if let (Some(new), Some(known)) = (data.modseq, self.modseq) {
            if new < known {
                return false;
            }
        }
        if let Some(flags) = &data.flags {
            self.flags = flags.clone();
        }
        if data.modseq.is_some() {
            self.modseq = data.modseq;
        }
        if data.size.is_some() {
            self.size = data.size;
        }
        if let Some(date) = &data.internal_date {
            self.internal_date = Some(date.clone());
        }
        true
    }

    /// Whether the message is marked for deletion.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.flags.contains(&Flag::Deleted)
    }
}

/// Ownership seam for message records.
///
/// The engine creates, updates and removes records as the server reports
/// changes, but treats the collection itself as a collaborator so callers
/// can bring their own storage.
pub trait RecordStore: Send {
    /// Looks up a record.
    fn get(&self, uid: Uid) -> Option<&MessageRecord>;

    /// Looks up a record for modification.
    fn get_mut(&mut self, uid: Uid) -> Option<&mut MessageRecord>;

    /// Adds or replaces a record.
    fn insert(&mut self, record: MessageRecord);

    /// Removes a record, returning it if present.
    fn remove(&mut self, uid: Uid) -> Option<MessageRecord>;

    /// All known UIDs, ascending.
    fn uids(&self) -> Vec<Uid>;

    /// Number of records held.
    fn len(&self) -> usize;

    /// True when no records are held.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every record. Called when the validity epoch changes.
    fn clear(&mut self);

    /// Folds fetch data into the record for `uid`, creating the record
    /// on first sight. Returns whether the data was applied.
    fn apply(&mut self, uid: Uid, data: &FetchData) -> bool {
        if let Some(record) = self.get_mut(uid) {
            return record.apply(data);
        }
        self.insert(MessageRecord::from_fetch(uid, data));
        true
    }
}

/// In-memory record store, ordered by UID.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<Uid, MessageRecord>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, uid: Uid) -> Option<&MessageRecord> {
        self.records.get(&uid)
    }

    fn get_mut(&mut self, uid: Uid) -> Option<&mut MessageRecord> {
        self.records.get_mut(&uid)
    }

    fn insert(&mut self, record: MessageRecord) {
        self.records.insert(record.uid, record);
    }

    fn remove(&mut self, uid: Uid) -> Option<MessageRecord> {
        self.records.remove(&uid)
    }

    fn uids(&self) -> Vec<Uid> {
        self.records.keys().copied().collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn clear(&mut self) {
        self.records.clear();
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

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    fn fetch(flags: &[Flag], modseq: Option<u64>) -> FetchData {
        FetchData {
            flags: Some(flags.iter().cloned().collect()),
            modseq: modseq.and_then(ModSeq::new),
            ..FetchData::default()
        }
    }

    mod record_tests {
        use super::*;

        #[test]
        fn from_fetch_defaults_missing_items() {
            let record = MessageRecord::from_fetch(uid(5), &FetchData::default());
            assert_eq!(record.uid, uid(5));
            assert!(record.flags.is_empty());
            assert!(record.modseq.is_none());
            assert!(record.size.is_none());
        }

        #[test]
        fn apply_replaces_flags_wholesale() {
            let mut record = MessageRecord::from_fetch(uid(1), &fetch(&[Flag::Seen], Some(10)));
            assert!(record.apply(&fetch(&[Flag::Answered], Some(11))));
            assert!(!record.flags.contains(&Flag::Seen));
            assert!(record.flags.contains(&Flag::Answered));
            assert_eq!(record.modseq.unwrap().get(), 11);
        }

        #[test]
        fn stale_modseq_is_ignored() {
            let mut record = MessageRecord::from_fetch(uid(1), &fetch(&[Flag::Seen], Some(20)));
            assert!(!record.apply(&fetch(&[], Some(19))));
            assert!(record.flags.contains(&Flag::Seen));
            assert_eq!(record.modseq.unwrap().get(), 20);
        }

        #[test]
        fn equal_modseq_still_applies() {
            let mut record = MessageRecord::from_fetch(uid(1), &fetch(&[], Some(20)));
            assert!(record.apply(&fetch(&[Flag::Flagged], Some(20))));
            assert!(record.flags.contains(&Flag::Flagged));
        }

        #[test]
        fn data_without_modseq_always_applies() {
            let mut record = MessageRecord::from_fetch(uid(1), &fetch(&[Flag::Seen], Some(20)));
            assert!(record.apply(&fetch(&[Flag::Deleted], None)));
            assert!(record.is_deleted());
            // The known mod-sequence survives a plain flag update.
            assert_eq!(record.modseq.unwrap().get(), 20);
        }

        #[test]
        fn serde_round_trip() {
            let record = MessageRecord {
                uid: uid(77),
                flags: [Flag::Seen, Flag::Keyword("$Work".to_string())]
                    .into_iter()
                    .collect(),
                modseq: ModSeq::new(900),
                size: Some(2048),
                internal_date: Some("17-Jul-2023 02:44:25 -0700".to_string()),
            };
            let json = serde_json::to_string(&record).unwrap();
            let back: MessageRecord = serde_json::from_str(&json).unwrap();
            assert_eq!(back, record);
        }
    }

    mod memory_store_tests {
        use super::*;

        #[test]
        fn apply_creates_then_updates() {
            let mut store = MemoryStore::new();
            assert!(store.apply(uid(3), &fetch(&[Flag::Seen], Some(5))));
            assert!(store.apply(uid(3), &fetch(&[Flag::Seen, Flag::Answered], Some(6))));
            assert_eq!(store.len(), 1);
            let record = store.get(uid(3)).unwrap();
            assert!(record.flags.contains(&Flag::Answered));
        }

        #[test]
        fn uids_come_back_ascending() {
            let mut store = MemoryStore::new();
            for n in [9, 2, 40, 17] {
                store.apply(uid(n), &FetchData::default());
            }
            let ids: Vec<u32> = store.uids().into_iter().map(Uid::get).collect();
            assert_eq!(ids, vec![2, 9, 17, 40]);
        }

        #[test]
        fn remove_and_clear() {
            let mut store = MemoryStore::new();
            store.apply(uid(1), &FetchData::default());
            store.apply(uid(2), &FetchData::default());
            assert!(store.remove(uid(1)).is_some());
            assert!(store.remove(uid(1)).is_none());
            store.clear();
            assert!(store.is_empty());
        }
    }
}
