//! Sequence-number bookkeeping for the selected mailbox.
//!
//! The server addresses messages two ways at once: by UID, stable for
//! the lifetime of the mailbox's validity epoch, and by sequence number,
//! which shifts every time a lower-numbered message is expunged.
//! [`MailboxSync`] maintains the mapping between the two from the
//! untagged traffic of the selected mailbox, and flags the conditions
//! under which the mapping can no longer be trusted and a full
//! resynchronization is required.
//!
//! The index never owns message data; slots hold UIDs into the caller's
//! [`crate::store::RecordStore`].

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::command::QresyncParams;
use crate::parser::FetchData;
use crate::seqset::SequenceSet;
use crate::types::{Flag, Flags, Mailbox, ModSeq, ResponseCode, SeqNum, Uid, UidValidity};

/// Synchronization state of one selected mailbox.
#[derive(Debug)]
pub struct MailboxSync {
    mailbox: Mailbox,
    uid_validity: Option<UidValidity>,
    uid_next: Option<Uid>,
    highest_modseq: Option<ModSeq>,
    /// Server said `[NOMODSEQ]`: do not track change counters this epoch.
    no_modseq: bool,
    exists: u32,
    recent: u32,
    unseen: Option<SeqNum>,
    applicable_flags: Flags,
    permanent_flags: Option<Vec<Flag>>,
    /// Slot `n` holds the UID of sequence number `n + 1`, once fetched.
    index: Vec<Option<Uid>>,
    /// Reverse lookup; values are 1-based sequence numbers.
    msn_of: HashMap<Uid, u32>,
    needs_resync: bool,
}

impl MailboxSync {
    /// Fresh state for a mailbox about to be selected. The index starts
    /// empty and grows as EXISTS counts and fetch positions arrive.
    #[must_use]
    pub fn new(mailbox: Mailbox) -> Self {
        Self {
            mailbox,
            uid_validity: None,
            uid_next: None,
            highest_modseq: None,
            no_modseq: false,
            exists: 0,
            recent: 0,
            unseen: None,
            applicable_flags: Flags::new(),
            permanent_flags: None,
            index: Vec::new(),
            msn_of: HashMap::new(),
            needs_resync: false,
        }
    }

    /// The mailbox this state tracks.
    #[must_use]
    pub const fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Message count last reported by the server.
    #[must_use]
    pub const fn exists(&self) -> u32 {
        self.exists
    }

    /// Recent count last reported by the server.
    #[must_use]
    pub const fn recent(&self) -> u32 {
        self.recent
    }

    /// First unseen message, from the SELECT response code.
    #[must_use]
    pub const fn unseen(&self) -> Option<SeqNum> {
        self.unseen
    }

    /// Validity epoch of the UIDs held here.
    #[must_use]
    pub const fn uid_validity(&self) -> Option<UidValidity> {
        self.uid_validity
    }

    /// Next UID the server expects to assign.
    #[must_use]
    pub const fn uid_next(&self) -> Option<Uid> {
        self.uid_next
    }

    /// Highest change counter observed this epoch.
    #[must_use]
    pub const fn highest_modseq(&self) -> Option<ModSeq> {
        self.highest_modseq
    }

    /// Whether change counters are usable for delta fetches.
    #[must_use]
    pub const fn tracks_modseq(&self) -> bool {
        !self.no_modseq && self.highest_modseq.is_some()
    }

    /// Flags applicable in this mailbox, from the untagged FLAGS row.
    #[must_use]
    pub const fn applicable_flags(&self) -> &Flags {
        &self.applicable_flags
    }

    /// Flags that can be stored permanently, when the server said so.
    #[must_use]
    pub fn permanent_flags(&self) -> Option<&[Flag]> {
        self.permanent_flags.as_deref()
    }

    /// Length of the sequence-number index.
    #[must_use]
    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// UID at a sequence position, if that position has been fetched.
    #[must_use]
    pub fn uid_at(&self, seq: SeqNum) -> Option<Uid> {
        self.index.get(seq.index()).copied().flatten()
    }

    /// Sequence position of a UID, if it is indexed.
    #[must_use]
    pub fn msn_of(&self, uid: Uid) -> Option<SeqNum> {
        self.msn_of.get(&uid).copied().and_then(SeqNum::new)
    }

    /// Whether the view has been invalidated and must be rebuilt before
    /// sequence numbers or cached UIDs can be trusted again.
    #[must_use]
    pub const fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    /// Clears the resync flag once the caller has rebuilt the view.
    pub fn mark_clean(&mut self) {
        self.needs_resync = false;
    }

    /// Records an EXISTS count.
    ///
    /// A count above the known one is new mail and grows the index. A
    /// count below it cannot be explained by the expunges already
    /// processed (those decrement as they arrive), so another client
    /// changed the mailbox behind our back: the index is purged and a
    /// full resync flagged.
    pub fn set_exists(&mut self, count: u32) {
        if count < self.exists {
            warn!(
                mailbox = %self.mailbox,
                known = self.exists,
                reported = count,
                "message count dropped outside an expunge, resync required"
            );
            self.invalidate_index();
        }
        self.exists = count;
        self.grow_to(count);
    }

    /// Records a RECENT count.
    pub fn set_recent(&mut self, count: u32) {
        self.recent = count;
    }

    /// Records the applicable-flags row of a SELECT response.
    pub fn set_flags(&mut self, flags: Flags) {
        self.applicable_flags = flags;
    }

    /// Applies a bracketed response code.
    ///
    /// Returns `true` when the validity epoch changed, in which case
    /// every UID issued under the old epoch, and everything cached under
    /// it, is invalid and must be purged by the caller.
    pub fn apply_code(&mut self, code: &ResponseCode) -> bool {
        match code {
            ResponseCode::UidValidity(validity) => {
                if let Some(current) = self.uid_validity {
                    if current != *validity {
                        warn!(
                            mailbox = %self.mailbox,
                            old = %current,
                            new = %validity,
                            "validity epoch changed, all cached UIDs are stale"
                        );
                        self.epoch_invalidate();
                        self.uid_validity = Some(*validity);
                        return true;
                    }
                } else {
                    self.uid_validity = Some(*validity);
                }
            }
            ResponseCode::UidNext(next) => self.uid_next = Some(*next),
            ResponseCode::HighestModSeq(modseq) => self.note_modseq(*modseq),
            ResponseCode::NoModSeq => {
                self.no_modseq = true;
                self.highest_modseq = None;
            }
            ResponseCode::Unseen(seq) => self.unseen = Some(*seq),
            ResponseCode::PermanentFlags(flags) => self.permanent_flags = Some(flags.clone()),
            _ => {}
        }
        false
    }

    /// Advances the highest observed change counter. Counters below the
    /// stored value are stale reports and ignored.
    pub fn note_modseq(&mut self, modseq: ModSeq) {
        if self.no_modseq {
            return;
        }
        match self.highest_modseq {
            Some(current) if modseq < current => {
                debug!(
                    mailbox = %self.mailbox,
                    current = %current,
                    stale = %modseq,
                    "ignoring stale change counter"
                );
            }
            _ => self.highest_modseq = Some(modseq),
        }
    }

    /// Binds a fetch response to its sequence position.
    ///
    /// Returns the UID the position now maps to, either freshly bound
    /// from the response or already known, so the caller can update its
    /// record store. A position rebinding to a different UID than before
    /// means our numbering has drifted from the server's; the data is
    /// taken but a full resync is flagged.
    pub fn record_fetch(&mut self, seq: SeqNum, data: &FetchData) -> Option<Uid> {
        self.grow_to(seq.get());
        if let Some(modseq) = data.modseq {
            self.note_modseq(modseq);
        }

        let slot = seq.index();
        let Some(uid) = data.uid else {
            return self.index[slot];
        };

        if let Some(existing) = self.index[slot] {
            if existing != uid {
                warn!(
                    mailbox = %self.mailbox,
                    %seq,
                    old = %existing,
                    new = %uid,
                    "sequence position rebound to a different UID, resync required"
                );
                self.msn_of.remove(&existing);
                self.needs_resync = true;
            }
        }
        if let Some(&old_msn) = self.msn_of.get(&uid) {
            if old_msn != seq.get() {
                // The UID moved without an expunge we saw.
                if let Some(slot) = self.index.get_mut(old_msn as usize - 1) {
                    *slot = None;
                }
                self.needs_resync = true;
            }
        }

        self.index[slot] = Some(uid);
        self.msn_of.insert(uid, seq.get());
        Some(uid)
    }

    /// Removes a sequence position in response to an EXPUNGE row and
    /// shifts every higher position down by one. Returns the UID that
    /// occupied the position, if it had been fetched, so the caller can
    /// drop the record and its cache entries.
    ///
    /// This must run before any pending command's response is
    /// interpreted; the server only promises not to reuse the expunged
    /// number, not that later responses still use the old numbering.
    pub fn expunge(&mut self, seq: SeqNum) -> Option<Uid> {
        let slot = seq.index();
        if slot >= self.index.len() {
            warn!(
                mailbox = %self.mailbox,
                %seq,
                len = self.index.len(),
                "expunge beyond the known index, resync required"
            );
            self.exists = self.exists.saturating_sub(1);
            self.needs_resync = true;
            return None;
        }

        let removed = self.index.remove(slot);
        if let Some(uid) = removed {
            self.msn_of.remove(&uid);
        }
        for (i, entry) in self.index.iter().enumerate().skip(slot) {
            if let (Some(uid), Ok(pos)) = (entry, u32::try_from(i)) {
                self.msn_of.insert(*uid, pos + 1);
            }
        }
        self.exists = self.exists.saturating_sub(1);
        removed
    }

    /// Removes a UID named by a VANISHED row.
    ///
    /// `(EARLIER)` rows describe expunges from before this session and
    /// arrive while the index is still empty; they touch no sequence
    /// numbers. Plain rows replace EXPUNGE under QRESYNC and shift the
    /// index exactly as an EXPUNGE would.
    pub fn vanish(&mut self, uid: Uid, earlier: bool) {
        if earlier {
            self.msn_of.remove(&uid);
            return;
        }
        match self.msn_of.get(&uid).copied().and_then(SeqNum::new) {
            Some(seq) => {
                let _ = self.expunge(seq);
            }
            None => {
                // The message was counted but never indexed, so there is
                // no way to tell which slot it occupied.
                self.exists = self.exists.saturating_sub(1);
                if !self.index.is_empty() {
                    self.needs_resync = true;
                }
            }
        }
    }

    /// UIDs currently indexed, as a compact set. Used for the QRESYNC
    /// known-UIDs hint and the cache checkpoint.
    #[must_use]
    pub fn known_uids(&self) -> SequenceSet {
        SequenceSet::from_uids(self.msn_of.keys().copied())
    }

    /// Sequence positions that have no UID yet, as a compact set.
    /// Fetching these completes the index after new mail arrives.
    #[must_use]
    pub fn unassigned(&self) -> SequenceSet {
        SequenceSet::from_ids(
            self.index
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.is_none())
                .filter_map(|(i, _)| u32::try_from(i).ok().map(|n| n + 1)),
        )
    }

    /// Resume parameters for the next QRESYNC SELECT, available once an
    /// epoch and a change counter have both been observed.
    #[must_use]
    pub fn checkpoint(&self) -> Option<QresyncParams> {
        let uid_validity = self.uid_validity?;
        let modseq = self.highest_modseq?;
        let known = self.known_uids();
        Some(QresyncParams {
            uid_validity,
            modseq,
            known_uids: (!known.is_empty()).then_some(known),
        })
    }

    fn grow_to(&mut self, count: u32) {
        let needed = count as usize;
        if needed > self.index.len() {
            self.index.resize(needed, None);
        }
        if count > self.exists {
            debug!(
                mailbox = %self.mailbox,
                known = self.exists,
                seen = count,
                "fetch position beyond the reported count"
            );
            self.exists = count;
        }
    }

    fn invalidate_index(&mut self) {
        self.index.clear();
        self.msn_of.clear();
        self.needs_resync = true;
    }

    /// Epoch change: beyond the index, the change counter and UID hint
    /// belong to the old epoch too.
    fn epoch_invalidate(&mut self) {
        self.invalidate_index();
        self.highest_modseq = None;
        self.uid_next = None;
        self.no_modseq = false;
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

    fn sync() -> MailboxSync {
        MailboxSync::new(Mailbox::inbox())
    }

    fn seq(n: u32) -> SeqNum {
        SeqNum::new(n).unwrap()
    }

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    fn fetch_uid(n: u32) -> FetchData {
        FetchData {
            uid: Some(uid(n)),
            ..FetchData::default()
        }
    }

    mod index_tests {
        use super::*;

        #[test]
        fn expunge_shifts_higher_positions_down() {
            let mut sync = sync();
            for n in 1..=5 {
                sync.record_fetch(seq(n), &fetch_uid(100 + n));
            }
            assert_eq!(sync.index_len(), 5);

            let removed = sync.expunge(seq(3));
            assert_eq!(removed, Some(uid(103)));
            assert_eq!(sync.index_len(), 4);
            assert_eq!(sync.uid_at(seq(3)), Some(uid(104)));
            assert_eq!(sync.uid_at(seq(4)), Some(uid(105)));
            assert_eq!(sync.msn_of(uid(105)), Some(seq(4)));
            assert!(sync.msn_of(uid(103)).is_none());
            assert!(!sync.needs_resync());
        }

        #[test]
        fn expunge_then_matching_exists_is_calm() {
            // Select reports ten messages; another client expunges one.
            let mut sync = sync();
            sync.set_exists(10);
            assert_eq!(sync.index_len(), 10);

            sync.expunge(seq(3));
            sync.set_exists(9);

            assert_eq!(sync.exists(), 9);
            assert_eq!(sync.index_len(), 9);
            assert!(sync.uid_at(seq(9)).is_none());
            assert!(!sync.needs_resync());
        }

        #[test]
        fn exists_drop_outside_expunge_forces_resync() {
            let mut sync = sync();
            sync.set_exists(10);
            sync.record_fetch(seq(1), &fetch_uid(500));

            sync.set_exists(7);
            assert!(sync.needs_resync());
            assert_eq!(sync.exists(), 7);
            assert_eq!(sync.index_len(), 7);
            assert!(sync.uid_at(seq(1)).is_none());

            sync.mark_clean();
            assert!(!sync.needs_resync());
        }

        #[test]
        fn exists_growth_leaves_new_positions_unassigned() {
            let mut sync = sync();
            sync.set_exists(2);
            sync.record_fetch(seq(1), &fetch_uid(11));
            sync.set_exists(4);
            assert_eq!(sync.index_len(), 4);
            assert_eq!(sync.uid_at(seq(1)), Some(uid(11)));
            assert!(sync.uid_at(seq(3)).is_none());
            assert_eq!(sync.unassigned().to_string(), "2:4");
        }

        #[test]
        fn fetch_beyond_the_count_grows_both() {
            let mut sync = sync();
            sync.set_exists(3);
            sync.record_fetch(seq(6), &fetch_uid(60));
            assert_eq!(sync.exists(), 6);
            assert_eq!(sync.index_len(), 6);
        }

        #[test]
        fn rebinding_a_position_flags_resync() {
            let mut sync = sync();
            sync.record_fetch(seq(1), &fetch_uid(10));
            sync.record_fetch(seq(1), &fetch_uid(12));
            assert!(sync.needs_resync());
            assert_eq!(sync.uid_at(seq(1)), Some(uid(12)));
            assert!(sync.msn_of(uid(10)).is_none());
        }

        #[test]
        fn refetching_the_same_binding_is_calm() {
            let mut sync = sync();
            sync.record_fetch(seq(2), &fetch_uid(20));
            sync.record_fetch(seq(2), &fetch_uid(20));
            assert!(!sync.needs_resync());
        }

        #[test]
        fn fetch_without_uid_reports_the_known_binding() {
            let mut sync = sync();
            sync.record_fetch(seq(4), &fetch_uid(40));
            let flags_only = FetchData::default();
            assert_eq!(sync.record_fetch(seq(4), &flags_only), Some(uid(40)));
        }

        #[test]
        fn expunge_beyond_the_index_flags_resync() {
            let mut sync = sync();
            sync.set_exists(2);
            sync.expunge(seq(9));
            assert!(sync.needs_resync());
            assert_eq!(sync.exists(), 1);
        }
    }

    mod vanished_tests {
        use super::*;

        #[test]
        fn earlier_rows_leave_the_index_alone() {
            let mut sync = sync();
            sync.set_exists(3);
            sync.vanish(uid(300), true);
            assert_eq!(sync.index_len(), 3);
            assert_eq!(sync.exists(), 3);
            assert!(!sync.needs_resync());
        }

        #[test]
        fn current_rows_shift_like_an_expunge() {
            let mut sync = sync();
            for n in 1..=3 {
                sync.record_fetch(seq(n), &fetch_uid(10 * n));
            }
            sync.vanish(uid(20), false);
            assert_eq!(sync.index_len(), 2);
            assert_eq!(sync.uid_at(seq(2)), Some(uid(30)));
            assert!(!sync.needs_resync());
        }

        #[test]
        fn unindexed_uid_vanishing_forces_resync() {
            let mut sync = sync();
            sync.set_exists(5);
            sync.record_fetch(seq(1), &fetch_uid(1));
            sync.vanish(uid(999), false);
            assert_eq!(sync.exists(), 4);
            assert!(sync.needs_resync());
        }
    }

    mod code_tests {
        use super::*;

        fn validity(n: u32) -> ResponseCode {
            ResponseCode::UidValidity(UidValidity::new(n).unwrap())
        }

        #[test]
        fn first_epoch_is_not_a_change() {
            let mut sync = sync();
            assert!(!sync.apply_code(&validity(111)));
            assert_eq!(sync.uid_validity().unwrap().get(), 111);
        }

        #[test]
        fn epoch_change_invalidates_everything() {
            let mut sync = sync();
            sync.apply_code(&validity(111));
            sync.apply_code(&ResponseCode::HighestModSeq(ModSeq::new(500).unwrap()));
            sync.record_fetch(seq(1), &fetch_uid(42));

            assert!(sync.apply_code(&validity(222)));
            assert!(sync.needs_resync());
            assert_eq!(sync.index_len(), 0);
            assert!(sync.msn_of(uid(42)).is_none());
            assert!(sync.highest_modseq().is_none());
            assert_eq!(sync.uid_validity().unwrap().get(), 222);
        }

        #[test]
        fn same_epoch_is_calm() {
            let mut sync = sync();
            sync.apply_code(&validity(111));
            sync.record_fetch(seq(1), &fetch_uid(42));
            assert!(!sync.apply_code(&validity(111)));
            assert!(!sync.needs_resync());
            assert_eq!(sync.index_len(), 1);
        }

        #[test]
        fn stale_change_counters_are_ignored() {
            let mut sync = sync();
            sync.note_modseq(ModSeq::new(100).unwrap());
            sync.note_modseq(ModSeq::new(90).unwrap());
            assert_eq!(sync.highest_modseq().unwrap().get(), 100);
            sync.note_modseq(ModSeq::new(100).unwrap());
            assert_eq!(sync.highest_modseq().unwrap().get(), 100);
            sync.note_modseq(ModSeq::new(110).unwrap());
            assert_eq!(sync.highest_modseq().unwrap().get(), 110);
        }

        #[test]
        fn nomodseq_stops_counter_tracking() {
            let mut sync = sync();
            sync.apply_code(&ResponseCode::NoModSeq);
            sync.note_modseq(ModSeq::new(77).unwrap());
            assert!(sync.highest_modseq().is_none());
            assert!(!sync.tracks_modseq());
        }

        #[test]
        fn fetch_modseq_advances_the_high_water_mark() {
            let mut sync = sync();
            let data = FetchData {
                uid: Some(uid(8)),
                modseq: ModSeq::new(625),
                ..FetchData::default()
            };
            sync.record_fetch(seq(4), &data);
            assert_eq!(sync.highest_modseq().unwrap().get(), 625);
        }
    }

    mod checkpoint_tests {
        use super::*;

        #[test]
        fn checkpoint_needs_epoch_and_counter() {
            let mut sync = sync();
            assert!(sync.checkpoint().is_none());
            sync.apply_code(&ResponseCode::UidValidity(UidValidity::new(9).unwrap()));
            assert!(sync.checkpoint().is_none());
            sync.note_modseq(ModSeq::new(4711).unwrap());
            let params = sync.checkpoint().unwrap();
            assert_eq!(params.uid_validity.get(), 9);
            assert_eq!(params.modseq.get(), 4711);
            assert!(params.known_uids.is_none());
        }

        #[test]
        fn checkpoint_carries_known_uids_compactly() {
            let mut sync = sync();
            sync.apply_code(&ResponseCode::UidValidity(UidValidity::new(9).unwrap()));
            sync.note_modseq(ModSeq::new(1).unwrap());
            for n in 1..=4 {
                sync.record_fetch(seq(n), &fetch_uid(200 + n));
            }
            let params = sync.checkpoint().unwrap();
            assert_eq!(params.known_uids.unwrap().to_string(), "201:204");
        }
    }
}
