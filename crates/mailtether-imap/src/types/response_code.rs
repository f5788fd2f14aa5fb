//! Response codes.

use super::{Capability, Flag, ModSeq, SeqNum, Uid, UidValidity};

/// Bracketed response code carried by a status response.
///
/// Codes refine command completion or announce mailbox state, for
/// example `[UIDVALIDITY 857529045]` during SELECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: human-readable message that must be surfaced to the user.
    Alert,
    /// CAPABILITY list embedded in a status response.
    Capability(Vec<Capability>),
    /// PERMANENTFLAGS: flags that can be changed permanently.
    PermanentFlags(Vec<Flag>),
    /// READ-ONLY: mailbox selected without write access.
    ReadOnly,
    /// READ-WRITE: mailbox selected with write access.
    ReadWrite,
    /// TRYCREATE: target mailbox does not exist but may be created.
    TryCreate,
    /// UIDNEXT: next UID the server expects to assign.
    UidNext(Uid),
    /// UIDVALIDITY: epoch for the mailbox's UID namespace.
    UidValidity(UidValidity),
    /// UNSEEN: sequence number of the first unseen message.
    Unseen(SeqNum),
    /// APPENDUID: UID the server assigned to an appended message.
    AppendUid {
        /// UIDVALIDITY of the destination mailbox.
        uidvalidity: UidValidity,
        /// UID of the appended message.
        uid: Uid,
    },
    /// COPYUID: UID mapping for a COPY or MOVE.
    CopyUid {
        /// UIDVALIDITY of the destination mailbox.
        uidvalidity: UidValidity,
        /// Source UID set, as sent by the server.
        source: String,
        /// Destination UID set, parallel to `source`.
        dest: String,
    },
    /// HIGHESTMODSEQ: highest mod-sequence in the mailbox.
    HighestModSeq(ModSeq),
    /// NOMODSEQ: mailbox does not persist mod-sequences.
    NoModSeq,
    /// MODIFIED: messages that failed an UNCHANGEDSINCE store.
    Modified(String),
    /// CLOSED: previously selected mailbox is now closed.
    Closed,
    /// Code this client does not interpret.
    Unknown(String),
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
    fn capability_with_list() {
        let code = ResponseCode::Capability(vec![Capability::Imap4Rev1, Capability::Idle]);
        if let ResponseCode::Capability(c) = code {
            assert_eq!(c.len(), 2);
        } else {
            panic!("Expected Capability variant");
        }
    }

    #[test]
    fn permanent_flags() {
        let code = ResponseCode::PermanentFlags(vec![Flag::Seen, Flag::Deleted]);
        if let ResponseCode::PermanentFlags(f) = code {
            assert_eq!(f.len(), 2);
        } else {
            panic!("Expected PermanentFlags variant");
        }
    }

    #[test]
    fn uid_validity() {
        let code = ResponseCode::UidValidity(UidValidity::new(857529045).unwrap());
        if let ResponseCode::UidValidity(v) = code {
            assert_eq!(v.get(), 857529045);
        } else {
            panic!("Expected UidValidity variant");
        }
    }

    #[test]
    fn append_uid() {
        let code = ResponseCode::AppendUid {
            uidvalidity: UidValidity::new(999).unwrap(),
            uid: Uid::new(50).unwrap(),
        };
        if let ResponseCode::AppendUid { uidvalidity, uid } = code {
            assert_eq!(uidvalidity.get(), 999);
            assert_eq!(uid.get(), 50);
        } else {
            panic!("Expected AppendUid variant");
        }
    }

    #[test]
    fn copy_uid_keeps_raw_sets() {
        let code = ResponseCode::CopyUid {
            uidvalidity: UidValidity::new(888).unwrap(),
            source: "1:3,5".to_string(),
            dest: "101:103,105".to_string(),
        };
        if let ResponseCode::CopyUid { source, dest, .. } = code {
            assert_eq!(source, "1:3,5");
            assert_eq!(dest, "101:103,105");
        } else {
            panic!("Expected CopyUid variant");
        }
    }

    #[test]
    fn highest_mod_seq_is_sixty_four_bit() {
        let code = ResponseCode::HighestModSeq(ModSeq::new(90060115194045027).unwrap());
        if let ResponseCode::HighestModSeq(seq) = code {
            assert_eq!(seq.get(), 90060115194045027);
        } else {
            panic!("Expected HighestModSeq variant");
        }
    }

    #[test]
    fn modified_carries_failed_set() {
        let code = ResponseCode::Modified("7,9".to_string());
        if let ResponseCode::Modified(set) = code {
            assert_eq!(set, "7,9");
        } else {
            panic!("Expected Modified variant");
        }
    }

    #[test]
    fn closed_and_nomodseq_are_bare() {
        assert!(matches!(ResponseCode::Closed, ResponseCode::Closed));
        assert!(matches!(ResponseCode::NoModSeq, ResponseCode::NoModSeq));
    }

    #[test]
    fn unknown_preserves_text() {
        let code = ResponseCode::Unknown("METADATA LONGENTRIES 2199".to_string());
        if let ResponseCode::Unknown(s) = code {
            assert_eq!(s, "METADATA LONGENTRIES 2199");
        } else {
            panic!("Expected Unknown variant");
        }
    }
}
