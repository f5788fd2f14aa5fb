//! Core protocol types.
//!
//! Fundamental identifiers, flags and response data shared across the
//! engine, following RFC 3501 with the CONDSTORE and QRESYNC extensions
//! (RFC 7162).

#![allow(clippy::missing_const_for_fn)]

mod capability;
mod flags;
mod identifiers;
mod mailbox;
mod response_code;

pub use capability::{Capability, CapabilitySet, Status};
pub use flags::{Flag, Flags};
pub use identifiers::{ModSeq, SeqNum, Uid, UidValidity};
pub use mailbox::{ListEntry, Mailbox, MailboxStatus, NameAttribute, StatusRing};
pub use response_code::ResponseCode;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_reject_zero() {
        assert!(SeqNum::new(0).is_none());
        assert!(Uid::new(0).is_none());
        assert!(ModSeq::new(0).is_none());
        assert_eq!(SeqNum::new(42).unwrap().get(), 42);
    }

    #[test]
    fn capability_parse_covers_extensions() {
        assert_eq!(Capability::parse("IMAP4rev1"), Capability::Imap4Rev1);
        assert_eq!(Capability::parse("idle"), Capability::Idle);
        assert_eq!(Capability::parse("QRESYNC"), Capability::QResync);
        assert_eq!(
            Capability::parse("AUTH=PLAIN"),
            Capability::Auth("PLAIN".to_string())
        );
    }

    #[test]
    fn flag_parse_separates_keywords() {
        assert_eq!(Flag::parse("\\Seen"), Flag::Seen);
        assert_eq!(Flag::parse("custom"), Flag::Keyword("custom".to_string()));
    }
}
