//! Argument types for command construction.

use crate::seqset::SequenceSet;
use crate::types::{Flags, ModSeq, UidValidity};

/// STATUS attributes to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAttribute {
    /// Number of messages.
    Messages,
    /// Number of recent messages.
    Recent,
    /// Next UID.
    UidNext,
    /// UIDVALIDITY.
    UidValidity,
    /// Number of unseen messages.
    Unseen,
    /// Highest mod-sequence.
    HighestModSeq,
}

impl StatusAttribute {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
            Self::HighestModSeq => "HIGHESTMODSEQ",
        }
    }
}

/// FETCH items to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItems {
    /// The ALL macro (FLAGS INTERNALDATE RFC822.SIZE ENVELOPE).
    All,
    /// The FULL macro (ALL plus BODY).
    Full,
    /// The FAST macro (FLAGS INTERNALDATE RFC822.SIZE).
    Fast,
    /// Explicit list of items.
    Items(Vec<FetchAttribute>),
}

impl FetchItems {
    /// The items a header synchronization pass needs: identity, flags,
    /// change tracking, size and the named header fields.
    #[must_use]
    pub fn header_sync(fields: Vec<String>) -> Self {
        Self::Items(vec![
            FetchAttribute::Uid,
            FetchAttribute::Flags,
            FetchAttribute::ModSeq,
            FetchAttribute::InternalDate,
            FetchAttribute::Rfc822Size,
            FetchAttribute::HeaderFields(fields),
        ])
    }

    /// Flags plus change tracking, for incremental resynchronization.
    #[must_use]
    pub fn flag_sync() -> Self {
        Self::Items(vec![
            FetchAttribute::Uid,
            FetchAttribute::Flags,
            FetchAttribute::ModSeq,
        ])
    }

    /// The whole message body, without setting `\Seen`.
    #[must_use]
    pub fn peek_body() -> Self {
        Self::Items(vec![
            FetchAttribute::Uid,
            FetchAttribute::Body {
                section: None,
                peek: true,
                partial: None,
            },
        ])
    }
}

/// Individual FETCH attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// Message flags.
    Flags,
    /// Internal date.
    InternalDate,
    /// RFC822 size.
    Rfc822Size,
    /// UID.
    Uid,
    /// MODSEQ.
    ModSeq,
    /// RFC822 (full message).
    Rfc822,
    /// RFC822.HEADER.
    Rfc822Header,
    /// RFC822.TEXT.
    Rfc822Text,
    /// `BODY.PEEK[HEADER.FIELDS (...)]`, the named header fields only.
    HeaderFields(Vec<String>),
    /// Body section.
    Body {
        /// Section specifier, e.g. `1.2` or `HEADER`.
        section: Option<String>,
        /// Use BODY.PEEK so the fetch does not set `\Seen`.
        peek: bool,
        /// Partial fetch as (start, length).
        partial: Option<(u32, u32)>,
    },
}

/// How a STORE changes message flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// `FLAGS`: replace the flag list.
    Replace,
    /// `+FLAGS`: add to the flag list.
    Add,
    /// `-FLAGS`: remove from the flag list.
    Remove,
}

/// A complete STORE request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAction {
    /// Replace, add or remove.
    pub mode: StoreMode,
    /// The flags in question.
    pub flags: Flags,
    /// Suppress the echoed FETCH response (`.SILENT`).
    pub silent: bool,
    /// CONDSTORE guard: apply only to messages unchanged since this
    /// mod-sequence. Rejected messages come back in a MODIFIED code.
    pub unchanged_since: Option<ModSeq>,
}

impl StoreAction {
    /// Adds flags.
    #[must_use]
    pub const fn add(flags: Flags) -> Self {
        Self {
            mode: StoreMode::Add,
            flags,
            silent: false,
            unchanged_since: None,
        }
    }

    /// Removes flags.
    #[must_use]
    pub const fn remove(flags: Flags) -> Self {
        Self {
            mode: StoreMode::Remove,
            flags,
            silent: false,
            unchanged_since: None,
        }
    }

    /// Replaces the flag list wholesale.
    #[must_use]
    pub const fn replace(flags: Flags) -> Self {
        Self {
            mode: StoreMode::Replace,
            flags,
            silent: false,
            unchanged_since: None,
        }
    }

    /// Suppresses the echoed FETCH response.
    #[must_use]
    pub const fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    /// Guards the store with UNCHANGEDSINCE.
    #[must_use]
    pub const fn unchanged_since(mut self, modseq: ModSeq) -> Self {
        self.unchanged_since = Some(modseq);
        self
    }
}

/// Parameters for a QRESYNC SELECT/EXAMINE.
///
/// Sent as `(QRESYNC (uidvalidity modseq [known-uids]))` so the server
/// replays flag changes and expunges since the checkpoint instead of the
/// client refetching everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QresyncParams {
    /// The cached validity epoch. A mismatch makes the server ignore the
    /// parameters and the client start over.
    pub uid_validity: UidValidity,
    /// Highest mod-sequence seen at checkpoint time.
    pub modseq: ModSeq,
    /// UIDs the client knows, to scope VANISHED (EARLIER).
    pub known_uids: Option<SequenceSet>,
}

/// SEARCH criteria.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// All messages.
    All,
    /// Messages with `\Answered`.
    Answered,
    /// Messages with `\Deleted`.
    Deleted,
    /// Messages with `\Draft`.
    Draft,
    /// Messages with `\Flagged`.
    Flagged,
    /// Recent messages not yet seen.
    New,
    /// Messages without `\Deleted`.
    Undeleted,
    /// Messages without `\Seen`.
    Unseen,
    /// Messages with `\Seen`.
    Seen,
    /// Messages in a sequence-number set.
    SequenceSet(SequenceSet),
    /// Messages in a UID set.
    Uid(SequenceSet),
    /// Subject contains text.
    Subject(String),
    /// From contains text.
    From(String),
    /// To contains text.
    To(String),
    /// Body contains text.
    Body(String),
    /// Header or body contains text.
    Text(String),
    /// Internal date on or after the date (`d-Mon-yyyy`).
    Since(String),
    /// Internal date before the date.
    Before(String),
    /// Internal date on the date.
    On(String),
    /// Larger than the size in bytes.
    Larger(u32),
    /// Smaller than the size in bytes.
    Smaller(u32),
    /// Header field contains value.
    Header(String, String),
    /// Mod-sequence at or above the value (CONDSTORE).
    ModSeq(u64),
    /// Conjunction.
    And(Vec<Self>),
    /// Disjunction.
    Or(Box<Self>, Box<Self>),
    /// Negation.
    Not(Box<Self>),
    /// A pre-formatted criteria string, written to the wire verbatim
    /// with no quoting or escaping.
    Raw(String),
}
