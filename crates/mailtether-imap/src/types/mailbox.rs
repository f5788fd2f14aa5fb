//! Mailbox names, listing rows and cached STATUS data.

use super::{ModSeq, Uid, UidValidity};

/// Number of STATUS entries kept before the oldest is evicted.
const STATUS_RING_CAPACITY: usize = 10;

/// Mailbox name, in decoded (UTF-8) form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox(pub String);

impl Mailbox {
    /// Creates a mailbox name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The INBOX mailbox.
    #[must_use]
    pub fn inbox() -> Self {
        Self("INBOX".to_string())
    }

    /// Whether this names INBOX, which compares case-insensitively.
    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.0.eq_ignore_ascii_case("INBOX")
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Mailbox {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// One row of a LIST or LSUB response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Name attributes (`\NoSelect`, `\HasChildren`, ...).
    pub attributes: Vec<NameAttribute>,
    /// Hierarchy delimiter, absent for flat namespaces.
    pub delimiter: Option<char>,
    /// Mailbox name, decoded.
    pub mailbox: Mailbox,
}

impl ListEntry {
    /// Whether the mailbox can be selected.
    #[must_use]
    pub fn selectable(&self) -> bool {
        !self.attributes.contains(&NameAttribute::NoSelect)
    }
}

/// Name attribute on a LIST row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameAttribute {
    /// Mailbox cannot be selected.
    NoSelect,
    /// Mailbox cannot have children.
    NoInferiors,
    /// Mailbox has child mailboxes.
    HasChildren,
    /// Mailbox has no child mailboxes.
    HasNoChildren,
    /// Mailbox is marked as containing recent mail.
    Marked,
    /// Mailbox is not marked.
    Unmarked,
    /// Mailbox is subscribed.
    Subscribed,
    /// Attribute this client does not interpret.
    Unknown(String),
}

impl NameAttribute {
    /// Parses a name attribute token.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\NOSELECT" => Self::NoSelect,
            "\\NOINFERIORS" => Self::NoInferiors,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            "\\MARKED" => Self::Marked,
            "\\UNMARKED" => Self::Unmarked,
            "\\SUBSCRIBED" => Self::Subscribed,
            _ => Self::Unknown(s.to_string()),
        }
    }
}

/// Counters reported by a STATUS response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Mailbox the counters describe.
    pub mailbox: Option<Mailbox>,
    /// Total message count.
    pub messages: u32,
    /// Recent message count.
    pub recent: u32,
    /// Unseen message count.
    pub unseen: u32,
    /// Next UID the server expects to assign.
    pub uid_next: Option<Uid>,
    /// UID namespace epoch.
    pub uid_validity: Option<UidValidity>,
    /// Highest mod-sequence, when CONDSTORE is available.
    pub highest_modseq: Option<ModSeq>,
}

/// Fixed-capacity cache of STATUS rows, keyed by mailbox name.
///
/// Holds the most recently reported counters for up to ten mailboxes.
/// A repeat STATUS for a known mailbox updates in place; a new mailbox
/// past capacity evicts the oldest entry.
#[derive(Debug, Default)]
pub struct StatusRing {
    entries: Vec<MailboxStatus>,
}

impl StatusRing {
    /// Creates an empty ring.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records a STATUS row. Entries without a mailbox name are ignored.
    pub fn update(&mut self, status: MailboxStatus) {
        let Some(name) = status.mailbox.clone() else {
            return;
        };
        if let Some(slot) = self
            .entries
            .iter_mut()
            .find(|e| e.mailbox.as_ref() == Some(&name))
        {
            *slot = status;
            return;
        }
        if self.entries.len() == STATUS_RING_CAPACITY {
            self.entries.remove(0);
        }
        self.entries.push(status);
    }

    /// Looks up the cached row for a mailbox.
    #[must_use]
    pub fn get(&self, mailbox: &Mailbox) -> Option<&MailboxStatus> {
        self.entries
            .iter()
            .find(|e| e.mailbox.as_ref() == Some(mailbox))
    }

    /// Drops the cached row for a mailbox, after DELETE or RENAME.
    pub fn remove(&mut self, mailbox: &Mailbox) {
        self.entries.retain(|e| e.mailbox.as_ref() != Some(mailbox));
    }

    /// Number of cached rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
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

    mod mailbox_tests {
        use super::*;

        #[test]
        fn inbox_matches_any_case() {
            assert!(Mailbox::new("inbox").is_inbox());
            assert!(Mailbox::new("InBox").is_inbox());
            assert!(!Mailbox::new("INBOX/child").is_inbox());
        }

        #[test]
        fn display_shows_decoded_name() {
            let mb = Mailbox::new("Entw\u{fc}rfe");
            assert_eq!(format!("{mb}"), "Entw\u{fc}rfe");
        }
    }

    mod list_entry_tests {
        use super::*;

        #[test]
        fn noselect_is_not_selectable() {
            let entry = ListEntry {
                attributes: vec![NameAttribute::NoSelect, NameAttribute::HasChildren],
                delimiter: Some('/'),
                mailbox: Mailbox::new("[Gmail]"),
            };
            assert!(!entry.selectable());
        }

        #[test]
        fn attribute_parse_is_case_insensitive() {
            assert_eq!(NameAttribute::parse("\\Noselect"), NameAttribute::NoSelect);
            assert_eq!(
                NameAttribute::parse("\\NOINFERIORS"),
                NameAttribute::NoInferiors
            );
            assert_eq!(
                NameAttribute::parse("\\XListInbox"),
                NameAttribute::Unknown("\\XListInbox".to_string())
            );
        }
    }

    mod status_ring_tests {
        use super::*;

        fn row(name: &str, messages: u32) -> MailboxStatus {
            MailboxStatus {
                mailbox: Some(Mailbox::new(name)),
                messages,
                ..MailboxStatus::default()
            }
        }

        #[test]
        fn update_replaces_existing_entry() {
            let mut ring = StatusRing::new();
            ring.update(row("INBOX", 10));
            ring.update(row("INBOX", 12));
            assert_eq!(ring.len(), 1);
            assert_eq!(ring.get(&Mailbox::inbox()).unwrap().messages, 12);
        }

        #[test]
        fn eviction_drops_oldest() {
            let mut ring = StatusRing::new();
            for i in 0..11 {
                ring.update(row(&format!("box-{i}"), i));
            }
            assert_eq!(ring.len(), 10);
            assert!(ring.get(&Mailbox::new("box-0")).is_none());
            assert!(ring.get(&Mailbox::new("box-10")).is_some());
        }

        #[test]
        fn remove_forgets_the_mailbox() {
            let mut ring = StatusRing::new();
            ring.update(row("Sent", 3));
            ring.remove(&Mailbox::new("Sent"));
            assert!(ring.is_empty());
        }

        #[test]
        fn nameless_rows_are_ignored() {
            let mut ring = StatusRing::new();
            ring.update(MailboxStatus::default());
            assert!(ring.is_empty());
        }
    }
}
