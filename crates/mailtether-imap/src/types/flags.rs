//! Message flags.

use serde::{Deserialize, Serialize};

/// A single message flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flag {
    /// Message has been read.
    Seen,
    /// Message has been answered.
    Answered,
    /// Message is flagged for attention.
    Flagged,
    /// Message is marked for deletion.
    Deleted,
    /// Message is a draft.
    Draft,
    /// Message arrived since the mailbox was last selected.
    Recent,
    /// Server- or client-defined keyword.
    Keyword(String),
}

impl Flag {
    /// Parses a wire flag token (`\Seen`, `$Label`, ...).
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "\\SEEN" => Self::Seen,
            "\\ANSWERED" => Self::Answered,
            "\\FLAGGED" => Self::Flagged,
            "\\DELETED" => Self::Deleted,
            "\\DRAFT" => Self::Draft,
            "\\RECENT" => Self::Recent,
            _ => Self::Keyword(s.to_string()),
        }
    }

    /// Wire representation of the flag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(s) => s,
        }
    }
}

impl std::fmt::Display for Flag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An ordered, duplicate-free flag collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    flags: Vec<Flag>,
}

impl Flags {
    /// Creates an empty collection.
    #[must_use]
    pub const fn new() -> Self {
        Self { flags: Vec::new() }
    }

    /// Adds a flag if not already present.
    pub fn insert(&mut self, flag: Flag) {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
    }

    /// Removes a flag if present.
    pub fn remove(&mut self, flag: &Flag) {
        self.flags.retain(|f| f != flag);
    }

    /// Whether the flag is present.
    #[must_use]
    pub fn contains(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// Iterates the flags in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    /// Number of flags present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// True when no flags are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

impl IntoIterator for Flags {
    type Item = Flag;
    type IntoIter = std::vec::IntoIter<Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.into_iter()
    }
}

impl FromIterator<Flag> for Flags {
    fn from_iter<T: IntoIterator<Item = Flag>>(iter: T) -> Self {
        let mut out = Self::new();
        for flag in iter {
            out.insert(flag);
        }
        out
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

    mod flag_tests {
        use super::*;

        #[test]
        fn parse_system_flags_case_insensitively() {
            assert_eq!(Flag::parse("\\seen"), Flag::Seen);
            assert_eq!(Flag::parse("\\SEEN"), Flag::Seen);
            assert_eq!(Flag::parse("\\Deleted"), Flag::Deleted);
            assert_eq!(Flag::parse("\\recent"), Flag::Recent);
        }

        #[test]
        fn keywords_keep_their_original_spelling() {
            let flag = Flag::parse("$MailFlagBit0");
            assert_eq!(flag, Flag::Keyword("$MailFlagBit0".to_string()));
            assert_eq!(flag.as_str(), "$MailFlagBit0");
        }

        #[test]
        fn wire_form_uses_canonical_case() {
            assert_eq!(Flag::parse("\\ANSWERED").as_str(), "\\Answered");
            assert_eq!(format!("{}", Flag::Flagged), "\\Flagged");
        }
    }

    mod flags_tests {
        use super::*;

        #[test]
        fn insert_deduplicates() {
            let mut flags = Flags::new();
            flags.insert(Flag::Seen);
            flags.insert(Flag::Seen);
            flags.insert(Flag::Answered);
            assert_eq!(flags.len(), 2);
        }

        #[test]
        fn remove_leaves_others_intact() {
            let mut flags: Flags = [Flag::Seen, Flag::Flagged].into_iter().collect();
            flags.remove(&Flag::Seen);
            assert!(!flags.contains(&Flag::Seen));
            assert!(flags.contains(&Flag::Flagged));
        }

        #[test]
        fn collect_from_iterator_deduplicates() {
            let flags: Flags = [Flag::Draft, Flag::Draft, Flag::Seen].into_iter().collect();
            assert_eq!(flags.len(), 2);
            let order: Vec<_> = flags.iter().cloned().collect();
            assert_eq!(order, vec![Flag::Draft, Flag::Seen]);
        }

        #[test]
        fn serde_round_trip_preserves_order() {
            let flags: Flags = [
                Flag::Seen,
                Flag::Keyword("$Forwarded".to_string()),
                Flag::Draft,
            ]
            .into_iter()
            .collect();
            let json = serde_json::to_string(&flags).unwrap();
            let back: Flags = serde_json::from_str(&json).unwrap();
            assert_eq!(back, flags);
        }
    }
}
