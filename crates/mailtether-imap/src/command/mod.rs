//! Command construction and wire rendering.
//!
//! A [`Command`] serializes to its tagged line; commands that carry data
//! the server must first accept with a continuation (APPEND, non-inline
//! AUTHENTICATE) expose that data separately via
//! [`Command::continuation_payload`].

mod queue;
mod serialize;
mod tag_generator;
mod types;

use crate::seqset::SequenceSet;
use crate::types::{Capability, Flags, Mailbox, ModSeq};

pub use queue::{CommandOutcome, CommandQueue, CommandState, QueuedCommand};
pub use tag_generator::TagGenerator;
pub use types::{
    FetchAttribute, FetchItems, QresyncParams, SearchCriteria, StatusAttribute, StoreAction,
    StoreMode,
};

use serialize::{
    write_astring, write_fetch_items, write_flag_list, write_mailbox, write_search_criteria,
    write_select_params, write_store_action,
};

/// A client command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // Any state
    /// CAPABILITY
    Capability,
    /// NOOP, also used as the poll when IDLE is unavailable.
    Noop,
    /// CHECK, a requested checkpoint of the selected mailbox.
    Check,
    /// LOGOUT
    Logout,

    // Not authenticated
    /// STARTTLS
    StartTls,
    /// LOGIN
    Login {
        /// Account name.
        username: String,
        /// Password, quoted on the wire as needed.
        password: String,
    },
    /// AUTHENTICATE
    Authenticate {
        /// SASL mechanism name.
        mechanism: String,
        /// Base64 client response.
        response: String,
        /// Send the response inline (SASL-IR) instead of waiting for a
        /// continuation.
        initial: bool,
    },

    // Authenticated
    /// ENABLE
    Enable {
        /// Extensions to switch on.
        capabilities: Vec<Capability>,
    },
    /// SELECT
    Select {
        /// Mailbox to open read-write.
        mailbox: Mailbox,
        /// Ask for mod-sequences with `(CONDSTORE)`.
        condstore: bool,
        /// Quick resync parameters; take precedence over `condstore`.
        qresync: Option<QresyncParams>,
    },
    /// EXAMINE
    Examine {
        /// Mailbox to open read-only.
        mailbox: Mailbox,
        /// Ask for mod-sequences with `(CONDSTORE)`.
        condstore: bool,
        /// Quick resync parameters; take precedence over `condstore`.
        qresync: Option<QresyncParams>,
    },
    /// CREATE
    Create {
        /// Mailbox to create.
        mailbox: Mailbox,
    },
    /// DELETE
    Delete {
        /// Mailbox to delete.
        mailbox: Mailbox,
    },
    /// RENAME
    Rename {
        /// Current name.
        from: Mailbox,
        /// New name.
        to: Mailbox,
    },
    /// SUBSCRIBE
    Subscribe {
        /// Mailbox to subscribe to.
        mailbox: Mailbox,
    },
    /// UNSUBSCRIBE
    Unsubscribe {
        /// Mailbox to unsubscribe from.
        mailbox: Mailbox,
    },
    /// LIST
    List {
        /// Reference name, usually empty.
        reference: String,
        /// Pattern with `*`/`%` wildcards.
        pattern: String,
    },
    /// LSUB
    Lsub {
        /// Reference name, usually empty.
        reference: String,
        /// Pattern with `*`/`%` wildcards.
        pattern: String,
    },
    /// STATUS
    Status {
        /// Mailbox to query without selecting.
        mailbox: Mailbox,
        /// Attributes to request.
        items: Vec<StatusAttribute>,
    },
    /// APPEND. The message itself goes out after the continuation.
    Append {
        /// Target mailbox.
        mailbox: Mailbox,
        /// Initial flags; omitted from the line when empty.
        flags: Flags,
        /// INTERNALDATE to record, as RFC 3501 date-time text.
        internal_date: Option<String>,
        /// Full message, CRLF line endings.
        message: Vec<u8>,
    },

    // Selected
    /// CLOSE
    Close,
    /// EXPUNGE
    Expunge,
    /// UID EXPUNGE (UIDPLUS), scoped to the given UIDs.
    UidExpunge {
        /// UIDs to expunge.
        uids: SequenceSet,
    },
    /// SEARCH / UID SEARCH
    Search {
        /// Criteria tree.
        criteria: SearchCriteria,
        /// Report UIDs instead of sequence numbers.
        uid: bool,
    },
    /// FETCH / UID FETCH
    Fetch {
        /// Messages to fetch.
        sequence: SequenceSet,
        /// Items to fetch.
        items: FetchItems,
        /// Address messages by UID.
        uid: bool,
        /// CHANGEDSINCE modifier (CONDSTORE).
        changed_since: Option<ModSeq>,
        /// VANISHED modifier; only valid with `uid` and `changed_since`.
        vanished: bool,
    },
    /// STORE / UID STORE
    Store {
        /// Messages to change.
        sequence: SequenceSet,
        /// What to change.
        action: StoreAction,
        /// Address messages by UID.
        uid: bool,
    },
    /// COPY / UID COPY
    Copy {
        /// Messages to copy.
        sequence: SequenceSet,
        /// Destination mailbox.
        mailbox: Mailbox,
        /// Address messages by UID.
        uid: bool,
    },
    /// MOVE / UID MOVE
    Move {
        /// Messages to move.
        sequence: SequenceSet,
        /// Destination mailbox.
        mailbox: Mailbox,
        /// Address messages by UID.
        uid: bool,
    },
    /// IDLE
    Idle,
    /// DONE, terminating an IDLE. Sent without a tag.
    Done,
}

impl Command {
    /// Serializes the command line with the given tag, CRLF included.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();

        // DONE continues the still-open IDLE command and carries no tag.
        if !matches!(self, Self::Done) {
            buf.extend_from_slice(tag.as_bytes());
            buf.push(b' ');
        }

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Check => buf.extend_from_slice(b"CHECK"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }

            Self::Authenticate {
                mechanism,
                response,
                initial,
            } => {
                buf.extend_from_slice(b"AUTHENTICATE ");
                buf.extend_from_slice(mechanism.as_bytes());
                if *initial {
                    buf.push(b' ');
                    buf.extend_from_slice(response.as_bytes());
                }
            }

            Self::Enable { capabilities } => {
                buf.extend_from_slice(b"ENABLE");
                for cap in capabilities {
                    buf.push(b' ');
                    buf.extend_from_slice(cap.to_string().as_bytes());
                }
            }

            Self::Select {
                mailbox,
                condstore,
                qresync,
            } => {
                buf.extend_from_slice(b"SELECT ");
                write_mailbox(&mut buf, mailbox);
                write_select_params(&mut buf, *condstore, qresync.as_ref());
            }

            Self::Examine {
                mailbox,
                condstore,
                qresync,
            } => {
                buf.extend_from_slice(b"EXAMINE ");
                write_mailbox(&mut buf, mailbox);
                write_select_params(&mut buf, *condstore, qresync.as_ref());
            }

            Self::Create { mailbox } => {
                buf.extend_from_slice(b"CREATE ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::Delete { mailbox } => {
                buf.extend_from_slice(b"DELETE ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::Rename { from, to } => {
                buf.extend_from_slice(b"RENAME ");
                write_mailbox(&mut buf, from);
                buf.push(b' ');
                write_mailbox(&mut buf, to);
            }

            Self::Subscribe { mailbox } => {
                buf.extend_from_slice(b"SUBSCRIBE ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::Unsubscribe { mailbox } => {
                buf.extend_from_slice(b"UNSUBSCRIBE ");
                write_mailbox(&mut buf, mailbox);
            }

            Self::List { reference, pattern } => {
                buf.extend_from_slice(b"LIST ");
                write_astring(&mut buf, reference);
                buf.push(b' ');
                write_astring(&mut buf, pattern);
            }

            Self::Lsub { reference, pattern } => {
                buf.extend_from_slice(b"LSUB ");
                write_astring(&mut buf, reference);
                buf.push(b' ');
                write_astring(&mut buf, pattern);
            }

            Self::Status { mailbox, items } => {
                buf.extend_from_slice(b"STATUS ");
                write_mailbox(&mut buf, mailbox);
                buf.extend_from_slice(b" (");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        buf.push(b' ');
                    }
                    buf.extend_from_slice(item.as_str().as_bytes());
                }
                buf.push(b')');
            }

            Self::Append {
                mailbox,
                flags,
                internal_date,
                message,
            } => {
                buf.extend_from_slice(b"APPEND ");
                write_mailbox(&mut buf, mailbox);
                if !flags.is_empty() {
                    buf.push(b' ');
                    write_flag_list(&mut buf, flags);
                }
                if let Some(date) = internal_date {
                    buf.extend_from_slice(format!(" \"{date}\"").as_bytes());
                }
                buf.extend_from_slice(format!(" {{{}}}", message.len()).as_bytes());
            }

            Self::Close => buf.extend_from_slice(b"CLOSE"),
            Self::Expunge => buf.extend_from_slice(b"EXPUNGE"),

            Self::UidExpunge { uids } => {
                buf.extend_from_slice(b"UID EXPUNGE ");
                buf.extend_from_slice(uids.to_string().as_bytes());
            }

            Self::Search { criteria, uid } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"SEARCH ");
                write_search_criteria(&mut buf, criteria);
            }

            Self::Fetch {
                sequence,
                items,
                uid,
                changed_since,
                vanished,
            } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"FETCH ");
                buf.extend_from_slice(sequence.to_string().as_bytes());
                buf.push(b' ');
                write_fetch_items(&mut buf, items);
                if let Some(modseq) = changed_since {
                    buf.extend_from_slice(format!(" (CHANGEDSINCE {modseq}").as_bytes());
                    if *vanished {
                        buf.extend_from_slice(b" VANISHED");
                    }
                    buf.push(b')');
                }
            }

            Self::Store {
                sequence,
                action,
                uid,
            } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"STORE ");
                buf.extend_from_slice(sequence.to_string().as_bytes());
                buf.push(b' ');
                write_store_action(&mut buf, action);
            }

            Self::Copy {
                sequence,
                mailbox,
                uid,
            } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"COPY ");
                buf.extend_from_slice(sequence.to_string().as_bytes());
                buf.push(b' ');
                write_mailbox(&mut buf, mailbox);
            }

            Self::Move {
                sequence,
                mailbox,
                uid,
            } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"MOVE ");
                buf.extend_from_slice(sequence.to_string().as_bytes());
                buf.push(b' ');
                write_mailbox(&mut buf, mailbox);
            }

            Self::Idle => buf.extend_from_slice(b"IDLE"),
            Self::Done => buf.extend_from_slice(b"DONE"),
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Data to send once the server answers with a continuation, CRLF
    /// included. `None` for commands that complete in one line.
    #[must_use]
    pub fn continuation_payload(&self) -> Option<Vec<u8>> {
        match self {
            Self::Append { message, .. } => {
                let mut payload = message.clone();
                payload.extend_from_slice(b"\r\n");
                Some(payload)
            }
            Self::Authenticate {
                response,
                initial: false,
                ..
            } => {
                let mut payload = response.clone().into_bytes();
                payload.extend_from_slice(b"\r\n");
                Some(payload)
            }
            _ => None,
        }
    }

    /// Whether the server must grant a continuation before this command
    /// can finish sending. IDLE waits for the grant but sends nothing
    /// until the later DONE.
    #[must_use]
    pub fn expects_continuation(&self) -> bool {
        matches!(self, Self::Idle) || self.continuation_payload().is_some()
    }

    /// The command's keyword, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Check => "CHECK",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Authenticate { .. } => "AUTHENTICATE",
            Self::Enable { .. } => "ENABLE",
            Self::Select { .. } => "SELECT",
            Self::Examine { .. } => "EXAMINE",
            Self::Create { .. } => "CREATE",
            Self::Delete { .. } => "DELETE",
            Self::Rename { .. } => "RENAME",
            Self::Subscribe { .. } => "SUBSCRIBE",
            Self::Unsubscribe { .. } => "UNSUBSCRIBE",
            Self::List { .. } => "LIST",
            Self::Lsub { .. } => "LSUB",
            Self::Status { .. } => "STATUS",
            Self::Append { .. } => "APPEND",
            Self::Close => "CLOSE",
            Self::Expunge => "EXPUNGE",
            Self::UidExpunge { .. } => "UID EXPUNGE",
            Self::Search { .. } => "SEARCH",
            Self::Fetch { .. } => "FETCH",
            Self::Store { .. } => "STORE",
            Self::Copy { .. } => "COPY",
            Self::Move { .. } => "MOVE",
            Self::Idle => "IDLE",
            Self::Done => "DONE",
        }
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
    use crate::types::{Flag, ModSeq, UidValidity};

    use super::*;

    #[test]
    fn capability() {
        assert_eq!(Command::Capability.serialize("a0001"), b"a0001 CAPABILITY\r\n");
    }

    #[test]
    fn login_plain_atoms() {
        let cmd = Command::Login {
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        assert_eq!(cmd.serialize("a0001"), b"a0001 LOGIN user pass\r\n");
    }

    #[test]
    fn login_quotes_when_needed() {
        let cmd = Command::Login {
            username: "user@example.com".to_string(),
            password: "pass word".to_string(),
        };
        assert_eq!(
            cmd.serialize("a0001"),
            b"a0001 LOGIN user@example.com \"pass word\"\r\n"
        );
    }

    #[test]
    fn authenticate_inline_vs_continuation() {
        let inline = Command::Authenticate {
            mechanism: "PLAIN".to_string(),
            response: "AHUAcA==".to_string(),
            initial: true,
        };
        assert_eq!(
            inline.serialize("a0002"),
            b"a0002 AUTHENTICATE PLAIN AHUAcA==\r\n"
        );
        assert!(inline.continuation_payload().is_none());

        let deferred = Command::Authenticate {
            mechanism: "PLAIN".to_string(),
            response: "AHUAcA==".to_string(),
            initial: false,
        };
        assert_eq!(deferred.serialize("a0002"), b"a0002 AUTHENTICATE PLAIN\r\n");
        assert_eq!(
            deferred.continuation_payload().unwrap(),
            b"AHUAcA==\r\n".to_vec()
        );
    }

    #[test]
    fn select_plain() {
        let cmd = Command::Select {
            mailbox: Mailbox::inbox(),
            condstore: false,
            qresync: None,
        };
        assert_eq!(cmd.serialize("a0001"), b"a0001 SELECT INBOX\r\n");
    }

    #[test]
    fn select_condstore() {
        let cmd = Command::Select {
            mailbox: Mailbox::inbox(),
            condstore: true,
            qresync: None,
        };
        assert_eq!(cmd.serialize("a0001"), b"a0001 SELECT INBOX (CONDSTORE)\r\n");
    }

    #[test]
    fn select_qresync_overrides_condstore() {
        let cmd = Command::Select {
            mailbox: Mailbox::inbox(),
            condstore: true,
            qresync: Some(QresyncParams {
                uid_validity: UidValidity::new(67890007).unwrap(),
                modseq: ModSeq::new(90060115194045000).unwrap(),
                known_uids: Some(SequenceSet::parse("41:211,214:541").unwrap()),
            }),
        };
        assert_eq!(
            cmd.serialize("a0003"),
            b"a0003 SELECT INBOX (QRESYNC (67890007 90060115194045000 41:211,214:541))\r\n"
                .to_vec()
        );
    }

    #[test]
    fn mailbox_names_go_out_encoded() {
        let cmd = Command::Examine {
            mailbox: Mailbox::new("Entw\u{fc}rfe"),
            condstore: false,
            qresync: None,
        };
        assert_eq!(cmd.serialize("a0004"), b"a0004 EXAMINE Entw&APw-rfe\r\n");
    }

    #[test]
    fn list_and_lsub() {
        let list = Command::List {
            reference: String::new(),
            pattern: "*".to_string(),
        };
        assert_eq!(list.serialize("a0001"), b"a0001 LIST \"\" \"*\"\r\n");

        let lsub = Command::Lsub {
            reference: String::new(),
            pattern: "INBOX.%".to_string(),
        };
        assert_eq!(lsub.serialize("a0002"), b"a0002 LSUB \"\" \"INBOX.%\"\r\n");
    }

    #[test]
    fn status_items() {
        let cmd = Command::Status {
            mailbox: Mailbox::new("archive"),
            items: vec![
                StatusAttribute::Messages,
                StatusAttribute::UidNext,
                StatusAttribute::UidValidity,
            ],
        };
        assert_eq!(
            cmd.serialize("a0005"),
            b"a0005 STATUS archive (MESSAGES UIDNEXT UIDVALIDITY)\r\n"
        );
    }

    #[test]
    fn fetch_changedsince_vanished() {
        let cmd = Command::Fetch {
            sequence: SequenceSet::all(),
            items: FetchItems::flag_sync(),
            uid: true,
            changed_since: ModSeq::new(12345),
            vanished: true,
        };
        assert_eq!(
            cmd.serialize("a0006"),
            b"a0006 UID FETCH 1:* (UID FLAGS MODSEQ) (CHANGEDSINCE 12345 VANISHED)\r\n".to_vec()
        );
    }

    #[test]
    fn fetch_single_item_is_unparenthesized() {
        let cmd = Command::Fetch {
            sequence: SequenceSet::range(1, 10).unwrap(),
            items: FetchItems::Items(vec![FetchAttribute::Flags]),
            uid: false,
            changed_since: None,
            vanished: false,
        };
        assert_eq!(cmd.serialize("a0001"), b"a0001 FETCH 1:10 FLAGS\r\n");
    }

    #[test]
    fn store_silent_add() {
        let cmd = Command::Store {
            sequence: SequenceSet::single(1).unwrap(),
            action: StoreAction::add(Flags::from_iter([Flag::Seen])).silent(),
            uid: false,
        };
        assert_eq!(
            cmd.serialize("a0001"),
            b"a0001 STORE 1 +FLAGS.SILENT (\\Seen)\r\n"
        );
    }

    #[test]
    fn store_unchangedsince_precedes_the_item() {
        let cmd = Command::Store {
            sequence: SequenceSet::parse("1:4").unwrap(),
            action: StoreAction::replace(Flags::from_iter([Flag::Deleted]))
                .unchanged_since(ModSeq::new(320162338).unwrap()),
            uid: true,
        };
        assert_eq!(
            cmd.serialize("a0007"),
            b"a0007 UID STORE 1:4 (UNCHANGEDSINCE 320162338) FLAGS (\\Deleted)\r\n".to_vec()
        );
    }

    #[test]
    fn append_line_plus_payload() {
        let cmd = Command::Append {
            mailbox: Mailbox::new("Drafts"),
            flags: Flags::from_iter([Flag::Draft]),
            internal_date: None,
            message: b"From: a@b\r\n\r\nhi".to_vec(),
        };
        assert_eq!(
            cmd.serialize("a0008"),
            b"a0008 APPEND Drafts (\\Draft) {15}\r\n".to_vec()
        );
        assert_eq!(
            cmd.continuation_payload().unwrap(),
            b"From: a@b\r\n\r\nhi\r\n".to_vec()
        );
    }

    #[test]
    fn append_without_flags_omits_the_list() {
        let cmd = Command::Append {
            mailbox: Mailbox::inbox(),
            flags: Flags::new(),
            internal_date: None,
            message: b"x".to_vec(),
        };
        assert_eq!(cmd.serialize("a0001"), b"a0001 APPEND INBOX {1}\r\n");
    }

    #[test]
    fn append_internal_date_is_quoted() {
        let cmd = Command::Append {
            mailbox: Mailbox::inbox(),
            flags: Flags::from_iter([Flag::Seen]),
            internal_date: Some("05-Nov-2024 12:30:00 +0000".to_string()),
            message: b"x".to_vec(),
        };
        assert_eq!(
            cmd.serialize("a0002"),
            b"a0002 APPEND INBOX (\\Seen) \"05-Nov-2024 12:30:00 +0000\" {1}\r\n".to_vec()
        );
    }

    #[test]
    fn uid_expunge() {
        let cmd = Command::UidExpunge {
            uids: SequenceSet::range(100, 200).unwrap(),
        };
        assert_eq!(cmd.serialize("a0001"), b"a0001 UID EXPUNGE 100:200\r\n");
    }

    #[test]
    fn search_unseen() {
        let cmd = Command::Search {
            criteria: SearchCriteria::Unseen,
            uid: false,
        };
        assert_eq!(cmd.serialize("a0001"), b"a0001 SEARCH UNSEEN\r\n");
    }

    #[test]
    fn enable_lists_extensions() {
        let cmd = Command::Enable {
            capabilities: vec![Capability::CondStore, Capability::QResync],
        };
        assert_eq!(cmd.serialize("a0001"), b"a0001 ENABLE CONDSTORE QRESYNC\r\n");
    }

    #[test]
    fn done_is_untagged() {
        assert_eq!(Command::Done.serialize(""), b"DONE\r\n");
    }

    #[test]
    fn move_with_uid() {
        let cmd = Command::Move {
            sequence: SequenceSet::parse("4,7").unwrap(),
            mailbox: Mailbox::new("archive"),
            uid: true,
        };
        assert_eq!(cmd.serialize("a0009"), b"a0009 UID MOVE 4,7 archive\r\n");
    }
}
