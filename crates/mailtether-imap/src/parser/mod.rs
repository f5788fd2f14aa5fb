//! Server response parsing.
//!
//! One [`Response`] is produced per complete response unit handed over
//! by the framing layer: a tagged completion, an untagged data line or
//! a continuation request. Unknown untagged data is preserved rather
//! than rejected so one exotic server extension cannot wedge a session.
//!
//! # Example
//!
//! ```
//! use mailtether_imap::parser::{Response, ResponseParser, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* 23 EXISTS\r\n").unwrap();
//! assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(23)));
//! ```

#![allow(clippy::missing_errors_doc)]

mod fetch;
mod lexer;

pub use fetch::FetchData;
pub use lexer::{Lexer, Token};

use crate::codec;
use crate::error::{Error, Result};
use crate::seqset::SequenceSet;
use crate::types::{
    Capability, Flag, Flags, ListEntry, Mailbox, MailboxStatus, ModSeq, NameAttribute,
    ResponseCode, SeqNum, Status, Uid, UidValidity,
};

use fetch::parse_fetch_data;

/// A parsed server response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Command completion, matched to an in-flight command by tag.
    Tagged {
        /// Tag echoed from the command.
        tag: String,
        /// Completion status.
        status: Status,
        /// Optional bracketed code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Server data or unsolicited state change.
    Untagged(UntaggedResponse),
    /// Continuation request; the pending literal may now be sent.
    Continuation {
        /// Server-supplied prompt text, if any.
        text: Option<String>,
    },
}

/// Payload of an untagged response.
#[derive(Debug, Clone, PartialEq)]
pub enum UntaggedResponse {
    /// `* OK/NO/BAD/PREAUTH/BYE`, including the greeting.
    Status {
        /// Which condition the server reported.
        status: Status,
        /// Optional bracketed code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...`
    Capability(Vec<Capability>),
    /// `* <n> EXISTS`
    Exists(u32),
    /// `* <n> RECENT`
    Recent(u32),
    /// `* <n> EXPUNGE`
    Expunge(SeqNum),
    /// `* <n> FETCH (...)`
    Fetch {
        /// Sequence number the data applies to.
        seq: SeqNum,
        /// Items carried by the response.
        data: FetchData,
    },
    /// `* FLAGS (...)`, the mailbox's applicable flags.
    Flags(Flags),
    /// `* LIST (...) "<delim>" <name>`
    List(ListEntry),
    /// `* LSUB (...) "<delim>" <name>`
    Lsub(ListEntry),
    /// `* SEARCH <n>...`
    Search(Vec<u32>),
    /// `* STATUS <name> (...)`
    StatusData(MailboxStatus),
    /// `* ENABLED ...`
    Enabled(Vec<Capability>),
    /// `* VANISHED [(EARLIER)] <uid-set>`
    Vanished {
        /// Whether the set describes pre-disconnect expunges.
        earlier: bool,
        /// UIDs no longer present.
        uids: SequenceSet,
    },
    /// Data this client does not interpret, kept verbatim.
    Unknown(String),
}

/// Parses complete response units.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses one response. `input` must hold the whole unit, literals
    /// included.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer),
            Token::Plus => Self::parse_continuation(&mut lexer),
            Token::Atom(tag) => Self::parse_tagged(&mut lexer, tag),
            token => Err(Error::Parse {
                position: 0,
                message: format!("expected *, + or tag, got {token:?}"),
            }),
        }
    }

    fn parse_tagged(lexer: &mut Lexer<'_>, tag: &str) -> Result<Response> {
        lexer.expect_space()?;
        let status = read_status(lexer)?;
        lexer.expect_space()?;
        let (code, text) = parse_resp_text(lexer)?;

        Ok(Response::Tagged {
            tag: tag.to_string(),
            status,
            code,
            text,
        })
    }

    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<Response> {
        lexer.expect_space()?;

        let response = match lexer.next_token()? {
            Token::Atom(word) => match word.to_uppercase().as_str() {
                "OK" | "NO" | "BAD" | "PREAUTH" | "BYE" => {
                    let status = Status::parse(word).ok_or_else(|| Error::Parse {
                        position: lexer.position(),
                        message: format!("invalid status {word}"),
                    })?;
                    lexer.expect_space()?;
                    let (code, text) = parse_resp_text(lexer)?;
                    UntaggedResponse::Status { status, code, text }
                }
                "CAPABILITY" => UntaggedResponse::Capability(parse_capability_list(lexer)?),
                "ENABLED" => UntaggedResponse::Enabled(parse_capability_list(lexer)?),
                "FLAGS" => {
                    lexer.expect_space()?;
                    UntaggedResponse::Flags(parse_flag_list(lexer)?)
                }
                "LIST" => {
                    lexer.expect_space()?;
                    UntaggedResponse::List(parse_list_entry(lexer)?)
                }
                "LSUB" => {
                    lexer.expect_space()?;
                    UntaggedResponse::Lsub(parse_list_entry(lexer)?)
                }
                "SEARCH" => UntaggedResponse::Search(parse_search_ids(lexer)?),
                "STATUS" => {
                    lexer.expect_space()?;
                    UntaggedResponse::StatusData(parse_status_data(lexer)?)
                }
                "VANISHED" => {
                    lexer.expect_space()?;
                    parse_vanished(lexer)?
                }
                _ => {
                    let rest = lexer.read_text_line()?;
                    if rest.is_empty() {
                        UntaggedResponse::Unknown(word.to_string())
                    } else {
                        UntaggedResponse::Unknown(format!("{word} {rest}"))
                    }
                }
            },
            Token::Number(n) => {
                lexer.expect_space()?;
                let keyword = lexer.read_atom_string()?;
                match keyword.to_uppercase().as_str() {
                    "EXISTS" => UntaggedResponse::Exists(narrow(lexer, n)?),
                    "RECENT" => UntaggedResponse::Recent(narrow(lexer, n)?),
                    "EXPUNGE" => UntaggedResponse::Expunge(read_seq(lexer, n)?),
                    "FETCH" => {
                        let seq = read_seq(lexer, n)?;
                        lexer.expect_space()?;
                        let data = parse_fetch_data(lexer)?;
                        UntaggedResponse::Fetch { seq, data }
                    }
                    _ => {
                        let rest = lexer.read_text_line()?;
                        UntaggedResponse::Unknown(format!("{n} {keyword} {rest}"))
                    }
                }
            }
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("unexpected token after *: {token:?}"),
                });
            }
        };

        Ok(Response::Untagged(response))
    }

    fn parse_continuation(lexer: &mut Lexer<'_>) -> Result<Response> {
        lexer.skip_spaces();
        let text = lexer.read_text_line()?;
        Ok(Response::Continuation {
            text: (!text.is_empty()).then_some(text),
        })
    }
}

fn read_status(lexer: &mut Lexer<'_>) -> Result<Status> {
    let word = lexer.read_atom_string()?;
    Status::parse(word).ok_or_else(|| Error::Parse {
        position: lexer.position(),
        message: format!("invalid status {word}"),
    })
}

fn narrow(lexer: &Lexer<'_>, n: u64) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::Parse {
        position: lexer.position(),
        message: "count exceeds 32 bits".to_string(),
    })
}

fn read_seq(lexer: &Lexer<'_>, n: u64) -> Result<SeqNum> {
    narrow(lexer, n).and_then(|n| {
        SeqNum::new(n).ok_or_else(|| Error::Parse {
            position: lexer.position(),
            message: "sequence number cannot be 0".to_string(),
        })
    })
}

/// Decodes a wire mailbox name, keeping the raw form when the server
/// sends something undecodable.
fn decode_mailbox(name: &str) -> Mailbox {
    match codec::decode(name) {
        Ok(decoded) => Mailbox::new(decoded),
        Err(_) => Mailbox::new(name),
    }
}

fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
    let code = if lexer.peek() == Some(b'[') {
        Some(parse_response_code(lexer)?)
    } else {
        None
    };
    lexer.skip_spaces();
    let text = lexer.read_text_line()?;
    Ok((code, text))
}

fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;

    let atom = lexer.read_atom_string()?;
    let code = match atom.to_uppercase().as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "NOMODSEQ" => ResponseCode::NoModSeq,
        "CLOSED" => ResponseCode::Closed,
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.read_number_u32()?;
            ResponseCode::UidNext(Uid::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "UIDNEXT cannot be 0".to_string(),
            })?)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = lexer.read_number_u32()?;
            ResponseCode::UidValidity(UidValidity::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "UIDVALIDITY cannot be 0".to_string(),
            })?)
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            let n = lexer.read_number_u32()?;
            ResponseCode::Unseen(SeqNum::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "UNSEEN cannot be 0".to_string(),
            })?)
        }
        "HIGHESTMODSEQ" => {
            lexer.expect_space()?;
            let n = lexer.read_number()?;
            ResponseCode::HighestModSeq(ModSeq::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "HIGHESTMODSEQ cannot be 0".to_string(),
            })?)
        }
        "CAPABILITY" => ResponseCode::Capability(parse_capability_list(lexer)?),
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            let flags = parse_flag_list(lexer)?;
            ResponseCode::PermanentFlags(flags.into_iter().collect())
        }
        "APPENDUID" => {
            lexer.expect_space()?;
            let validity = lexer.read_number_u32()?;
            lexer.expect_space()?;
            let uid = lexer.read_number_u32()?;
            match (UidValidity::new(validity), Uid::new(uid)) {
                (Some(uidvalidity), Some(uid)) => ResponseCode::AppendUid { uidvalidity, uid },
                _ => {
                    return Err(Error::Parse {
                        position: lexer.position(),
                        message: "APPENDUID values cannot be 0".to_string(),
                    });
                }
            }
        }
        "COPYUID" => {
            lexer.expect_space()?;
            let validity = lexer.read_number_u32()?;
            let uidvalidity = UidValidity::new(validity).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "COPYUID validity cannot be 0".to_string(),
            })?;
            lexer.expect_space()?;
            let source = read_set_text(lexer)?;
            lexer.expect_space()?;
            let dest = read_set_text(lexer)?;
            ResponseCode::CopyUid {
                uidvalidity,
                source,
                dest,
            }
        }
        "MODIFIED" => {
            lexer.expect_space()?;
            ResponseCode::Modified(read_set_text(lexer)?)
        }
        _ => {
            skip_to_bracket(lexer);
            ResponseCode::Unknown(atom.to_string())
        }
    };

    skip_to_bracket(lexer);
    lexer.expect(Token::RBracket)?;
    Ok(code)
}

/// Reads a uid-set argument, which lexes as a number or an atom.
fn read_set_text(lexer: &mut Lexer<'_>) -> Result<String> {
    match lexer.next_token()? {
        Token::Number(n) => Ok(n.to_string()),
        Token::Atom(s) => Ok(s.to_string()),
        token => Err(Error::Parse {
            position: lexer.position(),
            message: format!("expected uid set, got {token:?}"),
        }),
    }
}

/// Drains unconsumed code arguments up to the closing bracket.
fn skip_to_bracket(lexer: &mut Lexer<'_>) {
    while !matches!(lexer.peek(), Some(b']') | None) {
        if lexer.next_token().is_err() {
            break;
        }
    }
}

fn parse_capability_list(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();
    while lexer.peek() == Some(b' ') {
        lexer.expect_space()?;
        if let Token::Atom(s) = lexer.next_token()? {
            caps.push(Capability::parse(s));
        }
    }
    Ok(caps)
}

pub(crate) fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;

    let mut flags = Flags::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            Token::Space => continue,
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("unexpected token in flag list: {token:?}"),
                });
            }
        }
    }
    Ok(flags)
}

fn parse_list_entry(lexer: &mut Lexer<'_>) -> Result<ListEntry> {
    lexer.expect(Token::LParen)?;
    let mut attributes = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => attributes.push(NameAttribute::parse(s)),
            Token::Space => continue,
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("unexpected token in name attributes: {token:?}"),
                });
            }
        }
    }

    lexer.expect_space()?;
    let delimiter = match lexer.next_token()? {
        Token::Nil => None,
        Token::QuotedString(s) => s.chars().next(),
        token => {
            return Err(Error::Parse {
                position: lexer.position(),
                message: format!("expected hierarchy delimiter, got {token:?}"),
            });
        }
    };

    lexer.expect_space()?;
    let name = lexer.read_astring()?;

    Ok(ListEntry {
        attributes,
        delimiter,
        mailbox: decode_mailbox(&name),
    })
}

fn parse_search_ids(lexer: &mut Lexer<'_>) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    while lexer.peek() == Some(b' ') {
        lexer.expect_space()?;
        match lexer.next_token()? {
            Token::Number(n) => ids.push(narrow(lexer, n)?),
            // MODSEQ tail or other extension data; nothing we track.
            _ => break,
        }
    }
    Ok(ids)
}

fn parse_status_data(lexer: &mut Lexer<'_>) -> Result<MailboxStatus> {
    let name = lexer.read_astring()?;
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;

    let mut status = MailboxStatus {
        mailbox: Some(decode_mailbox(&name)),
        ..MailboxStatus::default()
    };

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(item) => {
                lexer.expect_space()?;
                let value = lexer.read_number()?;
                match item.to_uppercase().as_str() {
                    "MESSAGES" => status.messages = narrow(lexer, value)?,
                    "RECENT" => status.recent = narrow(lexer, value)?,
                    "UNSEEN" => status.unseen = narrow(lexer, value)?,
                    "UIDNEXT" => status.uid_next = Uid::new(narrow(lexer, value)?),
                    "UIDVALIDITY" => status.uid_validity = UidValidity::new(narrow(lexer, value)?),
                    "HIGHESTMODSEQ" => status.highest_modseq = ModSeq::new(value),
                    _ => {}
                }
            }
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("unexpected token in STATUS items: {token:?}"),
                });
            }
        }
    }

    Ok(status)
}

fn parse_vanished(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    let mut earlier = false;
    if lexer.peek() == Some(b'(') {
        lexer.expect(Token::LParen)?;
        let word = lexer.read_atom_string()?;
        if !word.eq_ignore_ascii_case("EARLIER") {
            return Err(Error::Parse {
                position: lexer.position(),
                message: format!("unexpected VANISHED modifier {word}"),
            });
        }
        lexer.expect(Token::RParen)?;
        lexer.expect_space()?;
        earlier = true;
    }

    let set_text = lexer.read_text_line()?;
    let uids = SequenceSet::parse(set_text.trim())?;
    Ok(UntaggedResponse::Vanished { earlier, uids })
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

    fn parse(bytes: &[u8]) -> Response {
        ResponseParser::parse(bytes).unwrap()
    }

    fn untagged(bytes: &[u8]) -> UntaggedResponse {
        match parse(bytes) {
            Response::Untagged(data) => data,
            other => panic!("expected untagged response, got {other:?}"),
        }
    }

    mod tagged_tests {
        use super::*;

        #[test]
        fn ok_with_text() {
            match parse(b"a0001 OK LOGIN completed\r\n") {
                Response::Tagged {
                    tag,
                    status,
                    code,
                    text,
                } => {
                    assert_eq!(tag, "a0001");
                    assert_eq!(status, Status::Ok);
                    assert!(code.is_none());
                    assert_eq!(text, "LOGIN completed");
                }
                other => panic!("expected tagged response, got {other:?}"),
            }
        }

        #[test]
        fn no_with_trycreate() {
            match parse(b"a0042 NO [TRYCREATE] no such mailbox\r\n") {
                Response::Tagged { status, code, .. } => {
                    assert_eq!(status, Status::No);
                    assert_eq!(code, Some(ResponseCode::TryCreate));
                }
                other => panic!("expected tagged response, got {other:?}"),
            }
        }

        #[test]
        fn appenduid_code() {
            match parse(b"a0009 OK [APPENDUID 38505 3955] APPEND completed\r\n") {
                Response::Tagged { code, .. } => {
                    assert_eq!(
                        code,
                        Some(ResponseCode::AppendUid {
                            uidvalidity: UidValidity::new(38505).unwrap(),
                            uid: Uid::new(3955).unwrap(),
                        })
                    );
                }
                other => panic!("expected tagged response, got {other:?}"),
            }
        }

        #[test]
        fn copyuid_code_keeps_both_sets() {
            match parse(b"a0010 OK [COPYUID 38505 304,319:320 3956:3958] done\r\n") {
                Response::Tagged { code, .. } => {
                    assert_eq!(
                        code,
                        Some(ResponseCode::CopyUid {
                            uidvalidity: UidValidity::new(38505).unwrap(),
                            source: "304,319:320".to_string(),
                            dest: "3956:3958".to_string(),
                        })
                    );
                }
                other => panic!("expected tagged response, got {other:?}"),
            }
        }

        #[test]
        fn modified_code_reports_failed_stores() {
            match parse(b"a0011 OK [MODIFIED 7,9] conditional STORE failed\r\n") {
                Response::Tagged { code, .. } => {
                    assert_eq!(code, Some(ResponseCode::Modified("7,9".to_string())));
                }
                other => panic!("expected tagged response, got {other:?}"),
            }
        }
    }

    mod untagged_tests {
        use super::*;

        #[test]
        fn greeting_with_embedded_capabilities() {
            match untagged(b"* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] ready\r\n") {
                UntaggedResponse::Status { status, code, .. } => {
                    assert_eq!(status, Status::Ok);
                    match code {
                        Some(ResponseCode::Capability(caps)) => {
                            assert!(caps.contains(&Capability::StartTls));
                            assert!(caps.contains(&Capability::LoginDisabled));
                        }
                        other => panic!("expected capability code, got {other:?}"),
                    }
                }
                other => panic!("expected status, got {other:?}"),
            }
        }

        #[test]
        fn preauth_greeting() {
            match untagged(b"* PREAUTH ready, no login needed\r\n") {
                UntaggedResponse::Status { status, .. } => assert_eq!(status, Status::PreAuth),
                other => panic!("expected status, got {other:?}"),
            }
        }

        #[test]
        fn counts_and_expunge() {
            assert_eq!(untagged(b"* 23 EXISTS\r\n"), UntaggedResponse::Exists(23));
            assert_eq!(untagged(b"* 2 RECENT\r\n"), UntaggedResponse::Recent(2));
            assert_eq!(
                untagged(b"* 3 EXPUNGE\r\n"),
                UntaggedResponse::Expunge(SeqNum::new(3).unwrap())
            );
        }

        #[test]
        fn expunge_zero_is_rejected() {
            assert!(ResponseParser::parse(b"* 0 EXPUNGE\r\n").is_err());
        }

        #[test]
        fn fetch_with_modseq() {
            match untagged(b"* 4 FETCH (UID 8 MODSEQ (625) FLAGS (\\Seen))\r\n") {
                UntaggedResponse::Fetch { seq, data } => {
                    assert_eq!(seq.get(), 4);
                    assert_eq!(data.uid.unwrap().get(), 8);
                    assert_eq!(data.modseq.unwrap().get(), 625);
                }
                other => panic!("expected fetch, got {other:?}"),
            }
        }

        #[test]
        fn vanished_earlier() {
            match untagged(b"* VANISHED (EARLIER) 300:310,405,411\r\n") {
                UntaggedResponse::Vanished { earlier, uids } => {
                    assert!(earlier);
                    let ids: Vec<u32> = uids.iter(0).collect();
                    assert_eq!(ids.len(), 13);
                    assert_eq!(ids[0], 300);
                    assert_eq!(*ids.last().unwrap(), 411);
                }
                other => panic!("expected vanished, got {other:?}"),
            }
        }

        #[test]
        fn vanished_without_modifier() {
            match untagged(b"* VANISHED 405\r\n") {
                UntaggedResponse::Vanished { earlier, uids } => {
                    assert!(!earlier);
                    assert_eq!(uids.iter(0).collect::<Vec<_>>(), vec![405]);
                }
                other => panic!("expected vanished, got {other:?}"),
            }
        }

        #[test]
        fn list_decodes_mailbox_names() {
            match untagged(b"* LIST (\\HasNoChildren) \"/\" \"Entw&APw-rfe\"\r\n") {
                UntaggedResponse::List(entry) => {
                    assert_eq!(entry.mailbox.as_str(), "Entw\u{fc}rfe");
                    assert_eq!(entry.delimiter, Some('/'));
                    assert!(entry.attributes.contains(&NameAttribute::HasNoChildren));
                }
                other => panic!("expected list, got {other:?}"),
            }
        }

        #[test]
        fn lsub_row() {
            match untagged(b"* LSUB () \".\" INBOX.Sent\r\n") {
                UntaggedResponse::Lsub(entry) => {
                    assert_eq!(entry.mailbox.as_str(), "INBOX.Sent");
                    assert_eq!(entry.delimiter, Some('.'));
                }
                other => panic!("expected lsub, got {other:?}"),
            }
        }

        #[test]
        fn status_row() {
            let data = untagged(
                b"* STATUS blurdybloop (MESSAGES 231 UIDNEXT 44292 HIGHESTMODSEQ 7011231777)\r\n",
            );
            match data {
                UntaggedResponse::StatusData(status) => {
                    assert_eq!(status.mailbox.unwrap().as_str(), "blurdybloop");
                    assert_eq!(status.messages, 231);
                    assert_eq!(status.uid_next.unwrap().get(), 44292);
                    assert_eq!(status.highest_modseq.unwrap().get(), 7011231777);
                }
                other => panic!("expected status data, got {other:?}"),
            }
        }

        #[test]
        fn search_ids() {
            assert_eq!(
                untagged(b"* SEARCH 2 84 882\r\n"),
                UntaggedResponse::Search(vec![2, 84, 882])
            );
            assert_eq!(
                untagged(b"* SEARCH\r\n"),
                UntaggedResponse::Search(Vec::new())
            );
        }

        #[test]
        fn enabled_extensions() {
            match untagged(b"* ENABLED CONDSTORE QRESYNC\r\n") {
                UntaggedResponse::Enabled(caps) => {
                    assert!(caps.contains(&Capability::CondStore));
                    assert!(caps.contains(&Capability::QResync));
                }
                other => panic!("expected enabled, got {other:?}"),
            }
        }

        #[test]
        fn unknown_data_is_kept_not_rejected() {
            match untagged(b"* NAMESPACE ((\"\" \"/\")) NIL NIL\r\n") {
                UntaggedResponse::Unknown(text) => assert!(text.starts_with("NAMESPACE")),
                other => panic!("expected unknown, got {other:?}"),
            }
        }
    }

    mod continuation_tests {
        use super::*;

        #[test]
        fn with_prompt() {
            assert_eq!(
                parse(b"+ Ready for literal\r\n"),
                Response::Continuation {
                    text: Some("Ready for literal".to_string())
                }
            );
        }

        #[test]
        fn bare() {
            assert_eq!(parse(b"+\r\n"), Response::Continuation { text: None });
        }
    }
}
