//! FETCH response parsing.

use crate::error::{Error, Result};
use crate::parser::lexer::{Lexer, Token};
use crate::types::{Flags, ModSeq, Uid};

use super::parse_flag_list;

/// Data items carried by one FETCH response.
///
/// Servers send any subset, in any order, and may volunteer items that
/// were not asked for. Unrecognized items are skipped structurally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchData {
    /// Stable identifier of the message.
    pub uid: Option<Uid>,
    /// Current flag set. `Some` even when empty, if FLAGS was present.
    pub flags: Option<Flags>,
    /// Mod-sequence of the most recent change.
    pub modseq: Option<ModSeq>,
    /// Message size in octets.
    pub size: Option<u32>,
    /// Server-assigned arrival date, verbatim.
    pub internal_date: Option<String>,
    /// Header block from a `BODY[HEADER...]` item, byte-exact.
    pub headers: Option<Vec<u8>>,
    /// Message payload from a `BODY[]` or `BODY[TEXT]` item.
    pub body: Option<Vec<u8>>,
}

/// Parses the parenthesized item list of a FETCH response.
pub fn parse_fetch_data(lexer: &mut Lexer<'_>) -> Result<FetchData> {
    lexer.expect(Token::LParen)?;

    let mut data = FetchData::default();

    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => continue,
            Token::Atom(name) => match name.to_uppercase().as_str() {
                "UID" => {
                    lexer.expect_space()?;
                    let n = lexer.read_number_u32()?;
                    data.uid = Some(Uid::new(n).ok_or_else(|| Error::Parse {
                        position: lexer.position(),
                        message: "UID cannot be 0".to_string(),
                    })?);
                }
                "FLAGS" => {
                    lexer.expect_space()?;
                    data.flags = Some(parse_flag_list(lexer)?);
                }
                "MODSEQ" => {
                    lexer.expect_space()?;
                    lexer.expect(Token::LParen)?;
                    let n = lexer.read_number()?;
                    lexer.expect(Token::RParen)?;
                    data.modseq = ModSeq::new(n);
                }
                "RFC822.SIZE" => {
                    lexer.expect_space()?;
                    data.size = Some(lexer.read_number_u32()?);
                }
                "INTERNALDATE" => {
                    lexer.expect_space()?;
                    if let Token::QuotedString(date) = lexer.next_token()? {
                        data.internal_date = Some(date);
                    }
                }
                "BODY" | "RFC822" | "RFC822.HEADER" | "RFC822.TEXT" => {
                    let section = read_section(lexer)?;
                    lexer.expect_space()?;
                    let payload = match lexer.next_token()? {
                        Token::Literal(bytes) => Some(bytes),
                        Token::QuotedString(s) => Some(s.into_bytes()),
                        Token::Nil => None,
                        token => {
                            return Err(Error::Parse {
                                position: lexer.position(),
                                message: format!("expected body payload, got {token:?}"),
                            });
                        }
                    };
                    if is_header_section(name, section.as_deref()) {
                        data.headers = payload;
                    } else {
                        data.body = payload;
                    }
                }
                _ => skip_fetch_item(lexer)?,
            },
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("unexpected token in FETCH items: {token:?}"),
                });
            }
        }
    }

    Ok(data)
}

fn is_header_section(item: &str, section: Option<&str>) -> bool {
    item.eq_ignore_ascii_case("RFC822.HEADER")
        || section.is_some_and(|s| s.to_uppercase().contains("HEADER"))
}

/// Consumes an optional `[section]` and discards any `<origin>` suffix.
fn read_section(lexer: &mut Lexer<'_>) -> Result<Option<String>> {
    let mut section = None;

    if lexer.peek() == Some(b'[') {
        lexer.expect(Token::LBracket)?;
        let mut buf = String::new();
        loop {
            match lexer.next_token()? {
                Token::RBracket => break,
                Token::Atom(s) => buf.push_str(s),
                Token::Number(n) => buf.push_str(&n.to_string()),
                Token::Space => buf.push(' '),
                Token::LParen => buf.push('('),
                Token::RParen => buf.push(')'),
                Token::QuotedString(s) => buf.push_str(&s),
                token => {
                    return Err(Error::Parse {
                        position: lexer.position(),
                        message: format!("unexpected token in body section: {token:?}"),
                    });
                }
            }
        }
        if !buf.is_empty() {
            section = Some(buf);
        }
    }

    // Partial-fetch origin, e.g. <0>, lexes as one atom. Not tracked.
    if lexer.peek() == Some(b'<') {
        let _ = lexer.next_token()?;
    }

    Ok(section)
}

/// Skips one unrecognized item value, balancing parentheses and
/// consuming literals whole.
fn skip_fetch_item(lexer: &mut Lexer<'_>) -> Result<()> {
    if lexer.peek() == Some(b' ') {
        lexer.expect_space()?;
    }

    let mut depth: u32 = 0;
    loop {
        match lexer.peek() {
            Some(b'(') => {
                depth += 1;
                lexer.expect(Token::LParen)?;
            }
            Some(b')') => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
                lexer.expect(Token::RParen)?;
            }
            Some(b' ') if depth == 0 => break,
            Some(b'{') => {
                let _ = lexer.next_token()?;
            }
            Some(_) => {
                let _ = lexer.next_token()?;
            }
            None => break,
        }
    }

    Ok(())
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
    use crate::types::Flag;

    use super::*;

    fn parse(bytes: &[u8]) -> FetchData {
        let mut lexer = Lexer::new(bytes);
        parse_fetch_data(&mut lexer).unwrap()
    }

    #[test]
    fn uid_and_flags() {
        let data = parse(b"(UID 123 FLAGS (\\Seen \\Flagged))");
        assert_eq!(data.uid.unwrap().get(), 123);
        let flags = data.flags.unwrap();
        assert!(flags.contains(&Flag::Seen));
        assert!(flags.contains(&Flag::Flagged));
    }

    #[test]
    fn empty_flag_list_is_still_present() {
        let data = parse(b"(UID 9 FLAGS ())");
        assert!(data.flags.unwrap().is_empty());
    }

    #[test]
    fn uid_zero_is_rejected() {
        let mut lexer = Lexer::new(b"(UID 0)");
        assert!(parse_fetch_data(&mut lexer).is_err());
    }

    #[test]
    fn modseq_uses_parenthesized_form() {
        let data = parse(b"(MODSEQ (90060115194045027))");
        assert_eq!(data.modseq.unwrap().get(), 90060115194045027);
    }

    #[test]
    fn size_and_internal_date() {
        let data = parse(b"(RFC822.SIZE 44827 INTERNALDATE \"17-Jul-2023 02:44:25 -0700\")");
        assert_eq!(data.size, Some(44827));
        assert_eq!(
            data.internal_date.as_deref(),
            Some("17-Jul-2023 02:44:25 -0700")
        );
    }

    #[test]
    fn header_fields_literal_lands_in_headers() {
        let data = parse(b"(UID 7 BODY[HEADER.FIELDS (SUBJECT)] {17}\r\nSubject: hi\r\n\r\n\r\n)");
        assert_eq!(data.uid.unwrap().get(), 7);
        assert_eq!(data.headers.as_deref(), Some(&b"Subject: hi\r\n\r\n\r\n"[..]));
        assert!(data.body.is_none());
    }

    #[test]
    fn full_body_literal_lands_in_body() {
        let data = parse(b"(UID 8 BODY[] {13}\r\nhello, world!)");
        assert_eq!(data.body.as_deref(), Some(&b"hello, world!"[..]));
        assert!(data.headers.is_none());
    }

    #[test]
    fn nil_body_stays_absent() {
        let data = parse(b"(BODY[] NIL)");
        assert!(data.body.is_none());
    }

    #[test]
    fn unknown_items_are_skipped_structurally() {
        let data = parse(b"(X-GM-LABELS (\"\\\\Inbox\" work) UID 55 X-GM-THRID 17230)");
        assert_eq!(data.uid.unwrap().get(), 55);
    }

    #[test]
    fn unknown_item_with_literal_is_skipped_whole() {
        let data = parse(b"(X-RAW {6}\r\na (b c UID 91)");
        assert_eq!(data.uid.unwrap().get(), 91);
    }
}
