//! Tokenizer for server response lines.
//!
//! Breaks one complete response (a line plus any literals it carries)
//! into protocol tokens. The framing layer guarantees completeness, so
//! a literal prefix here always has its payload in the buffer.

#![allow(clippy::missing_errors_doc)]

use crate::error::{Error, Result};

/// Token produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Unquoted run of atom characters.
    Atom(&'a str),
    /// Quoted string, unescaped.
    QuotedString(String),
    /// Literal payload, byte-exact.
    Literal(Vec<u8>),
    /// Unsigned number. 64-bit to cover mod-sequences.
    Number(u64),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// Single space.
    Space,
    /// `*`, the untagged prefix.
    Asterisk,
    /// `+`, the continuation prefix.
    Plus,
    /// The NIL atom.
    Nil,
    /// Line terminator.
    Crlf,
    /// End of input.
    Eof,
}

/// Cursor over one response's bytes.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer over the given response bytes.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Current byte offset.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Peeks at the current byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        match byte {
            b'\r' => {
                if self.peek_at(1) == Some(b'\n') {
                    self.skip(2);
                    Ok(Token::Crlf)
                } else {
                    Err(self.error("expected LF after CR"))
                }
            }
            b' ' => {
                self.advance();
                Ok(Token::Space)
            }
            b'(' => {
                self.advance();
                Ok(Token::LParen)
            }
            b')' => {
                self.advance();
                Ok(Token::RParen)
            }
            b'[' => {
                self.advance();
                Ok(Token::LBracket)
            }
            b']' => {
                self.advance();
                Ok(Token::RBracket)
            }
            b'*' => {
                self.advance();
                Ok(Token::Asterisk)
            }
            b'+' => {
                self.advance();
                Ok(Token::Plus)
            }
            b'"' => self.read_quoted_string(),
            b'{' => self.read_literal(),
            b'0'..=b'9' => self.read_number_or_atom(),
            _ if is_atom_char(byte) => self.read_atom(),
            _ => Err(self.error(&format!("unexpected byte {byte:#04x}"))),
        }
    }

    fn read_quoted_string(&mut self) -> Result<Token<'a>> {
        self.advance();

        let mut result = Vec::new();
        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    Some(c @ (b'"' | b'\\')) => result.push(c),
                    Some(c) => return Err(self.error(&format!("invalid escape \\{}", c as char))),
                    None => return Err(self.error("unterminated quoted string")),
                },
                Some(c) => result.push(c),
                None => return Err(self.error("unterminated quoted string")),
            }
        }

        let s =
            String::from_utf8(result).map_err(|_| self.error("invalid UTF-8 in quoted string"))?;
        Ok(Token::QuotedString(s))
    }

    /// Reads `{n}` CRLF plus exactly n payload bytes.
    fn read_literal(&mut self) -> Result<Token<'a>> {
        self.advance();

        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error("missing literal size"));
        }
        let size: usize = std::str::from_utf8(&self.input[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| self.error("invalid literal size"))?;

        if self.advance() != Some(b'}') {
            return Err(self.error("expected } after literal size"));
        }
        if self.advance() != Some(b'\r') || self.advance() != Some(b'\n') {
            return Err(self.error("expected CRLF after literal size"));
        }
        if self.pos + size > self.input.len() {
            return Err(self.error("literal payload truncated"));
        }

        let data = self.input[self.pos..self.pos + size].to_vec();
        self.skip(size);
        Ok(Token::Literal(data))
    }

    fn read_number_or_atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        let mut all_digits = true;

        while let Some(b) = self.peek() {
            if is_atom_char(b) {
                if !b.is_ascii_digit() {
                    all_digits = false;
                }
                self.advance();
            } else {
                break;
            }
        }

        let s = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("invalid UTF-8 in atom"))?;

        if all_digits {
            let n: u64 = s.parse().map_err(|_| self.error("number too large"))?;
            Ok(Token::Number(n))
        } else {
            Ok(Token::Atom(s))
        }
    }

    fn read_atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if is_atom_char(b) {
                self.advance();
            } else {
                break;
            }
        }

        let s = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("invalid UTF-8 in atom"))?;

        if s.eq_ignore_ascii_case("NIL") {
            Ok(Token::Nil)
        } else {
            Ok(Token::Atom(s))
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// Consumes one token and checks its kind.
    #[allow(clippy::needless_pass_by_value)]
    pub fn expect(&mut self, expected: Token<'_>) -> Result<()> {
        let token = self.next_token()?;
        if std::mem::discriminant(&token) == std::mem::discriminant(&expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {expected:?}, got {token:?}")))
        }
    }

    /// Consumes a single space.
    pub fn expect_space(&mut self) -> Result<()> {
        self.expect(Token::Space)
    }

    /// Reads an atom, quoted string or literal as text.
    ///
    /// All-digit names lex as numbers and a name spelled `NIL` lexes as
    /// NIL; both are valid astrings and come back as their text.
    pub fn read_astring(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::QuotedString(s) => Ok(s),
            Token::Literal(data) => {
                String::from_utf8(data).map_err(|_| self.error("invalid UTF-8 in literal"))
            }
            Token::Number(n) => Ok(n.to_string()),
            Token::Nil => Ok("NIL".to_string()),
            token => Err(self.error(&format!("expected astring, got {token:?}"))),
        }
    }

    /// Reads NIL or a string.
    pub fn read_nstring(&mut self) -> Result<Option<String>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::Atom(s) => Ok(Some(s.to_string())),
            Token::QuotedString(s) => Ok(Some(s)),
            Token::Literal(data) => String::from_utf8(data)
                .map(Some)
                .map_err(|_| self.error("invalid UTF-8 in literal")),
            Token::Number(n) => Ok(Some(n.to_string())),
            token => Err(self.error(&format!("expected nstring, got {token:?}"))),
        }
    }

    /// Reads a number of any width.
    pub fn read_number(&mut self) -> Result<u64> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            token => Err(self.error(&format!("expected number, got {token:?}"))),
        }
    }

    /// Reads a number that must fit 32 bits (sequence numbers, UIDs).
    pub fn read_number_u32(&mut self) -> Result<u32> {
        let n = self.read_number()?;
        u32::try_from(n).map_err(|_| self.error("number exceeds 32 bits"))
    }

    /// Reads a bare atom, borrowing from the input.
    pub fn read_atom_string(&mut self) -> Result<&'a str> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s),
            token => Err(self.error(&format!("expected atom, got {token:?}"))),
        }
    }

    /// Consumes the rest of the line as free text, dropping the CRLF.
    pub fn read_text_line(&mut self) -> Result<String> {
        let start = self.pos;
        let end = self.input[start..]
            .windows(2)
            .position(|w| w == b"\r\n")
            .map_or(self.input.len(), |rel| start + rel);
        let text = std::str::from_utf8(&self.input[start..end])
            .map_err(|_| self.error("invalid UTF-8 in response text"))?
            .to_string();
        self.pos = (end + 2).min(self.input.len());
        Ok(text)
    }

    /// Skips any run of spaces.
    pub fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.advance();
        }
    }
}

/// Whether the byte may appear in an atom.
///
/// `\` is admitted so flags like `\Seen` lex as one token, although the
/// grammar lists it as a quoted-special.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b,
        0x21 | 0x23 | 0x24 | 0x26 | 0x27 |
        0x2B..=0x5A |
        0x5C |
        0x5E..=0x7A |
        0x7C |
        0x7E
    )
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
    fn untagged_prefix() {
        let mut lexer = Lexer::new(b"* OK");
        assert_eq!(lexer.next_token().unwrap(), Token::Asterisk);
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("OK"));
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn tagged_line_tokenizes_through_crlf() {
        let mut lexer = Lexer::new(b"a0007 NO [TRYCREATE] no such mailbox\r\n");
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("a0007"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("NO"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::LBracket);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("TRYCREATE"));
        assert_eq!(lexer.next_token().unwrap(), Token::RBracket);
    }

    #[test]
    fn numbers_are_sixty_four_bit() {
        let mut lexer = Lexer::new(b"90060115194045027");
        assert_eq!(lexer.next_token().unwrap(), Token::Number(90060115194045027));
    }

    #[test]
    fn read_number_u32_rejects_wide_values() {
        let mut lexer = Lexer::new(b"4294967296");
        assert!(lexer.read_number_u32().is_err());
    }

    #[test]
    fn quoted_string_unescapes() {
        let mut lexer = Lexer::new(b"\"a \\\"b\\\" \\\\c\"");
        assert_eq!(
            lexer.next_token().unwrap(),
            Token::QuotedString("a \"b\" \\c".to_string())
        );
    }

    #[test]
    fn literal_carries_exact_payload() {
        let mut lexer = Lexer::new(b"{11}\r\nhello\r\nwait rest");
        match lexer.next_token().unwrap() {
            Token::Literal(data) => assert_eq!(data, b"hello\r\nwait"),
            other => panic!("expected literal, got {other:?}"),
        }
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("rest"));
    }

    #[test]
    fn truncated_literal_is_an_error() {
        let mut lexer = Lexer::new(b"{10}\r\nshort");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn flags_lex_as_single_atoms() {
        let mut lexer = Lexer::new(b"(\\Seen \\Flagged)");
        assert_eq!(lexer.next_token().unwrap(), Token::LParen);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("\\Seen"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("\\Flagged"));
        assert_eq!(lexer.next_token().unwrap(), Token::RParen);
    }

    #[test]
    fn nil_is_case_insensitive() {
        let mut lexer = Lexer::new(b"NIL nil");
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
    }

    #[test]
    fn read_text_line_stops_at_crlf() {
        let mut lexer = Lexer::new(b"IDLE terminated\r\n");
        assert_eq!(lexer.read_text_line().unwrap(), "IDLE terminated");
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn percent_and_star_are_not_atom_chars() {
        assert!(is_atom_char(b'A'));
        assert!(is_atom_char(b':'));
        assert!(is_atom_char(b'\\'));
        assert!(!is_atom_char(b'%'));
        assert!(!is_atom_char(b'*'));
        assert!(!is_atom_char(b' '));
        assert!(!is_atom_char(b'('));
    }
}
