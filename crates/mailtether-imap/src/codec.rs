//! Mailbox-name transcoding.
//!
//! Mailbox names travel in the modified UTF-7 of RFC 3501 section
//! 5.1.3: printable ASCII stays as-is, `&` escapes to `&-`, and
//! everything else rides in base64-coded UTF-16BE shift sequences
//! bracketed by `&` and `-`. Names embedded in commands additionally
//! need quoting.

use base64::engine::general_purpose;
use base64::{Engine as _, alphabet, engine};

use crate::error::{Error, Result};

/// Shift-sequence alphabet. Same as standard base64 except `,`
/// replaces `/`, which is reserved as the hierarchy delimiter.
const MUTF7_ALPHABET: alphabet::Alphabet = match alphabet::Alphabet::new(
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+,",
) {
    Ok(alphabet) => alphabet,
    Err(_) => panic!("alphabet is 64 unique ASCII bytes"),
};

const MUTF7: engine::GeneralPurpose =
    engine::GeneralPurpose::new(&MUTF7_ALPHABET, general_purpose::NO_PAD);

/// Encodes a decoded (UTF-8) mailbox name for the wire.
///
/// Total over all input. The output is minimal: direct characters are
/// never shifted and every shift sequence carries at least one unit.
#[must_use]
pub fn encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending = String::new();
    for ch in name.chars() {
        if ch == '&' {
            flush_shift(&mut out, &mut pending);
            out.push_str("&-");
        } else if matches!(ch, ' '..='~') {
            flush_shift(&mut out, &mut pending);
            out.push(ch);
        } else {
            pending.push(ch);
        }
    }
    flush_shift(&mut out, &mut pending);
    out
}

fn flush_shift(out: &mut String, pending: &mut String) {
    if pending.is_empty() {
        return;
    }
    let mut payload = Vec::with_capacity(pending.len() * 2);
    for unit in pending.encode_utf16() {
        payload.extend_from_slice(&unit.to_be_bytes());
    }
    out.push('&');
    out.push_str(&MUTF7.encode(payload));
    out.push('-');
    pending.clear();
}

/// Decodes a wire mailbox name back to UTF-8.
///
/// Fails on unterminated or undecodable shift sequences and on raw
/// 8-bit bytes, which well-formed names never contain.
pub fn decode(wire: &str) -> Result<String> {
    let bytes = wire.as_bytes();
    let mut out = String::with_capacity(wire.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'&' {
            let Some(len) = bytes[i + 1..].iter().position(|&c| c == b'-') else {
                return Err(Error::Parse {
                    position: i,
                    message: "unterminated shift sequence".to_string(),
                });
            };
            let end = i + 1 + len;
            if len == 0 {
                out.push('&');
            } else {
                out.push_str(&decode_shift(&wire[i + 1..end], i + 1)?);
            }
            i = end + 1;
        } else if (0x20..0x7F).contains(&b) {
            out.push(b as char);
            i += 1;
        } else {
            return Err(Error::Parse {
                position: i,
                message: "raw non-ASCII byte in mailbox name".to_string(),
            });
        }
    }
    Ok(out)
}

fn decode_shift(chunk: &str, position: usize) -> Result<String> {
    let raw = MUTF7.decode(chunk).map_err(|_| Error::Parse {
        position,
        message: "invalid base64 in shift sequence".to_string(),
    })?;
    if raw.len() % 2 != 0 {
        return Err(Error::Parse {
            position,
            message: "shift sequence is not whole UTF-16 units".to_string(),
        });
    }
    let units: Vec<u16> = raw
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| Error::Parse {
        position,
        message: "invalid UTF-16 in shift sequence".to_string(),
    })
}

/// Wraps an already-encoded name in quotes, escaping `"` and `\`.
#[must_use]
pub fn quote(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('"');
    for ch in name.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Strips quoting applied by [`quote`]. Unquoted input passes through.
#[must_use]
pub fn unquote(text: &str) -> String {
    let inner = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);
    let mut out = String::with_capacity(inner.len());
    let mut escaped = false;
    for ch in inner.chars() {
        if escaped {
            out.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else {
            out.push(ch);
        }
    }
    out
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
    use proptest::prelude::*;

    use super::*;

    mod encode_tests {
        use super::*;

        #[test]
        fn ascii_passes_through() {
            assert_eq!(encode("INBOX"), "INBOX");
            assert_eq!(encode("Sent Items"), "Sent Items");
        }

        #[test]
        fn ampersand_escapes() {
            assert_eq!(encode("Lost & Found"), "Lost &- Found");
        }

        #[test]
        fn rfc_examples() {
            assert_eq!(
                encode("~peter/mail/\u{53f0}\u{5317}/\u{65e5}\u{672c}\u{8a9e}"),
                "~peter/mail/&U,BTFw-/&ZeVnLIqe-"
            );
            assert_eq!(encode("\u{263a}!"), "&Jjo-!");
        }

        #[test]
        fn adjacent_indirect_characters_share_one_shift() {
            assert_eq!(
                encode("\u{53f0}\u{5317}\u{65e5}\u{672c}\u{8a9e}"),
                "&U,BTF2XlZyyKng-"
            );
        }
    }

    mod decode_tests {
        use super::*;

        #[test]
        fn ascii_passes_through() {
            assert_eq!(decode("INBOX").unwrap(), "INBOX");
        }

        #[test]
        fn escaped_ampersand() {
            assert_eq!(decode("Lost &- Found").unwrap(), "Lost & Found");
        }

        #[test]
        fn rfc_examples() {
            assert_eq!(
                decode("~peter/mail/&U,BTFw-/&ZeVnLIqe-").unwrap(),
                "~peter/mail/\u{53f0}\u{5317}/\u{65e5}\u{672c}\u{8a9e}"
            );
        }

        #[test]
        fn rejects_unterminated_shift() {
            assert!(decode("&Jjo").is_err());
        }

        #[test]
        fn rejects_raw_eight_bit() {
            assert!(decode("caf\u{e9}").is_err());
        }

        #[test]
        fn rejects_bad_base64() {
            assert!(decode("&/xx-").is_err());
        }
    }

    mod quote_tests {
        use super::*;

        #[test]
        fn wraps_and_escapes() {
            assert_eq!(quote("Sent Items"), "\"Sent Items\"");
            assert_eq!(quote("a\"b"), "\"a\\\"b\"");
            assert_eq!(quote("a\\b"), "\"a\\\\b\"");
        }

        #[test]
        fn unquote_reverses_quote() {
            for name in ["Sent Items", "a\"b", "a\\b", ""] {
                assert_eq!(unquote(&quote(name)), name);
            }
        }

        #[test]
        fn unquote_passes_bare_atoms() {
            assert_eq!(unquote("INBOX"), "INBOX");
        }

        #[test]
        fn quoted_name_survives_the_full_path() {
            let quoted = quote(&encode("Sent Items"));
            assert_eq!(decode(&unquote(&quoted)).unwrap(), "Sent Items");
        }
    }

    proptest! {
        #[test]
        fn encoding_is_reversible(s in ".*") {
            prop_assert_eq!(decode(&encode(&s)).unwrap(), s);
        }

        #[test]
        fn quoting_is_reversible(s in ".*") {
            prop_assert_eq!(unquote(&quote(&s)), s);
        }
    }
}
