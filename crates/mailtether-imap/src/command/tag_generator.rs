//! Command tag generation.
//!
//! Tags match completions to the commands that caused them. They only
//! need to be unique among in-flight commands, so the counter wraps; the
//! queue is far too small for a live tag to collide with its reuse.

use std::sync::atomic::{AtomicU32, Ordering};

/// Span of the tag counter; tags repeat after this many commands.
const TAG_SPAN: u32 = 10_000;

/// Generates tags in the form `a0000`, `a0001`, ... wrapping at
/// [`TAG_SPAN`].
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a generator with the given prefix character.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            counter: AtomicU32::new(0),
            prefix,
        }
    }

    /// Generates the next tag.
    #[must_use]
    pub fn next(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) % TAG_SPAN;
        format!("{}{:04}", self.prefix, n)
    }

    /// The number of tags issued so far.
    #[must_use]
    pub fn issued(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Restarts the sequence. Used when a fresh connection replaces a
    /// broken one.
    pub fn reset(&self) {
        self.counter.store(0, Ordering::Relaxed);
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('a')
    }
}

impl Clone for TagGenerator {
    fn clone(&self) -> Self {
        Self {
            counter: AtomicU32::new(self.counter.load(Ordering::Relaxed)),
            prefix: self.prefix,
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
    use super::*;

    #[test]
    fn sequence_is_zero_padded() {
        let generator = TagGenerator::default();
        assert_eq!(generator.next(), "a0000");
        assert_eq!(generator.next(), "a0001");
        assert_eq!(generator.next(), "a0002");
    }

    #[test]
    fn custom_prefix() {
        let generator = TagGenerator::new('t');
        assert_eq!(generator.next(), "t0000");
        assert_eq!(generator.next(), "t0001");
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let generator = TagGenerator::default();
        let _ = generator.next();
        let _ = generator.next();
        generator.reset();
        assert_eq!(generator.next(), "a0000");
    }

    #[test]
    fn tags_are_unique_within_the_span() {
        let generator = TagGenerator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..TAG_SPAN {
            assert!(seen.insert(generator.next()), "duplicate tag inside span");
        }
    }

    #[test]
    fn counter_wraps_instead_of_growing_a_fifth_digit() {
        let generator = TagGenerator::default();
        for _ in 0..TAG_SPAN {
            let _ = generator.next();
        }
        assert_eq!(generator.next(), "a0000");
        assert_eq!(generator.issued(), TAG_SPAN + 1);
    }
}
