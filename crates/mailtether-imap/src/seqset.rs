//! Compact message-number set expressions.
//!
//! A sequence set is the wire form `1:3,5,9:*` used to address messages
//! by sequence number or UID. Sets are validated when constructed and
//! expanded lazily, one identifier at a time, in the order declared.

use crate::error::{Error, Result};
use crate::types::Uid;

/// One bound of a range. `*` stands for the session maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Num(u32),
    Star,
}

/// One comma-separated item. A single number is a range with `lo == hi`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    lo: Bound,
    hi: Bound,
}

impl Entry {
    const fn span(lo: u32, hi: u32) -> Self {
        Self {
            lo: Bound::Num(lo),
            hi: Bound::Num(hi),
        }
    }
}

/// A validated sequence-set expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceSet {
    entries: Vec<Entry>,
}

impl SequenceSet {
    /// Parses a wire expression.
    ///
    /// Malformed input fails here, never mid-iteration. The reported
    /// position is the byte offset of the offending token.
    pub fn parse(expr: &str) -> Result<Self> {
        let mut entries = Vec::new();
        let mut pos = 0usize;
        for item in expr.split(',') {
            if item.is_empty() {
                return Err(Error::Parse {
                    position: pos,
                    message: "empty sequence item".to_string(),
                });
            }
            let entry = match item.find(':') {
                None => {
                    let bound = parse_bound(item, pos)?;
                    Entry {
                        lo: bound,
                        hi: bound,
                    }
                }
                Some(colon) => {
                    let hi_text = &item[colon + 1..];
                    if hi_text.contains(':') {
                        return Err(Error::Parse {
                            position: pos + colon + 1,
                            message: "range has more than two bounds".to_string(),
                        });
                    }
                    Entry {
                        lo: parse_bound(&item[..colon], pos)?,
                        hi: parse_bound(hi_text, pos + colon + 1)?,
                    }
                }
            };
            entries.push(entry);
            pos += item.len() + 1;
        }
        Ok(Self { entries })
    }

    /// Set containing a single identifier. Zero is not a valid identifier.
    #[must_use]
    pub fn single(id: u32) -> Option<Self> {
        (id != 0).then(|| Self {
            entries: vec![Entry::span(id, id)],
        })
    }

    /// Set covering an inclusive range. Iterates descending when `hi < lo`.
    #[must_use]
    pub fn range(lo: u32, hi: u32) -> Option<Self> {
        (lo != 0 && hi != 0).then(|| Self {
            entries: vec![Entry::span(lo, hi)],
        })
    }

    /// The whole-mailbox set `1:*`.
    #[must_use]
    pub fn all() -> Self {
        Self {
            entries: vec![Entry {
                lo: Bound::Num(1),
                hi: Bound::Star,
            }],
        }
    }

    /// Builds the most compact set covering the given UIDs.
    ///
    /// Input order does not matter; duplicates collapse. The result
    /// renders ascending, adjacent runs folded into ranges.
    #[must_use]
    pub fn from_uids(uids: impl IntoIterator<Item = Uid>) -> Self {
        Self::from_ids(uids.into_iter().map(Uid::get))
    }

    /// Builds the most compact set covering the given raw identifiers,
    /// sequence numbers or UIDs alike. Zeros are not identifiers and are
    /// dropped.
    #[must_use]
    pub fn from_ids(ids: impl IntoIterator<Item = u32>) -> Self {
        let mut ids: Vec<u32> = ids.into_iter().filter(|&n| n != 0).collect();
        ids.sort_unstable();
        ids.dedup();

        let mut entries = Vec::new();
        let mut run: Option<(u32, u32)> = None;
        for id in ids {
            match &mut run {
                Some((_, hi)) if id - *hi == 1 => *hi = id,
                _ => {
                    if let Some((lo, hi)) = run.take() {
                        entries.push(Entry::span(lo, hi));
                    }
                    run = Some((id, id));
                }
            }
        }
        if let Some((lo, hi)) = run {
            entries.push(Entry::span(lo, hi));
        }
        Self { entries }
    }

    /// True when the set denotes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lazily expands the set with `*` standing for `max`.
    ///
    /// With `max == 0` (nothing in the mailbox) items containing `*`
    /// denote nothing and are skipped. The iterator is finite and
    /// one-shot.
    #[must_use]
    pub fn iter(&self, max: u32) -> SeqSetIter<'_> {
        SeqSetIter {
            entries: self.entries.iter(),
            current: None,
            max,
        }
    }
}

impl std::fmt::Display for SequenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if entry.lo == entry.hi {
                write_bound(f, entry.lo)?;
            } else {
                write_bound(f, entry.lo)?;
                f.write_str(":")?;
                write_bound(f, entry.hi)?;
            }
        }
        Ok(())
    }
}

fn write_bound(f: &mut std::fmt::Formatter<'_>, bound: Bound) -> std::fmt::Result {
    match bound {
        Bound::Num(n) => write!(f, "{n}"),
        Bound::Star => f.write_str("*"),
    }
}

fn parse_bound(text: &str, position: usize) -> Result<Bound> {
    if text == "*" {
        return Ok(Bound::Star);
    }
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Parse {
            position,
            message: format!("invalid sequence number {text:?}"),
        });
    }
    let n: u32 = text.parse().map_err(|_| Error::Parse {
        position,
        message: format!("sequence number {text:?} out of range"),
    })?;
    if n == 0 {
        return Err(Error::Parse {
            position,
            message: "sequence numbers start at 1".to_string(),
        });
    }
    Ok(Bound::Num(n))
}

/// Lazy expansion of a [`SequenceSet`].
#[derive(Debug)]
pub struct SeqSetIter<'a> {
    entries: std::slice::Iter<'a, Entry>,
    current: Option<Run>,
    max: u32,
}

#[derive(Debug, Clone, Copy)]
struct Run {
    next: u32,
    last: u32,
    descending: bool,
    exhausted: bool,
}

impl SeqSetIter<'_> {
    fn resolve(&self, bound: Bound) -> Option<u32> {
        match bound {
            Bound::Num(n) => Some(n),
            Bound::Star => (self.max > 0).then_some(self.max),
        }
    }
}

impl Iterator for SeqSetIter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        loop {
            if let Some(run) = &mut self.current {
                if run.exhausted {
                    self.current = None;
                    continue;
                }
                let value = run.next;
                if value == run.last {
                    run.exhausted = true;
                } else if run.descending {
                    run.next -= 1;
                } else {
                    run.next += 1;
                }
                return Some(value);
            }
            let entry = self.entries.next()?;
            let (Some(lo), Some(hi)) = (self.resolve(entry.lo), self.resolve(entry.hi)) else {
                continue;
            };
            self.current = Some(Run {
                next: lo,
                last: hi,
                descending: hi < lo,
                exhausted: false,
            });
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
    use proptest::prelude::*;

    use super::*;

    fn expand(expr: &str, max: u32) -> Vec<u32> {
        SequenceSet::parse(expr).unwrap().iter(max).collect()
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn accepts_singles_ranges_and_stars() {
            assert!(SequenceSet::parse("1").is_ok());
            assert!(SequenceSet::parse("1:5").is_ok());
            assert!(SequenceSet::parse("*").is_ok());
            assert!(SequenceSet::parse("1:*").is_ok());
            assert!(SequenceSet::parse("*:4").is_ok());
            assert!(SequenceSet::parse("1:3,5,9:*").is_ok());
        }

        #[test]
        fn rejects_zero() {
            assert!(SequenceSet::parse("0").is_err());
            assert!(SequenceSet::parse("0:5").is_err());
        }

        #[test]
        fn rejects_empty_items() {
            assert!(SequenceSet::parse("").is_err());
            assert!(SequenceSet::parse("1,,3").is_err());
            assert!(SequenceSet::parse("1,").is_err());
            assert!(SequenceSet::parse("1:").is_err());
        }

        #[test]
        fn rejects_garbage_with_position() {
            let err = SequenceSet::parse("1:3,x").unwrap_err();
            match err {
                Error::Parse { position, .. } => assert_eq!(position, 4),
                other => panic!("unexpected error {other:?}"),
            }
        }

        #[test]
        fn rejects_three_bound_ranges() {
            assert!(SequenceSet::parse("1:2:3").is_err());
        }

        #[test]
        fn rejects_signed_numbers() {
            assert!(SequenceSet::parse("+5").is_err());
            assert!(SequenceSet::parse("-5").is_err());
        }

        #[test]
        fn display_round_trips_canonical_form() {
            for expr in ["1", "1:5", "*", "1:*", "1:3,5,9:*", "9:5"] {
                assert_eq!(SequenceSet::parse(expr).unwrap().to_string(), expr);
            }
        }

        #[test]
        fn single_range_entry_collapses_to_one_number() {
            assert_eq!(SequenceSet::parse("7:7").unwrap().to_string(), "7");
        }
    }

    mod iter_tests {
        use super::*;

        #[test]
        fn yields_items_in_declared_order() {
            assert_eq!(expand("3,1,5", 0), vec![3, 1, 5]);
        }

        #[test]
        fn ranges_expand_inclusively() {
            assert_eq!(expand("2:5", 0), vec![2, 3, 4, 5]);
        }

        #[test]
        fn reversed_ranges_descend() {
            assert_eq!(expand("5:2", 0), vec![5, 4, 3, 2]);
        }

        #[test]
        fn star_takes_the_session_maximum() {
            assert_eq!(expand("9:*", 12), vec![9, 10, 11, 12]);
            assert_eq!(expand("*", 7), vec![7]);
            assert_eq!(expand("*:5", 7), vec![7, 6, 5]);
        }

        #[test]
        fn star_with_no_maximum_denotes_nothing() {
            assert_eq!(expand("1:*", 0), Vec::<u32>::new());
            assert_eq!(expand("1:3,5:*", 0), vec![1, 2, 3]);
        }

        #[test]
        fn numeric_items_ignore_the_maximum() {
            assert_eq!(expand("8:10", 3), vec![8, 9, 10]);
        }

        #[test]
        fn iterator_is_finite_at_extremes() {
            let ids = expand(&format!("{}:{}", u32::MAX - 2, u32::MAX), 0);
            assert_eq!(ids, vec![u32::MAX - 2, u32::MAX - 1, u32::MAX]);
        }
    }

    mod from_uids_tests {
        use super::*;

        fn uids(ids: &[u32]) -> Vec<Uid> {
            ids.iter().map(|&n| Uid::new(n).unwrap()).collect()
        }

        #[test]
        fn folds_adjacent_runs() {
            let set = SequenceSet::from_uids(uids(&[1, 2, 3, 5, 9, 10]));
            assert_eq!(set.to_string(), "1:3,5,9:10");
        }

        #[test]
        fn sorts_and_deduplicates_input() {
            let set = SequenceSet::from_uids(uids(&[10, 2, 9, 2, 1, 3]));
            assert_eq!(set.to_string(), "1:3,9:10");
        }

        #[test]
        fn empty_input_yields_empty_set() {
            let set = SequenceSet::from_uids(Vec::new());
            assert!(set.is_empty());
            assert_eq!(set.iter(100).count(), 0);
        }

        #[test]
        fn raw_ids_drop_zeros() {
            let set = SequenceSet::from_ids([0, 3, 4, 0, 5]);
            assert_eq!(set.to_string(), "3:5");
        }
    }

    proptest! {
        #[test]
        fn iteration_matches_denoted_ids(
            items in prop::collection::vec((1u32..500, 0u32..40, any::<bool>()), 1..8)
        ) {
            let mut expr = String::new();
            let mut expected = Vec::new();
            for (lo, span, ascending) in items {
                if !expr.is_empty() {
                    expr.push(',');
                }
                let hi = lo + span;
                if span == 0 {
                    expr.push_str(&lo.to_string());
                    expected.push(lo);
                } else if ascending {
                    expr.push_str(&format!("{lo}:{hi}"));
                    expected.extend(lo..=hi);
                } else {
                    expr.push_str(&format!("{hi}:{lo}"));
                    expected.extend((lo..=hi).rev());
                }
            }
            let got: Vec<u32> = expand(&expr, 0);
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn compaction_round_trips(ids in prop::collection::btree_set(1u32..2000, 0..60)) {
            let set = SequenceSet::from_uids(
                ids.iter().map(|&n| Uid::new(n).unwrap()).collect::<Vec<_>>(),
            );
            let expanded: Vec<u32> = set.iter(0).collect();
            let sorted: Vec<u32> = ids.into_iter().collect();
            prop_assert_eq!(expanded, sorted);
        }
    }
}
