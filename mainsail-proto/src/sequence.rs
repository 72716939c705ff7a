//! Sequence sets: `2`, `4:7`, `12:*`, `1,3:5,9`.

use std::fmt::{Display, Formatter};

use nom::{
    branch::alt,
    bytes::streaming::tag,
    combinator::{map, opt, value},
    multi::separated_list1,
    sequence::{pair, preceded},
};

use crate::{core::number, decode::ProtoResult};

/// One comma-separated element of a sequence set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqItem {
    Single(u32),
    Range(u32, u32),
    /// `lo:*` — everything from `lo` to the highest number in the mailbox.
    From(u32),
    /// A bare `*`.
    Star,
}

/// `sequence-set = (seq-number / seq-range) *("," (seq-number / seq-range))`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequenceSet(pub Vec<SeqItem>);

impl SequenceSet {
    /// A single number.
    pub fn single(n: u32) -> Self {
        Self(vec![SeqItem::Single(n)])
    }

    /// `lo:hi` (normalized so that `lo <= hi`).
    pub fn range(lo: u32, hi: u32) -> Self {
        Self(vec![SeqItem::Range(lo.min(hi), lo.max(hi))])
    }

    /// `lo:*`
    pub fn from(lo: u32) -> Self {
        Self(vec![SeqItem::From(lo)])
    }

    /// Build the most compact set covering the given sorted, deduplicated
    /// numbers.
    pub fn from_sorted(numbers: &[u32]) -> Self {
        let mut items = Vec::new();
        let mut iter = numbers.iter().copied();

        let Some(mut lo) = iter.next() else {
            return Self(items);
        };
        let mut hi = lo;

        for n in iter {
            if n == hi + 1 {
                hi = n;
            } else {
                items.push(if lo == hi {
                    SeqItem::Single(lo)
                } else {
                    SeqItem::Range(lo, hi)
                });
                lo = n;
                hi = n;
            }
        }
        items.push(if lo == hi {
            SeqItem::Single(lo)
        } else {
            SeqItem::Range(lo, hi)
        });

        Self(items)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Expand to concrete numbers, with `*` standing for `max`.
    ///
    /// Ranges are clamped to `max`; an empty vector means the set selects
    /// nothing within a mailbox of `max` messages.
    pub fn expand(&self, max: u32) -> Vec<u32> {
        let mut out = Vec::new();
        for item in &self.0 {
            match *item {
                SeqItem::Single(n) => {
                    if n <= max {
                        out.push(n);
                    }
                }
                SeqItem::Range(lo, hi) => out.extend(lo..=hi.min(max)),
                SeqItem::From(lo) => out.extend(lo..=max),
                SeqItem::Star => {
                    if max > 0 {
                        out.push(max);
                    }
                }
            }
        }
        out
    }

    /// Expand a set that must not contain `*` (VANISHED, APPENDUID, ...).
    pub fn expand_finite(&self) -> Option<Vec<u32>> {
        let mut out = Vec::new();
        for item in &self.0 {
            match *item {
                SeqItem::Single(n) => out.push(n),
                SeqItem::Range(lo, hi) => out.extend(lo..=hi),
                SeqItem::From(_) | SeqItem::Star => return None,
            }
        }
        Some(out)
    }
}

impl Display for SequenceSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            match *item {
                SeqItem::Single(n) => write!(f, "{n}")?,
                SeqItem::Range(lo, hi) => write!(f, "{lo}:{hi}")?,
                SeqItem::From(lo) => write!(f, "{lo}:*")?,
                SeqItem::Star => f.write_str("*")?,
            }
        }
        Ok(())
    }
}

/// `seq-number = number / "*"`
fn seq_number(input: &[u8]) -> ProtoResult<'_, Option<u32>> {
    alt((map(number, Some), value(None, tag(b"*"))))(input)
}

/// `seq-range = seq-number ":" seq-number`, or a lone `seq-number`.
fn seq_item(input: &[u8]) -> ProtoResult<'_, SeqItem> {
    map(
        pair(seq_number, opt(preceded(tag(b":"), seq_number))),
        |(first, second)| match (first, second) {
            (Some(n), None) => SeqItem::Single(n),
            (None, None) => SeqItem::Star,
            (Some(lo), Some(Some(hi))) => SeqItem::Range(lo.min(hi), lo.max(hi)),
            (Some(lo), Some(None)) => SeqItem::From(lo),
            // "*:n" — the server means n:* since a range is unordered
            (None, Some(Some(hi))) => SeqItem::From(hi),
            (None, Some(None)) => SeqItem::Star,
        },
    )(input)
}

/// Parse a full sequence set.
pub fn sequence_set(input: &[u8]) -> ProtoResult<'_, SequenceSet> {
    map(separated_list1(tag(b","), seq_item), SequenceSet)(input)
}
