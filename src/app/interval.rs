//! Closed byte intervals and their fill-tracking extension
//!
//! [`Interval`] is the pure value type the range engine is built on: a closed
//! integer interval `[start, end]` with union/gap/overlap/adjacency
//! predicates. [`TrackedInterval`] extends it with a fill cursor and a state,
//! and compares by bounds only so a worker holding a local copy can locate
//! the canonical entry inside an ordered set and mirror updates into it.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Closed integer interval `[start, end]`, both endpoints inclusive.
///
/// An interval is invalid when `start < 0` or `start > end`; the invalid
/// sentinel `{-1, -1}` doubles as the "no result" value of [`Interval::union`]
/// and [`Interval::gap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

/// The invalid sentinel interval.
pub const INVALID_INTERVAL: Interval = Interval { start: -1, end: -1 };

impl Interval {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn valid(&self) -> bool {
        self.start >= 0 && self.start <= self.end
    }

    /// Number of bytes covered; 0 for invalid intervals.
    pub fn size(&self) -> i64 {
        if self.valid() {
            self.end - self.start + 1
        } else {
            0
        }
    }

    /// True when the two intervals share at least one point.
    pub fn intersects(&self, other: &Interval) -> bool {
        !(self.end < other.start || self.start > other.end)
    }

    /// True when the two intervals touch without sharing a point.
    pub fn adjacent(&self, other: &Interval) -> bool {
        (self.start - other.end).abs() == 1 || (self.end - other.start).abs() == 1
    }

    /// Intersecting or adjacent (and both valid).
    pub fn mergeable(&self, other: &Interval) -> bool {
        if !self.valid() || !other.valid() {
            return false;
        }
        self.intersects(other) || self.adjacent(other)
    }

    /// Span of two mergeable intervals; the invalid sentinel otherwise.
    pub fn union(&self, other: &Interval) -> Interval {
        if self.mergeable(other) {
            Interval::new(self.start.min(other.start), self.end.max(other.end))
        } else {
            INVALID_INTERVAL
        }
    }

    /// The interval exactly filling the hole between two non-mergeable
    /// inputs; the invalid sentinel when they are mergeable (no hole).
    pub fn gap(&self, other: &Interval) -> Interval {
        if !self.valid() || !other.valid() || self.mergeable(other) {
            return INVALID_INTERVAL;
        }
        if self.start < other.start {
            Interval::new(self.end + 1, other.start - 1)
        } else {
            Interval::new(other.end + 1, self.start - 1)
        }
    }
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start.cmp(&other.start).then(self.end.cmp(&other.end))
    }
}

/// Fill progress of a tracked interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FillState {
    /// Not yet claimed by any worker; cursor at `start`.
    Unfilled,
    /// Claimed by exactly one worker, nothing written; cursor at `start`.
    Pending,
    /// Prefix written; `start <= position <= end`.
    Partial,
    /// Fully written; cursor at `end + 1`.
    Filled,
}

/// An [`Interval`] plus a fill cursor and state.
///
/// Equality, ordering and hashing consider the bounds only: two
/// `TrackedInterval`s are the same set member iff `start` and `end` match,
/// regardless of cursor or state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrackedInterval {
    pub span: Interval,
    /// Offset of the next byte to fill; `span.end + 1` once filled.
    pub position: i64,
    pub state: FillState,
}

impl TrackedInterval {
    /// A fresh unclaimed interval with the cursor parked at `start`.
    pub fn unfilled(span: Interval) -> Self {
        Self {
            span,
            position: span.start,
            state: FillState::Unfilled,
        }
    }

    /// A fully written interval with the cursor past `end`.
    pub fn filled(span: Interval) -> Self {
        Self {
            span,
            position: span.end + 1,
            state: FillState::Filled,
        }
    }

    /// Bytes still missing from this interval.
    pub fn remaining(&self) -> i64 {
        self.span.end + 1 - self.position
    }

    /// Move the cursor forward after a successful write of `n` bytes and
    /// derive the resulting state.
    pub fn advance(&mut self, n: i64) {
        self.position += n;
        self.state = if self.position == self.span.end + 1 {
            FillState::Filled
        } else {
            FillState::Partial
        };
    }
}

impl PartialEq for TrackedInterval {
    fn eq(&self, other: &Self) -> bool {
        self.span == other.span
    }
}

impl Eq for TrackedInterval {}

impl PartialOrd for TrackedInterval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TrackedInterval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.span.cmp(&other.span)
    }
}

impl std::hash::Hash for TrackedInterval {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.span.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sentinel_is_invalid() {
        assert!(!INVALID_INTERVAL.valid());
        assert_eq!(INVALID_INTERVAL.size(), 0);
    }

    #[test]
    fn singleton_and_basic_sizes() {
        let zero = Interval::new(0, 0);
        assert!(zero.valid());
        assert_eq!(zero.size(), 1);

        let r = Interval::new(1, 5);
        assert!(r.valid());
        assert_eq!(r.size(), 5);
    }

    #[test]
    fn intersection_cases() {
        let zero = Interval::new(0, 0);
        let a = Interval::new(1, 5);
        let b = Interval::new(3, 8);
        let c = Interval::new(6, 10);
        let d = Interval::new(10, 15);

        assert!(!zero.intersects(&a));
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
        assert!(!a.intersects(&c));
        assert!(!a.intersects(&d));
        assert!(c.intersects(&d)); // shared endpoint
    }

    #[test]
    fn mergeability_cases() {
        let zero = Interval::new(0, 0);
        let a = Interval::new(1, 5);
        let b = Interval::new(3, 8);
        let c = Interval::new(6, 10);
        let d = Interval::new(10, 15);

        // adjacency counts
        assert!(zero.mergeable(&a));
        assert!(a.mergeable(&c));
        // intersection counts
        assert!(a.mergeable(&b));
        assert!(b.mergeable(&c));
        // a gap does not
        assert!(!a.mergeable(&d));
        // invalid never merges
        assert!(!INVALID_INTERVAL.mergeable(&a));
        assert!(!a.mergeable(&INVALID_INTERVAL));
    }

    #[test]
    fn reflexive_mergeability() {
        let r = Interval::new(7, 42);
        assert!(r.mergeable(&r));
        assert_eq!(r.union(&r), r);
    }

    #[test]
    fn union_spans_min_to_max() {
        let zero = Interval::new(0, 0);
        let a = Interval::new(1, 5);
        let b = Interval::new(3, 8);
        let c = Interval::new(6, 10);
        let d = Interval::new(10, 15);

        assert_eq!(a.union(&zero), Interval::new(0, 5));
        assert_eq!(a.union(&b), Interval::new(1, 8));
        assert_eq!(b.union(&c), Interval::new(3, 10));
        assert!(!a.union(&d).valid());
    }

    #[test]
    fn adjacent_union_size_is_sum() {
        let a = Interval::new(0, 5);
        let b = Interval::new(6, 11);
        assert!(a.adjacent(&b));
        assert_eq!(a.union(&b).size(), a.size() + b.size());
    }

    #[test]
    fn gap_fills_the_hole_exactly() {
        let a = Interval::new(1, 5);
        let b = Interval::new(3, 8);
        let c = Interval::new(6, 10);
        let d = Interval::new(10, 15);

        // mergeable pairs have no gap
        assert!(!b.gap(&a).valid());
        assert!(!a.gap(&c).valid());

        let g = d.gap(&b);
        assert_eq!(g, Interval::new(9, 9));
        assert_eq!(g.size(), 1);
    }

    #[test]
    fn gap_law() {
        let a = Interval::new(0, 3);
        let b = Interval::new(10, 20);
        assert!(!a.mergeable(&b));
        let g = a.gap(&b);
        let span = Interval::new(a.start, b.end);
        assert_eq!(a.size() + g.size() + b.size(), span.size());
    }

    #[test]
    fn tracked_interval_compares_by_bounds_only() {
        let mut a = TrackedInterval::unfilled(Interval::new(0, 9));
        let b = TrackedInterval::filled(Interval::new(0, 9));
        assert_eq!(a, b);

        a.advance(4);
        assert_eq!(a, b);
        assert_eq!(a.state, FillState::Partial);
        assert_eq!(a.position, 4);
    }

    #[test]
    fn advance_reaches_filled_at_end_plus_one() {
        let mut r = TrackedInterval::unfilled(Interval::new(10, 19));
        r.state = FillState::Pending;

        r.advance(5);
        assert_eq!(r.state, FillState::Partial);
        assert_eq!(r.remaining(), 5);

        r.advance(5);
        assert_eq!(r.state, FillState::Filled);
        assert_eq!(r.position, 20);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn ordering_is_by_start() {
        let mut set = std::collections::BTreeSet::new();
        set.insert(TrackedInterval::unfilled(Interval::new(20, 29)));
        set.insert(TrackedInterval::unfilled(Interval::new(0, 9)));
        set.insert(TrackedInterval::unfilled(Interval::new(10, 19)));

        let starts: Vec<i64> = set.iter().map(|r| r.span.start).collect();
        assert_eq!(starts, vec![0, 10, 20]);
    }
}
