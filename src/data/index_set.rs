//! Compact sets of global DoF indices.
//!
//! An [`IndexSet`] stores a subset of `[0, size)` as sorted, disjoint,
//! non-adjacent half-open ranges. Every mutation leaves the set in this
//! normalized form, so membership and rank queries are binary searches.
//!
//! Elements lie in `[0, u64::MAX)`: `u64::MAX` is the invalid DoF marker and
//! has no half-open range, so callers validate indices before adding them.

use crate::debug_invariants::DebugInvariants;
use crate::dof_error::DofError;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSet {
    size: u64,
    ranges: Vec<Range<u64>>,
    /// `starts[k]` = number of elements in `ranges[..k]`.
    starts: Vec<u64>,
}

impl IndexSet {
    /// Empty subset of `[0, size)`.
    pub fn new(size: u64) -> Self {
        Self {
            size,
            ranges: Vec::new(),
            starts: Vec::new(),
        }
    }

    /// The whole of `[0, size)`.
    pub fn complete(size: u64) -> Self {
        let mut s = Self::new(size);
        s.add_range(0, size);
        s
    }

    /// Upper bound of the universe.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Changes the universe bound; it never shrinks below the largest element.
    pub fn set_size(&mut self, size: u64) {
        let max = self.ranges.last().map_or(0, |r| r.end);
        self.size = size.max(max);
    }

    /// Add `[start, end)`. Indices at or beyond `size()` extend the universe.
    pub fn add_range(&mut self, start: u64, end: u64) {
        if start >= end {
            return;
        }
        self.size = self.size.max(end);
        let lo = self.ranges.partition_point(|r| r.end < start);
        let hi = self.ranges.partition_point(|r| r.start <= end);
        let merged = if lo < hi {
            self.ranges[lo].start.min(start)..self.ranges[hi - 1].end.max(end)
        } else {
            start..end
        };
        self.ranges.splice(lo..hi, std::iter::once(merged));
        self.rebuild_starts();
    }

    /// # Panics
    ///
    /// If `i == u64::MAX`.
    pub fn add_index(&mut self, i: u64) {
        assert!(i != u64::MAX, "u64::MAX is not a storable index");
        self.add_range(i, i + 1);
    }

    /// Add many indices at once; input order and duplicates do not matter.
    ///
    /// # Panics
    ///
    /// If any index equals `u64::MAX`.
    pub fn add_indices<I: IntoIterator<Item = u64>>(&mut self, indices: I) {
        let sorted: Vec<u64> = indices.into_iter().sorted_unstable().dedup().collect();
        assert!(
            sorted.last() != Some(&u64::MAX),
            "u64::MAX is not a storable index"
        );
        let mut runs: Vec<Range<u64>> = Vec::new();
        for i in sorted {
            match runs.last_mut() {
                Some(r) if r.end == i => r.end += 1,
                _ => runs.push(i..i + 1),
            }
        }
        if self.ranges.is_empty() {
            if let Some(last) = runs.last() {
                self.size = self.size.max(last.end);
            }
            self.ranges = runs;
            self.rebuild_starts();
        } else {
            for r in runs {
                self.add_range(r.start, r.end);
            }
        }
    }

    fn rebuild_starts(&mut self) {
        self.starts.clear();
        let mut acc = 0;
        for r in &self.ranges {
            self.starts.push(acc);
            acc += r.end - r.start;
        }
    }

    pub fn n_elements(&self) -> u64 {
        match (self.starts.last(), self.ranges.last()) {
            (Some(&s), Some(r)) => s + (r.end - r.start),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn n_intervals(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_contiguous(&self) -> bool {
        self.ranges.len() <= 1
    }

    pub fn ranges(&self) -> &[Range<u64>] {
        &self.ranges
    }

    fn range_of(&self, i: u64) -> Option<usize> {
        let k = self.ranges.partition_point(|r| r.end <= i);
        (k < self.ranges.len() && self.ranges[k].start <= i).then_some(k)
    }

    pub fn is_element(&self, i: u64) -> bool {
        self.range_of(i).is_some()
    }

    /// Position of `i` among the elements in ascending order.
    pub fn index_within_set(&self, i: u64) -> Option<u64> {
        self.range_of(i)
            .map(|k| self.starts[k] + (i - self.ranges[k].start))
    }

    /// The `n`-th smallest element.
    pub fn nth_index_in_set(&self, n: u64) -> Option<u64> {
        if n >= self.n_elements() {
            return None;
        }
        let k = self.starts.partition_point(|&s| s <= n) - 1;
        Some(self.ranges[k].start + (n - self.starts[k]))
    }

    /// Elements in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.ranges.iter().flat_map(|r| r.clone())
    }

    pub fn union(&self, other: &IndexSet) -> IndexSet {
        let mut out = self.clone();
        out.size = out.size.max(other.size);
        for r in &other.ranges {
            out.add_range(r.start, r.end);
        }
        out
    }

    /// True if the two sets share at least one element.
    pub fn intersects(&self, other: &IndexSet) -> bool {
        let (mut a, mut b) = (0, 0);
        while a < self.ranges.len() && b < other.ranges.len() {
            let (x, y) = (&self.ranges[a], &other.ranges[b]);
            if x.start < y.end && y.start < x.end {
                return true;
            }
            if x.end <= y.end {
                a += 1;
            } else {
                b += 1;
            }
        }
        false
    }
}

impl FromIterator<u64> for IndexSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut s = IndexSet::default();
        s.add_indices(iter);
        s
    }
}

impl fmt::Display for IndexSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.ranges
                .iter()
                .map(|r| if r.end - r.start == 1 {
                    format!("{}", r.start)
                } else {
                    format!("[{},{}]", r.start, r.end - 1)
                })
                .join(", ")
        )
    }
}

impl DebugInvariants for IndexSet {
    fn validate_invariants(&self) -> Result<(), DofError> {
        let bad = |msg: String| Err(DofError::Precondition(format!("index set: {msg}")));
        if self.starts.len() != self.ranges.len() {
            return bad("prefix table out of sync".into());
        }
        let mut acc = 0;
        for (k, r) in self.ranges.iter().enumerate() {
            if r.start >= r.end {
                return bad(format!("empty range {r:?}"));
            }
            if k > 0 && self.ranges[k - 1].end >= r.start {
                return bad(format!("ranges {:?} and {r:?} not separated", self.ranges[k - 1]));
            }
            if self.starts[k] != acc {
                return bad(format!("prefix {} != {acc}", self.starts[k]));
            }
            acc += r.end - r.start;
        }
        if let Some(r) = self.ranges.last() {
            if r.end > self.size {
                return bad(format!("element {} beyond size {}", r.end - 1, self.size));
            }
        }
        Ok(())
    }

    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "IndexSet");
    }
}
