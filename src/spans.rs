//! Interval algebra over closed integer ranges.
//!
//! [`Range`] is a single closed interval and [`Compound`] a sorted set of
//! non-overlapping ranges that merges on construction and insertion. Both
//! are plain values; nothing here holds on to a caller's range.

use crate::{Error, Result};
use std::cmp::Ordering;
use std::fmt;

/// A closed interval `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    min: i64,
    max: i64,
}

impl Range {
    pub fn new(min: i64, max: i64) -> Result<Self> {
        if min > max {
            return Err(Error::InvalidRange(format!("bad range {},{}", min, max)));
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn contains(&self, pos: i64) -> bool {
        pos >= self.min && pos <= self.max
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} - {}]", self.min, self.max)
    }
}

impl Ord for Range {
    fn cmp(&self, other: &Self) -> Ordering {
        self.min
            .cmp(&other.min)
            .then_with(|| self.max.cmp(&other.max))
    }
}

impl PartialOrd for Range {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Anything that can be viewed as a sorted list of disjoint ranges.
pub trait Ranges {
    fn ranges(&self) -> &[Range];
}

impl Ranges for Range {
    fn ranges(&self) -> &[Range] {
        std::slice::from_ref(self)
    }
}

/// Sorted, non-overlapping set of ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    ranges: Vec<Range>,
}

impl Compound {
    /// Builds a set from ranges in any order, merging overlaps.
    pub fn new(mut ranges: Vec<Range>) -> Self {
        ranges.sort();

        let mut merged: Vec<Range> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(current) if range.min <= current.max => {
                    current.max = current.max.max(range.max);
                }
                _ => merged.push(range),
            }
        }

        Self { ranges: merged }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn min(&self) -> Option<i64> {
        self.ranges.first().map(Range::min)
    }

    pub fn max(&self) -> Option<i64> {
        self.ranges.last().map(Range::max)
    }

    /// Index of the first range whose `max >= pos`.
    ///
    /// Returns `len()` when `pos` lies beyond every range and `0` when it
    /// lies before every range.
    pub fn lower_bound(&self, pos: i64) -> usize {
        let (Some(min), Some(max)) = (self.min(), self.max()) else {
            return 0;
        };
        if pos > max {
            return self.ranges.len();
        }
        if pos < min {
            return 0;
        }
        self.ranges.partition_point(|r| r.max < pos)
    }

    pub fn contains(&self, pos: i64) -> bool {
        self.ranges
            .get(self.lower_bound(pos))
            .is_some_and(|r| r.contains(pos))
    }

    /// Adds a range, absorbing every existing range it overlaps.
    pub fn insert_range(&mut self, range: Range) {
        let lb = self.lower_bound(range.min);

        if lb == self.ranges.len() {
            self.ranges.push(range);
            return;
        }

        if range.max < self.ranges[lb].min {
            self.ranges.insert(lb, range);
            return;
        }

        let mut merged = range;
        merged.min = merged.min.min(self.ranges[lb].min);

        let mut ub = lb + 1;
        while ub < self.ranges.len() && self.ranges[ub].min <= merged.max {
            ub += 1;
        }
        merged.max = merged.max.max(self.ranges[ub - 1].max);

        self.ranges.splice(lb..ub, std::iter::once(merged));
    }
}

impl Ranges for Compound {
    fn ranges(&self) -> &[Range] {
        &self.ranges
    }
}

impl From<Range> for Compound {
    fn from(range: Range) -> Self {
        Self {
            ranges: vec![range],
        }
    }
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", r)?;
        }
        Ok(())
    }
}

/// Result of an intersection: one range or several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Spans {
    Single(Range),
    Multiple(Compound),
}

impl Ranges for Spans {
    fn ranges(&self) -> &[Range] {
        match self {
            Spans::Single(r) => r.ranges(),
            Spans::Multiple(c) => c.ranges(),
        }
    }
}

pub fn union(a: &impl Ranges, b: &impl Ranges) -> Compound {
    let mut out = Compound::new(a.ranges().to_vec());
    for &range in b.ranges() {
        out.insert_range(range);
    }
    out
}

/// Overlap of two range sets, or `None` when they are disjoint.
pub fn intersection(a: &impl Ranges, b: &impl Ranges) -> Option<Spans> {
    let (r0, r1) = (a.ranges(), b.ranges());
    let (mut i0, mut i1) = (0, 0);
    let mut out = Vec::new();

    while i0 < r0.len() && i1 < r1.len() {
        let (s0, s1) = (r0[i0], r1[i1]);
        let lap_min = s0.min.max(s1.min);
        let lap_max = s0.max.min(s1.max);

        if lap_max >= lap_min {
            out.push(Range {
                min: lap_min,
                max: lap_max,
            });
        }

        if s0.max > s1.max {
            i1 += 1;
        } else {
            i0 += 1;
        }
    }

    match out.len() {
        0 => None,
        1 => Some(Spans::Single(out[0])),
        _ => Some(Spans::Multiple(Compound::new(out))),
    }
}

/// Total number of positions covered.
pub fn coverage(s: &impl Ranges) -> i64 {
    s.ranges().iter().map(|r| r.max - r.min + 1).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(min: i64, max: i64) -> Range {
        Range::new(min, max).unwrap()
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        assert!(Range::new(5, 4).is_err());
        assert!(r(4, 4).contains(4));
        assert!(!r(4, 6).contains(7));
    }

    #[test]
    fn test_compound_merges_overlaps() {
        let c = Compound::new(vec![r(10, 20), r(1, 5), r(15, 30), r(4, 8)]);
        assert_eq!(c.ranges(), &[r(1, 8), r(10, 30)]);
        assert_eq!(c.to_string(), "[1 - 8],[10 - 30]");
    }

    #[test]
    fn test_compound_order_independent() {
        let input = vec![r(3, 9), r(40, 41), r(1, 2), r(8, 12), r(20, 25)];
        let expected = Compound::new(input.clone());
        let mut reversed = input.clone();
        reversed.reverse();
        assert_eq!(Compound::new(reversed), expected);
        let mut rotated = input;
        rotated.rotate_left(2);
        assert_eq!(Compound::new(rotated), expected);
    }

    #[test]
    fn test_lower_bound() {
        let c = Compound::new(vec![r(10, 20), r(30, 40), r(50, 60)]);
        assert_eq!(c.lower_bound(5), 0);
        assert_eq!(c.lower_bound(15), 0);
        assert_eq!(c.lower_bound(25), 1);
        assert_eq!(c.lower_bound(40), 1);
        assert_eq!(c.lower_bound(45), 2);
        assert_eq!(c.lower_bound(61), 3);
        assert!(c.contains(35));
        assert!(!c.contains(45));
        assert_eq!(Compound::default().lower_bound(3), 0);
    }

    #[test]
    fn test_insert_range_cases() {
        let mut c = Compound::new(vec![r(10, 20), r(30, 40), r(50, 60)]);
        c.insert_range(r(70, 80));
        assert_eq!(c.len(), 4);
        c.insert_range(r(0, 5));
        assert_eq!(c.ranges()[0], r(0, 5));
        c.insert_range(r(22, 25));
        assert_eq!(c.ranges()[2], r(22, 25));
        c.insert_range(r(15, 55));
        assert_eq!(c.ranges(), &[r(0, 5), r(10, 60), r(70, 80)]);
    }

    #[test]
    fn test_insert_does_not_alias_argument() {
        let arg = r(15, 35);
        let mut c = Compound::new(vec![r(10, 20), r(30, 40)]);
        c.insert_range(arg);
        assert_eq!(arg, r(15, 35));
        assert_eq!(c.ranges(), &[r(10, 40)]);
    }

    #[test]
    fn test_intersection() {
        let a = Compound::new(vec![r(0, 10), r(20, 30)]);
        let b = Compound::new(vec![r(5, 25)]);
        let i = intersection(&a, &b).unwrap();
        assert_eq!(i.ranges(), &[r(5, 10), r(20, 25)]);
        assert_eq!(intersection(&b, &a), Some(i));

        assert_eq!(intersection(&r(0, 3), &r(2, 9)), Some(Spans::Single(r(2, 3))));
        assert_eq!(intersection(&r(0, 3), &r(4, 9)), None);
    }

    #[test]
    fn test_coverage_of_union() {
        let a = Compound::new(vec![r(0, 9), r(20, 29)]);
        let b = Compound::new(vec![r(5, 14)]);
        let u = union(&a, &b);
        assert_eq!(coverage(&u), 25);
        assert!(coverage(&u) < coverage(&a) + coverage(&b));

        let disjoint = Compound::new(vec![r(40, 44)]);
        assert_eq!(
            coverage(&union(&a, &disjoint)),
            coverage(&a) + coverage(&disjoint)
        );
    }
}
