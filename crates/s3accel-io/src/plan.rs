//! IO plans
//!
//! An [`IoPlan`] is the set of byte ranges a caller wants fetched. Plans are
//! built freely (unsorted, possibly overlapping) and then coalesced into the
//! minimal list of transport requests.

use crate::range::Range;
use std::fmt;

/// An ordered, mergeable collection of ranges to fetch
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IoPlan {
    ranges: Vec<Range>,
}

/// The plan that fetches nothing
pub const EMPTY_PLAN: IoPlan = IoPlan { ranges: Vec::new() };

impl IoPlan {
    /// Create a plan from a sequence of ranges, kept in the given order
    #[must_use]
    pub const fn new(ranges: Vec<Range>) -> Self {
        Self { ranges }
    }

    /// Ranges in their current order
    #[must_use]
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Sum of range lengths. Overlapping ranges are counted twice until the
    /// plan is coalesced.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.ranges.iter().map(Range::len).sum()
    }

    /// Append a range to the plan
    pub fn push(&mut self, range: Range) {
        self.ranges.push(range);
    }

    /// Merge ranges separated by no more than `tolerance` bytes.
    ///
    /// After this call the ranges are sorted and disjoint, and consecutive
    /// ranges are more than `max(tolerance, 1)` apart measured as
    /// `next.start - prev.end`. Overlapping and adjacent ranges always merge.
    /// Applying it twice is a no-op.
    pub fn coalesce(&mut self, tolerance: u64) {
        if self.ranges.len() < 2 {
            return;
        }

        self.ranges.sort_unstable();
        let reach = tolerance.max(1);

        let mut merged = Vec::with_capacity(self.ranges.len());
        let mut current = self.ranges[0];

        for next in &self.ranges[1..] {
            if next.start() <= current.end().saturating_add(reach) {
                current = current.hull(next);
            } else {
                merged.push(current);
                current = *next;
            }
        }
        merged.push(current);

        self.ranges = merged;
    }
}

impl From<Range> for IoPlan {
    fn from(range: Range) -> Self {
        Self {
            ranges: vec![range],
        }
    }
}

impl From<Vec<Range>> for IoPlan {
    fn from(ranges: Vec<Range>) -> Self {
        Self::new(ranges)
    }
}

impl FromIterator<Range> for IoPlan {
    fn from_iter<I: IntoIterator<Item = Range>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl fmt::Display for IoPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{range}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: u64, end: u64) -> Range {
        Range::new(start, end).unwrap()
    }

    fn coalesced(ranges: Vec<Range>, tolerance: u64) -> Vec<Range> {
        let mut plan = IoPlan::new(ranges);
        plan.coalesce(tolerance);
        plan.ranges().to_vec()
    }

    #[test]
    fn test_range_list_constructor() {
        let ranges = vec![r(1, 2), r(10, 20)];
        let plan = IoPlan::new(ranges.clone());
        assert_eq!(plan.ranges(), ranges.as_slice());
    }

    #[test]
    fn test_range_constructor() {
        let plan = IoPlan::from(r(1, 2));
        assert_eq!(plan.ranges(), &[r(1, 2)]);
    }

    #[test]
    fn test_to_string() {
        assert_eq!(IoPlan::new(vec![r(1, 2), r(10, 20)]).to_string(), "[1-2,10-20]");
        assert_eq!(IoPlan::from(r(1, 2)).to_string(), "[1-2]");
        assert_eq!(EMPTY_PLAN.to_string(), "[]");
    }

    #[test]
    fn test_total_bytes() {
        let mut plan = IoPlan::new(vec![r(1, 5), r(3, 8), r(20, 20)]);
        assert_eq!(plan.total_bytes(), 5 + 6 + 1);
        plan.coalesce(0);
        assert_eq!(plan.total_bytes(), 8 + 1);
        assert_eq!(EMPTY_PLAN.total_bytes(), 0);
    }

    #[test]
    fn test_coalesce_overlapping_ranges() {
        assert_eq!(coalesced(vec![r(1, 5), r(3, 8)], 0), vec![r(1, 8)]);
    }

    #[test]
    fn test_coalesce_touching_ranges() {
        assert_eq!(coalesced(vec![r(1, 5), r(5, 10)], 0), vec![r(1, 10)]);
    }

    #[test]
    fn test_coalesce_adjacent_ranges_without_tolerance() {
        assert_eq!(coalesced(vec![r(1, 5), r(6, 8)], 0), vec![r(1, 8)]);
    }

    #[test]
    fn test_coalesce_with_tolerance() {
        assert_eq!(coalesced(vec![r(1, 5), r(7, 12)], 2), vec![r(1, 12)]);
    }

    #[test]
    fn test_coalesce_no_merge() {
        assert_eq!(
            coalesced(vec![r(1, 5), r(10, 15)], 0),
            vec![r(1, 5), r(10, 15)]
        );
    }

    #[test]
    fn test_coalesce_single_range() {
        assert_eq!(coalesced(vec![r(1, 5)], 0), vec![r(1, 5)]);
    }

    #[test]
    fn test_coalesce_empty_plan() {
        let mut plan = EMPTY_PLAN;
        plan.coalesce(0);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_coalesce_multiple_ranges() {
        assert_eq!(
            coalesced(vec![r(1, 3), r(4, 7), r(9, 11), r(12, 15)], 1),
            vec![r(1, 7), r(9, 15)]
        );
    }

    #[test]
    fn test_coalesce_unordered_ranges() {
        assert_eq!(
            coalesced(vec![r(10, 15), r(1, 5), r(6, 8)], 1),
            vec![r(1, 8), r(10, 15)]
        );
    }

    #[test]
    fn test_coalesce_contained_range_keeps_outer_end() {
        assert_eq!(coalesced(vec![r(0, 100), r(10, 20)], 0), vec![r(0, 100)]);
    }

    #[test]
    fn test_coalesce_is_idempotent() {
        let mut plan = IoPlan::new(vec![r(40, 50), r(1, 3), r(4, 7), r(20, 22), r(9, 11)]);
        plan.coalesce(2);
        let once = plan.clone();
        plan.coalesce(2);
        assert_eq!(plan, once);
    }

    #[test]
    fn test_coalesce_near_u64_max() {
        assert_eq!(
            coalesced(vec![r(u64::MAX - 1, u64::MAX), r(0, 1)], u64::MAX),
            vec![r(0, u64::MAX)]
        );
    }

    #[test]
    fn test_coalesce_properties_random() {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let tolerance = rng.gen_range(0..8);
            let inputs: Vec<Range> = (0..rng.gen_range(0..20))
                .map(|_| {
                    let start = rng.gen_range(0..500);
                    r(start, start + rng.gen_range(0..30))
                })
                .collect();

            let output = coalesced(inputs.clone(), tolerance);

            for pair in output.windows(2) {
                assert!(pair[0].end() < pair[1].start());
                assert!(pair[1].start() - pair[0].end() > tolerance.max(1));
            }
            for input in &inputs {
                assert!(
                    output
                        .iter()
                        .any(|o| o.start() <= input.start() && input.end() <= o.end()),
                    "{input} not covered by {output:?}"
                );
            }
            assert_eq!(
                output.iter().map(Range::start).min(),
                inputs.iter().map(Range::start).min()
            );
            assert_eq!(
                output.iter().map(Range::end).max(),
                inputs.iter().map(Range::end).max()
            );
        }
    }
}
