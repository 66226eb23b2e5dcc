//! Interval-completeness scan.
//!
//! The same scan runs against two data sources at different granularities:
//!
//! - the source message index, with step `1` over distinct epochs
//!   ("is every epoch present"),
//! - the checksum repository, with step `chunk_size` over chunk starts
//!   ("is every chunk published").
//!
//! Markers are fed in ascending order. Whenever two consecutive markers are
//! further apart than `step`, the epochs between `prev + step` and
//! `next - 1` are reported as a gap, clipped to the query range.
//!
//! A gap must be bounded by data on both sides. Data sources should feed the
//! nearest marker before the query start and the nearest marker after the
//! query stop along with the markers inside the query, so that holes
//! straddling a boundary are reported. Missing data before the first marker
//! or after the last is coverage, not a gap, and an empty source yields no
//! gaps at all.

use crate::error::{CoreError, Result};
use crate::types::{Epoch, EpochRange, Gap};

/// Incremental gap scan over ascending markers.
#[derive(Debug, Clone)]
pub struct GapScanner {
    query: EpochRange,
    step: u64,
    prev: Option<Epoch>,
    gaps: Vec<Gap>,
}

impl GapScanner {
    pub fn new(query: EpochRange, step: u64) -> Result<Self> {
        if step == 0 {
            return Err(CoreError::ZeroStep);
        }
        Ok(Self {
            query,
            step,
            prev: None,
            gaps: Vec::new(),
        })
    }

    pub fn query(&self) -> EpochRange {
        self.query
    }

    /// Feed the next marker. Repeated or out-of-order markers are ignored.
    pub fn push(&mut self, marker: Epoch) {
        if let Some(prev) = self.prev {
            if marker <= prev {
                return;
            }
            if marker - prev > self.step {
                let first_missing = prev.saturating_add(self.step);
                let last_missing = marker - 1;
                if let Some(clipped) = self.query.clip(first_missing, last_missing) {
                    self.gaps.push(clipped.into());
                }
            }
        }
        self.prev = Some(marker);
    }

    /// Gaps found so far, in ascending order.
    pub fn finish(self) -> Vec<Gap> {
        self.gaps
    }
}

/// Run a complete scan over `markers`.
pub fn find_gaps<I>(markers: I, step: u64, query: EpochRange) -> Result<Vec<Gap>>
where
    I: IntoIterator<Item = Epoch>,
{
    let mut scanner = GapScanner::new(query, step)?;
    for marker in markers {
        scanner.push(marker);
    }
    Ok(scanner.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn range(start: u64, stop: u64) -> EpochRange {
        EpochRange::new(start, stop).unwrap()
    }

    #[test]
    fn test_epoch_gaps() {
        let gaps = find_gaps([0, 1, 2, 5, 6, 9], 1, range(0, 9)).unwrap();
        assert_eq!(gaps, vec![Gap::new(3, 4), Gap::new(7, 8)]);
    }

    #[test]
    fn test_chunk_gaps() {
        let gaps = find_gaps([0, 20], 10, range(0, 29)).unwrap();
        assert_eq!(gaps, vec![Gap::new(10, 19)]);
    }

    #[test]
    fn test_contiguous_has_no_gaps() {
        assert!(find_gaps(0..=100, 1, range(0, 100)).unwrap().is_empty());
        assert!(find_gaps([0, 10, 20, 30], 10, range(0, 39)).unwrap().is_empty());
    }

    #[test]
    fn test_empty_source_has_no_gaps() {
        assert!(find_gaps(Vec::<u64>::new(), 1, range(0, 1000)).unwrap().is_empty());
    }

    #[test]
    fn test_single_marker_has_no_gaps() {
        assert!(find_gaps([500], 1, range(0, 1000)).unwrap().is_empty());
    }

    #[test]
    fn test_straddling_gaps_are_clipped() {
        // Bracketing markers 2 and 20 sit outside the query.
        let gaps = find_gaps([2, 8, 9, 10, 20], 1, range(5, 15)).unwrap();
        assert_eq!(gaps, vec![Gap::new(5, 7), Gap::new(11, 15)]);
    }

    #[test]
    fn test_gaps_outside_query_are_dropped() {
        let gaps = find_gaps([0, 10, 11, 12, 30], 1, range(10, 12)).unwrap();
        assert!(gaps.is_empty());
    }

    #[test]
    fn test_duplicates_and_regressions_ignored() {
        let gaps = find_gaps([0, 0, 1, 1, 0, 4, 4], 1, range(0, 4)).unwrap();
        assert_eq!(gaps, vec![Gap::new(2, 3)]);
    }

    #[test]
    fn test_zero_step_rejected() {
        assert_eq!(find_gaps([1, 2], 0, range(0, 2)), Err(CoreError::ZeroStep));
    }

    #[test]
    fn test_misaligned_chunks_report_only_the_hole() {
        // Chunks of 10 starting at 0 and 15: only 10..=14 is uncovered.
        let gaps = find_gaps([0, 15], 10, range(0, 24)).unwrap();
        assert_eq!(gaps, vec![Gap::new(10, 14)]);
    }

    /// Epochs in `query` that are absent from `present` but have data on both sides.
    fn brute_force(present: &BTreeSet<u64>, query: EpochRange) -> BTreeSet<u64> {
        let (Some(&lo), Some(&hi)) = (present.first(), present.last()) else {
            return BTreeSet::new();
        };
        (query.start()..=query.stop())
            .filter(|e| !present.contains(e) && *e > lo && *e < hi)
            .collect()
    }

    proptest! {
        #[test]
        fn prop_epoch_scan_matches_brute_force(
            present in prop::collection::btree_set(0u64..200, 0..80),
            a in 0u64..200,
            b in 0u64..200,
        ) {
            let query = range(a.min(b), a.max(b));
            let gaps = find_gaps(present.iter().copied(), 1, query).unwrap();

            let reported: BTreeSet<u64> = gaps.iter().flat_map(|g| g.start..=g.stop).collect();
            prop_assert_eq!(reported, brute_force(&present, query));

            for pair in gaps.windows(2) {
                prop_assert!(pair[0].stop + 1 < pair[1].start);
            }
        }

        #[test]
        fn prop_bracketing_markers_suffice(
            present in prop::collection::btree_set(0u64..200, 0..80),
            a in 0u64..200,
            b in 0u64..200,
        ) {
            let query = range(a.min(b), a.max(b));
            let full = find_gaps(present.iter().copied(), 1, query).unwrap();

            let before = present.range(..query.start()).next_back().copied();
            let after = present.range(query.stop() + 1..).next().copied();
            let inside = present.range(query.start()..=query.stop()).copied();
            let bracketed: Vec<u64> = before.into_iter().chain(inside).chain(after).collect();

            prop_assert_eq!(find_gaps(bracketed, 1, query).unwrap(), full);
        }
    }
}
