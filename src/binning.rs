//! The five-level UCSC binning scheme used by BAI indexes.
//!
//! Bin numbering is fixed by the index format; the level offsets below must
//! not change or existing index files stop resolving.

/// First bin id on each level, coarsest (the root bin 0) first.
pub const LEVEL_OFFSETS: [u32; 6] = [0, 1, 9, 73, 585, 4681];

/// Bins at or above this id are the 16kb leaf bins.
pub const LEAF_OFFSET: u32 = 4681;

/// log2 of the tile size on each non-root level, coarsest first.
const LEVEL_SHIFTS: [u32; 5] = [26, 23, 20, 17, 14];

/// log2 of the linear index tile size (16kb).
pub const LINEAR_SHIFT: u32 = 14;

/// Coordinates at or past this are out of reach of the scheme.
pub const MAX_COORDINATE: i64 = 1 << 29;

/// Returns the first and last position of the interval, clamped to the
/// addressable range.
fn normalize(begin: i64, end: i64) -> (i64, i64) {
    let begin = begin.clamp(0, MAX_COORDINATE - 1);
    let last = (end.max(begin + 1) - 1).min(MAX_COORDINATE - 1);
    (begin, last)
}

/// Smallest bin wholly containing the half-open interval `[begin, end)`.
pub fn bin_for(begin: i64, end: i64) -> u32 {
    let (begin, last) = normalize(begin, end);

    for (level, shift) in LEVEL_SHIFTS.iter().enumerate().rev() {
        if begin >> shift == last >> shift {
            return LEVEL_OFFSETS[level + 1] + (begin >> shift) as u32;
        }
    }
    0
}

/// Every bin that may hold records overlapping `[begin, end)`, root first.
pub fn candidate_bins(begin: i64, end: i64) -> Vec<u32> {
    let (begin, last) = normalize(begin, end);

    let mut bins = vec![0];
    for (level, shift) in LEVEL_SHIFTS.iter().enumerate() {
        let offset = LEVEL_OFFSETS[level + 1];
        let first = offset + (begin >> shift) as u32;
        let final_bin = offset + (last >> shift) as u32;
        bins.extend(first..=final_bin);
    }
    bins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_for_levels() {
        assert_eq!(bin_for(0, 1), 4681);
        assert_eq!(bin_for(16384, 16385), 4682);
        assert_eq!(bin_for(0, 16385), 585);
        assert_eq!(bin_for(0, 1 << 17), 585);
        assert_eq!(bin_for(0, (1 << 17) + 1), 73);
        assert_eq!(bin_for(0, (1 << 26) + 1), 0);
        assert_eq!(bin_for(1 << 26, (1 << 26) + 10), 4681 + (1 << 12));
    }

    #[test]
    fn test_candidate_bins_small_interval() {
        assert_eq!(candidate_bins(0, 1), vec![0, 1, 9, 73, 585, 4681]);
        let bins = candidate_bins(16000, 17000);
        assert!(bins.contains(&4681));
        assert!(bins.contains(&4682));
        assert_eq!(bins.len(), 7);
    }

    #[test]
    fn test_bin_for_is_candidate() {
        let samples = [
            (0, 1),
            (100, 200),
            (16383, 16385),
            (1_000_000, 1_300_000),
            (5, 70_000_000),
            (123_456_789, 123_456_790),
            (300_000_000, 300_100_000),
        ];
        for (b, e) in samples {
            let bins = candidate_bins(b, e);
            assert_eq!(bins[0], 0);
            assert!(bins.contains(&bin_for(b, e)), "{}-{}", b, e);
        }
    }

    #[test]
    fn test_candidate_bins_clamped() {
        let bins = candidate_bins(0, i32::MAX as i64 + 1);
        assert_eq!(bins.len(), 1 + 8 + 64 + 512 + 4096 + 32768);
        assert_eq!(bins.last(), Some(&(4681 + 32767)));
    }

    #[test]
    fn test_empty_interval_treated_as_point() {
        assert_eq!(bin_for(0, 0), 4681);
        assert_eq!(candidate_bins(0, 0), vec![0, 1, 9, 73, 585, 4681]);
    }
}
