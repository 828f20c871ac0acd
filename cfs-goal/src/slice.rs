//! A single-technology row of a [`crate::Goal`] (C9): "one standard copy",
//! "xor level 3 with these three labeled strips", etc.
//!
//! Mirrors `src/common/goal.cc`'s
//! `Goal::Slice` (`mergeIn`, `getExpectedCopies`, `isValid`) and
//! `src/master/chunk_copies_calculator.cc`'s
//! `getFullCopiesCount` (kept here as `Slice::full_copies_count`, a
//! supplemented feature beyond the distilled goal algebra).

use crate::auction::{self, MAX_PARTS_COUNT};
use crate::label::{count_labels, labels_distance, labels_union, Labels};
use thiserror::Error;

/// Upper bound on `expectedCopies(goal)` (§3).
pub const MAX_EXPECTED_COPIES: u32 = 10;

/// Which physical technology a slice uses, and how many parts it has.
/// Mirrors `Goal::Slice::Type`'s `kTypeParts` table, minus the legacy
/// `tape` entry (out of this core's scope) and widened to a real EC
/// `(k, m)` pair instead of a single enumerated level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SliceType {
    Standard,
    Xor { level: u8 },
    Ec { k: u8, m: u8 },
}

impl SliceType {
    /// `expectedParts()`: slice size (1 for standard, `L` for xor including
    /// its parity part, `k + m` for ec).
    pub fn expected_parts(self) -> usize {
        match self {
            SliceType::Standard => 1,
            SliceType::Xor { level } => level as usize,
            SliceType::Ec { k, m } => k as usize + m as usize,
        }
    }

    pub fn is_standard(self) -> bool {
        matches!(self, SliceType::Standard)
    }

    pub fn is_xor(self) -> bool {
        matches!(self, SliceType::Xor { .. })
    }

    pub fn is_ec(self) -> bool {
        matches!(self, SliceType::Ec { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SliceError {
    #[error("slice of type {0:?} needs {1} parts, got {2}")]
    WrongPartCount(SliceType, usize, usize),
    #[error("part {0} of the slice has no labels at all (wildcards allowed, empty is not)")]
    EmptyPart(usize),
    #[error("cannot merge slices of different types")]
    TypeMismatch,
}

/// A typed array of labeled parts. Invariant (enforced at construction):
/// `parts.len() == slice_type.expected_parts()` and every part has at
/// least one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    slice_type: SliceType,
    parts: Vec<Labels>,
}

impl Slice {
    pub fn new(slice_type: SliceType, parts: Vec<Labels>) -> Result<Self, SliceError> {
        let expected = slice_type.expected_parts();
        if parts.len() != expected {
            return Err(SliceError::WrongPartCount(slice_type, expected, parts.len()));
        }
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                return Err(SliceError::EmptyPart(i));
            }
        }
        Ok(Slice { slice_type, parts })
    }

    /// Like [`Self::new`], but skips the "every part has a label" check: an
    /// *availability snapshot* (§3) describes actually-observed parts, which
    /// may legitimately be empty (nothing currently lives at that part
    /// index). Only a `target` goal carries the stronger invariant.
    pub fn new_unchecked(slice_type: SliceType, parts: Vec<Labels>) -> Result<Self, SliceError> {
        let expected = slice_type.expected_parts();
        if parts.len() != expected {
            return Err(SliceError::WrongPartCount(slice_type, expected, parts.len()));
        }
        Ok(Slice { slice_type, parts })
    }

    pub fn slice_type(&self) -> SliceType {
        self.slice_type
    }

    pub fn size(&self) -> usize {
        self.parts.len()
    }

    pub fn part(&self, idx: usize) -> &Labels {
        &self.parts[idx]
    }

    pub fn parts(&self) -> &[Labels] {
        &self.parts
    }

    pub fn parts_mut(&mut self) -> &mut [Labels] {
        &mut self.parts
    }

    pub fn is_valid(&self) -> bool {
        self.parts.len() == self.slice_type.expected_parts()
            && self.parts.iter().all(|p| !p.is_empty())
    }

    /// `getExpectedCopies`: total label count across every part.
    pub fn expected_copies(&self) -> u32 {
        self.parts.iter().map(count_labels).sum()
    }

    /// How many losses this slice tolerates before a logical copy is lost:
    /// `0` for a standard replica's single copy (any loss is fatal to that
    /// copy), `1` for xor (parity absorbs exactly one missing strip), `m`
    /// for ec(k, m).
    fn loss_tolerance(&self) -> usize {
        match self.slice_type {
            SliceType::Standard => 0,
            SliceType::Xor { .. } => 1,
            SliceType::Ec { m, .. } => m as usize,
        }
    }

    /// `getFullCopiesCount`: the number of *fully redundant* logical copies
    /// this slice currently backs. For a standard slice this is just the
    /// copy count; for xor/ec it is the `loss_tolerance`-th smallest
    /// per-part label count — the original's `l2` (second-lowest) for xor,
    /// generalized here to "the count that survives `loss_tolerance`
    /// simultaneous single-part losses".
    pub fn full_copies_count(&self) -> u32 {
        if self.slice_type.is_standard() {
            return self.expected_copies();
        }
        let mut counts: Vec<u32> = self.parts.iter().map(count_labels).collect();
        counts.sort_unstable();
        let idx = self.loss_tolerance().min(counts.len().saturating_sub(1));
        counts.get(idx).copied().unwrap_or(0)
    }

    /// Merges `other` into `self` in place, minimizing the total per-part
    /// label distance to the result under the best permutation of `other`'s
    /// parts (an assignment problem solved by the C10 auction), mirroring
    /// `Goal::Slice::mergeIn`.
    pub fn merge_in(&mut self, other: &Slice) -> Result<(), SliceError> {
        if self.slice_type != other.slice_type {
            return Err(SliceError::TypeMismatch);
        }
        let n = self.size();
        debug_assert_eq!(n, other.size());
        if n > MAX_PARTS_COUNT {
            // Slices this wide don't occur under kMaxExpectedCopies bounds;
            // guard defensively rather than index out of the cost matrix.
            return Err(SliceError::WrongPartCount(self.slice_type, MAX_PARTS_COUNT, n));
        }

        let mut cost = [[0i64; MAX_PARTS_COUNT]; MAX_PARTS_COUNT];
        for i in 0..n {
            for j in 0..n {
                let union = labels_union(&self.parts[i], &other.parts[j]);
                let dist = labels_distance(&self.parts[i], &union);
                cost[i][j] = 10 * MAX_EXPECTED_COPIES as i64 - dist as i64;
            }
        }

        let (assignment, _) = auction::auction_optimize(&cost, n);

        let mut result = Vec::with_capacity(n);
        for i in 0..n {
            result.push(labels_union(&self.parts[i], &other.parts[assignment[i]]));
        }
        self.parts = result;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::Label;

    fn part(pairs: &[(&str, u32)]) -> Labels {
        pairs.iter().map(|(l, c)| (Label::new(*l), *c)).collect()
    }

    #[test]
    fn rejects_wrong_part_count() {
        let err = Slice::new(SliceType::Xor { level: 3 }, vec![part(&[("us", 1)])]).unwrap_err();
        assert_eq!(err, SliceError::WrongPartCount(SliceType::Xor { level: 3 }, 3, 1));
    }

    #[test]
    fn rejects_empty_part() {
        let err = Slice::new(
            SliceType::Standard,
            vec![Labels::new()],
        )
        .unwrap_err();
        assert_eq!(err, SliceError::EmptyPart(0));
    }

    #[test]
    fn standard_full_copies_is_expected_copies() {
        let s = Slice::new(SliceType::Standard, vec![part(&[("us", 1), ("eu", 1)])]).unwrap();
        assert_eq!(s.full_copies_count(), 2);
    }

    #[test]
    fn xor_full_copies_is_second_lowest_part_count() {
        let s = Slice::new(
            SliceType::Xor { level: 3 },
            vec![part(&[("us", 2)]), part(&[("us", 1)]), part(&[("us", 2)])],
        )
        .unwrap();
        // sorted part counts: [1, 2, 2] -> second-lowest (index 1) is 2
        assert_eq!(s.full_copies_count(), 2);
    }

    #[test]
    fn merge_of_disjoint_label_sets_unions_per_part() {
        let mut a = Slice::new(
            SliceType::Xor { level: 2 },
            vec![part(&[("us", 1)]), part(&[("eu", 1)])],
        )
        .unwrap();
        let b = Slice::new(
            SliceType::Xor { level: 2 },
            vec![part(&[("us", 1)]), part(&[("eu", 1)])],
        )
        .unwrap();
        a.merge_in(&b).unwrap();
        assert_eq!(a.part(0), &part(&[("us", 1)]));
        assert_eq!(a.part(1), &part(&[("eu", 1)]));
    }

    #[test]
    fn merge_is_idempotent_on_equal_slices() {
        let mut a = Slice::new(SliceType::Standard, vec![part(&[("us", 1), ("eu", 1)])]).unwrap();
        let b = a.clone();
        a.merge_in(&b).unwrap();
        assert_eq!(a, b);
    }
}
