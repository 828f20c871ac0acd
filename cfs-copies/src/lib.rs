//! Per-chunk replication target calculator (C8): given a declared `target`
//! goal and an `available` snapshot of actually-observed labeled parts,
//! decides which parts to create/delete/relabel while preserving a safety
//! invariant.
//!
//! Modeled on
//! `src/master/chunk_copies_calculator.cc`'s
//! `ChunkCopiesCalculator`, adapted to a cleaner integer
//! `redundancyLevel` formula (`-1 + sum(max(sliceRedundancy + 1, 0))`)
//! rather than the original's three-bucket `ChunksAvailabilityState`
//! classification: the two disagree by exactly one slot at the safety
//! boundary for a `standard` slice (original: safe needs `copies >= 2`,
//! i.e. `redundancy >= 1`) versus an xor/ec slice (safe needs
//! `type_count >= L`, i.e. `redundancy >= 0`) — the
//! `max(sliceRedundancy + 1, 0)` sum already folds that asymmetry in
//! consistently, so re-deriving the three-bucket scheme on top would risk
//! breaking the "can-remove implies safe" guarantee below. `operationCount`,
//! `canMovePartToDifferentLabel`, `getLabelsToRecover`, and `getRemovePool`
//! keep the original's exact wildcard-absorbing walk.

use cfs_goal::{count_labels, Goal, Label, Labels, Slice, SliceType};
use std::collections::BTreeSet;

/// Translates `operationCount(src, dst)`: creates/deletes needed to turn a
/// multiset of currently-available labels into the multiset a goal part
/// requires, letting a `dst` wildcard absorb `src` surplus at other labels
/// before counting it as a deletion.
fn label_op_count(src: &Labels, dst: &Labels) -> (u32, u32) {
    let mut wcount = dst.get(&Label::wildcard()).copied().unwrap_or(0);
    let mut creates = 0u32;
    let mut deletes = 0u32;

    let mut src_iter = src.iter().peekable();

    for (label, &want) in dst.iter() {
        if label.is_wildcard() {
            break;
        }
        while let Some(&(sl, _)) = src_iter.peek() {
            if sl < label {
                let (_, &sc) = src_iter.next().unwrap();
                let absorbed = wcount.min(sc);
                deletes += sc - absorbed;
                wcount -= absorbed;
            } else {
                break;
            }
        }

        match src_iter.peek().copied() {
            Some((sl, &sc)) if sl == label => {
                if want < sc {
                    let remove = sc - want;
                    let absorbed = wcount.min(remove);
                    deletes += remove - absorbed;
                    wcount -= absorbed;
                } else if want > sc {
                    creates += want - sc;
                }
                src_iter.next();
            }
            _ => {
                creates += want;
            }
        }
    }

    for (_, &sc) in src_iter {
        let absorbed = wcount.min(sc);
        deletes += sc - absorbed;
        wcount -= absorbed;
    }

    creates += wcount;
    (creates, deletes)
}

fn empty_labels() -> Labels {
    Labels::new()
}

/// Joint analysis of a `(target, available)` goal pair for one chunk.
pub struct CopiesCalculator {
    target: Goal,
    available: Goal,
}

impl CopiesCalculator {
    pub fn new(target: Goal, available: Goal) -> Self {
        CopiesCalculator { target, available }
    }

    pub fn target(&self) -> &Goal {
        &self.target
    }

    pub fn available(&self) -> &Goal {
        &self.available
    }

    pub fn set_target(&mut self, target: Goal) {
        self.target = target;
    }

    pub fn set_available(&mut self, available: Goal) {
        self.available = available;
    }

    fn all_slice_types(&self) -> Vec<SliceType> {
        let mut types: Vec<SliceType> = self.target.slices().iter().map(Slice::slice_type).collect();
        for s in self.available.slices() {
            if !types.contains(&s.slice_type()) {
                types.push(s.slice_type());
            }
        }
        types
    }

    /// Per-slice redundancy per §4.8's safety definition: standard is
    /// `copies - 1`; xor(L) is `distinct live strips - L`; ec(k, m) is
    /// `distinct live strips - k`, capped at `+m` (can't be "more
    /// redundant" than the parity budget allows).
    fn slice_redundancy(slice_type: SliceType, slice: Option<&Slice>) -> i32 {
        let distinct_live = slice
            .map(|s| s.parts().iter().filter(|p| !p.is_empty()).count() as i32)
            .unwrap_or(0);
        match slice_type {
            SliceType::Standard => {
                let copies = slice.map(|s| count_labels(s.part(0)) as i32).unwrap_or(0);
                copies - 1
            }
            SliceType::Xor { level } => distinct_live - level as i32,
            SliceType::Ec { k, m } => (distinct_live - k as i32).min(m as i32),
        }
    }

    /// `redundancyLevel(chunk)`: `0` endangered, `<0` lost, `>=1` safe with
    /// that much margin. Evaluated against `self.available` over the union
    /// of slice types named by either `target` or `available` (a slice type
    /// the target wants but that has zero observed parts still contributes
    /// its full negative redundancy to the sum).
    pub fn redundancy_level(&self) -> i32 {
        self.redundancy_level_of(&self.available)
    }

    fn redundancy_level_of(&self, available: &Goal) -> i32 {
        let types = self.all_slice_types();
        if types.is_empty() {
            // nothing targeted and nothing observed: vacuously safe.
            return 1;
        }
        let sum: i32 = types
            .iter()
            .map(|&t| (Self::slice_redundancy(t, available.find(t)) + 1).max(0))
            .sum();
        sum - 1
    }

    /// `(creates, deletes)` summed over every slice part named by either
    /// goal.
    pub fn operation_count(&self) -> (u32, u32) {
        let mut creates = 0u32;
        let mut deletes = 0u32;
        for slice_type in self.all_slice_types() {
            let target_slice = self.target.find(slice_type);
            let avail_slice = self.available.find(slice_type);
            let parts = slice_type.expected_parts();
            for idx in 0..parts {
                let empty = empty_labels();
                let src = avail_slice.map(|s| s.part(idx)).unwrap_or(&empty);
                let dst = target_slice.map(|s| s.part(idx)).unwrap_or(&empty);
                let (c, d) = label_op_count(src, dst);
                creates += c;
                deletes += d;
            }
        }
        (creates, deletes)
    }

    fn simulate_remove(&self, slice_type: SliceType, part: usize, label: &Label) -> Goal {
        let mut available = self.available.clone();
        if let Some(slice) = available.find_mut(slice_type) {
            if let Some(count) = slice.parts_mut()[part].get_mut(label) {
                *count -= 1;
                if *count == 0 {
                    slice.parts_mut()[part].remove(label);
                }
            }
        }
        available
    }

    /// True iff removing one copy of `(slice_type, part, label)` leaves the
    /// chunk safe (`redundancy_level() >= 1` afterward) — with the one
    /// documented exception of §4.8: when the target is exactly a single
    /// total copy (e.g. `standard x 1`) and at least one copy of this slice
    /// currently exists, reducing to zero redundancy is permitted (the user
    /// asked for an endangered chunk).
    pub fn can_remove_part(&self, slice_type: SliceType, part: usize, label: &Label) -> bool {
        if self.target.slices().is_empty() {
            return true;
        }

        if let Some(target_slice) = self.target.find(slice_type) {
            if target_slice.expected_copies() == 1 {
                if let Some(avail_slice) = self.available.find(slice_type) {
                    if avail_slice.expected_copies() >= 1 {
                        return true;
                    }
                }
            }
        }

        let simulated = self.simulate_remove(slice_type, part, label);
        if self.redundancy_level_of(&simulated) < 1 {
            return false;
        }

        // the aggregate redundancy number alone can't tell a surplus copy
        // (safe to drop) from a copy a non-wildcard target slot still
        // specifically requires: both shapes reduce the slice's total
        // label count by the same amount. `labels_to_recover_against` finds
        // out which this is by recomputing each target label's shortfall
        // against the simulated availability, folding surplus toward the
        // target's own wildcard (if any) the same way `getLabelsToRecover`
        // does; any non-wildcard entry there means this exact label was
        // still pinned down by the target, so the removal isn't safe even
        // though the headcount alone still looks fine.
        let recover = self.labels_to_recover_against(&simulated, slice_type, part);
        recover.keys().all(Label::is_wildcard)
    }

    /// True iff the part at `(slice_type, part)` currently has more copies
    /// at `label` than the target requires there, i.e. a copy could be
    /// relocated to a different label without first creating a new one.
    pub fn can_move_part_to_different_label(
        &self,
        slice_type: SliceType,
        part: usize,
        label: &Label,
    ) -> bool {
        let (Some(avail_slice), Some(target_slice)) =
            (self.available.find(slice_type), self.target.find(slice_type))
        else {
            return false;
        };

        let target_count = target_slice.part(part).get(label).copied();
        let Some(target_count) = target_count else {
            return true;
        };
        let avail_count = avail_slice.part(part).get(label).copied().unwrap_or(0);
        avail_count > target_count
    }

    /// Multiset of labels whose required count at `(slice_type, part)`
    /// exceeds what's available, folding surplus at other labels toward a
    /// wildcard requirement first.
    pub fn labels_to_recover(&self, slice_type: SliceType, part: usize) -> Labels {
        self.labels_to_recover_against(&self.available, slice_type, part)
    }

    /// Same computation as [`Self::labels_to_recover`] but against an
    /// arbitrary `available` snapshot instead of `self.available` — used by
    /// `can_remove_part` to check a simulated removal without mutating or
    /// cloning `self`.
    fn labels_to_recover_against(&self, available: &Goal, slice_type: SliceType, part: usize) -> Labels {
        let Some(target_slice) = self.target.find(slice_type) else {
            return Labels::new();
        };
        let target_labels = target_slice.part(part);
        let Some(avail_slice) = available.find(slice_type) else {
            return target_labels.clone();
        };
        let avail_labels = avail_slice.part(part);

        let mut wcount = target_labels.get(&Label::wildcard()).copied().unwrap_or(0);
        let mut result = Labels::new();
        let mut avail_iter = avail_labels.iter().peekable();

        for (label, &want) in target_labels.iter() {
            if label.is_wildcard() {
                break;
            }
            while let Some(&(al, _)) = avail_iter.peek() {
                if al < label {
                    let (_, &ac) = avail_iter.next().unwrap();
                    wcount -= wcount.min(ac);
                } else {
                    break;
                }
            }
            match avail_iter.peek().copied() {
                Some((al, &ac)) if al == label => {
                    if want > ac {
                        result.insert(label.clone(), want - ac);
                    }
                    if want < ac {
                        let remove = ac - want;
                        wcount -= wcount.min(remove);
                    }
                    avail_iter.next();
                }
                _ => {
                    result.insert(label.clone(), want);
                }
            }
        }
        for (_, &ac) in avail_iter {
            wcount -= wcount.min(ac);
        }
        if wcount > 0 {
            result.insert(Label::wildcard(), wcount);
        }
        result
    }

    /// Labels from which a copy of `(slice_type, part)` may safely be
    /// reclaimed: available labels beyond what the target still needs
    /// there, unless the excess is already fully absorbed by the target's
    /// own wildcard requirement.
    pub fn remove_pool(&self, slice_type: SliceType, part: usize) -> BTreeSet<Label> {
        let Some(avail_slice) = self.available.find(slice_type) else {
            return BTreeSet::new();
        };
        let avail_labels = avail_slice.part(part);
        let Some(target_slice) = self.target.find(slice_type) else {
            return avail_labels.keys().cloned().collect();
        };
        let target_labels = target_slice.part(part);

        let mut surplus = 0u32;
        let mut wildcard_target = 0u32;
        let mut result = BTreeSet::new();
        let mut avail_iter = avail_labels.iter().peekable();

        for (label, &want) in target_labels.iter() {
            if label.is_wildcard() {
                wildcard_target = want;
                break;
            }
            while let Some(&(al, &ac)) = avail_iter.peek() {
                if al < label {
                    result.insert(al.clone());
                    surplus += ac;
                    avail_iter.next();
                } else {
                    break;
                }
            }
            if let Some((al, &ac)) = avail_iter.peek().copied() {
                if al == label {
                    if want < ac {
                        result.insert(label.clone());
                        surplus += ac - want;
                    }
                    avail_iter.next();
                }
            }
        }
        for (al, &ac) in avail_iter {
            result.insert(al.clone());
            surplus += ac;
        }

        if surplus <= wildcard_target {
            result.clear();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfs_goal::SliceType;

    fn labels(pairs: &[(&str, u32)]) -> Labels {
        pairs.iter().map(|(l, c)| (Label::new(*l), *c)).collect()
    }

    fn standard_goal(name: &str, copies: &[(&str, u32)]) -> Goal {
        let slice = Slice::new(SliceType::Standard, vec![labels(copies)]).unwrap();
        Goal::new(name, vec![slice]).unwrap()
    }

    fn standard_available(copies: &[(&str, u32)]) -> Goal {
        let slice = Slice::new_unchecked(SliceType::Standard, vec![labels(copies)]).unwrap();
        Goal::observed("available", vec![slice]).unwrap()
    }

    /// S6: target `us_eu = {standard[{us:1, eu:1}]}`, available
    /// `{us:1, eu:1, cn:1}`.
    #[test]
    fn s6_remove_surplus_copy_is_safe_remove_required_is_not() {
        let target = standard_goal("us_eu", &[("us", 1), ("eu", 1)]);
        let available = standard_available(&[("us", 1), ("eu", 1), ("cn", 1)]);
        let calc = CopiesCalculator::new(target, available);

        assert!(calc.can_remove_part(SliceType::Standard, 0, &Label::new("cn")));
        assert!(!calc.can_remove_part(SliceType::Standard, 0, &Label::new("us")));
        assert!(calc.labels_to_recover(SliceType::Standard, 0).is_empty());
        assert!(calc.remove_pool(SliceType::Standard, 0).contains(&Label::new("cn")));
    }

    #[test]
    fn standard_single_copy_target_permits_reduction_to_zero_redundancy() {
        let target = standard_goal("g", &[("us", 1)]);
        let available = standard_available(&[("us", 1)]);
        let calc = CopiesCalculator::new(target, available);
        assert!(calc.can_remove_part(SliceType::Standard, 0, &Label::new("us")));
    }

    #[test]
    fn redundancy_level_counts_missing_slice_as_fully_negative() {
        let target = standard_goal("g", &[("us", 1), ("eu", 1)]);
        let available = Goal::empty("available");
        let calc = CopiesCalculator::new(target, available);
        // standard, 0 copies: redundancy = -1; chunk level = -1 + max(-1+1,0) = -1
        assert_eq!(calc.redundancy_level(), -1);
    }

    #[test]
    fn operation_count_reports_missing_copies_as_creates() {
        let target = standard_goal("g", &[("us", 1), ("eu", 1)]);
        let available = standard_available(&[("us", 1)]);
        let calc = CopiesCalculator::new(target, available);
        let (creates, deletes) = calc.operation_count();
        assert_eq!((creates, deletes), (1, 0));
    }

    #[test]
    fn can_move_part_to_different_label_detects_surplus() {
        let target = standard_goal("g", &[("us", 1)]);
        let available = standard_available(&[("us", 2)]);
        let calc = CopiesCalculator::new(target, available);
        assert!(calc.can_move_part_to_different_label(SliceType::Standard, 0, &Label::new("us")));
    }
}
