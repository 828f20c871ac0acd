//! A replication/erasure policy: a named set of [`Slice`]s, at most one per
//! [`SliceType`]. Mirrors
//! `src/common/goal.cc`'s `Goal::mergeIn`/
//! `Goal::getExpectedCopies`.

use crate::slice::{Slice, SliceType, MAX_EXPECTED_COPIES};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GoalError {
    #[error("goal already has a slice of type {0:?}")]
    DuplicateSliceType(SliceType),
    #[error("expected copies {0} exceeds the bound of {MAX_EXPECTED_COPIES}")]
    TooManyExpectedCopies(u32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Goal {
    name: String,
    slices: Vec<Slice>,
}

impl Goal {
    pub fn new(name: impl Into<String>, slices: Vec<Slice>) -> Result<Self, GoalError> {
        let goal = Goal {
            name: name.into(),
            slices,
        };
        for (i, a) in goal.slices.iter().enumerate() {
            for b in &goal.slices[i + 1..] {
                if a.slice_type() == b.slice_type() {
                    return Err(GoalError::DuplicateSliceType(a.slice_type()));
                }
            }
        }
        let copies = goal.expected_copies();
        if copies > MAX_EXPECTED_COPIES {
            return Err(GoalError::TooManyExpectedCopies(copies));
        }
        Ok(goal)
    }

    /// An empty goal: no slices, `expected_copies() == 0`. Used as the
    /// `available` snapshot's starting point before any parts are observed.
    pub fn empty(name: impl Into<String>) -> Self {
        Goal {
            name: name.into(),
            slices: Vec::new(),
        }
    }

    /// Builds an *availability snapshot* (§3): same shape as a goal, but
    /// without the `expected_copies <= kMaxExpectedCopies` bound a declared
    /// target must respect — an over-replicated chunk can transiently have
    /// more observed copies than any goal would ever request. Slice types
    /// must still be unique.
    pub fn observed(name: impl Into<String>, slices: Vec<Slice>) -> Result<Self, GoalError> {
        let goal = Goal {
            name: name.into(),
            slices,
        };
        for (i, a) in goal.slices.iter().enumerate() {
            for b in &goal.slices[i + 1..] {
                if a.slice_type() == b.slice_type() {
                    return Err(GoalError::DuplicateSliceType(a.slice_type()));
                }
            }
        }
        Ok(goal)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn find(&self, slice_type: SliceType) -> Option<&Slice> {
        self.slices.iter().find(|s| s.slice_type() == slice_type)
    }

    pub fn find_mut(&mut self, slice_type: SliceType) -> Option<&mut Slice> {
        self.slices.iter_mut().find(|s| s.slice_type() == slice_type)
    }

    pub fn expected_copies(&self) -> u32 {
        self.slices.iter().map(Slice::expected_copies).sum()
    }

    /// `Goal::mergeIn`: unions `other`'s slices into `self`, slice type by
    /// slice type. A slice type `self` lacks is adopted as-is (union with
    /// empty is identity); a shared slice type is merged per
    /// `Slice::merge_in`.
    pub fn merge_in(&mut self, other: &Goal) -> Result<(), crate::slice::SliceError> {
        for other_slice in &other.slices {
            match self.find_mut(other_slice.slice_type()) {
                Some(existing) => existing.merge_in(other_slice)?,
                None => self.slices.push(other_slice.clone()),
            }
        }
        Ok(())
    }

    /// `merge(g1, g2)`: the non-mutating form, building a fresh goal with
    /// `g1`'s name so callers don't need to decide which side to clone.
    pub fn merge(g1: &Goal, g2: &Goal) -> Result<Goal, crate::slice::SliceError> {
        let mut result = g1.clone();
        result.merge_in(g2)?;
        Ok(result)
    }

    /// Sum of [`Slice::full_copies_count`] across slices, the goal-level
    /// "how many complete copies do we have" reporting figure (supplemented
    /// feature, see `DESIGN.md`).
    pub fn full_copies_count(&self) -> u32 {
        self.slices.iter().map(Slice::full_copies_count).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::{Label, Labels};
    use crate::slice::Slice;

    fn part(pairs: &[(&str, u32)]) -> Labels {
        pairs.iter().map(|(l, c)| (Label::new(*l), *c)).collect()
    }

    fn standard_goal(name: &str, labels: &[(&str, u32)]) -> Goal {
        let slice = Slice::new(SliceType::Standard, vec![part(labels)]).unwrap();
        Goal::new(name, vec![slice]).unwrap()
    }

    #[test]
    fn merge_is_commutative_up_to_permutation() {
        let a = standard_goal("a", &[("us", 1)]);
        let b = standard_goal("b", &[("eu", 1)]);
        let ab = Goal::merge(&a, &b).unwrap();
        let ba = Goal::merge(&b, &a).unwrap();
        assert_eq!(ab.expected_copies(), ba.expected_copies());
        assert_eq!(
            ab.find(SliceType::Standard).unwrap().part(0),
            ba.find(SliceType::Standard).unwrap().part(0)
        );
    }

    #[test]
    fn merge_is_idempotent() {
        let a = standard_goal("a", &[("us", 1), ("eu", 1)]);
        let once = Goal::merge(&a, &a).unwrap();
        let twice = Goal::merge(&once, &a).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn merge_adopts_a_slice_type_the_target_lacks() {
        let a = Goal::empty("a");
        let b = standard_goal("b", &[("us", 1)]);
        let merged = Goal::merge(&a, &b).unwrap();
        assert_eq!(merged.expected_copies(), 1);
    }

    #[test]
    fn duplicate_slice_type_is_rejected_at_construction() {
        let s1 = Slice::new(SliceType::Standard, vec![part(&[("us", 1)])]).unwrap();
        let s2 = Slice::new(SliceType::Standard, vec![part(&[("eu", 1)])]).unwrap();
        let err = Goal::new("g", vec![s1, s2]).unwrap_err();
        assert_eq!(err, GoalError::DuplicateSliceType(SliceType::Standard));
    }
}
