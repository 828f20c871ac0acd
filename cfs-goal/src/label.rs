//! Chunk-server labels (C9): short free-form tags used to constrain chunk
//! placement, plus the reserved wildcard that matches any server.
//!
//! Mirrors `src/common/goal.cc`'s
//! `MediaLabel`/`makeLabelsUnion`/`labelsDistance`: a `MediaLabel` there is
//! an ordered key with the wildcard defined to compare greater than every
//! other value, so a `std::map<MediaLabel, int>` iterates real labels first
//! and the wildcard last. [`Label`]'s `Ord` impl reproduces exactly that so
//! a plain `BTreeMap<Label, u32>` gets the same iteration order for free.

use std::collections::BTreeMap;
use std::fmt;

/// The reserved label matching any chunkserver, always sorted last.
pub const WILDCARD: &str = "_";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(String);

impl Label {
    pub fn new(s: impl Into<String>) -> Self {
        Label(s.into())
    }

    pub fn wildcard() -> Self {
        Label(WILDCARD.to_string())
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialOrd for Label {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Label {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use std::cmp::Ordering::*;
        match (self.is_wildcard(), other.is_wildcard()) {
            (true, true) => Equal,
            (true, false) => Greater,
            (false, true) => Less,
            (false, false) => self.0.cmp(&other.0),
        }
    }
}

/// A multiset of labels: `label -> required/observed count`. Always kept
/// with zero-count entries removed, which is what lets [`labels_distance`]
/// treat "missing" and "explicitly zero" the same way.
pub type Labels = BTreeMap<Label, u32>;

/// Total copies named by a label multiset, wildcard included.
pub fn count_labels(labels: &Labels) -> u32 {
    labels.values().sum()
}

/// `labelsUnion`/`makeLabelsUnion`: a sorted merge-walk of `a` and `b` that
/// takes the label-wise maximum for labels both sides name explicitly, and
/// folds any remaining excess (`max(sum_a, sum_b) - merged_sum`) into a
/// wildcard entry of the result — the union must still describe at least
/// as many copies as either input even when the inputs disagree about
/// which concrete labels they are at.
pub fn labels_union(a: &Labels, b: &Labels) -> Labels {
    let mut result = Labels::new();
    let mut sum_a = 0u32;
    let mut sum_b = 0u32;
    let mut merged = 0u32;

    let mut a_iter = a.iter().peekable();
    let mut b_iter = b.iter().peekable();

    loop {
        match (a_iter.peek(), b_iter.peek()) {
            (Some((la, _)), _) if la.is_wildcard() => {
                sum_a += a_iter.next().unwrap().1;
                break;
            }
            (_, Some((lb, _))) if lb.is_wildcard() => {
                // handled after the loop once `a` is drained
                break;
            }
            (Some((la, ca)), Some((lb, cb))) => match la.cmp(lb) {
                std::cmp::Ordering::Less => {
                    result.insert((*la).clone(), *ca);
                    sum_a += ca;
                    merged += ca;
                    a_iter.next();
                }
                std::cmp::Ordering::Greater => {
                    result.insert((*lb).clone(), *cb);
                    sum_b += cb;
                    merged += cb;
                    b_iter.next();
                }
                std::cmp::Ordering::Equal => {
                    let m = (*ca).max(*cb);
                    result.insert((*la).clone(), m);
                    sum_a += ca;
                    sum_b += cb;
                    merged += m;
                    a_iter.next();
                    b_iter.next();
                }
            },
            (Some(_), None) => {
                let (l, c) = a_iter.next().unwrap();
                result.insert(l.clone(), *c);
                sum_a += c;
                merged += c;
            }
            (None, Some(_)) => {
                let (l, c) = b_iter.next().unwrap();
                result.insert(l.clone(), *c);
                sum_b += c;
                merged += c;
            }
            (None, None) => break,
        }
    }
    // drain whatever real labels are left on either side once one side hit
    // its wildcard (or both sides are exhausted of real labels)
    for (l, c) in a_iter {
        if !l.is_wildcard() {
            result.insert(l.clone(), *c);
            merged += c;
        }
        sum_a += c;
    }
    for (l, c) in b_iter {
        if !l.is_wildcard() {
            result.insert(l.clone(), *c);
            merged += c;
        }
        sum_b += c;
    }

    let wildcards = sum_a.max(sum_b).saturating_sub(merged);
    if wildcards > 0 {
        result.insert(Label::wildcard(), wildcards);
    }
    result
}

/// `labelsDistance`: the 1-norm `sum(|a[l] - b[l]|)` over the union of
/// labels named by either side, missing entries treated as zero.
pub fn labels_distance(a: &Labels, b: &Labels) -> u32 {
    let mut keys: Vec<&Label> = a.keys().chain(b.keys()).collect();
    keys.sort();
    keys.dedup();
    keys.into_iter()
        .map(|l| {
            let av = a.get(l).copied().unwrap_or(0);
            let bv = b.get(l).copied().unwrap_or(0);
            av.abs_diff(bv)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, u32)]) -> Labels {
        pairs.iter().map(|(l, c)| (Label::new(*l), *c)).collect()
    }

    #[test]
    fn wildcard_sorts_last() {
        let mut ls = labels(&[("us", 1), ("_", 1), ("eu", 1)]);
        let mut v: Vec<&str> = ls.keys().map(Label::as_str).collect();
        assert_eq!(v, vec!["eu", "us", "_"]);
        ls.clear();
        v.clear();
    }

    #[test]
    fn union_of_disjoint_labels_is_the_sum() {
        let a = labels(&[("us", 1)]);
        let b = labels(&[("eu", 1)]);
        let u = labels_union(&a, &b);
        assert_eq!(u, labels(&[("us", 1), ("eu", 1)]));
    }

    #[test]
    fn union_takes_max_on_shared_label() {
        let a = labels(&[("us", 3)]);
        let b = labels(&[("us", 1)]);
        assert_eq!(labels_union(&a, &b), labels(&[("us", 3)]));
    }

    #[test]
    fn union_of_wholly_disjoint_labels_has_no_wildcard_excess() {
        let a = labels(&[("us", 1), ("eu", 1)]);
        let b = labels(&[("cn", 2)]);
        let u = labels_union(&a, &b);
        assert_eq!(u, labels(&[("us", 1), ("eu", 1), ("cn", 2)]));
    }

    #[test]
    fn union_with_wildcard_on_one_side_forces_wildcard_excess() {
        // target wants any 2 servers; available only names "us":1 explicitly
        let a = labels(&[("_", 2)]);
        let b = labels(&[("us", 1)]);
        let u = labels_union(&a, &b);
        assert_eq!(u.get(&Label::new("us")), Some(&1));
        assert_eq!(u.get(&Label::wildcard()), Some(&1));
        assert_eq!(count_labels(&u), 2);
    }

    #[test]
    fn distance_counts_missing_as_zero() {
        let a = labels(&[("us", 2)]);
        let b = labels(&[]);
        assert_eq!(labels_distance(&a, &b), 2);
    }
}
