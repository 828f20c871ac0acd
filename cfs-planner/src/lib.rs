//! Read planner (C7): given the chunk parts a client can currently see and
//! a requested byte range, decides which parts to read and how to turn
//! what comes back into the requested bytes.
//!
//! Follows `ChunkReadPlanner`'s two-phase shape: enumerate candidate slice
//! types present among the available parts, pick the first one for which
//! reading is possible, then compute the data-part index range the
//! requested block range maps to. The plan/post-processing split mirrors
//! `read_plan_executor.h`'s `executePlan` (issuing reads) followed by
//! `executeXorOperations` (running recovery). `ChunkReadPlanner` delegates
//! its actual feasibility/recovery logic to a `SliceReadPlanner` with no
//! surviving reference implementation, so the ladder steps,
//! wave/additional-operation split, and post-processing op set below are
//! derived directly from the read-path contract this planner must satisfy.

use cfs_chunk_format::ChunkPartType;
use std::collections::{BTreeMap, HashMap, HashSet};

pub const MFS_BLOCK_SIZE: u64 = cfs_chunk_format::MFS_BLOCK_SIZE;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("no combination of available parts can recover the requested range")]
    NotRecoverable,
}

/// The physical striping scheme a group of [`ChunkPartType`]s belongs to,
/// used to group candidates during ladder evaluation. Distinct from
/// `cfs_goal::SliceType` (which lives a layer up, at the goal/placement
/// level) so this crate doesn't need to depend on `cfs-goal` at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum SliceKey {
    Standard,
    Xor(u8),
    Ec(u8, u8),
}

fn slice_key(t: ChunkPartType) -> SliceKey {
    match t {
        ChunkPartType::Standard => SliceKey::Standard,
        ChunkPartType::Xor { level, .. } | ChunkPartType::XorParity { level } => SliceKey::Xor(level),
        ChunkPartType::Ec { k, m, .. } => SliceKey::Ec(k, m),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOperation {
    pub request_offset: u64,
    pub request_size: u64,
    pub buffer_offset: u64,
    pub wave: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostProcessingOp {
    /// Re-interleaves blocks read from `data_parts` (in stripe order) back
    /// into contiguous chunk-block order, the `BlockConverter` analog.
    CopyBlockInterleave {
        chunk_first_block: u32,
        chunk_block_count: u32,
        data_part_count: u32,
        first_required_part: u8,
    },
    /// XORs the missing data part's blocks back in place using the parity
    /// part and the other present data parts.
    XorRecover { level: u8, missing_part: u8 },
    /// Reed-Solomon recovery of the missing data strips from `k` of the
    /// `k + m` available strips via a Vandermonde-style inverse over
    /// GF(2^8).
    RsRecover { k: u8, m: u8, missing: Vec<u8> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadPlan {
    pub read_buffer_size: u64,
    pub basic_read_operations: BTreeMap<ChunkPartType, ReadOperation>,
    pub additional_operations: BTreeMap<ChunkPartType, ReadOperation>,
    pub post_processing: Vec<(u64, PostProcessingOp)>,
}

impl ReadPlan {
    /// True once every part named in `basic_read_operations` has arrived
    /// (additional/speculative parts are never required).
    pub fn is_reading_finished(&self, received: &HashSet<ChunkPartType>) -> bool {
        self.basic_read_operations.keys().all(|p| received.contains(p))
    }
}

fn block_range(offset: u64, size: u64) -> (u32, u32) {
    let first = (offset / MFS_BLOCK_SIZE) as u32;
    let last = ((offset + size - 1) / MFS_BLOCK_SIZE) as u32;
    (first, last - first + 1)
}

/// Which block indices of a striped part (by 1-based xor `part` or 0-based
/// ec `idx`) are touched by chunk blocks `[chunk_first, chunk_first +
/// chunk_count)`, and the corresponding offset range within that part file.
/// Same row range as [`part_block_span`], but for a full-width strip
/// (xor parity, or an ec strip standing in for a missing data strip):
/// every row the range touches needs the strip present, regardless of
/// which column within the row the range happens to start/end on.
fn full_width_block_span(data_part_count: u32, chunk_first: u32, chunk_count: u32) -> (u32, u32) {
    let chunk_last = chunk_first + chunk_count - 1;
    let first_part_block = chunk_first / data_part_count;
    let last_part_block = chunk_last / data_part_count;
    (first_part_block, last_part_block - first_part_block + 1)
}

fn part_block_span(data_part_count: u32, part_index: u32, chunk_first: u32, chunk_count: u32) -> (u32, u32) {
    let chunk_last = chunk_first + chunk_count - 1;
    let first_part_block = chunk_first / data_part_count;
    let last_part_block = chunk_last / data_part_count;
    // every part block in [first_part_block, last_part_block] is touched
    // unless the range is shorter than one full stripe row and doesn't
    // include this part's column at all.
    if chunk_count < data_part_count {
        let first_col = chunk_first % data_part_count;
        let last_col = chunk_last % data_part_count;
        let touched = if first_col <= last_col {
            part_index >= first_col && part_index <= last_col
        } else {
            part_index >= first_col || part_index <= last_col
        };
        if !touched {
            return (first_part_block, 0);
        }
    }
    (first_part_block, last_part_block - first_part_block + 1)
}

/// Per-candidate context: the chunk part types actually available, keyed
/// by [`ChunkPartType`], alongside a score used for tie-breaking.
pub struct Planner {
    bandwidth_overuse: f64,
    scores: HashMap<ChunkPartType, f64>,
    avoided: HashSet<ChunkPartType>,
}

impl Planner {
    pub fn new(bandwidth_overuse: f64) -> Self {
        Planner {
            bandwidth_overuse: bandwidth_overuse.max(1.0),
            scores: HashMap::new(),
            avoided: HashSet::new(),
        }
    }

    pub fn set_scores(&mut self, scores: HashMap<ChunkPartType, f64>) {
        self.scores = scores;
    }

    fn score(&self, t: ChunkPartType) -> f64 {
        self.scores.get(&t).copied().unwrap_or(0.0)
    }

    /// `startAvoidingPart`: durably excludes `part` from basic-wave
    /// candidate selection until process restart; it may still be used as
    /// a failover (`additional_operations`) part.
    pub fn start_avoiding_part(&mut self, part: ChunkPartType) {
        self.avoided.insert(part);
    }

    /// `isFinishingPossible`: would the ladder still find a usable
    /// strategy if every part in `failed` were removed from
    /// `available`?
    pub fn is_finishing_possible(&self, available: &[ChunkPartType], offset: u64, size: u64, failed: &HashSet<ChunkPartType>) -> bool {
        let remaining: Vec<ChunkPartType> = available.iter().copied().filter(|p| !failed.contains(p)).collect();
        self.evaluate(&remaining, offset, size).is_some()
    }

    /// Finds the ladder step to use, returning `(slice_key, data parts
    /// present, parity/extra parts present)`. Does not build the plan yet.
    fn evaluate(&self, available: &[ChunkPartType], offset: u64, size: u64) -> Option<LadderChoice> {
        let (chunk_first, chunk_count) = block_range(offset, size);

        let mut groups: BTreeMap<SliceKey, Vec<ChunkPartType>> = BTreeMap::new();
        for &p in available {
            groups.entry(slice_key(p)).or_default().push(p);
        }

        // step 1: full data-part set for some striping slice type (standard
        // excluded — trivial single-part case is step 2).
        let mut best_full: Option<(SliceKey, Vec<ChunkPartType>, u32)> = None;
        for (&key, parts) in &groups {
            let data_part_count = match key {
                SliceKey::Standard => continue,
                SliceKey::Xor(level) => level as u32,
                SliceKey::Ec(k, _) => k as u32,
            };
            let data_parts: Vec<ChunkPartType> = parts
                .iter()
                .copied()
                .filter(|p| p.is_xor() || p.is_ec())
                .collect();
            let distinct: HashSet<u8> = data_parts
                .iter()
                .filter_map(|p| match *p {
                    ChunkPartType::Xor { part, .. } => Some(part - 1),
                    ChunkPartType::Ec { k, idx, .. } if idx < k => Some(idx),
                    _ => None,
                })
                .collect();
            if distinct.len() as u32 == data_part_count {
                let better = match &best_full {
                    None => true,
                    Some((_, _, best_count)) => data_part_count > *best_count,
                };
                if better {
                    best_full = Some((key, data_parts, data_part_count));
                }
            }
        }
        if let Some((key, data_parts, data_part_count)) = best_full {
            return Some(LadderChoice::FullDataSet { key, data_parts, data_part_count });
        }

        // step 2: a standard replica.
        if let Some(parts) = groups.get(&SliceKey::Standard) {
            if !parts.is_empty() {
                return Some(LadderChoice::Standard);
            }
        }

        // step 3: parity-aided reconstruction.
        let mut best_recovery: Option<LadderChoice> = None;
        for (&key, parts) in &groups {
            match key {
                SliceKey::Xor(level) => {
                    let data_parts: Vec<u8> = parts
                        .iter()
                        .filter_map(|p| match *p {
                            ChunkPartType::Xor { part, .. } => Some(part - 1),
                            _ => None,
                        })
                        .collect();
                    let has_parity = parts.iter().any(|p| p.is_xor_parity());
                    let distinct: HashSet<u8> = data_parts.iter().copied().collect();
                    if has_parity && distinct.len() as u32 + 1 >= level as u32 {
                        let missing: Vec<u8> = (0..level).filter(|i| !distinct.contains(i)).collect();
                        if missing.len() <= 1 {
                            best_recovery = Some(LadderChoice::XorRecover {
                                level,
                                present: parts.clone(),
                                missing_part: missing.first().copied(),
                            });
                        }
                    }
                }
                SliceKey::Ec(k, m) => {
                    let distinct: HashSet<u8> = parts
                        .iter()
                        .filter_map(|p| match *p {
                            ChunkPartType::Ec { idx, .. } => Some(idx),
                            _ => None,
                        })
                        .collect();
                    if distinct.len() as u32 >= k as u32 {
                        let missing: Vec<u8> = (0..k).filter(|i| !distinct.contains(i)).collect();
                        best_recovery = Some(LadderChoice::EcRecover {
                            k,
                            m,
                            present: parts.clone(),
                            missing,
                        });
                    }
                }
                SliceKey::Standard => {}
            }
            if best_recovery.is_some() {
                break;
            }
        }
        best_recovery
    }

    /// Builds a full [`ReadPlan`] for `[offset, offset + size)`, or fails
    /// `NotRecoverable` if no ladder step applies.
    pub fn plan_read(&self, available: &[ChunkPartType], offset: u64, size: u64) -> Result<ReadPlan, PlanError> {
        let candidates: Vec<ChunkPartType> = available.iter().copied().filter(|p| !self.avoided.contains(p)).collect();
        let choice = self.evaluate(&candidates, offset, size).ok_or(PlanError::NotRecoverable)?;
        Ok(self.build(choice, offset, size, available))
    }

    fn build(&self, choice: LadderChoice, offset: u64, size: u64, all_available: &[ChunkPartType]) -> ReadPlan {
        let (chunk_first, chunk_count) = block_range(offset, size);
        let mut plan = ReadPlan {
            read_buffer_size: chunk_count as u64 * MFS_BLOCK_SIZE,
            ..Default::default()
        };

        match choice {
            LadderChoice::Standard => {
                plan.read_buffer_size = size;
                plan.basic_read_operations.insert(
                    ChunkPartType::Standard,
                    ReadOperation {
                        request_offset: offset,
                        request_size: size,
                        buffer_offset: 0,
                        wave: 0,
                    },
                );
            }
            LadderChoice::FullDataSet { key, data_parts, data_part_count } => {
                let mut buffer_offset = 0u64;
                let mut sorted = data_parts.clone();
                sorted.sort_by_key(|p| match *p {
                    ChunkPartType::Xor { part, .. } => part as u32,
                    ChunkPartType::Ec { idx, .. } => idx as u32,
                    _ => 0,
                });
                let first_required_part = match sorted.first() {
                    Some(ChunkPartType::Xor { part, .. }) => part - 1,
                    Some(ChunkPartType::Ec { idx, .. }) => *idx,
                    _ => 0,
                };
                for &part in &sorted {
                    let idx = match part {
                        ChunkPartType::Xor { part, .. } => (part - 1) as u32,
                        ChunkPartType::Ec { idx, .. } => idx as u32,
                        _ => unreachable!(),
                    };
                    let (part_first_block, part_blocks) = part_block_span(data_part_count, idx, chunk_first, chunk_count);
                    if part_blocks == 0 {
                        continue;
                    }
                    let request_size = part_blocks as u64 * MFS_BLOCK_SIZE;
                    plan.basic_read_operations.insert(
                        part,
                        ReadOperation {
                            request_offset: part_first_block as u64 * MFS_BLOCK_SIZE,
                            request_size,
                            buffer_offset,
                            wave: 0,
                        },
                    );
                    buffer_offset += request_size;
                }
                plan.read_buffer_size = buffer_offset;
                plan.post_processing.push((
                    chunk_count as u64 * MFS_BLOCK_SIZE,
                    PostProcessingOp::CopyBlockInterleave {
                        chunk_first_block: chunk_first,
                        chunk_block_count: chunk_count,
                        data_part_count,
                        first_required_part,
                    },
                ));
                let _ = key;
            }
            LadderChoice::XorRecover { level, present, missing_part } => {
                let mut buffer_offset = 0u64;
                for &part in &present {
                    // Recovering the missing column's row needs every present
                    // column's data at that row, not just the columns the
                    // requested range happens to touch — a row-wise XOR can't
                    // be computed from a partial row. So every present part
                    // (data or parity) uses the full-width span here, unlike
                    // the direct-read `FullDataSet` case above.
                    let (part_first_block, part_blocks) = match part {
                        ChunkPartType::Xor { .. } | ChunkPartType::XorParity { .. } => {
                            full_width_block_span(level as u32, chunk_first, chunk_count)
                        }
                        _ => continue,
                    };
                    if part_blocks == 0 {
                        continue;
                    }
                    let request_size = part_blocks as u64 * MFS_BLOCK_SIZE;
                    plan.basic_read_operations.insert(
                        part,
                        ReadOperation {
                            request_offset: part_first_block as u64 * MFS_BLOCK_SIZE,
                            request_size,
                            buffer_offset,
                            wave: 0,
                        },
                    );
                    buffer_offset += request_size;
                }
                plan.read_buffer_size = buffer_offset;
                if let Some(missing_part) = missing_part {
                    plan.post_processing.push((
                        chunk_count as u64 * MFS_BLOCK_SIZE,
                        PostProcessingOp::XorRecover { level, missing_part },
                    ));
                }
            }
            LadderChoice::EcRecover { k, m, present, missing } => {
                let mut buffer_offset = 0u64;
                for &part in &present {
                    // Same row-wise requirement as the xor case: reconstructing
                    // the missing strip(s) needs every present strip's data at
                    // the touched rows, not just the strips whose own column
                    // the request happens to cover.
                    let (part_first_block, part_blocks) = match part {
                        ChunkPartType::Ec { .. } => full_width_block_span(k as u32, chunk_first, chunk_count),
                        _ => continue,
                    };
                    if part_blocks == 0 {
                        continue;
                    }
                    let request_size = part_blocks as u64 * MFS_BLOCK_SIZE;
                    plan.basic_read_operations.insert(
                        part,
                        ReadOperation {
                            request_offset: part_first_block as u64 * MFS_BLOCK_SIZE,
                            request_size,
                            buffer_offset,
                            wave: 0,
                        },
                    );
                    buffer_offset += request_size;
                }
                plan.read_buffer_size = buffer_offset;
                if !missing.is_empty() {
                    plan.post_processing.push((
                        chunk_count as u64 * MFS_BLOCK_SIZE,
                        PostProcessingOp::RsRecover { k, m, missing },
                    ));
                }
            }
        }

        // speculative redundant partner in wave 0 (bandwidthOveruse > 1):
        // add one more available, unused part of the same slice group the
        // caller could fail over to without re-planning.
        if self.bandwidth_overuse > 1.0 {
            if let Some(&extra) = all_available
                .iter()
                .filter(|p| !plan.basic_read_operations.contains_key(p) && !self.avoided.contains(p))
                .max_by(|a, b| self.score(**a).partial_cmp(&self.score(**b)).unwrap())
            {
                plan.additional_operations.insert(
                    extra,
                    ReadOperation {
                        request_offset: 0,
                        request_size: MFS_BLOCK_SIZE,
                        buffer_offset: 0,
                        wave: 1,
                    },
                );
            }
        }

        plan
    }
}

enum LadderChoice {
    Standard,
    FullDataSet { key: SliceKey, data_parts: Vec<ChunkPartType>, data_part_count: u32 },
    XorRecover { level: u8, present: Vec<ChunkPartType>, missing_part: Option<u8> },
    EcRecover { k: u8, m: u8, present: Vec<ChunkPartType>, missing: Vec<u8> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_replica_is_a_direct_single_operation_read() {
        let planner = Planner::new(1.0);
        let available = vec![ChunkPartType::standard()];
        let plan = planner.plan_read(&available, 0, MFS_BLOCK_SIZE).unwrap();
        assert_eq!(plan.basic_read_operations.len(), 1);
        assert!(plan.post_processing.is_empty());
        let op = plan.basic_read_operations[&ChunkPartType::standard()];
        assert_eq!(op.request_offset, 0);
        assert_eq!(op.request_size, MFS_BLOCK_SIZE);
    }

    #[test]
    fn full_xor_data_set_reads_directly_with_interleave_postprocessing() {
        let planner = Planner::new(1.0);
        let available: Vec<ChunkPartType> = (1..=3).map(|p| ChunkPartType::xor(3, p).unwrap()).collect();
        let plan = planner.plan_read(&available, 0, 3 * MFS_BLOCK_SIZE).unwrap();
        assert_eq!(plan.basic_read_operations.len(), 3);
        assert_eq!(plan.post_processing.len(), 1);
        assert!(matches!(plan.post_processing[0].1, PostProcessingOp::CopyBlockInterleave { .. }));
    }

    #[test]
    fn missing_one_xor_data_part_falls_back_to_parity_recovery() {
        let planner = Planner::new(1.0);
        let mut available: Vec<ChunkPartType> = (1..=3).map(|p| ChunkPartType::xor(3, p).unwrap()).collect();
        available.remove(0); // drop data part 1
        available.push(ChunkPartType::xor_parity(3).unwrap());
        let plan = planner.plan_read(&available, 0, 3 * MFS_BLOCK_SIZE).unwrap();
        assert!(matches!(plan.post_processing[0].1, PostProcessingOp::XorRecover { missing_part: Some(0), .. }));
    }

    #[test]
    fn unreadable_range_fails_not_recoverable() {
        let planner = Planner::new(1.0);
        let available = vec![ChunkPartType::xor(3, 1).unwrap()];
        assert_eq!(planner.plan_read(&available, 0, MFS_BLOCK_SIZE).unwrap_err(), PlanError::NotRecoverable);
    }

    #[test]
    fn ec_recovery_uses_any_k_of_k_plus_m_strips() {
        let planner = Planner::new(1.0);
        let available = vec![
            ChunkPartType::ec(3, 2, 0).unwrap(),
            ChunkPartType::ec(3, 2, 3).unwrap(), // parity strip stands in for missing data strip 1
            ChunkPartType::ec(3, 2, 2).unwrap(),
        ];
        let plan = planner.plan_read(&available, 0, 3 * MFS_BLOCK_SIZE).unwrap();
        assert_eq!(plan.basic_read_operations.len(), 3);
        assert!(matches!(plan.post_processing[0].1, PostProcessingOp::RsRecover { .. }));
    }

    #[test]
    fn avoided_part_is_excluded_from_basic_wave() {
        let mut planner = Planner::new(1.0);
        planner.start_avoiding_part(ChunkPartType::standard());
        let available = vec![ChunkPartType::standard()];
        assert_eq!(planner.plan_read(&available, 0, MFS_BLOCK_SIZE).unwrap_err(), PlanError::NotRecoverable);
    }

    #[test]
    fn is_finishing_possible_checks_the_reduced_set() {
        let planner = Planner::new(1.0);
        let available = vec![ChunkPartType::standard(), ChunkPartType::xor(3, 1).unwrap()];
        let mut failed = HashSet::new();
        failed.insert(ChunkPartType::standard());
        assert!(!planner.is_finishing_possible(&available, 0, 3 * MFS_BLOCK_SIZE, &failed));
    }
}
