//! Fixed-capacity ring buffers at four time scales (C11 data structure).
//!
//! Mirrors `mfscommon/charts.c`'s `series`/
//! `pointers`/`timepoint` globals and `charts_add`: four per-scale rings
//! of `LENG` slots per stat, advanced forward in wall-clock lockstep and
//! combined into with the stat's aggregation mode.

/// Samples per ring, at every scale. `charts.c`'s `#define LENG 950`.
pub const LENG: usize = 950;
/// Number of scales kept per stat.
pub const RANGES: usize = 4;
/// Sentinel for "no sample landed in this slot yet" (`CHARTS_NODATA`).
pub const NODATA: u64 = u64::MAX;

/// The four ring scales, in the same order `charts.c` indexes them
/// (`SHORTRANGE, MEDIUMRANGE, LONGRANGE, VERYLONGRANGE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Scale {
    Minute1,
    Minute6,
    Minute30,
    Day1,
}

impl Scale {
    pub const ALL: [Scale; RANGES] = [Scale::Minute1, Scale::Minute6, Scale::Minute30, Scale::Day1];

    /// Width of one ring slot, in seconds. `charts_add`'s `local / 60`,
    /// `local / (60*6)`, `local / (60*30)`, `local / (60*60*24)`.
    pub fn slot_seconds(self) -> u64 {
        match self {
            Scale::Minute1 => 60,
            Scale::Minute6 => 60 * 6,
            Scale::Minute30 => 60 * 30,
            Scale::Day1 => 60 * 60 * 24,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Scale::Minute1 => 0,
            Scale::Minute6 => 1,
            Scale::Minute30 => 2,
            Scale::Day1 => 3,
        }
    }
}

/// How a newly-arrived sample combines with whatever is already in its
/// slot. `CHARTS_MODE_ADD`/`CHARTS_MODE_MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    Add,
    Max,
}

impl AggregationMode {
    fn combine(self, existing: u64, incoming: u64) -> u64 {
        match self {
            AggregationMode::Add => existing + incoming,
            AggregationMode::Max => existing.max(incoming),
        }
    }
}

/// The four ring buffers backing a single stat (`stat_record` in the
/// original). Independent of the stat's name/mode/display attributes,
/// which live in [`crate::store::StatDef`] instead.
#[derive(Debug, Clone)]
pub struct RingSet {
    samples: [[u64; LENG]; RANGES],
}

impl Default for RingSet {
    fn default() -> Self {
        RingSet { samples: [[NODATA; LENG]; RANGES] }
    }
}

impl RingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slots(&self, scale: Scale) -> &[u64; LENG] {
        &self.samples[scale.index()]
    }

    pub fn slots_mut(&mut self, scale: Scale) -> &mut [u64; LENG] {
        &mut self.samples[scale.index()]
    }
}

/// Shared clock state for one ring scale across every stat in a store:
/// the write head and the wall-clock minute/hour/day (in scale units)
/// it currently points at. `pointers[range]`/`timepoint[range]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RingClock {
    pub head: u32,
    pub timepoint: u32,
}

/// One scale's worth of the `charts_add` algorithm, applied to every
/// stat's ring at once. The caller (`store::MetricsStore::add`) converts
/// the wall-clock timestamp into this scale's units and loops this over
/// [`Scale::ALL`].
pub fn advance_scale(
    clock: &mut RingClock,
    rings: &mut [RingSet],
    modes: &[AggregationMode],
    scale: Scale,
    now_in_scale_units: u32,
    samples: Option<&[u64]>,
) {
    let delta = now_in_scale_units as i64 - clock.timepoint as i64;
    if delta > 0 {
        let steps = delta.min(LENG as i64);
        for _ in 0..steps {
            clock.head = (clock.head + 1) % LENG as u32;
            for ring in rings.iter_mut() {
                ring.samples[scale.index()][clock.head as usize] = NODATA;
            }
        }
        clock.timepoint = now_in_scale_units;
    }
    if delta <= 0 && delta > -(LENG as i64) {
        if let Some(samples) = samples {
            let idx = ((clock.head as i64 + LENG as i64 + delta).rem_euclid(LENG as i64)) as usize;
            for (j, ring) in rings.iter_mut().enumerate() {
                let slot = &mut ring.samples[scale.index()][idx];
                let incoming = samples[j];
                *slot = if *slot == NODATA { incoming } else { modes[j].combine(*slot, incoming) };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ring_is_all_nodata() {
        let ring = RingSet::new();
        assert!(ring.slots(Scale::Minute1).iter().all(|&s| s == NODATA));
    }

    #[test]
    fn advance_fills_one_slot_and_leaves_the_rest_nodata() {
        let mut clock = RingClock::default();
        let mut rings = vec![RingSet::new()];
        let modes = [AggregationMode::Add];
        advance_scale(&mut clock, &mut rings, &modes, Scale::Minute1, 100, Some(&[7]));
        let head = clock.head as usize;
        assert_eq!(rings[0].slots(Scale::Minute1)[head], 7);
        let other = (head + 1) % LENG;
        assert_eq!(rings[0].slots(Scale::Minute1)[other], NODATA);
    }

    #[test]
    fn add_mode_accumulates_within_the_same_slot() {
        let mut clock = RingClock::default();
        let mut rings = vec![RingSet::new()];
        let modes = [AggregationMode::Add];
        advance_scale(&mut clock, &mut rings, &modes, Scale::Minute1, 100, Some(&[3]));
        advance_scale(&mut clock, &mut rings, &modes, Scale::Minute1, 100, Some(&[4]));
        let head = clock.head as usize;
        assert_eq!(rings[0].slots(Scale::Minute1)[head], 7);
    }

    #[test]
    fn max_mode_keeps_the_larger_value() {
        let mut clock = RingClock::default();
        let mut rings = vec![RingSet::new()];
        let modes = [AggregationMode::Max];
        advance_scale(&mut clock, &mut rings, &modes, Scale::Minute1, 100, Some(&[3]));
        advance_scale(&mut clock, &mut rings, &modes, Scale::Minute1, 100, Some(&[2]));
        let head = clock.head as usize;
        assert_eq!(rings[0].slots(Scale::Minute1)[head], 3);
    }

    #[test]
    fn a_gap_clears_the_skipped_slots_to_nodata() {
        let mut clock = RingClock::default();
        let mut rings = vec![RingSet::new()];
        let modes = [AggregationMode::Add];
        advance_scale(&mut clock, &mut rings, &modes, Scale::Minute1, 1, Some(&[5]));
        let first_head = clock.head as usize;
        advance_scale(&mut clock, &mut rings, &modes, Scale::Minute1, 4, Some(&[9]));
        assert_eq!(rings[0].slots(Scale::Minute1)[first_head], 5);
        let gap_slot = (first_head + 1) % LENG;
        assert_eq!(rings[0].slots(Scale::Minute1)[gap_slot], NODATA);
    }

    #[test]
    fn a_timestamp_older_than_leng_slots_is_dropped() {
        let mut clock = RingClock { head: 0, timepoint: 1000 };
        let mut rings = vec![RingSet::new()];
        let modes = [AggregationMode::Add];
        advance_scale(&mut clock, &mut rings, &modes, Scale::Minute1, 1, Some(&[1]));
        assert!(rings[0].slots(Scale::Minute1).iter().all(|&s| s == NODATA));
    }
}
