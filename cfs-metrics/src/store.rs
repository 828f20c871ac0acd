//! The metrics store proper: stat definitions, the ring buffers behind
//! them, and the `add`/`get`/`fill_tab` query surface.
//!
//! Mirrors `mfscommon/charts.c`'s
//! `charts_init`/`charts_add`/`charts_get`/`charts_filltab`, generalized
//! from that file's four-times-repeated per-scale blocks into loops over
//! [`Scale::ALL`].

use crate::expr::{self, Op};
use crate::ring::{self, AggregationMode, RingClock, RingSet, Scale, LENG, NODATA, RANGES};
use thiserror::Error;

/// A chart-display unit-scale bias: which entry of the metric-prefix
/// table (`µ m _ k M G T P E Z Y`) a raw sample's natural unit starts
/// at, before `fix_max`'s auto-scaling walks it upward. `charts.c`'s
/// per-stat `scale` field.
pub type ScaleBias = i8;

/// One directly-sampled stat (`statdef`): a name, how repeat samples in
/// the same slot combine, and how raw sample values map to display
/// units.
#[derive(Debug, Clone)]
pub struct StatDef {
    pub name: String,
    pub mode: AggregationMode,
    pub percent: bool,
    pub scale_bias: ScaleBias,
    pub multiplier: u64,
    pub divisor: u64,
}

impl StatDef {
    pub fn new(name: impl Into<String>, mode: AggregationMode) -> Self {
        StatDef { name: name.into(), mode, percent: false, scale_bias: 0, multiplier: 1, divisor: 1 }
    }
}

/// Where one of an extended stat's three stacked sources comes from:
/// another direct stat's raw series, or a compiled RPN program over
/// direct stats (`CHARTS_DEF_IS_DIRECT`/`CHARTS_DEF_IS_CALC`).
#[derive(Debug, Clone)]
pub enum Source {
    Direct(usize),
    Calc(Vec<Op>),
}

/// A derived stat built by stacking up to three [`Source`]s
/// (`estatdef`). Used for charts that show several direct stats (or
/// RPN-combined stats) as one stacked area.
#[derive(Debug, Clone)]
pub struct ExtendedStatDef {
    pub name: String,
    pub sources: Vec<Source>,
    pub mode: AggregationMode,
    pub percent: bool,
    pub scale_bias: ScaleBias,
    pub multiplier: u64,
    pub divisor: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricsError {
    #[error("sample count {got} does not match the {expected} direct stats this store was built with")]
    SampleCountMismatch { got: usize, expected: usize },
}

/// Owns the ring buffers for every direct stat plus the clock state
/// shared across all of them per scale. Extended stats are resolved
/// on demand from the direct stats' rings; they have no storage of
/// their own (`CHARTS_IS_EXTENDED_STAT` dispatch in `charts_filltab`).
pub struct MetricsStore {
    stat_defs: Vec<StatDef>,
    extended_defs: Vec<ExtendedStatDef>,
    rings: Vec<RingSet>,
    clocks: [RingClock; RANGES],
}

impl MetricsStore {
    pub fn new(stat_defs: Vec<StatDef>, extended_defs: Vec<ExtendedStatDef>) -> Self {
        let rings = stat_defs.iter().map(|_| RingSet::new()).collect();
        MetricsStore { stat_defs, extended_defs, rings, clocks: [RingClock::default(); RANGES] }
    }

    pub fn stat_defs(&self) -> &[StatDef] {
        &self.stat_defs
    }

    pub fn extended_defs(&self) -> &[ExtendedStatDef] {
        &self.extended_defs
    }

    pub fn clock(&self, scale: Scale) -> RingClock {
        self.clocks[scale.index()]
    }

    /// `charts_add`: advances every scale's ring forward to `now` (unix
    /// seconds, UTC; the original additionally applies the local UTC
    /// offset before dividing into scale units, which is an environment
    /// concern left to the caller) and merges `samples[i]` into stat
    /// `i`'s current slot at each scale.
    pub fn add(&mut self, samples: &[u64], now: u64) -> Result<(), MetricsError> {
        if samples.len() != self.stat_defs.len() {
            return Err(MetricsError::SampleCountMismatch { got: samples.len(), expected: self.stat_defs.len() });
        }
        let modes: Vec<AggregationMode> = self.stat_defs.iter().map(|s| s.mode).collect();
        for scale in Scale::ALL {
            let now_units = (now / scale.slot_seconds()) as u32;
            ring::advance_scale(&mut self.clocks[scale.index()], &mut self.rings, &modes, scale, now_units, Some(samples));
        }
        Ok(())
    }

    /// `charts_get`: the rolling average (add-mode stats) or maximum
    /// (max-mode stats) of direct stat `stat_index`'s last `count`
    /// minute-scale samples, skipping [`NODATA`] slots. `0` if `count`
    /// is `0`, too large, or every sample in range is missing.
    pub fn get(&self, stat_index: usize, count: u32) -> u64 {
        if count == 0 || count as usize > LENG {
            return 0;
        }
        let def = &self.stat_defs[stat_index];
        let ring = &self.rings[stat_index];
        let head = self.clocks[Scale::Minute1.index()].head as i64;
        let slots = ring.slots(Scale::Minute1);
        match def.mode {
            AggregationMode::Add => {
                let mut sum = 0u64;
                let mut n = 0u64;
                for i in 0..count as i64 {
                    let idx = ((LENG as i64 + head - i) % LENG as i64) as usize;
                    if slots[idx] != NODATA {
                        sum += slots[idx];
                        n += 1;
                    }
                }
                if n > 0 {
                    sum / n
                } else {
                    0
                }
            }
            AggregationMode::Max => {
                let mut best = 0u64;
                for i in 0..count as i64 {
                    let idx = ((LENG as i64 + head - i) % LENG as i64) as usize;
                    if slots[idx] != NODATA && slots[idx] > best {
                        best = slots[idx];
                    }
                }
                best
            }
        }
    }

    /// `charts_filltab`: materializes one source's full `LENG`-sample
    /// series at `scale`, resolving a [`Source::Calc`] program slot by
    /// slot against every direct stat's ring at the same scale.
    pub fn fill_tab(&self, source: &Source, scale: Scale) -> [u64; LENG] {
        match source {
            Source::Direct(i) => *self.rings[*i].slots(scale),
            Source::Calc(ops) => {
                let mut out = [NODATA; LENG];
                for (slot, out_slot) in out.iter_mut().enumerate() {
                    *out_slot = expr::eval(ops, |stat_i| self.rings[stat_i].slots(scale)[slot]);
                }
                out
            }
        }
    }

    pub(crate) fn rings(&self) -> &[RingSet] {
        &self.rings
    }

    pub(crate) fn clocks(&self) -> &[RingClock; RANGES] {
        &self.clocks
    }

    pub(crate) fn clocks_mut(&mut self) -> &mut [RingClock; RANGES] {
        &mut self.clocks
    }

    pub(crate) fn rings_mut(&mut self) -> &mut [RingSet] {
        &mut self.rings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MetricsStore {
        MetricsStore::new(
            vec![StatDef::new("reads", AggregationMode::Add), StatDef::new("maxlat", AggregationMode::Max)],
            vec![],
        )
    }

    #[test]
    fn add_then_get_rolls_up_recent_minutes() {
        let mut s = store();
        s.add(&[10, 3], 60).unwrap();
        s.add(&[20, 7], 120).unwrap();
        assert_eq!(s.get(0, 2), 15); // average of 10 and 20
        assert_eq!(s.get(1, 2), 7); // max of 3 and 7
    }

    #[test]
    fn mismatched_sample_count_is_rejected() {
        let mut s = store();
        assert_eq!(s.add(&[1], 60), Err(MetricsError::SampleCountMismatch { got: 1, expected: 2 }));
    }

    #[test]
    fn calc_source_sums_two_direct_stats_slot_by_slot() {
        let mut s = store();
        s.add(&[10, 3], 60).unwrap();
        let combined = Source::Calc(vec![Op::Stat(0), Op::Stat(1), Op::Add]);
        let tab = s.fill_tab(&combined, Scale::Minute1);
        let head = s.clock(Scale::Minute1).head as usize;
        assert_eq!(tab[head], 13);
    }
}
