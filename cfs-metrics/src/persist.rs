//! The persisted metrics file: current format plus legacy 3-/4-range
//! import.
//!
//! Mirrors `mfscommon/charts.c`'s
//! `charts_store`/`charts_load`/`charts_import_from_old_4ranges_format`/
//! `charts_import_from_old_3ranges_format`. Reuses `cfs-protocol`'s
//! `Reader`/`Writer` byte cursors (C1) rather than hand-rolling another
//! big-endian pack/unpack pair.

use crate::ring::{RingClock, Scale, LENG, NODATA, RANGES};
use crate::store::{MetricsStore, StatDef};
use anyhow::{bail, Context, Result};
use cfs_protocol::{Reader, Writer};
use std::io::{Read, Write};

/// `CHARTS_FILE_VERSION`.
pub const FILE_VERSION: u32 = 0x0001_0000;
/// Stat name field width on disk. `charts_store`'s `namehdr[100]`.
const NAME_FIELD: usize = 100;

fn stat_record_bytes() -> usize {
    NAME_FIELD + RANGES * LENG * 8
}

/// Writes the current-format file: a 16-byte header followed by, for
/// each stat, a 100-byte zero-padded name and `RANGES * LENG` samples
/// per scale, each range written oldest-first (rotated so the ring's
/// physical head wraps to the end — `charts_store`'s `p = pointers[j]+1`
/// read-from-`p`-wrapping-at-`LENG` loop).
pub fn save<W: Write>(store: &MetricsStore, mut out: W) -> Result<()> {
    let mut header = [0u8; 16];
    {
        let mut w = Writer::new(&mut header);
        w.put_u32(FILE_VERSION);
        w.put_u32(LENG as u32);
        w.put_u32(store.stat_defs().len() as u32);
        w.put_u32(store.clock(Scale::Minute1).timepoint);
    }
    out.write_all(&header).context("writing charts file header")?;

    for (i, def) in store.stat_defs().iter().enumerate() {
        let mut record = vec![0u8; stat_record_bytes()];
        let mut w = Writer::new(&mut record);
        let mut name_field = [0u8; NAME_FIELD];
        let name_bytes = def.name.as_bytes();
        let n = name_bytes.len().min(NAME_FIELD);
        name_field[..n].copy_from_slice(&name_bytes[..n]);
        w.put_bytes(&name_field);

        for scale in Scale::ALL {
            let ring = &store.rings()[i];
            let slots = ring.slots(scale);
            let pointer = store.clocks()[scale.index()].head as usize;
            for s in 0..LENG {
                let idx = (pointer + 1 + s) % LENG;
                w.put_u64(slots[idx]);
            }
        }
        out.write_all(&record).context("writing charts stat record")?;
    }
    Ok(())
}

/// Reads back a file written by [`save`]. Fails if `leng`/`statCount`
/// don't match `store`'s shape, or the version is a legacy one (use
/// [`import_legacy`] for those instead).
pub fn load<R: Read>(store: &mut MetricsStore, mut input: R) -> Result<()> {
    let mut header = [0u8; 16];
    input.read_exact(&mut header).context("reading charts file header")?;
    let mut r = Reader::new(&header);
    let version = r.get_u32()?;
    let leng = r.get_u32()? as usize;
    let stat_count = r.get_u32()? as usize;
    let head_timepoint = r.get_u32()?;
    if version != FILE_VERSION {
        bail!("unsupported charts file version 0x{version:08x}, expected 0x{FILE_VERSION:08x}");
    }
    if leng != LENG {
        bail!("charts file leng {leng} does not match this build's LENG {LENG}");
    }
    if stat_count != store.stat_defs().len() {
        bail!("charts file has {stat_count} stats, store expects {}", store.stat_defs().len());
    }

    for scale in Scale::ALL {
        store.clocks_mut()[scale.index()] = RingClock { head: LENG as u32 - 1, timepoint: head_timepoint };
    }

    for i in 0..stat_count {
        let mut record = vec![0u8; stat_record_bytes()];
        input.read_exact(&mut record).context("reading charts stat record")?;
        let mut r = Reader::new(&record);
        let _name = r.get_bytes(NAME_FIELD)?;
        for scale in Scale::ALL {
            let slots = store.rings_mut()[i].slots_mut(scale);
            for slot in slots.iter_mut() {
                *slot = r.get_u64()?;
            }
        }
    }
    Ok(())
}

/// Imports a legacy file with `ranges` scales (3 for the pre-`VERYLONGRANGE`
/// format, 4 otherwise) and `file_leng` samples per stat per range,
/// reshaping into this build's `RANGES`/`LENG` layout with every scale's
/// pointer set to `LENG - 1`, i.e. the loaded data is right-aligned
/// against the tail of each ring (`charts_import_from_old_Nranges_format`'s
/// documented convention, simplified here to a single tail-alignment copy
/// rather than the original's seek-to-skip-unused-samples optimization,
/// which is an I/O efficiency detail and not a behavior difference).
pub fn import_legacy<R: Read>(store: &mut MetricsStore, mut input: R, ranges: usize, file_leng: usize, head_timepoint: u32) -> Result<()> {
    if ranges == 0 || ranges > RANGES {
        bail!("legacy charts file declares {ranges} ranges, expected 1..={RANGES}");
    }
    for scale in Scale::ALL {
        store.clocks_mut()[scale.index()] = RingClock { head: LENG as u32 - 1, timepoint: head_timepoint };
    }
    let stat_count = store.stat_defs().len();
    for range_idx in 0..ranges {
        let scale = Scale::ALL[range_idx];
        for i in 0..stat_count {
            let mut raw = vec![0u8; file_leng * 8];
            input.read_exact(&mut raw).with_context(|| format!("reading legacy charts samples for stat {i} range {range_idx}"))?;
            let mut r = Reader::new(&raw);
            let mut values = Vec::with_capacity(file_leng);
            for _ in 0..file_leng {
                values.push(r.get_u64()?);
            }
            let take = values.len().min(LENG);
            let tail = &values[values.len() - take..];
            let slots = store.rings_mut()[i].slots_mut(scale);
            for s in slots.iter_mut() {
                *s = NODATA;
            }
            let dest_start = LENG - take;
            slots[dest_start..].copy_from_slice(tail);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::AggregationMode;
    use std::io::Cursor;

    fn store_with_data() -> MetricsStore {
        let mut s = MetricsStore::new(vec![StatDef::new("a", AggregationMode::Add)], vec![]);
        s.add(&[5], 60).unwrap();
        s.add(&[7], 120).unwrap();
        s
    }

    #[test]
    fn save_then_load_round_trips_the_tail_of_the_short_range() {
        let s = store_with_data();
        let mut buf = Vec::new();
        save(&s, &mut buf).unwrap();

        let mut loaded = MetricsStore::new(vec![StatDef::new("a", AggregationMode::Add)], vec![]);
        load(&mut loaded, Cursor::new(buf)).unwrap();

        let head = loaded.clock(Scale::Minute1).head as usize;
        assert_eq!(loaded.rings()[0].slots(Scale::Minute1)[head], 7);
    }

    #[test]
    fn load_rejects_a_stat_count_mismatch() {
        let s = store_with_data();
        let mut buf = Vec::new();
        save(&s, &mut buf).unwrap();

        let mut loaded = MetricsStore::new(vec![StatDef::new("a", AggregationMode::Add), StatDef::new("b", AggregationMode::Add)], vec![]);
        assert!(load(&mut loaded, Cursor::new(buf)).is_err());
    }

    #[test]
    fn legacy_import_right_aligns_shorter_history_against_the_tail() {
        let mut loaded = MetricsStore::new(vec![StatDef::new("a", AggregationMode::Add)], vec![]);
        let file_leng = 3usize;
        let mut raw = Vec::new();
        for v in [1u64, 2, 3] {
            raw.extend_from_slice(&v.to_be_bytes());
        }
        import_legacy(&mut loaded, Cursor::new(raw), 1, file_leng, 1000).unwrap();
        let slots = loaded.rings()[0].slots(Scale::Minute1);
        assert_eq!(&slots[LENG - 3..], &[1, 2, 3]);
        assert_eq!(slots[0], NODATA);
    }
}
