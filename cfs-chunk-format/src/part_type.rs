//! Chunk-part identity (C4): which of the four part families a given file
//! on a chunk server holds, and how many blocks/bytes of the logical chunk
//! it is responsible for.

use cfs_protocol::{DeserializeError, FixedWidth, Reader, Writer};

/// Blocks per full-size standard chunk.
pub const MFS_BLOCKS_IN_CHUNK: u32 = 1024;
/// Bytes per block.
pub const MFS_BLOCK_SIZE: u32 = 65536;
/// Bytes per full-size standard chunk.
pub const MFS_CHUNK_SIZE: u64 = MFS_BLOCKS_IN_CHUNK as u64 * MFS_BLOCK_SIZE as u64;

pub const MIN_XOR_LEVEL: u8 = 2;
pub const MAX_XOR_LEVEL: u8 = 9;
/// `part == 0` is the reserved sentinel for the parity strip of a given
/// level, the same convention `chunk_type.cc`'s `kXorParityPart` uses —
/// one unified id space for data and parity strips of the same level.
pub const XOR_PARITY_PART: u8 = 0;

/// Per-side bound on EC `k`/`m`. Not named numerically in the original
/// (which has no EC support at all); chosen here so that `k + m` never
/// exceeds 32, a generous bound for any Reed-Solomon scheme in practice.
/// Recorded as a from-scratch design decision in `DESIGN.md`.
pub const MAX_EC_PARTS_PER_SIDE: u16 = 16;
/// Upper bound on `k + m` implied by [`MAX_EC_PARTS_PER_SIDE`].
pub const MAX_EC_TOTAL_PARTS: u16 = MAX_EC_PARTS_PER_SIDE * 2;

const EC_ID_BASE: u16 = 1000;

/// One of the four chunk-part families of §3. `Xor` is a data stripe;
/// `XorParity` is the dedicated parity strip for the same level — kept as
/// a distinct variant (rather than folding it into `Xor` with `part == 0`
/// the way the wire id does) because the two have genuinely different
/// operations available on them (a data stripe can be read directly, a
/// parity strip never stores logical chunk bytes of its own).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChunkPartType {
    Standard,
    Xor { level: u8, part: u8 },
    XorParity { level: u8 },
    Ec { k: u8, m: u8, idx: u8 },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PartTypeError {
    #[error("xor level {level} out of range [{MIN_XOR_LEVEL}, {MAX_XOR_LEVEL}]")]
    XorLevelOutOfRange { level: u8 },
    #[error("xor part {part} out of range [1, {level}]")]
    XorPartOutOfRange { part: u8, level: u8 },
    #[error("ec k={k} m={m} exceed the per-side bound of {MAX_EC_PARTS_PER_SIDE}")]
    EcSideOutOfRange { k: u8, m: u8 },
    #[error("ec idx={idx} out of range [0, {total})")]
    EcIdxOutOfRange { idx: u8, total: u8 },
    #[error("unknown chunk part type id {0}")]
    UnknownId(u16),
}

impl ChunkPartType {
    pub fn standard() -> Self {
        ChunkPartType::Standard
    }

    pub fn xor(level: u8, part: u8) -> Result<Self, PartTypeError> {
        validate_xor(level, part)?;
        Ok(ChunkPartType::Xor { level, part })
    }

    pub fn xor_parity(level: u8) -> Result<Self, PartTypeError> {
        if !(MIN_XOR_LEVEL..=MAX_XOR_LEVEL).contains(&level) {
            return Err(PartTypeError::XorLevelOutOfRange { level });
        }
        Ok(ChunkPartType::XorParity { level })
    }

    pub fn ec(k: u8, m: u8, idx: u8) -> Result<Self, PartTypeError> {
        validate_ec(k, m, idx)?;
        Ok(ChunkPartType::Ec { k, m, idx })
    }

    pub fn is_standard(self) -> bool {
        matches!(self, ChunkPartType::Standard)
    }

    /// True for xor *data* strips only; the parity strip is
    /// [`Self::is_xor_parity`] instead.
    pub fn is_xor(self) -> bool {
        matches!(self, ChunkPartType::Xor { .. })
    }

    pub fn is_xor_parity(self) -> bool {
        matches!(self, ChunkPartType::XorParity { .. })
    }

    pub fn is_ec(self) -> bool {
        matches!(self, ChunkPartType::Ec { .. })
    }

    /// Valid whenever this part belongs to an xor slice, data or parity.
    pub fn xor_level(self) -> Option<u8> {
        match self {
            ChunkPartType::Xor { level, .. } | ChunkPartType::XorParity { level } => Some(level),
            _ => None,
        }
    }

    /// Valid only for xor data strips (`is_xor()`); the parity strip has
    /// no "part" of its own to report.
    pub fn xor_part(self) -> Option<u8> {
        match self {
            ChunkPartType::Xor { part, .. } => Some(part),
            _ => None,
        }
    }

    /// `1 | L | k`: the number of distinct strips the logical data of a
    /// chunk is spread across under this part's slice type.
    pub fn number_of_data_parts(self) -> u32 {
        match self {
            ChunkPartType::Standard => 1,
            ChunkPartType::Xor { level, .. } | ChunkPartType::XorParity { level } => level as u32,
            ChunkPartType::Ec { k, .. } => k as u32,
        }
    }

    /// Number of distinct strips that must be present to reconstruct the
    /// logical data: identical to [`Self::number_of_data_parts`] under
    /// this model (no partial-strip recovery below the strip level).
    pub fn required_parts_to_recover(self) -> u32 {
        self.number_of_data_parts()
    }

    fn stripe_width(self) -> u32 {
        match self {
            ChunkPartType::Standard => 1,
            ChunkPartType::Xor { level, .. } | ChunkPartType::XorParity { level } => level as u32,
            ChunkPartType::Ec { k, .. } => k as u32,
        }
    }

    /// Number of `MFS_BLOCK_SIZE`-sized blocks this part stores for a
    /// chunk whose logical length is `chunk_len` bytes.
    pub fn number_of_blocks(self, chunk_len: u64) -> u32 {
        let total_blocks = total_blocks_for_length(chunk_len);
        self.blocks_for_total(total_blocks)
    }

    /// `maxBlocksInFile`: the number of blocks this part would store for
    /// a maximally-sized (1024-block) chunk — an upper bound independent
    /// of any particular chunk's length, used to size on-disk headers.
    pub fn max_blocks_in_file(self) -> u32 {
        self.blocks_for_total(MFS_BLOCKS_IN_CHUNK)
    }

    fn blocks_for_total(self, total_blocks: u32) -> u32 {
        let width = self.stripe_width();
        match self {
            ChunkPartType::Standard => total_blocks,
            ChunkPartType::Xor { part, .. } => {
                // data part at position `part` (1-based) owns block `b`
                // iff `b mod L + 1 == part`.
                count_owned_rows(total_blocks, width, (part - 1) as u32)
            }
            ChunkPartType::XorParity { .. } => ceil_div(total_blocks, width),
            ChunkPartType::Ec { k, idx, .. } => {
                if idx < k {
                    count_owned_rows(total_blocks, width, idx as u32)
                } else {
                    ceil_div(total_blocks, width)
                }
            }
        }
    }

    /// Logical bytes this part contributes toward a chunk of length
    /// `chunk_len`: full blocks at `MFS_BLOCK_SIZE` each, except the part
    /// owning the chunk's final (possibly short) block, whose last block
    /// is sized to the remainder.
    pub fn chunk_length_to_part_length(self, chunk_len: u64) -> u64 {
        if let ChunkPartType::Standard = self {
            return chunk_len;
        }
        let blocks = self.number_of_blocks(chunk_len) as u64;
        if blocks == 0 {
            return 0;
        }
        let total_blocks = total_blocks_for_length(chunk_len) as u64;
        let last_block_owner = self.owns_block(total_blocks.saturating_sub(1) as u32);
        let full_blocks = if last_block_owner { blocks - 1 } else { blocks };
        let tail = chunk_len - (total_blocks - 1) * MFS_BLOCK_SIZE as u64;
        let mut len = full_blocks * MFS_BLOCK_SIZE as u64;
        if last_block_owner {
            len += tail.min(MFS_BLOCK_SIZE as u64);
        }
        len
    }

    fn owns_block(self, b: u32) -> bool {
        match self {
            ChunkPartType::Standard => true,
            ChunkPartType::Xor { level, part } => b % level as u32 == (part - 1) as u32,
            ChunkPartType::XorParity { .. } => true,
            ChunkPartType::Ec { k, idx, .. } if idx < k => b % k as u32 == idx as u32,
            ChunkPartType::Ec { .. } => true,
        }
    }

    /// The 16-bit wire id. `0` is reserved for `Standard`; xor ids reuse
    /// the original one-byte `level * (MaxLevel + 1) + part` scheme
    /// (`part == 0` meaning parity) widened to two bytes; EC ids live in
    /// a disjoint range above `1000` with no original-format precedent.
    pub fn wire_id(self) -> u16 {
        match self {
            ChunkPartType::Standard => 0,
            ChunkPartType::Xor { level, part } => level as u16 * 10 + part as u16,
            ChunkPartType::XorParity { level } => level as u16 * 10 + XOR_PARITY_PART as u16,
            ChunkPartType::Ec { k, m, idx } => {
                EC_ID_BASE
                    + idx as u16
                    + MAX_EC_PARTS_PER_SIDE * (m as u16 - 1)
                    + MAX_EC_PARTS_PER_SIDE * MAX_EC_PARTS_PER_SIDE * (k as u16 - 1)
            }
        }
    }

    pub fn from_wire_id(id: u16) -> Result<Self, PartTypeError> {
        if id == 0 {
            return Ok(ChunkPartType::Standard);
        }
        if id < EC_ID_BASE {
            let level = (id / 10) as u8;
            let part = (id % 10) as u8;
            if !(MIN_XOR_LEVEL..=MAX_XOR_LEVEL).contains(&level) {
                return Err(PartTypeError::UnknownId(id));
            }
            if part as u16 > level as u16 {
                return Err(PartTypeError::UnknownId(id));
            }
            return if part == XOR_PARITY_PART {
                Ok(ChunkPartType::XorParity { level })
            } else {
                Ok(ChunkPartType::Xor { level, part })
            };
        }
        let raw = id - EC_ID_BASE;
        let per_side = MAX_EC_PARTS_PER_SIDE;
        let k = (raw / (per_side * per_side)) + 1;
        let rem = raw % (per_side * per_side);
        let m = (rem / per_side) + 1;
        let idx = rem % per_side;
        if k > per_side || m > per_side {
            return Err(PartTypeError::UnknownId(id));
        }
        let (k, m, idx) = (k as u8, m as u8, idx as u8);
        validate_ec(k, m, idx).map_err(|_| PartTypeError::UnknownId(id))?;
        Ok(ChunkPartType::Ec { k, m, idx })
    }
}

impl FixedWidth for ChunkPartType {
    const WIRE_SIZE: usize = 2;

    fn read_fixed(r: &mut Reader) -> Result<Self, DeserializeError> {
        let id = r.get_u16()?;
        ChunkPartType::from_wire_id(id).map_err(|_| DeserializeError::UnknownCode(id))
    }

    fn write_fixed(&self, w: &mut Writer) {
        w.put_u16(self.wire_id());
    }
}

fn validate_xor(level: u8, part: u8) -> Result<(), PartTypeError> {
    if !(MIN_XOR_LEVEL..=MAX_XOR_LEVEL).contains(&level) {
        return Err(PartTypeError::XorLevelOutOfRange { level });
    }
    if part < 1 || part > level {
        return Err(PartTypeError::XorPartOutOfRange { part, level });
    }
    Ok(())
}

fn validate_ec(k: u8, m: u8, idx: u8) -> Result<(), PartTypeError> {
    if k == 0 || m == 0 || k as u16 > MAX_EC_PARTS_PER_SIDE || m as u16 > MAX_EC_PARTS_PER_SIDE {
        return Err(PartTypeError::EcSideOutOfRange { k, m });
    }
    if idx as u16 >= (k as u16 + m as u16) {
        return Err(PartTypeError::EcIdxOutOfRange { idx, total: k + m });
    }
    Ok(())
}

fn total_blocks_for_length(chunk_len: u64) -> u32 {
    let blocks = (chunk_len + MFS_BLOCK_SIZE as u64 - 1) / MFS_BLOCK_SIZE as u64;
    blocks.min(MFS_BLOCKS_IN_CHUNK as u64) as u32
}

fn ceil_div(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

/// Number of rows `b` in `0..total` with `b % width == residue`.
fn count_owned_rows(total: u32, width: u32, residue: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let full_cycles = total / width;
    let extra = if total % width > residue { 1 } else { 0 };
    full_cycles + extra
}
