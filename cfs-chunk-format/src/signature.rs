//! The 8-byte magic plus identity fields every chunk file opens with.
//!
//! Ported from `src/chunkserver/chunk_signature.cc`'s
//! `ChunkSignature`: `readFromDescriptor` accepts three magics (current and
//! two legacy), `serialize` always writes the current one.

use crate::part_type::ChunkPartType;
use cfs_protocol::{DeserializeError, FixedWidth, Reader, Writer};

/// Current magic: `ChunkPartType` on the wire as two bytes.
pub const LIZ_SIGNATURE_ID: &[u8; 8] = b"LIZC 1.1";
/// Legacy magic: `ChunkPartType` on the wire as one byte (standard/xor only).
pub const LIZ_SIGNATURE_ID_10: &[u8; 8] = b"LIZC 1.0";
/// Legacy MooseFS magic, one-byte part type, no xor/ec ids at all (standard
/// chunks only in practice).
pub const MFS_SIGNATURE_ID: &[u8; 8] = b"MFSC 1.0";

const SIGNATURE_ID_SIZE: usize = 8;
/// 8 (magic) + 8 (chunk id) + 4 (version) + 2 (part type, current format).
pub const SIGNATURE_SIZE: usize = SIGNATURE_ID_SIZE + 8 + 4 + 2;
/// Legacy one-byte-part-type variant is one byte shorter.
const SIGNATURE_SIZE_LEGACY: usize = SIGNATURE_ID_SIZE + 8 + 4 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureFormat {
    Current,
    LegacyLiz10,
    LegacyMfs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSignature {
    pub chunk_id: u64,
    pub version: u32,
    pub chunk_type: ChunkPartType,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("buffer too short for a chunk signature")]
    TooShort,
    #[error("unrecognized signature magic")]
    UnknownMagic,
    #[error("malformed part type field: {0}")]
    BadPartType(#[from] DeserializeError),
}

impl ChunkSignature {
    pub fn new(chunk_id: u64, version: u32, chunk_type: ChunkPartType) -> Self {
        ChunkSignature { chunk_id, version, chunk_type }
    }

    /// `ChunkSignature::readFromDescriptor`, applied to an in-memory buffer
    /// instead of a raw fd so callers own the I/O (mmap, pread, whatever the
    /// storage backend uses).
    pub fn parse(buffer: &[u8]) -> Result<Self, SignatureError> {
        if buffer.len() < SIGNATURE_ID_SIZE {
            return Err(SignatureError::TooShort);
        }
        let magic = &buffer[..SIGNATURE_ID_SIZE];
        let rest = &buffer[SIGNATURE_ID_SIZE..];

        if magic == LIZ_SIGNATURE_ID {
            if buffer.len() < SIGNATURE_SIZE {
                return Err(SignatureError::TooShort);
            }
            let mut r = Reader::new(rest);
            let chunk_id = r.get_u64()?;
            let version = r.get_u32()?;
            let chunk_type = ChunkPartType::read_fixed(&mut r)?;
            Ok(ChunkSignature { chunk_id, version, chunk_type })
        } else if magic == LIZ_SIGNATURE_ID_10 || magic == MFS_SIGNATURE_ID {
            if buffer.len() < SIGNATURE_SIZE_LEGACY {
                return Err(SignatureError::TooShort);
            }
            let mut r = Reader::new(rest);
            let chunk_id = r.get_u64()?;
            let version = r.get_u32()?;
            let legacy_id = r.get_u8()?;
            let chunk_type = if legacy_id == 0 {
                ChunkPartType::Standard
            } else {
                // legacy one-byte xor id: level*10 + part, parity at part 0
                ChunkPartType::from_wire_id(legacy_id as u16)
                    .map_err(|_| SignatureError::BadPartType(DeserializeError::UnknownCode(legacy_id as u16)))?
            };
            Ok(ChunkSignature { chunk_id, version, chunk_type })
        } else {
            Err(SignatureError::UnknownMagic)
        }
    }

    pub fn serialized_size(&self) -> usize {
        SIGNATURE_SIZE
    }

    /// Always writes the current format, mirroring `ChunkSignature::serialize`
    /// always emitting `kLizSignatureId` regardless of what was read.
    pub fn write(&self, out: &mut [u8]) {
        out[..SIGNATURE_ID_SIZE].copy_from_slice(LIZ_SIGNATURE_ID);
        let mut w = Writer::new(&mut out[SIGNATURE_ID_SIZE..SIGNATURE_SIZE]);
        w.put_u64(self.chunk_id);
        w.put_u32(self.version);
        self.chunk_type.write_fixed(&mut w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_current_format() {
        let sig = ChunkSignature::new(0x1234_5678_9abc_def0, 7, ChunkPartType::standard());
        let mut buf = [0u8; SIGNATURE_SIZE];
        sig.write(&mut buf);
        let parsed = ChunkSignature::parse(&buf).unwrap();
        assert_eq!(parsed, sig);
    }

    #[test]
    fn parses_legacy_mfs_standard_signature() {
        let mut buf = [0u8; SIGNATURE_SIZE_LEGACY];
        buf[..8].copy_from_slice(MFS_SIGNATURE_ID);
        let mut w = Writer::new(&mut buf[8..]);
        w.put_u64(42);
        w.put_u32(3);
        w.put_u8(0);
        let parsed = ChunkSignature::parse(&buf).unwrap();
        assert_eq!(parsed.chunk_id, 42);
        assert_eq!(parsed.version, 3);
        assert_eq!(parsed.chunk_type, ChunkPartType::standard());
    }

    #[test]
    fn rejects_unknown_magic() {
        let buf = [0u8; SIGNATURE_SIZE];
        assert_eq!(ChunkSignature::parse(&buf).unwrap_err(), SignatureError::UnknownMagic);
    }

    #[test]
    fn rejects_short_buffer() {
        let buf = [0u8; 4];
        assert_eq!(ChunkSignature::parse(&buf).unwrap_err(), SignatureError::TooShort);
    }
}
