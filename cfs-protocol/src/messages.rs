//! The request/response message catalogue of §6. The outer `type length
//! version` envelope is handled once by [`crate::serialize_packet`] and
//! friends; every struct here is just the body that follows the `version`
//! tag, in wire order.
//!
//! `chunk_type` fields carry the raw 16-bit id from `cfs-chunk-format`'s
//! `ChunkPartType` wire encoding. Keeping it as a bare `u16` here (rather
//! than depending on `cfs-chunk-format`) keeps this crate a leaf: chunk-part
//! identity is built on top of serialization, not the other way around.

use crate::{DeserializeError, ErrorCode, FixedWidth, PacketBody, Reader, Writer};
use std::convert::TryFrom;

/// `CLTOMA_FUSE_READ_CHUNK` — client asks the master which chunk and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CltomaFuseReadChunk {
    pub msgid: u32,
    pub inode: u32,
    pub chunk_index: u32,
}

impl PacketBody for CltomaFuseReadChunk {
    fn wire_size(&self) -> usize {
        4 + 4 + 4
    }

    fn write(&self, w: &mut Writer) {
        w.put_u32(self.msgid);
        w.put_u32(self.inode);
        w.put_u32(self.chunk_index);
    }

    fn read(r: &mut Reader) -> Result<Self, DeserializeError> {
        Ok(CltomaFuseReadChunk {
            msgid: r.get_u32()?,
            inode: r.get_u32()?,
            chunk_index: r.get_u32()?,
        })
    }
}

/// One entry of `MATOCL_FUSE_READ_CHUNK`'s location list: a chunk server
/// holding a readable part, and which part it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLocation {
    pub ip: u32,
    pub port: u16,
    pub chunk_type: u16,
    pub cs_version: u32,
}

impl FixedWidth for ChunkLocation {
    const WIRE_SIZE: usize = 4 + 2 + 2 + 4;

    fn read_fixed(r: &mut Reader) -> Result<Self, DeserializeError> {
        Ok(ChunkLocation {
            ip: r.get_u32()?,
            port: r.get_u16()?,
            chunk_type: r.get_u16()?,
            cs_version: r.get_u32()?,
        })
    }

    fn write_fixed(&self, w: &mut Writer) {
        w.put_u32(self.ip);
        w.put_u16(self.port);
        w.put_u16(self.chunk_type);
        w.put_u32(self.cs_version);
    }
}

/// `MATOCL_FUSE_READ_CHUNK` (data variant) — the location vector is the
/// variable-length trailer and must come last per §4.3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatoclFuseReadChunkData {
    pub msgid: u32,
    pub file_length: u64,
    pub chunk_id: u64,
    pub chunk_version: u32,
    pub locations: Vec<ChunkLocation>,
}

impl PacketBody for MatoclFuseReadChunkData {
    fn wire_size(&self) -> usize {
        4 + 8 + 8 + 4 + self.locations.len() * ChunkLocation::WIRE_SIZE
    }

    fn write(&self, w: &mut Writer) {
        w.put_u32(self.msgid);
        w.put_u64(self.file_length);
        w.put_u64(self.chunk_id);
        w.put_u32(self.chunk_version);
        w.put_vec(&self.locations);
    }

    fn read(r: &mut Reader) -> Result<Self, DeserializeError> {
        let msgid = r.get_u32()?;
        let file_length = r.get_u64()?;
        let chunk_id = r.get_u64()?;
        let chunk_version = r.get_u32()?;
        let locations = r.get_vec_all()?;
        Ok(MatoclFuseReadChunkData {
            msgid,
            file_length,
            chunk_id,
            chunk_version,
            locations,
        })
    }
}

/// `MATOCL_FUSE_READ_CHUNK` (status variant) — the master couldn't resolve
/// the read and returns an `ErrorCode` instead of a location list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatoclFuseReadChunkStatus {
    pub msgid: u32,
    pub status: ErrorCode,
}

impl PacketBody for MatoclFuseReadChunkStatus {
    fn wire_size(&self) -> usize {
        4 + 1
    }

    fn write(&self, w: &mut Writer) {
        w.put_u32(self.msgid);
        w.put_u8(self.status.into());
    }

    fn read(r: &mut Reader) -> Result<Self, DeserializeError> {
        let msgid = r.get_u32()?;
        let status = ErrorCode::try_from(r.get_u8()?)?;
        Ok(MatoclFuseReadChunkStatus { msgid, status })
    }
}

/// `CLTOCS_READ` — client asks a chunk server to read a byte range of one
/// part directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CltocsRead {
    pub chunk_id: u64,
    pub chunk_version: u32,
    pub chunk_type: u16,
    pub offset: u32,
    pub size: u32,
}

impl PacketBody for CltocsRead {
    fn wire_size(&self) -> usize {
        8 + 4 + 2 + 4 + 4
    }

    fn write(&self, w: &mut Writer) {
        w.put_u64(self.chunk_id);
        w.put_u32(self.chunk_version);
        w.put_u16(self.chunk_type);
        w.put_u32(self.offset);
        w.put_u32(self.size);
    }

    fn read(r: &mut Reader) -> Result<Self, DeserializeError> {
        Ok(CltocsRead {
            chunk_id: r.get_u64()?,
            chunk_version: r.get_u32()?,
            chunk_type: r.get_u16()?,
            offset: r.get_u32()?,
            size: r.get_u32()?,
        })
    }
}

/// `CSTOCL_READ_DATA` — one block's worth of data plus its CRC. `data` is
/// the variable-length trailer and must come last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CstoclReadData {
    pub chunk_id: u64,
    pub block_offset: u32,
    pub crc: u32,
    pub data: Vec<u8>,
}

impl PacketBody for CstoclReadData {
    fn wire_size(&self) -> usize {
        8 + 4 + 4 + 4 + self.data.len()
    }

    fn write(&self, w: &mut Writer) {
        w.put_u64(self.chunk_id);
        w.put_u32(self.block_offset);
        w.put_u32(self.data.len() as u32);
        w.put_u32(self.crc);
        w.put_bytes(&self.data);
    }

    fn read(r: &mut Reader) -> Result<Self, DeserializeError> {
        let chunk_id = r.get_u64()?;
        let block_offset = r.get_u32()?;
        let block_size = r.get_u32()?;
        let crc = r.get_u32()?;
        let data = r.get_bytes(block_size as usize)?.to_vec();
        Ok(CstoclReadData {
            chunk_id,
            block_offset,
            crc,
            data,
        })
    }
}

/// `CSTOCL_READ_STATUS` — terminates a `CLTOCS_READ` stream, successfully
/// (`ErrorCode::Ok`) or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CstoclReadStatus {
    pub chunk_id: u64,
    pub status: ErrorCode,
}

impl PacketBody for CstoclReadStatus {
    fn wire_size(&self) -> usize {
        8 + 1
    }

    fn write(&self, w: &mut Writer) {
        w.put_u64(self.chunk_id);
        w.put_u8(self.status.into());
    }

    fn read(r: &mut Reader) -> Result<Self, DeserializeError> {
        let chunk_id = r.get_u64()?;
        let status = ErrorCode::try_from(r.get_u8()?)?;
        Ok(CstoclReadStatus { chunk_id, status })
    }
}

/// `CSTOMA_REGISTER_HOST` — a chunk server announcing itself to the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CstomaRegisterHost {
    pub ip: u32,
    pub port: u16,
    pub timeout: u16,
}

impl PacketBody for CstomaRegisterHost {
    fn wire_size(&self) -> usize {
        4 + 2 + 2
    }

    fn write(&self, w: &mut Writer) {
        w.put_u32(self.ip);
        w.put_u16(self.port);
        w.put_u16(self.timeout);
    }

    fn read(r: &mut Reader) -> Result<Self, DeserializeError> {
        Ok(CstomaRegisterHost {
            ip: r.get_u32()?,
            port: r.get_u16()?,
            timeout: r.get_u16()?,
        })
    }
}

/// `CSTOCS_GET_CHUNK_BLOCKS` — one chunk server asking a peer how many
/// blocks it holds for a part, used to settle disagreements during repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CstocsGetChunkBlocks {
    pub chunk_id: u64,
    pub chunk_version: u32,
    pub chunk_type: u16,
}

impl PacketBody for CstocsGetChunkBlocks {
    fn wire_size(&self) -> usize {
        8 + 4 + 2
    }

    fn write(&self, w: &mut Writer) {
        w.put_u64(self.chunk_id);
        w.put_u32(self.chunk_version);
        w.put_u16(self.chunk_type);
    }

    fn read(r: &mut Reader) -> Result<Self, DeserializeError> {
        Ok(CstocsGetChunkBlocks {
            chunk_id: r.get_u64()?,
            chunk_version: r.get_u32()?,
            chunk_type: r.get_u16()?,
        })
    }
}

/// `CSTOCS_GET_CHUNK_BLOCKS_STATUS` — the peer's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CstocsGetChunkBlocksStatus {
    pub chunk_id: u64,
    pub chunk_version: u32,
    pub chunk_type: u16,
    pub blocks: u16,
    pub status: ErrorCode,
}

impl PacketBody for CstocsGetChunkBlocksStatus {
    fn wire_size(&self) -> usize {
        8 + 4 + 2 + 2 + 1
    }

    fn write(&self, w: &mut Writer) {
        w.put_u64(self.chunk_id);
        w.put_u32(self.chunk_version);
        w.put_u16(self.chunk_type);
        w.put_u16(self.blocks);
        w.put_u8(self.status.into());
    }

    fn read(r: &mut Reader) -> Result<Self, DeserializeError> {
        let chunk_id = r.get_u64()?;
        let chunk_version = r.get_u32()?;
        let chunk_type = r.get_u16()?;
        let blocks = r.get_u16()?;
        let status = ErrorCode::try_from(r.get_u8()?)?;
        Ok(CstocsGetChunkBlocksStatus {
            chunk_id,
            chunk_version,
            chunk_type,
            blocks,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{deserialize_packet_data_no_header, serialize_packet};

    #[test]
    fn read_chunk_data_roundtrips_with_locations() {
        let data = MatoclFuseReadChunkData {
            msgid: 1,
            file_length: 1 << 30,
            chunk_id: 0xDEAD_BEEF,
            chunk_version: 3,
            locations: vec![
                ChunkLocation {
                    ip: 0x7F00_0001,
                    port: 9422,
                    chunk_type: 0,
                    cs_version: 1,
                },
                ChunkLocation {
                    ip: 0x7F00_0002,
                    port: 9422,
                    chunk_type: 0,
                    cs_version: 1,
                },
            ],
        };
        let buf = serialize_packet(100, 0, &data);
        let (version, parsed) =
            deserialize_packet_data_no_header::<MatoclFuseReadChunkData>(&buf[8..]).unwrap();
        assert_eq!(version, 0);
        assert_eq!(parsed, data);
    }

    #[test]
    fn read_data_trailer_roundtrips() {
        let data = CstoclReadData {
            chunk_id: 42,
            block_offset: 0,
            crc: 0x1234_5678,
            data: vec![7u8; 65536],
        };
        let buf = serialize_packet(200, 0, &data);
        let (_, parsed) =
            deserialize_packet_data_no_header::<CstoclReadData>(&buf[8..]).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn status_message_carries_error_code() {
        let data = CstoclReadStatus {
            chunk_id: 1,
            status: ErrorCode::Crc,
        };
        let buf = serialize_packet(201, 0, &data);
        let (_, parsed) =
            deserialize_packet_data_no_header::<CstoclReadStatus>(&buf[8..]).unwrap();
        assert_eq!(parsed.status, ErrorCode::Crc);
    }
}
