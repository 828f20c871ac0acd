//! On-disk chunk file layout and the operations a chunk server runs
//! against a single chunk (C6).
//!
//! Ported from `mfschunkserver/chunk.cc`'s
//! `getHeaderSize`/`getCrcOffset`/`getDataBlockOffset`/`isFileSizeValid`/
//! `maxBlocksInFile` for the MooseFS layout, and `src/chunkserver/
//! chunk_signature.cc` for the signature block. The interleaved (`.liz`)
//! layout has no header/CRC-table split in the original (each block carries
//! its own CRC inline) — its offset math is derived directly from
//! the `[header-per-block][data-per-block]` layout it's meant to store.

use crate::filename::FileLayout;
use crate::part_type::ChunkPartType;
use crate::signature::{ChunkSignature, SIGNATURE_SIZE};
use anyhow::{bail, Context, Result};
use std::io::{Read, Seek, SeekFrom, Write};

pub const MFS_BLOCK_SIZE: u64 = 65536;
/// Fixed offset of the CRC table in the MooseFS layout, independent of
/// part type (`Chunk::getCrcOffset` always returns 1024).
pub const CRC_TABLE_OFFSET: u64 = 1024;
const DISK_BLOCK_SIZE: u64 = 4096;
/// Per-block CRC stored inline ahead of each block's data in the
/// interleaved layout.
const INTERLEAVED_BLOCK_HEADER_SIZE: u64 = 4;

fn round_up(value: u64, multiple: u64) -> u64 {
    (value + multiple - 1) / multiple * multiple
}

/// `getHeaderSize`: for a standard chunk this is the fixed
/// `1024 + 4*MFSBLOCKSINCHUNK`; for xor/ec it is that same formula sized to
/// the part's own (smaller) `maxBlocksInFile`, then rounded up to a disk
/// block so data blocks start on a 4 KiB boundary.
pub fn header_size(part_type: ChunkPartType) -> u64 {
    let required = CRC_TABLE_OFFSET + 4 * part_type.max_blocks_in_file() as u64;
    if part_type.is_standard() {
        required
    } else {
        round_up(required, DISK_BLOCK_SIZE)
    }
}

pub fn crc_offset() -> u64 {
    CRC_TABLE_OFFSET
}

pub fn crc_table_size(part_type: ChunkPartType) -> u64 {
    4 * part_type.max_blocks_in_file() as u64
}

pub fn data_block_offset(part_type: ChunkPartType, layout: FileLayout, block: u32) -> u64 {
    match layout {
        FileLayout::MooseFs => header_size(part_type) + block as u64 * MFS_BLOCK_SIZE,
        FileLayout::Interleaved => {
            SIGNATURE_SIZE as u64
                + block as u64 * (INTERLEAVED_BLOCK_HEADER_SIZE + MFS_BLOCK_SIZE)
                + INTERLEAVED_BLOCK_HEADER_SIZE
        }
    }
}

fn interleaved_block_header_offset(block: u32) -> u64 {
    SIGNATURE_SIZE as u64 + block as u64 * (INTERLEAVED_BLOCK_HEADER_SIZE + MFS_BLOCK_SIZE)
}

/// `getFileSizeFromBlockCount`.
pub fn file_size_from_block_count(part_type: ChunkPartType, layout: FileLayout, blocks: u32) -> u64 {
    match layout {
        FileLayout::MooseFs => header_size(part_type) + blocks as u64 * MFS_BLOCK_SIZE,
        FileLayout::Interleaved => {
            SIGNATURE_SIZE as u64 + blocks as u64 * (INTERLEAVED_BLOCK_HEADER_SIZE + MFS_BLOCK_SIZE)
        }
    }
}

/// `isFileSizeValid`.
pub fn is_file_size_valid(part_type: ChunkPartType, layout: FileLayout, file_size: u64) -> bool {
    match layout {
        FileLayout::MooseFs => {
            let header = header_size(part_type);
            if file_size < header {
                return false;
            }
            let rest = file_size - header;
            rest % MFS_BLOCK_SIZE == 0 && rest / MFS_BLOCK_SIZE <= part_type.max_blocks_in_file() as u64
        }
        FileLayout::Interleaved => {
            if file_size < SIGNATURE_SIZE as u64 {
                return false;
            }
            let rest = file_size - SIGNATURE_SIZE as u64;
            let stride = INTERLEAVED_BLOCK_HEADER_SIZE + MFS_BLOCK_SIZE;
            rest % stride == 0 && rest / stride <= part_type.max_blocks_in_file() as u64
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ChunkFileError {
    #[error("chunk signature does not match expected (id={expected_id}, version={expected_version})")]
    SignatureMismatch { expected_id: u64, expected_version: u32 },
    #[error("block {block} is out of range (file has {blocks} blocks)")]
    BlockOutOfRange { block: u32, blocks: u32 },
    #[error("stored CRC {stored:#010x} does not match computed CRC {computed:#010x} for block {block}")]
    CrcMismatch { block: u32, stored: u32, computed: u32 },
    #[error("file size {0} is not a valid chunk file size for this type/layout")]
    InvalidFileSize(u64),
}

/// A single chunk file, opened against some backing store (`File`,
/// `Cursor<Vec<u8>>` in tests, anything `Read + Write + Seek`).
pub struct ChunkFile<F> {
    backend: F,
    part_type: ChunkPartType,
    layout: FileLayout,
    chunk_id: u64,
    version: u32,
    blocks: u32,
}

impl<F: Read + Write + Seek> ChunkFile<F> {
    /// `open` + `verify signature`: reads the signature block and checks it
    /// names the expected chunk, deriving `blocks` from the current file
    /// length.
    pub fn open(mut backend: F, part_type: ChunkPartType, layout: FileLayout, expected_id: u64, expected_version: u32) -> Result<Self> {
        let mut sig_buf = vec![0u8; SIGNATURE_SIZE];
        backend
            .seek(SeekFrom::Start(0))
            .context("seeking to chunk signature")?;
        backend
            .read_exact(&mut sig_buf)
            .context("reading chunk signature")?;
        let sig = ChunkSignature::parse(&sig_buf).context("parsing chunk signature")?;
        if sig.chunk_id != expected_id || sig.version != expected_version {
            bail!(ChunkFileError::SignatureMismatch {
                expected_id,
                expected_version,
            });
        }

        let file_len = backend.seek(SeekFrom::End(0)).context("seeking to end of chunk file")?;
        if !is_file_size_valid(part_type, layout, file_len) {
            bail!(ChunkFileError::InvalidFileSize(file_len));
        }
        let blocks = match layout {
            FileLayout::MooseFs => ((file_len - header_size(part_type)) / MFS_BLOCK_SIZE) as u32,
            FileLayout::Interleaved => {
                ((file_len - SIGNATURE_SIZE as u64) / (INTERLEAVED_BLOCK_HEADER_SIZE + MFS_BLOCK_SIZE)) as u32
            }
        };

        Ok(ChunkFile {
            backend,
            part_type,
            layout,
            chunk_id: expected_id,
            version: expected_version,
            blocks,
        })
    }

    /// Formats a brand-new, empty (zero-block) chunk file: writes the
    /// signature and, for the MooseFS layout, zeroes the CRC table/padding.
    pub fn create(mut backend: F, part_type: ChunkPartType, layout: FileLayout, chunk_id: u64, version: u32) -> Result<Self> {
        let sig = ChunkSignature::new(chunk_id, version, part_type);
        let mut sig_buf = vec![0u8; SIGNATURE_SIZE];
        sig.write(&mut sig_buf);
        backend.seek(SeekFrom::Start(0)).context("seeking to start of new chunk file")?;
        backend.write_all(&sig_buf).context("writing chunk signature")?;

        if let FileLayout::MooseFs = layout {
            let header = header_size(part_type);
            let padding = vec![0u8; (header - SIGNATURE_SIZE as u64) as usize];
            backend.write_all(&padding).context("zeroing chunk header")?;
        }
        backend.flush().context("flushing new chunk file")?;

        Ok(ChunkFile {
            backend,
            part_type,
            layout,
            chunk_id,
            version,
            blocks: 0,
        })
    }

    pub fn part_type(&self) -> ChunkPartType {
        self.part_type
    }

    pub fn layout(&self) -> FileLayout {
        self.layout
    }

    pub fn blocks(&self) -> u32 {
        self.blocks
    }

    pub fn chunk_id(&self) -> u64 {
        self.chunk_id
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    fn crc_slot_offset(&self, block: u32) -> u64 {
        CRC_TABLE_OFFSET + 4 * block as u64
    }

    /// `read block`: returns the block's data and its stored CRC,
    /// verifying the data matches it.
    pub fn read_block(&mut self, block: u32) -> Result<(Vec<u8>, u32)> {
        if block >= self.blocks {
            bail!(ChunkFileError::BlockOutOfRange { block, blocks: self.blocks });
        }

        let stored_crc = match self.layout {
            FileLayout::MooseFs => {
                self.backend
                    .seek(SeekFrom::Start(self.crc_slot_offset(block)))
                    .context("seeking to CRC slot")?;
                let mut crc_buf = [0u8; 4];
                self.backend.read_exact(&mut crc_buf).context("reading CRC slot")?;
                u32::from_be_bytes(crc_buf)
            }
            FileLayout::Interleaved => {
                self.backend
                    .seek(SeekFrom::Start(interleaved_block_header_offset(block)))
                    .context("seeking to interleaved block header")?;
                let mut crc_buf = [0u8; 4];
                self.backend.read_exact(&mut crc_buf).context("reading interleaved block header")?;
                u32::from_be_bytes(crc_buf)
            }
        };

        let data_offset = data_block_offset(self.part_type, self.layout, block);
        self.backend.seek(SeekFrom::Start(data_offset)).context("seeking to block data")?;
        let mut data = vec![0u8; MFS_BLOCK_SIZE as usize];
        self.backend.read_exact(&mut data).context("reading block data")?;

        let computed = cfs_crc::crc32(0, &data);
        if computed != stored_crc {
            bail!(ChunkFileError::CrcMismatch { block, stored: stored_crc, computed });
        }
        Ok((data, stored_crc))
    }

    /// `write block`: persists `data` (must be exactly one block, callers
    /// pad the final short block themselves) and updates the CRC table.
    /// Extends `blocks`/file length if `block` is the current tail.
    pub fn write_block(&mut self, block: u32, data: &[u8]) -> Result<u32> {
        if data.len() as u64 > MFS_BLOCK_SIZE {
            bail!("block payload of {} bytes exceeds MFSBLOCKSIZE", data.len());
        }
        if block > self.blocks {
            bail!("cannot write block {} past current tail {}", block, self.blocks);
        }
        let crc = cfs_crc::crc32(0, data);

        match self.layout {
            FileLayout::MooseFs => {
                self.backend
                    .seek(SeekFrom::Start(self.crc_slot_offset(block)))
                    .context("seeking to CRC slot")?;
                self.backend.write_all(&crc.to_be_bytes()).context("writing CRC slot")?;
                self.backend
                    .seek(SeekFrom::Start(data_block_offset(self.part_type, self.layout, block)))
                    .context("seeking to block data")?;
                self.backend.write_all(data).context("writing block data")?;
            }
            FileLayout::Interleaved => {
                self.backend
                    .seek(SeekFrom::Start(interleaved_block_header_offset(block)))
                    .context("seeking to interleaved block header")?;
                self.backend.write_all(&crc.to_be_bytes()).context("writing interleaved block header")?;
                self.backend.write_all(data).context("writing interleaved block data")?;
            }
        }
        self.backend.flush().context("flushing written block")?;

        if block == self.blocks {
            self.blocks += 1;
        }
        Ok(crc)
    }

    /// `truncate`: shrinks or extends the chunk to exactly
    /// `new_block_count` blocks, zero-filling any newly-added blocks.
    pub fn truncate(&mut self, new_block_count: u32) -> Result<()> {
        if new_block_count > self.blocks {
            let zeros = vec![0u8; MFS_BLOCK_SIZE as usize];
            for block in self.blocks..new_block_count {
                self.write_block(block, &zeros)?;
            }
        } else {
            let new_len = file_size_from_block_count(self.part_type, self.layout, new_block_count);
            self.backend.seek(SeekFrom::Start(new_len)).context("seeking to new end of chunk")?;
            self.blocks = new_block_count;
        }
        Ok(())
    }

    /// `checksum whole chunk`: the CRC of the CRCs, folded left to right
    /// with [`cfs_crc::crc32_combine`] rather than re-reading every block's
    /// data — the table already holds each block's CRC.
    pub fn checksum(&mut self) -> Result<u32> {
        let mut acc = cfs_crc::crc32(0, &[]);
        for block in 0..self.blocks {
            let (_, crc) = self.read_block(block)?;
            acc = cfs_crc::crc32_combine(acc, crc, MFS_BLOCK_SIZE as u64);
        }
        Ok(acc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn new_backend() -> Cursor<Vec<u8>> {
        Cursor::new(Vec::new())
    }

    #[test]
    fn header_size_for_standard_is_fixed_and_unrounded() {
        let t = ChunkPartType::standard();
        assert_eq!(header_size(t), 1024 + 4 * 1024);
    }

    #[test]
    fn header_size_for_xor_is_rounded_to_disk_block() {
        let t = ChunkPartType::xor(3, 1).unwrap();
        let h = header_size(t);
        assert_eq!(h % DISK_BLOCK_SIZE, 0);
        assert!(h >= CRC_TABLE_OFFSET + 4 * t.max_blocks_in_file() as u64);
    }

    #[test]
    fn create_then_write_then_read_round_trips_a_block() {
        let t = ChunkPartType::standard();
        let mut file = ChunkFile::create(new_backend(), t, FileLayout::MooseFs, 7, 1).unwrap();
        let data = vec![0xABu8; MFS_BLOCK_SIZE as usize];
        file.write_block(0, &data).unwrap();
        assert_eq!(file.blocks(), 1);
        let (read_data, crc) = file.read_block(0).unwrap();
        assert_eq!(read_data, data);
        assert_eq!(crc, cfs_crc::crc32(0, &data));
    }

    #[test]
    fn reopen_reads_back_identity_and_rejects_mismatched_expectations() {
        let t = ChunkPartType::standard();
        let mut file = ChunkFile::create(new_backend(), t, FileLayout::MooseFs, 7, 1).unwrap();
        let data = vec![0x11u8; MFS_BLOCK_SIZE as usize];
        file.write_block(0, &data).unwrap();
        let backend = file.backend;

        let reopened = ChunkFile::open(backend.clone(), t, FileLayout::MooseFs, 7, 1).unwrap();
        assert_eq!(reopened.blocks(), 1);

        let err = ChunkFile::open(backend, t, FileLayout::MooseFs, 7, 2).unwrap_err();
        assert!(err.to_string().contains("signature"));
    }

    #[test]
    fn truncate_extends_with_zero_blocks_and_shrinks_in_place() {
        let t = ChunkPartType::standard();
        let mut file = ChunkFile::create(new_backend(), t, FileLayout::MooseFs, 1, 0).unwrap();
        file.truncate(3).unwrap();
        assert_eq!(file.blocks(), 3);
        let (data, _) = file.read_block(2).unwrap();
        assert!(data.iter().all(|&b| b == 0));
        file.truncate(1).unwrap();
        assert_eq!(file.blocks(), 1);
    }

    #[test]
    fn checksum_combines_per_block_crcs() {
        let t = ChunkPartType::standard();
        let mut file = ChunkFile::create(new_backend(), t, FileLayout::MooseFs, 1, 0).unwrap();
        let a = vec![0x01u8; MFS_BLOCK_SIZE as usize];
        let b = vec![0x02u8; MFS_BLOCK_SIZE as usize];
        file.write_block(0, &a).unwrap();
        file.write_block(1, &b).unwrap();
        let whole = cfs_crc::crc32_combine(cfs_crc::crc32(0, &a), cfs_crc::crc32(0, &b), MFS_BLOCK_SIZE as u64);
        assert_eq!(file.checksum().unwrap(), whole);
    }

    #[test]
    fn is_file_size_valid_rejects_misaligned_sizes() {
        let t = ChunkPartType::standard();
        assert!(!is_file_size_valid(t, FileLayout::MooseFs, header_size(t) + 100));
        assert!(is_file_size_valid(t, FileLayout::MooseFs, header_size(t)));
        assert!(is_file_size_valid(t, FileLayout::MooseFs, header_size(t) + MFS_BLOCK_SIZE));
    }
}
