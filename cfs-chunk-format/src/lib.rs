//! Chunk-part identity (C4), filename/directory layout (C5), and the
//! on-disk chunk file formats (C6).

mod chunk_file;
mod filename;
mod part_type;
mod signature;

pub use chunk_file::{
    crc_offset, crc_table_size, data_block_offset, file_size_from_block_count, header_size,
    is_file_size_valid, ChunkFile, ChunkFileError, MFS_BLOCK_SIZE,
};
pub use filename::{
    generate_filename, parse_filename, subfolder_number_current, subfolder_number_legacy,
    DirectoryLayout, FileLayout, FilenameParseError, ParsedChunkFilename,
};
pub use part_type::{
    ChunkPartType, PartTypeError, MAX_EC_PARTS_PER_SIDE, MAX_EC_TOTAL_PARTS, MAX_XOR_LEVEL,
    MFS_BLOCKS_IN_CHUNK, MFS_CHUNK_SIZE, MIN_XOR_LEVEL, XOR_PARITY_PART,
};
pub use signature::{ChunkSignature, SignatureError, SignatureFormat, SIGNATURE_SIZE};
