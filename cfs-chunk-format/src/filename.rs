//! Chunk filename grammar (C5): a small hand-rolled recursive-descent
//! parser and its deterministic inverse, following
//! `src/chunkserver/chunk_filename_parser.cc`'s
//! token-by-token consumption style (`consume("xor_parity_of_")`, leading-
//! zero rejection, exact-width hex checks).

use crate::part_type::ChunkPartType;
use thiserror::Error;

/// `.mfs` chunks use the MooseFS (signature + CRC table + blocks) layout;
/// `.liz` chunks use the interleaved (per-block header+data) layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileLayout {
    MooseFs,
    Interleaved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChunkFilename {
    pub chunk_id: u64,
    pub version: u32,
    pub part_type: ChunkPartType,
    pub layout: FileLayout,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilenameParseError {
    #[error("missing required prefix {0:?}")]
    MissingPrefix(&'static str),
    #[error("expected {expected} hex digits, found {found}")]
    WrongHexWidth { expected: usize, found: usize },
    #[error("hex digit is not uppercase")]
    LowercaseHex,
    #[error("decimal field has a leading zero")]
    LeadingZero,
    #[error("decimal field is empty or not numeric")]
    NotNumeric,
    #[error("unknown filename extension, expected .mfs or .liz")]
    UnknownExtension,
    #[error("trailing bytes after a complete filename")]
    TrailingBytes,
    #[error(transparent)]
    PartType(#[from] crate::part_type::PartTypeError),
}

struct Cursor<'a> {
    rest: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self {
        Cursor { rest: s }
    }

    fn consume(&mut self, token: &'static str) -> bool {
        if let Some(rest) = self.rest.strip_prefix(token) {
            self.rest = rest;
            true
        } else {
            false
        }
    }

    fn require(&mut self, token: &'static str) -> Result<(), FilenameParseError> {
        if self.consume(token) {
            Ok(())
        } else {
            Err(FilenameParseError::MissingPrefix(token))
        }
    }

    /// Consumes a decimal run of 1-2 digits with no leading zero unless the
    /// value itself is exactly `0`.
    fn decimal(&mut self) -> Result<u32, FilenameParseError> {
        let digit_count = self
            .rest
            .as_bytes()
            .iter()
            .take(2)
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digit_count == 0 {
            return Err(FilenameParseError::NotNumeric);
        }
        let (digits, rest) = self.rest.split_at(digit_count);
        if digits.len() > 1 && digits.starts_with('0') {
            return Err(FilenameParseError::LeadingZero);
        }
        self.rest = rest;
        Ok(digits.parse().expect("ascii digits"))
    }

    /// Consumes exactly one decimal digit (the EC `generation` field).
    fn single_digit(&mut self) -> Result<u32, FilenameParseError> {
        let mut bytes = self.rest.bytes();
        match bytes.next() {
            Some(b) if b.is_ascii_digit() => {
                self.rest = &self.rest[1..];
                Ok((b - b'0') as u32)
            }
            _ => Err(FilenameParseError::NotNumeric),
        }
    }

    /// Consumes exactly `width` uppercase hex digits.
    fn exact_hex(&mut self, width: usize) -> Result<u64, FilenameParseError> {
        let found = self
            .rest
            .as_bytes()
            .iter()
            .take_while(|b| b.is_ascii_hexdigit())
            .count();
        if found < width {
            return Err(FilenameParseError::WrongHexWidth {
                expected: width,
                found,
            });
        }
        let (digits, rest) = self.rest.split_at(width);
        if digits.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(FilenameParseError::LowercaseHex);
        }
        self.rest = rest;
        u64::from_str_radix(digits, 16).map_err(|_| FilenameParseError::NotNumeric)
    }
}

/// Parses `chunk_[<prefix>]<CHUNKID:16HEX>_<VERSION:8HEX>.(mfs|liz)`.
pub fn parse_filename(name: &str) -> Result<ParsedChunkFilename, FilenameParseError> {
    let mut c = Cursor::new(name);
    c.require("chunk_")?;

    let part_type = parse_type_prefix(&mut c)?;
    let chunk_id = c.exact_hex(16)?;
    c.require("_")?;
    let version = c.exact_hex(8)? as u32;

    let layout = if c.consume(".mfs") {
        FileLayout::MooseFs
    } else if c.consume(".liz") {
        FileLayout::Interleaved
    } else {
        return Err(FilenameParseError::UnknownExtension);
    };

    if !c.rest.is_empty() {
        return Err(FilenameParseError::TrailingBytes);
    }

    Ok(ParsedChunkFilename {
        chunk_id,
        version,
        part_type,
        layout,
    })
}

fn parse_type_prefix(c: &mut Cursor) -> Result<ChunkPartType, FilenameParseError> {
    if c.consume("xor_parity_of_") {
        let level = c.decimal()?;
        c.require("_")?;
        return Ok(ChunkPartType::xor_parity(
            u8::try_from(level).map_err(|_| FilenameParseError::NotNumeric)?,
        )?);
    }
    if c.consume("xor_") {
        let part = c.decimal()?;
        c.require("_of_")?;
        let level = c.decimal()?;
        c.require("_")?;
        return Ok(ChunkPartType::xor(
            u8::try_from(level).map_err(|_| FilenameParseError::NotNumeric)?,
            u8::try_from(part).map_err(|_| FilenameParseError::NotNumeric)?,
        )?);
    }
    if c.consume("ec") {
        // generation: exactly 1 decimal digit per the grammar
        let _generation = c.single_digit()?;
        c.require("_")?;
        let idx = c.decimal()?;
        c.require("_of_")?;
        let k = c.decimal()?;
        c.require("_")?;
        let m = c.decimal()?;
        c.require("_")?;
        return Ok(ChunkPartType::ec(
            u8::try_from(k).map_err(|_| FilenameParseError::NotNumeric)?,
            u8::try_from(m).map_err(|_| FilenameParseError::NotNumeric)?,
            u8::try_from(idx).map_err(|_| FilenameParseError::NotNumeric)?,
        )?);
    }
    Ok(ChunkPartType::standard())
}

/// The deterministic inverse of [`parse_filename`]; round-trips for every
/// legal name.
pub fn generate_filename(
    chunk_id: u64,
    version: u32,
    part_type: ChunkPartType,
    layout: FileLayout,
) -> String {
    let mut s = String::from("chunk_");
    if part_type.is_xor_parity() {
        let level = part_type.xor_level().expect("xor parity has a level");
        s.push_str(&format!("xor_parity_of_{level}_"));
    } else if part_type.is_xor() {
        let level = part_type.xor_level().expect("xor data has a level");
        let part = part_type.xor_part().expect("xor data has a part");
        s.push_str(&format!("xor_{part}_of_{level}_"));
    } else if part_type.is_ec() {
        if let ChunkPartType::Ec { k, m, idx } = part_type {
            // generation 1: no ring-buffered EC generation tracking in
            // this core (out of scope); always emit "ec1_".
            s.push_str(&format!("ec1_{idx}_of_{k}_{m}_"));
        }
    }
    s.push_str(&format!("{chunk_id:016X}_{version:08X}"));
    s.push_str(match layout {
        FileLayout::MooseFs => ".mfs",
        FileLayout::Interleaved => ".liz",
    });
    s
}

/// `chunks<HH>/` with `HH = (chunkId >> 16) & 0xFF`: the current layout.
pub fn subfolder_number_current(chunk_id: u64) -> u8 {
    ((chunk_id >> 16) & 0xFF) as u8
}

/// `<HH>/` with `HH = chunkId & 0xFF`: the legacy layout, kept only for
/// reading chunks written before the current scheme
/// (`chunk.cc::getSubfolderNumber`'s two branches).
pub fn subfolder_number_legacy(chunk_id: u64) -> u8 {
    (chunk_id & 0xFF) as u8
}

/// Which directory layout (current vs. legacy numbering) a chunk store
/// uses, mirroring the original's explicit layout-version enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryLayout {
    Current,
    Legacy,
}

impl DirectoryLayout {
    pub fn subfolder_number(self, chunk_id: u64) -> u8 {
        match self {
            DirectoryLayout::Current => subfolder_number_current(chunk_id),
            DirectoryLayout::Legacy => subfolder_number_legacy(chunk_id),
        }
    }

    pub fn directory_name(self, chunk_id: u64) -> String {
        match self {
            DirectoryLayout::Current => format!("chunks{:02X}", self.subfolder_number(chunk_id)),
            DirectoryLayout::Legacy => format!("{:02X}", self.subfolder_number(chunk_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_filename_roundtrips() {
        let name = generate_filename(0x0123_4567_89AB_CDEF, 7, ChunkPartType::standard(), FileLayout::MooseFs);
        assert_eq!(name, "chunk_0123456789ABCDEF_00000007.mfs");
        let parsed = parse_filename(&name).unwrap();
        assert_eq!(parsed.chunk_id, 0x0123_4567_89AB_CDEF);
        assert_eq!(parsed.version, 7);
        assert_eq!(parsed.part_type, ChunkPartType::standard());
        assert_eq!(parsed.layout, FileLayout::MooseFs);
    }

    #[test]
    fn xor_data_and_parity_roundtrip() {
        let data = ChunkPartType::xor(5, 3).unwrap();
        let name = generate_filename(1, 1, data, FileLayout::Interleaved);
        assert_eq!(name, "chunk_xor_3_of_5_0000000000000001_00000001.liz");
        assert_eq!(parse_filename(&name).unwrap().part_type, data);

        let parity = ChunkPartType::xor_parity(5).unwrap();
        let name = generate_filename(1, 1, parity, FileLayout::Interleaved);
        assert_eq!(name, "chunk_xor_parity_of_5_0000000000000001_00000001.liz");
        assert_eq!(parse_filename(&name).unwrap().part_type, parity);
    }

    #[test]
    fn ec_part_roundtrips() {
        let ec = ChunkPartType::ec(6, 3, 4).unwrap();
        let name = generate_filename(9, 2, ec, FileLayout::MooseFs);
        assert_eq!(parse_filename(&name).unwrap().part_type, ec);
    }

    #[test]
    fn leading_zero_decimal_is_rejected() {
        let err = parse_filename("chunk_xor_01_of_5_0000000000000001_00000001.liz").unwrap_err();
        assert_eq!(err, FilenameParseError::LeadingZero);
    }

    #[test]
    fn lowercase_hex_is_rejected() {
        let err = parse_filename("chunk_0123456789abcdef_00000007.mfs").unwrap_err();
        assert_eq!(err, FilenameParseError::LowercaseHex);
    }

    #[test]
    fn short_hex_field_is_rejected() {
        let err = parse_filename("chunk_012345_00000007.mfs").unwrap_err();
        assert!(matches!(err, FilenameParseError::WrongHexWidth { .. }));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let err = parse_filename("chunk_0123456789ABCDEF_00000007.mfs.bak").unwrap_err();
        assert_eq!(err, FilenameParseError::TrailingBytes);
    }

    #[test]
    fn subfolder_numbering_schemes_differ() {
        let id = 0x0000_0000_0012_3456u64;
        assert_eq!(subfolder_number_current(id), 0x12);
        assert_eq!(subfolder_number_legacy(id), 0x56);
    }
}
