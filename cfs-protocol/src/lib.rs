//! Byte codec, packet framing, and the error taxonomy shared by the master,
//! chunk servers, and clients of the core chunk-handling subsystem.
//!
//! Everything here is non-allocating on the hot path: [`Reader`] and
//! [`Writer`] borrow the caller's buffer and never own one, mirroring the
//! cursor-pointer style of the original wire code (`datapack.h`,
//! `serialization.h`) while staying a safe, bounds-checked slice walk rather
//! than a raw pointer.

mod error_code;
mod messages;

pub use error_code::ErrorCode;
pub use messages::*;

use thiserror::Error;

/// Failure modes of the deserialization framework. These surface to the
/// outward-facing boundary as `ErrorCode::Einval` per the error-handling
/// design (serialization failures are never retried).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeserializeError {
    #[error("incorrect deserialization: needed {needed} bytes, {available} available")]
    IncorrectDeserialization { needed: usize, available: usize },
    #[error("vector element size {element_size} does not evenly divide remaining {remaining} bytes")]
    Misaligned { element_size: usize, remaining: usize },
    #[error("unsupported packet version {0}")]
    UnsupportedVersion(u32),
    #[error("unknown wire code {0}")]
    UnknownCode(u16),
}

/// A read-only, non-allocating cursor over a byte slice.
///
/// `remaining()` plays the role the original framework's explicit
/// `bytesLeftInBuffer` counter plays in C: in Rust the slice already carries
/// its own length, so there is nothing separate to keep in sync.
pub struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Reader { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DeserializeError> {
        if self.buf.len() < n {
            return Err(DeserializeError::IncorrectDeserialization {
                needed: n,
                available: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    pub fn get_u8(&mut self) -> Result<u8, DeserializeError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, DeserializeError> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn get_u32(&mut self) -> Result<u32, DeserializeError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn get_u64(&mut self) -> Result<u64, DeserializeError> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Reads exactly `n` raw bytes, e.g. a block's worth of chunk data.
    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8], DeserializeError> {
        self.take(n)
    }

    /// Consumes the rest of the buffer as a vector of fixed-width elements.
    /// The length is implicit: this is only valid for a trailer placed last
    /// in a packet's body, per §4.3.
    pub fn get_vec_all<T: FixedWidth>(&mut self) -> Result<Vec<T>, DeserializeError> {
        let remaining = self.remaining();
        if remaining % T::WIRE_SIZE != 0 {
            return Err(DeserializeError::Misaligned {
                element_size: T::WIRE_SIZE,
                remaining,
            });
        }
        let n = remaining / T::WIRE_SIZE;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(T::read_fixed(self)?);
        }
        Ok(out)
    }
}

/// A write-only, non-allocating cursor over a caller-owned byte slice.
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Writer { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf[self.pos] = v;
        self.pos += 1;
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf[self.pos..self.pos + 2].copy_from_slice(&v.to_be_bytes());
        self.pos += 2;
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_be_bytes());
        self.pos += 4;
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf[self.pos..self.pos + 8].copy_from_slice(&v.to_be_bytes());
        self.pos += 8;
    }

    pub fn put_bytes(&mut self, b: &[u8]) {
        self.buf[self.pos..self.pos + b.len()].copy_from_slice(b);
        self.pos += b.len();
    }

    pub fn put_vec<T: FixedWidth>(&mut self, items: &[T]) {
        for item in items {
            item.write_fixed(self);
        }
    }
}

/// A wire type whose serialized size never depends on its value: `u8`, `u16`,
/// `u32`, `u64`, and the fixed-size structs built from them. Required for
/// the length-implicit vector trailer rule of §4.3.
pub trait FixedWidth: Sized {
    const WIRE_SIZE: usize;

    fn read_fixed(r: &mut Reader) -> Result<Self, DeserializeError>;
    fn write_fixed(&self, w: &mut Writer);
}

macro_rules! impl_fixed_width_int {
    ($ty:ty, $size:expr, $get:ident, $put:ident) => {
        impl FixedWidth for $ty {
            const WIRE_SIZE: usize = $size;

            fn read_fixed(r: &mut Reader) -> Result<Self, DeserializeError> {
                r.$get()
            }

            fn write_fixed(&self, w: &mut Writer) {
                w.$put(*self)
            }
        }
    };
}

impl_fixed_width_int!(u8, 1, get_u8, put_u8);
impl_fixed_width_int!(u16, 2, get_u16, put_u16);
impl_fixed_width_int!(u32, 4, get_u32, put_u32);
impl_fixed_width_int!(u64, 8, get_u64, put_u64);

/// A message body that can be measured, written, and read back. Implemented
/// by every struct in the §6 wire catalogue; this is the Rust stand-in for
/// the original framework's variadic `serializedSize`/`serialize`/
/// `deserialize` triad — one call per compound type instead of per field.
pub trait PacketBody: Sized {
    fn wire_size(&self) -> usize;
    fn write(&self, w: &mut Writer);
    fn read(r: &mut Reader) -> Result<Self, DeserializeError>;
}

/// The 8-byte `type:u32 length:u32` header common to every packet,
/// legacy or versioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub msg_type: u32,
    /// Number of body bytes following the header (includes the `version`
    /// tag for versioned packets).
    pub length: u32,
}

impl PacketHeader {
    pub const SIZE: usize = 8;

    /// Reads the header without consuming anything beyond it; the caller's
    /// buffer is untouched past `SIZE` bytes (a "peek", not a destructive
    /// read, since the header alone doesn't tell the caller whether more
    /// bytes than `SIZE` are even available yet).
    pub fn peek(buf: &[u8]) -> Result<PacketHeader, DeserializeError> {
        let mut r = Reader::new(buf);
        let msg_type = r.get_u32()?;
        let length = r.get_u32()?;
        Ok(PacketHeader { msg_type, length })
    }
}

/// Peeks the `version` tag at the start of a packet body without advancing
/// or copying the caller's buffer.
pub fn peek_version(body: &[u8]) -> Result<u32, DeserializeError> {
    Reader::new(body).get_u32()
}

/// Computes the total header+body size a versioned packet carrying `data`
/// would need, and writes it into a freshly allocated buffer:
/// `type:u32 length:u32 version:u32 <data>`.
pub fn serialize_packet<T: PacketBody>(msg_type: u32, version: u32, data: &T) -> Vec<u8> {
    let body_size = 4 + data.wire_size();
    let total = PacketHeader::SIZE + body_size;
    let mut buf = vec![0u8; total];
    {
        let mut w = Writer::new(&mut buf);
        w.put_u32(msg_type);
        w.put_u32(body_size as u32);
        w.put_u32(version);
        data.write(&mut w);
    }
    buf
}

/// Deserializes a packet body that has already had its 8-byte header
/// stripped off, per §4.3's `deserializePacketDataNoHeader`.
pub fn deserialize_packet_data_no_header<T: PacketBody>(
    body: &[u8],
) -> Result<(u32, T), DeserializeError> {
    let mut r = Reader::new(body);
    let version = r.get_u32()?;
    let data = T::read(&mut r)?;
    Ok((version, data))
}

/// Deserializes a full `type length version data` packet, validating that
/// `length` matches the bytes actually supplied (the `SkipHeader` variant
/// of §4.3: the header is consumed as part of this call).
pub fn deserialize_packet_skip_header<T: PacketBody>(
    buf: &[u8],
) -> Result<(PacketHeader, u32, T), DeserializeError> {
    let header = PacketHeader::peek(buf)?;
    let body_start = PacketHeader::SIZE;
    let body_end = body_start + header.length as usize;
    if buf.len() < body_end {
        return Err(DeserializeError::IncorrectDeserialization {
            needed: body_end,
            available: buf.len(),
        });
    }
    let (version, data) = deserialize_packet_data_no_header(&buf[body_start..body_end])?;
    Ok((header, version, data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_roundtrip() {
        let mut buf = [0u8; 8];
        {
            let mut w = Writer::new(&mut buf);
            w.put_u64(0x0102_0304_0506_0708);
        }
        assert_eq!(buf, [1, 2, 3, 4, 5, 6, 7, 8]);

        let mut r = Reader::new(&buf);
        assert_eq!(r.get_u64().unwrap(), 0x0102_0304_0506_0708);
        assert!(r.is_empty());
    }

    #[test]
    fn get_past_end_fails() {
        let buf = [1u8, 2, 3];
        let mut r = Reader::new(&buf);
        assert!(r.get_u32().is_err());
    }

    #[test]
    fn vector_consumes_all_remaining_bytes() {
        let buf = [0u32, 1, 2, 3].iter().flat_map(|v| v.to_be_bytes()).collect::<Vec<u8>>();
        let mut r = Reader::new(&buf);
        let v: Vec<u32> = r.get_vec_all().unwrap();
        assert_eq!(v, vec![0, 1, 2, 3]);
        assert!(r.is_empty());
    }

    #[test]
    fn vector_rejects_misaligned_trailer() {
        let buf = [0u8; 6];
        let mut r = Reader::new(&buf);
        let err = r.get_vec_all::<u32>().unwrap_err();
        assert_eq!(
            err,
            DeserializeError::Misaligned {
                element_size: 4,
                remaining: 6
            }
        );
    }

    #[test]
    fn packet_roundtrip() {
        let data = CltomaFuseReadChunk {
            msgid: 7,
            inode: 42,
            chunk_index: 3,
        };
        let buf = serialize_packet(1, 0, &data);

        let header = PacketHeader::peek(&buf).unwrap();
        assert_eq!(header.msg_type, 1);
        assert_eq!(header.length as usize, buf.len() - PacketHeader::SIZE);

        let (parsed_header, version, parsed) =
            deserialize_packet_skip_header::<CltomaFuseReadChunk>(&buf).unwrap();
        assert_eq!(parsed_header, header);
        assert_eq!(version, 0);
        assert_eq!(parsed, data);
    }
}
