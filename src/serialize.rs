//! Deterministic binary codec for consensus structures.
//!
//! Integers are little-endian at fixed width. Variable-length "compact
//! size" fields use the minimal encoding (1 byte below 0xfd, otherwise a
//! marker byte plus a 2/4/8-byte payload); non-minimal encodings are
//! rejected on read since the encoding is consensus-critical. Byte vectors
//! are compact-size length-prefixed. Malformed input yields a
//! [`SerializeError`], never a panic: callers translate decode failures
//! into ordinary validation failures.

use crate::error::SerializeError;

/// Upper bound on any decoded collection length. Keeps a hostile length
/// prefix from forcing a huge allocation before the stream runs dry.
pub const MAX_DECODE_LEN: u64 = 32 * 1024 * 1024;

pub type Result<T> = std::result::Result<T, SerializeError>;

/// Byte-slice cursor the decoders pull from.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(SerializeError::UnexpectedEof);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Minimal compact-size decode.
    pub fn read_compact_size(&mut self) -> Result<u64> {
        let first = self.read_u8()?;
        let value = match first {
            0..=0xfc => u64::from(first),
            0xfd => {
                let v = u64::from(self.read_u16()?);
                if v < 0xfd {
                    return Err(SerializeError::NonMinimalCompactSize);
                }
                v
            }
            0xfe => {
                let v = u64::from(self.read_u32()?);
                if v <= u64::from(u16::MAX) {
                    return Err(SerializeError::NonMinimalCompactSize);
                }
                v
            }
            0xff => {
                let v = self.read_u64()?;
                if v <= u64::from(u32::MAX) {
                    return Err(SerializeError::NonMinimalCompactSize);
                }
                v
            }
        };
        if value > MAX_DECODE_LEN {
            return Err(SerializeError::OversizedLength(value));
        }
        Ok(value)
    }

    pub fn read_byte_vec(&mut self) -> Result<Vec<u8>> {
        let len = self.read_compact_size()? as usize;
        // Bounded by the input that is actually present.
        if len > self.remaining() {
            return Err(SerializeError::UnexpectedEof);
        }
        Ok(self.read_bytes(len)?.to_vec())
    }
}

/// Symmetric write half of the codec.
pub trait Encodable {
    fn encode_to(&self, out: &mut Vec<u8>);

    fn serialized_size(&self) -> usize {
        let mut buf = Vec::new();
        self.encode_to(&mut buf);
        buf.len()
    }
}

/// Symmetric read half of the codec.
pub trait Decodable: Sized {
    fn decode_from(reader: &mut Reader<'_>) -> Result<Self>;
}

pub fn write_compact_size(out: &mut Vec<u8>, value: u64) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

pub fn write_byte_vec(out: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

pub fn compact_size_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Serialize a value to a fresh buffer.
pub fn serialize<T: Encodable>(value: &T) -> Vec<u8> {
    let mut out = Vec::new();
    value.encode_to(&mut out);
    out
}

/// Deserialize a value consuming the entire buffer; trailing bytes are an
/// error so the wire framing cannot smuggle extra data past validation.
pub fn deserialize<T: Decodable>(data: &[u8]) -> Result<T> {
    let mut reader = Reader::new(data);
    let value = T::decode_from(&mut reader)?;
    if reader.remaining() != 0 {
        return Err(SerializeError::TrailingBytes);
    }
    Ok(value)
}

/// Decode a `Vec<T>` with a compact-size count prefix.
pub fn read_vec<T: Decodable>(reader: &mut Reader<'_>) -> Result<Vec<T>> {
    let count = reader.read_compact_size()? as usize;
    // Cap the pre-allocation; the stream still has to deliver every item.
    let mut items = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        items.push(T::decode_from(reader)?);
    }
    Ok(items)
}

pub fn write_vec<T: Encodable>(out: &mut Vec<u8>, items: &[T]) {
    write_compact_size(out, items.len() as u64);
    for item in items {
        item.encode_to(out);
    }
}
