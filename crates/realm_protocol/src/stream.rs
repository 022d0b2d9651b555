//! The wire buffer every packet is read from and written into.
//!
//! A [`PacketStream`] is an append-only byte buffer with a monotonic read
//! cursor. All multi-byte values are little-endian. Strings and nested blocks
//! carry a `u16` byte-length prefix; booleans are a single canonical `0`/`1`
//! byte.

use crate::error::{ProtocolError, ProtocolResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Largest value a `u16` length prefix can describe.
pub const MAX_PREFIXED_LEN: usize = u16::MAX as usize;

/// Largest value a 3-byte `bc` object id can hold.
pub const MAX_BC: u32 = 0x00ff_ffff;

/// A fixed-width value with a defined little-endian wire encoding.
pub trait WireValue: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Reads the value from the front of `src`. `src` holds at least `SIZE` bytes.
    fn get(src: &mut &[u8]) -> Self;

    /// Appends the value to `dst`.
    fn put(&self, dst: &mut BytesMut);
}

macro_rules! wire_value {
    ($($ty:ty => $get:ident, $put:ident;)*) => {
        $(
            impl WireValue for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn get(src: &mut &[u8]) -> Self {
                    src.$get()
                }

                fn put(&self, dst: &mut BytesMut) {
                    dst.$put(*self);
                }
            }
        )*
    };
}

wire_value! {
    u8 => get_u8, put_u8;
    i8 => get_i8, put_i8;
    u16 => get_u16_le, put_u16_le;
    i16 => get_i16_le, put_i16_le;
    u32 => get_u32_le, put_u32_le;
    i32 => get_i32_le, put_i32_le;
    u64 => get_u64_le, put_u64_le;
    i64 => get_i64_le, put_i64_le;
    f32 => get_f32_le, put_f32_le;
    f64 => get_f64_le, put_f64_le;
}

/// Byte buffer with typed reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketStream {
    buf: BytesMut,
    pos: usize,
}

impl PacketStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            pos: 0,
        }
    }

    /// Wraps received bytes for decoding, cursor at the start.
    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(data),
            pos: 0,
        }
    }

    /// Total number of bytes held, read or not.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes left between the read cursor and the end.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Current read cursor.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Moves the read cursor back to the first byte. Written data is kept.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Drops all bytes and rewinds the cursor.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.pos = 0;
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Bytes that have not been read yet.
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }

    fn ensure(&self, needed: usize) -> ProtocolResult<()> {
        let available = self.remaining();
        if available < needed {
            return Err(ProtocolError::TruncatedFrame { needed, available });
        }
        Ok(())
    }

    /// Reads one fixed-width value and advances the cursor by its size.
    pub fn read<T: WireValue>(&mut self) -> ProtocolResult<T> {
        self.ensure(T::SIZE)?;
        let mut src = &self.buf[self.pos..self.pos + T::SIZE];
        let value = T::get(&mut src);
        self.pos += T::SIZE;
        Ok(value)
    }

    /// Appends one fixed-width value.
    pub fn write<T: WireValue>(&mut self, value: T) -> &mut Self {
        value.put(&mut self.buf);
        self
    }

    pub fn read_bool(&mut self) -> ProtocolResult<bool> {
        match self.read::<u8>()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::malformed(
                "bool",
                format!("expected 0 or 1, found {other}"),
            )),
        }
    }

    pub fn write_bool(&mut self, value: bool) -> &mut Self {
        self.write(u8::from(value))
    }

    /// Reads a 3-byte little-endian object id.
    pub fn read_bc(&mut self) -> ProtocolResult<u32> {
        self.ensure(3)?;
        let raw = &self.buf[self.pos..self.pos + 3];
        let value = u32::from(raw[0]) | (u32::from(raw[1]) << 8) | (u32::from(raw[2]) << 16);
        self.pos += 3;
        Ok(value)
    }

    /// Writes a 3-byte little-endian object id.
    pub fn write_bc(&mut self, value: u32) -> ProtocolResult<&mut Self> {
        if value > MAX_BC {
            return Err(ProtocolError::malformed(
                "bc",
                format!("object id {value:#x} does not fit in 24 bits"),
            ));
        }
        self.buf.put_uint_le(u64::from(value), 3);
        Ok(self)
    }

    /// Reads exactly `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> ProtocolResult<Bytes> {
        self.ensure(len)?;
        let out = Bytes::copy_from_slice(&self.buf[self.pos..self.pos + len]);
        self.pos += len;
        Ok(out)
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Reads a `u16`-prefixed byte block.
    pub fn read_block(&mut self) -> ProtocolResult<Bytes> {
        let len = usize::from(self.read::<u16>()?);
        self.read_bytes(len)
    }

    /// Writes a `u16`-prefixed byte block.
    pub fn write_block(&mut self, data: &[u8]) -> ProtocolResult<&mut Self> {
        let len = u16::try_from(data.len()).map_err(|_| ProtocolError::LengthOverflow {
            len: data.len(),
            max: MAX_PREFIXED_LEN,
        })?;
        self.write(len);
        Ok(self.write_bytes(data))
    }

    /// Reads a `u16`-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> ProtocolResult<String> {
        let raw = self.read_block()?;
        String::from_utf8(raw.to_vec())
            .map_err(|err| ProtocolError::malformed("string", err.to_string()))
    }

    pub fn write_string(&mut self, value: &str) -> ProtocolResult<&mut Self> {
        self.write_block(value.as_bytes())
    }

    /// Reads a nested, length-prefixed stream. The returned stream starts with
    /// its cursor at zero.
    pub fn read_stream(&mut self) -> ProtocolResult<PacketStream> {
        let raw = self.read_block()?;
        Ok(PacketStream::from_slice(&raw))
    }

    /// Embeds the full contents of `inner` as a length-prefixed block.
    pub fn write_stream(&mut self, inner: &PacketStream) -> ProtocolResult<&mut Self> {
        self.write_block(inner.as_slice())
    }
}
