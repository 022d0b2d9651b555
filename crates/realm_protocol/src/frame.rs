//! Frame envelope and async frame IO.
//!
//! Every frame on the socket is laid out as:
//!
//! | field         | type   |
//! |---------------|--------|
//! | `opcode`      | `u16`  |
//! | `revision`    | `u8`   |
//! | `payload_len` | `u16`  |
//! | payload       | bytes  |
//!
//! All integers are little-endian.

use crate::error::{ProtocolError, ProtocolResult};
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the envelope that precedes every payload.
pub const HEADER_SIZE: usize = 5;

/// Largest payload the `u16` length field can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Decoded frame envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub opcode: u16,
    pub revision: u8,
    pub payload_len: u16,
}

impl FrameHeader {
    pub fn decode(raw: &[u8; HEADER_SIZE]) -> Self {
        let mut src = &raw[..];
        Self {
            opcode: src.get_u16_le(),
            revision: src.get_u8(),
            payload_len: src.get_u16_le(),
        }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let op = self.opcode.to_le_bytes();
        let len = self.payload_len.to_le_bytes();
        [op[0], op[1], self.revision, len[0], len[1]]
    }
}

/// One complete frame: envelope plus payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u16,
    pub revision: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(opcode: u16, revision: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            revision,
            payload: payload.into(),
        }
    }

    /// Serialises envelope and payload into one contiguous buffer.
    pub fn to_bytes(&self) -> ProtocolResult<Bytes> {
        let payload_len =
            u16::try_from(self.payload.len()).map_err(|_| ProtocolError::FrameTooLarge {
                len: self.payload.len(),
                limit: MAX_PAYLOAD_LEN,
            })?;
        let header = FrameHeader {
            opcode: self.opcode,
            revision: self.revision,
            payload_len,
        };
        let mut out = BytesMut::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(&self.payload);
        Ok(out.freeze())
    }
}

/// Reads whole frames from a byte stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_payload_len: usize,
}

impl<R> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(8 * 1024),
            max_payload_len: MAX_PAYLOAD_LEN,
        }
    }

    pub fn max_payload_len(mut self, max: usize) -> Self {
        self.max_payload_len = max.clamp(1, MAX_PAYLOAD_LEN);
        self
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Reads the next frame.
    ///
    /// Returns `Ok(None)` on a clean EOF between frames. An oversized payload
    /// is an `InvalidData` error: the stream cannot be resynchronised after it.
    pub async fn read_frame(&mut self) -> std::io::Result<Option<Frame>> {
        loop {
            if self.buf.len() >= HEADER_SIZE {
                let mut raw = [0u8; HEADER_SIZE];
                raw.copy_from_slice(&self.buf[..HEADER_SIZE]);
                let header = FrameHeader::decode(&raw);
                let len = usize::from(header.payload_len);
                if len > self.max_payload_len {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        ProtocolError::FrameTooLarge {
                            len,
                            limit: self.max_payload_len,
                        },
                    ));
                }

                if self.buf.len() >= HEADER_SIZE + len {
                    self.buf.advance(HEADER_SIZE);
                    let payload = self.buf.split_to(len).freeze();
                    return Ok(Some(Frame {
                        opcode: header.opcode,
                        revision: header.revision,
                        payload,
                    }));
                }
            }

            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "eof while reading frame",
                ));
            }
        }
    }
}

/// Writes pre-encoded frames to a byte stream.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Writes bytes produced by [`Frame::to_bytes`].
    pub async fn write_encoded(&mut self, encoded: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(encoded).await
    }

    pub async fn write_frame(&mut self, frame: &Frame) -> std::io::Result<()> {
        let encoded = frame
            .to_bytes()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
        self.write_encoded(&encoded).await
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush().await
    }

    /// Flushes and closes the write side of the stream.
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.inner.shutdown().await
    }
}
