//! Packet traits shared by every opcode.
//!
//! A packet type declares its opcode and revision through [`Packet`] and
//! implements [`InboundPacket`], [`OutboundPacket`] or both. Session and
//! world concerns live in the server crate; packets only know how to move
//! their own fields through a [`PacketStream`].

use crate::error::{ProtocolError, ProtocolResult};
use crate::frame::Frame;
use crate::stream::PacketStream;
use std::ops::RangeInclusive;

/// Which side of the connection produces a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server.
    Inbound,
    /// Server to client.
    Outbound,
}

/// Inclusive range of protocol revisions a route accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RevisionRange {
    pub min: u8,
    pub max: u8,
}

impl RevisionRange {
    pub const ALL: Self = Self { min: 0, max: u8::MAX };

    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    /// A range covering exactly one revision.
    pub const fn only(revision: u8) -> Self {
        Self {
            min: revision,
            max: revision,
        }
    }

    pub fn contains(&self, revision: u8) -> bool {
        (self.min..=self.max).contains(&revision)
    }

    pub fn overlaps(&self, other: &RevisionRange) -> bool {
        self.min <= other.max && other.min <= self.max
    }
}

impl From<RangeInclusive<u8>> for RevisionRange {
    fn from(range: RangeInclusive<u8>) -> Self {
        Self::new(*range.start(), *range.end())
    }
}

impl std::fmt::Display for RevisionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

/// Identity of a packet type on the wire.
pub trait Packet {
    /// Opcode carried in the frame envelope.
    const OPCODE: u16;

    /// Revision this layout was introduced in.
    const REVISION: u8;

    const DIRECTION: Direction;

    /// Type name used in log lines.
    fn name() -> &'static str {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("packet")
    }
}

/// A packet the server reads from a client frame.
pub trait InboundPacket: Packet + Sized {
    fn decode(stream: &mut PacketStream) -> ProtocolResult<Self>;

    /// Decodes a whole frame body. Bytes left over after the last field make
    /// the frame malformed.
    fn decode_frame(payload: &[u8]) -> ProtocolResult<Self> {
        let mut stream = PacketStream::from_slice(payload);
        let packet = Self::decode(&mut stream)?;
        if stream.remaining() > 0 {
            return Err(ProtocolError::malformed(
                "payload",
                format!("{} trailing bytes", stream.remaining()),
            ));
        }
        Ok(packet)
    }
}

/// A packet the server writes to a client.
pub trait OutboundPacket: Packet {
    fn encode(&self, stream: &mut PacketStream) -> ProtocolResult<()>;

    /// Encodes the payload and wraps it in a frame envelope.
    fn to_frame(&self) -> ProtocolResult<Frame> {
        let mut stream = PacketStream::new();
        self.encode(&mut stream)?;
        Ok(Frame::new(Self::OPCODE, Self::REVISION, stream.into_bytes()))
    }
}
