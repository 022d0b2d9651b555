//! # Realm protocol
//!
//! Wire format for the realm game server: the little-endian [`PacketStream`]
//! buffer, the frame envelope, the packet traits and the concrete packets.
//!
//! Nothing in this crate knows about sockets or sessions. The server crate
//! reads frames with [`FrameReader`], looks up a route by opcode and revision
//! and decodes the body with [`InboundPacket::decode_frame`].

pub mod error;
pub mod error_message;
pub mod frame;
pub mod opcodes;
pub mod packet;
pub mod packets;
pub mod stream;

pub use error::{ProtocolError, ProtocolResult};
pub use error_message::ErrorMessageType;
pub use frame::{Frame, FrameHeader, FrameReader, FrameWriter, HEADER_SIZE, MAX_PAYLOAD_LEN};
pub use packet::{Direction, InboundPacket, OutboundPacket, Packet, RevisionRange};
pub use stream::{PacketStream, WireValue};
