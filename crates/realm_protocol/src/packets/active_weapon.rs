use crate::error::ProtocolResult;
use crate::opcodes::{CS_ACTIVE_WEAPON_CHANGED, SC_ACTIVE_WEAPON_CHANGED};
use crate::packet::{Direction, InboundPacket, OutboundPacket, Packet};
use crate::stream::PacketStream;

/// The player switched weapon set.
///
/// Layout: `active_weapon: u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CSActiveWeaponChanged {
    pub active_weapon: u8,
}

impl Packet for CSActiveWeaponChanged {
    const OPCODE: u16 = CS_ACTIVE_WEAPON_CHANGED;
    const REVISION: u8 = 1;
    const DIRECTION: Direction = Direction::Inbound;
}

impl InboundPacket for CSActiveWeaponChanged {
    fn decode(stream: &mut PacketStream) -> ProtocolResult<Self> {
        Ok(Self {
            active_weapon: stream.read()?,
        })
    }
}

impl OutboundPacket for CSActiveWeaponChanged {
    fn encode(&self, stream: &mut PacketStream) -> ProtocolResult<()> {
        stream.write(self.active_weapon);
        Ok(())
    }
}

/// Tells observers that a unit switched weapon set.
///
/// Layout: `object_id: bc`, `active_weapon: u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SCActiveWeaponChanged {
    pub object_id: u32,
    pub active_weapon: u8,
}

impl Packet for SCActiveWeaponChanged {
    const OPCODE: u16 = SC_ACTIVE_WEAPON_CHANGED;
    const REVISION: u8 = 1;
    const DIRECTION: Direction = Direction::Outbound;
}

impl OutboundPacket for SCActiveWeaponChanged {
    fn encode(&self, stream: &mut PacketStream) -> ProtocolResult<()> {
        stream.write_bc(self.object_id)?.write(self.active_weapon);
        Ok(())
    }
}

impl InboundPacket for SCActiveWeaponChanged {
    fn decode(stream: &mut PacketStream) -> ProtocolResult<Self> {
        Ok(Self {
            object_id: stream.read_bc()?,
            active_weapon: stream.read()?,
        })
    }
}
