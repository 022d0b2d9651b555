use crate::error::ProtocolResult;
use crate::opcodes::{CS_USE_DOODAD, SC_DOODAD_PHASE_CHANGED};
use crate::packet::{Direction, InboundPacket, OutboundPacket, Packet};
use crate::stream::PacketStream;

/// The player used a world object with a skill.
///
/// Layout: `doodad_id: bc`, `skill_id: u32`. A skill id of `0` is a plain
/// interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CSUseDoodad {
    pub doodad_id: u32,
    pub skill_id: u32,
}

impl Packet for CSUseDoodad {
    const OPCODE: u16 = CS_USE_DOODAD;
    const REVISION: u8 = 1;
    const DIRECTION: Direction = Direction::Inbound;
}

impl InboundPacket for CSUseDoodad {
    fn decode(stream: &mut PacketStream) -> ProtocolResult<Self> {
        Ok(Self {
            doodad_id: stream.read_bc()?,
            skill_id: stream.read()?,
        })
    }
}

impl OutboundPacket for CSUseDoodad {
    fn encode(&self, stream: &mut PacketStream) -> ProtocolResult<()> {
        stream.write_bc(self.doodad_id)?.write(self.skill_id);
        Ok(())
    }
}

/// A doodad moved to a new phase.
///
/// Layout: `object_id: bc`, `phase: u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SCDoodadPhaseChanged {
    pub object_id: u32,
    pub phase: u32,
}

impl Packet for SCDoodadPhaseChanged {
    const OPCODE: u16 = SC_DOODAD_PHASE_CHANGED;
    const REVISION: u8 = 1;
    const DIRECTION: Direction = Direction::Outbound;
}

impl OutboundPacket for SCDoodadPhaseChanged {
    fn encode(&self, stream: &mut PacketStream) -> ProtocolResult<()> {
        stream.write_bc(self.object_id)?.write(self.phase);
        Ok(())
    }
}

impl InboundPacket for SCDoodadPhaseChanged {
    fn decode(stream: &mut PacketStream) -> ProtocolResult<Self> {
        Ok(Self {
            object_id: stream.read_bc()?,
            phase: stream.read()?,
        })
    }
}
