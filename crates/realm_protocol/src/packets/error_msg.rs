use crate::error::{ProtocolError, ProtocolResult};
use crate::error_message::ErrorMessageType;
use crate::opcodes::SC_ERROR_MSG;
use crate::packet::{Direction, InboundPacket, OutboundPacket, Packet};
use crate::stream::PacketStream;

/// Error notification shown by the client.
///
/// Layout: `code: u16`, `code: u16`, `context: u32`, `notify: bool`.
///
/// The code is written twice. Clients read both copies, so the duplicate stays
/// on the wire even though nothing distinguishes the two fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SCErrorMsg {
    pub error: ErrorMessageType,
    pub context: u32,
    pub notify: bool,
}

impl SCErrorMsg {
    pub fn new(error: ErrorMessageType, context: u32, notify: bool) -> Self {
        Self {
            error,
            context,
            notify,
        }
    }
}

impl Packet for SCErrorMsg {
    const OPCODE: u16 = SC_ERROR_MSG;
    const REVISION: u8 = 1;
    const DIRECTION: Direction = Direction::Outbound;
}

impl OutboundPacket for SCErrorMsg {
    fn encode(&self, stream: &mut PacketStream) -> ProtocolResult<()> {
        let code = self.error.code();
        stream
            .write(code)
            .write(code)
            .write(self.context)
            .write_bool(self.notify);
        Ok(())
    }
}

impl InboundPacket for SCErrorMsg {
    fn decode(stream: &mut PacketStream) -> ProtocolResult<Self> {
        let code = stream.read::<u16>()?;
        let repeated = stream.read::<u16>()?;
        if code != repeated {
            return Err(ProtocolError::malformed(
                "code",
                format!("duplicated code mismatch: {code} != {repeated}"),
            ));
        }
        Ok(Self {
            error: ErrorMessageType::try_from(code)?,
            context: stream.read()?,
            notify: stream.read_bool()?,
        })
    }
}
