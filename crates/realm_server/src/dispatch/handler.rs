use crate::context::HandlerContext;
use crate::error::HandlerError;
use realm_protocol::{InboundPacket, ProtocolError};
use std::marker::PhantomData;

/// Why a routed frame did not complete.
#[derive(Debug)]
pub enum RouteError {
    Decode(ProtocolError),
    Handler(HandlerError),
}

/// Type-erased packet handler stored in the dispatch table.
pub trait PacketHandler: Send + Sync + 'static {
    /// Decodes `payload` and runs the handler on it.
    fn handle(&self, ctx: &HandlerContext, payload: &[u8]) -> Result<(), RouteError>;

    /// Packet type name for logs.
    fn name(&self) -> &'static str;
}

/// Bridges a typed handler function to [`PacketHandler`].
pub struct TypedPacketHandler<P, F> {
    handler: F,
    _phantom: PhantomData<fn() -> P>,
}

impl<P, F> TypedPacketHandler<P, F>
where
    P: InboundPacket,
    F: Fn(&HandlerContext, P) -> Result<(), HandlerError>,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<P, F> PacketHandler for TypedPacketHandler<P, F>
where
    P: InboundPacket + 'static,
    F: Fn(&HandlerContext, P) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, ctx: &HandlerContext, payload: &[u8]) -> Result<(), RouteError> {
        let packet = P::decode_frame(payload).map_err(RouteError::Decode)?;
        (self.handler)(ctx, packet).map_err(RouteError::Handler)
    }

    fn name(&self) -> &'static str {
        P::name()
    }
}
