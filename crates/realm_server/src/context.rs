//! State a packet handler works with.

use crate::connection::{BroadcastReport, ConnectionManager, Session};
use crate::doodad::DoodadFuncRegistry;
use crate::error::{HandlerError, SendError};
use crate::world::{EntityHandle, World};
use realm_protocol::packets::SCErrorMsg;
use realm_protocol::{ErrorMessageType, OutboundPacket};
use std::sync::Arc;

/// Services shared by every connection of one server.
#[derive(Clone)]
pub struct ServerContext {
    pub manager: Arc<ConnectionManager>,
    pub world: Arc<dyn World>,
    pub doodads: Arc<DoodadFuncRegistry>,
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("connections", &self.manager.len())
            .field("doodads", &self.doodads)
            .finish_non_exhaustive()
    }
}

impl ServerContext {
    pub fn new(world: Arc<dyn World>, doodads: Arc<DoodadFuncRegistry>) -> Self {
        Self {
            manager: Arc::new(ConnectionManager::new()),
            world,
            doodads,
        }
    }
}

/// A handler's view of the connection a frame arrived on.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    session: Arc<Session>,
    server: Arc<ServerContext>,
}

impl HandlerContext {
    pub fn new(session: Arc<Session>, server: Arc<ServerContext>) -> Self {
        Self { session, server }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn world(&self) -> &dyn World {
        self.server.world.as_ref()
    }

    pub fn doodads(&self) -> &DoodadFuncRegistry {
        &self.server.doodads
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.server.manager
    }

    /// The entity this connection controls.
    pub fn require_entity(&self) -> Result<EntityHandle, HandlerError> {
        self.session.entity().ok_or(HandlerError::NoEntity)
    }

    /// Sends `packet` to this connection only. A connection that cannot take
    /// it is torn down; that is not an error for the handler.
    pub fn send<P: OutboundPacket>(&self, packet: &P) -> Result<(), HandlerError> {
        match self.session.send(packet) {
            Ok(()) => Ok(()),
            Err(SendError::Encode(e)) => Err(e.into()),
            Err(SendError::Delivery(e)) => {
                self.server
                    .manager
                    .delivery_failed(&self.session, e, self.world());
                Ok(())
            }
        }
    }

    /// Sends `packet` to every connection observing `originator`.
    pub fn broadcast<P: OutboundPacket>(
        &self,
        packet: &P,
        originator: EntityHandle,
        include_self: bool,
    ) -> Result<BroadcastReport, HandlerError> {
        Ok(self
            .server
            .manager
            .broadcast(packet, originator, include_self, self.world())?)
    }

    /// Shows an error message on this connection's client.
    pub fn notify_error(
        &self,
        error: ErrorMessageType,
        context: u32,
        notify: bool,
    ) -> Result<(), HandlerError> {
        self.send(&SCErrorMsg::new(error, context, notify))
    }
}
