//! Opcode routing.
//!
//! The [`DispatchTable`] maps an opcode and protocol revision to a typed
//! handler. Routes are added at startup; a frame whose opcode/revision has no
//! route is dropped without affecting the connection.
//!
//! The revision used for routing is the one in effect on the session. A frame
//! stamped with any other revision is dropped before route lookup.

mod handler;

pub use handler::{PacketHandler, RouteError, TypedPacketHandler};

use crate::context::HandlerContext;
use crate::error::{DispatchError, HandlerError};
use realm_protocol::{Direction, Frame, InboundPacket, ProtocolError, RevisionRange};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

/// Result of routing one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The body decoded and the handler completed.
    Handled,
    /// No route for this opcode and revision.
    UnknownOpcode { opcode: u16, revision: u8 },
    /// The frame was stamped with a revision other than the session's.
    RevisionMismatch { session: u8, frame: u8 },
    /// The body did not decode. The handler never ran.
    DecodeFailed(ProtocolError),
    /// The body decoded but the handler refused or failed.
    Rejected(HandlerError),
}

struct Route {
    range: RevisionRange,
    handler: Box<dyn PacketHandler>,
}

/// Table of routes keyed by opcode.
#[derive(Default)]
pub struct DispatchTable {
    routes: HashMap<u16, Vec<Route>>,
}

impl std::fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut opcodes: Vec<_> = self.routes.keys().copied().collect();
        opcodes.sort_unstable();
        f.debug_struct("DispatchTable")
            .field("opcodes", &opcodes)
            .finish()
    }
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `P` for every revision from `P::REVISION` upwards.
    pub fn register<P, F>(&mut self, handler: F) -> Result<(), DispatchError>
    where
        P: InboundPacket + 'static,
        F: Fn(&HandlerContext, P) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register_range::<P, F>(RevisionRange::new(P::REVISION, u8::MAX), handler)
    }

    /// Routes `P` for the revisions in `range`.
    pub fn register_range<P, F>(
        &mut self,
        range: impl Into<RevisionRange>,
        handler: F,
    ) -> Result<(), DispatchError>
    where
        P: InboundPacket + 'static,
        F: Fn(&HandlerContext, P) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        if P::DIRECTION != Direction::Inbound {
            return Err(DispatchError::NotInbound { packet: P::name() });
        }
        let range = range.into();
        let routes = self.routes.entry(P::OPCODE).or_default();
        if let Some(existing) = routes.iter().find(|r| r.range.overlaps(&range)) {
            return Err(DispatchError::OverlappingRoute {
                opcode: P::OPCODE,
                new: range,
                existing: existing.handler.name(),
                existing_range: existing.range,
            });
        }
        routes.push(Route {
            range,
            handler: Box::new(TypedPacketHandler::<P, F>::new(handler)),
        });
        trace!("Routed opcode {:#06x} revisions {} to {}", P::OPCODE, range, P::name());
        Ok(())
    }

    /// Whether a frame with this opcode and revision would reach a handler.
    pub fn has_route(&self, opcode: u16, revision: u8) -> bool {
        self.find(opcode, revision).is_some()
    }

    pub fn len(&self) -> usize {
        self.routes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find(&self, opcode: u16, revision: u8) -> Option<&Route> {
        self.routes
            .get(&opcode)?
            .iter()
            .find(|r| r.range.contains(revision))
    }

    /// Decodes `frame` and runs its handler.
    ///
    /// Domain errors are reported to the client as an error notification
    /// before the outcome is returned.
    pub fn dispatch(&self, ctx: &HandlerContext, frame: &Frame) -> DispatchOutcome {
        let connection = ctx.session().id();
        let revision = ctx.session().revision();
        if frame.revision != revision {
            debug!(
                "Connection {}: opcode {:#06x} sent as revision {}, session speaks {}, dropping",
                connection, frame.opcode, frame.revision, revision
            );
            return DispatchOutcome::RevisionMismatch {
                session: revision,
                frame: frame.revision,
            };
        }
        let Some(route) = self.find(frame.opcode, revision) else {
            debug!(
                "❓ Connection {}: no route for opcode {:#06x} revision {}, dropping {} bytes",
                connection,
                frame.opcode,
                revision,
                frame.payload.len()
            );
            return DispatchOutcome::UnknownOpcode {
                opcode: frame.opcode,
                revision,
            };
        };

        match route.handler.handle(ctx, &frame.payload) {
            Ok(()) => DispatchOutcome::Handled,
            Err(RouteError::Decode(e)) => {
                debug!(
                    "Connection {}: undecodable {}: {}",
                    connection,
                    route.handler.name(),
                    e
                );
                DispatchOutcome::DecodeFailed(e)
            }
            Err(RouteError::Handler(e)) => {
                if let HandlerError::Domain { error, context } = &e {
                    debug!(
                        "Connection {}: {} refused with {}",
                        connection,
                        route.handler.name(),
                        error
                    );
                    if let Err(notify_err) = ctx.notify_error(*error, *context, true) {
                        warn!("Failed to notify connection {}: {}", connection, notify_err);
                    }
                } else {
                    warn!(
                        "Connection {}: {} failed: {}",
                        connection,
                        route.handler.name(),
                        e
                    );
                }
                DispatchOutcome::Rejected(e)
            }
        }
    }
}
