//! Connection manager for tracking sessions and fanning out broadcasts.

use super::{session::StatsSnapshot, ConnectionId, Session};
use crate::error::{DeliveryError, ServerError};
use crate::world::{EntityHandle, World};
use bytes::Bytes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use realm_protocol::{OutboundPacket, ProtocolError};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Recipients whose queue accepted the frame.
    pub delivered: usize,
    /// Recipients that could not take the frame and were torn down.
    pub failed: usize,
}

/// Central registry of live sessions.
///
/// Each entity is owned by at most one connection. Broadcasts resolve the
/// world's observers to their owning connections and enqueue one shared
/// encoded frame on each; a recipient that cannot take it is torn down without
/// affecting the others.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    sessions: DashMap<ConnectionId, Arc<Session>>,
    owners: DashMap<EntityHandle, ConnectionId>,
    next_id: AtomicUsize,
    closed_stats: Mutex<StatsSnapshot>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(1),
            ..Default::default()
        }
    }

    /// Registers a new session and returns it with its outbound receiver.
    pub fn add_session(
        &self,
        remote_addr: SocketAddr,
        revision: u8,
        queue_capacity: usize,
    ) -> (Arc<Session>, mpsc::Receiver<Bytes>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (session, rx) = Session::new(id, remote_addr, revision, queue_capacity);
        let session = Arc::new(session);
        self.sessions.insert(id, session.clone());
        info!("🔗 Connection {} from {}", id, remote_addr);
        (session, rx)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Session>> {
        self.sessions.get(&id).map(|s| s.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of entities currently owned by a connection.
    pub fn owned_entities(&self) -> usize {
        self.owners.len()
    }

    /// Attaches `entity` to `session`. Fails if another connection owns it or
    /// the session is closed.
    pub fn attach_entity(&self, session: &Session, entity: EntityHandle) -> Result<(), ServerError> {
        let closed = || ServerError::Internal(format!("connection {} is closed", session.id()));
        if session.is_closed() {
            return Err(closed());
        }
        match self.owners.entry(entity) {
            Entry::Occupied(owner) if *owner.get() != session.id() => {
                return Err(ServerError::Internal(format!(
                    "entity {} already owned by connection {}",
                    entity,
                    owner.get()
                )));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(session.id());
            }
        }
        if let Some(previous) = session.set_entity(Some(entity)) {
            if previous != entity {
                self.owners.remove_if(&previous, |_, owner| *owner == session.id());
            }
        }
        // A teardown that closed the session after the first check may have
        // run before the entity was set and missed it.
        if session.is_closed() {
            session.set_entity(None);
            self.owners.remove_if(&entity, |_, owner| *owner == session.id());
            return Err(closed());
        }
        debug!("Connection {} controls entity {}", session.id(), entity);
        Ok(())
    }

    /// The live connection that controls `entity`.
    pub fn connection_for_entity(&self, entity: EntityHandle) -> Option<Arc<Session>> {
        let id = *self.owners.get(&entity)?;
        self.get(id)
    }

    /// Tears a connection down: closes it, detaches its entity from the world
    /// and forgets it. Safe to call any number of times.
    pub fn teardown(&self, session: &Session, world: &dyn World) {
        if !session.close() {
            return;
        }
        if let Some(entity) = session.set_entity(None) {
            self.owners.remove_if(&entity, |_, owner| *owner == session.id());
            world.detach(entity);
        }
        self.sessions.remove(&session.id());

        let stats = session.stats().snapshot();
        *self
            .closed_stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += stats;
        info!(
            "❌ Connection {} from {} closed (frames: {}, unknown: {}, decode failures: {}, delivery failures: {})",
            session.id(),
            session.remote_addr(),
            stats.frames_handled,
            stats.unknown_opcodes,
            stats.decode_failures,
            stats.delivery_failures
        );
    }

    /// Tears down every live connection.
    pub fn teardown_all(&self, world: &dyn World) {
        let live: Vec<Arc<Session>> = self.sessions.iter().map(|s| s.value().clone()).collect();
        for session in live {
            self.teardown(&session, world);
        }
    }

    /// Counters summed over closed and live connections.
    pub fn total_stats(&self) -> StatsSnapshot {
        let mut total = *self
            .closed_stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for session in self.sessions.iter() {
            total += session.stats().snapshot();
        }
        total
    }

    /// Queues `frame` on `session`, tearing it down if it cannot take it.
    pub fn deliver(&self, session: &Session, frame: Bytes, world: &dyn World) -> Result<(), DeliveryError> {
        session
            .enqueue(frame)
            .inspect_err(|e| self.delivery_failed(session, *e, world))
    }

    /// Records a failed enqueue and tears the connection down.
    pub fn delivery_failed(&self, session: &Session, error: DeliveryError, world: &dyn World) {
        warn!("📪 Delivery to connection {} failed: {}", session.id(), error);
        session.stats().record_delivery_failure();
        self.teardown(session, world);
    }

    /// Sends `packet` to every connection whose entity observes `originator`.
    ///
    /// The originator's own connection is added when `include_self` is set and
    /// left out otherwise. Per-recipient failures are counted in the report,
    /// never returned; only an encode failure makes the call itself fail.
    pub fn broadcast<P: OutboundPacket>(
        &self,
        packet: &P,
        originator: EntityHandle,
        include_self: bool,
        world: &dyn World,
    ) -> Result<BroadcastReport, ProtocolError> {
        let frame = packet.to_frame()?.to_bytes()?;

        let own = self.owners.get(&originator).map(|id| *id);
        let mut seen = HashSet::new();
        let mut recipients = Vec::new();
        let observers = world.observers_of(originator);
        let originator_entry = include_self.then_some(originator);
        for entity in observers.into_iter().chain(originator_entry) {
            let Some(session) = self.connection_for_entity(entity) else {
                continue;
            };
            if !include_self && Some(session.id()) == own {
                continue;
            }
            if seen.insert(session.id()) {
                recipients.push(session);
            }
        }

        let mut report = BroadcastReport::default();
        for session in recipients {
            match self.deliver(&session, frame.clone(), world) {
                Ok(()) => report.delivered += 1,
                Err(_) => report.failed += 1,
            }
        }
        debug!(
            "📡 Broadcast {} from {}: {} delivered, {} failed",
            P::name(),
            originator,
            report.delivered,
            report.failed
        );
        Ok(report)
    }
}
