//! A single client session.

use super::ConnectionId;
use crate::error::{DeliveryError, SendError};
use crate::world::EntityHandle;
use bytes::Bytes;
use realm_protocol::OutboundPacket;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;
use tokio::sync::{mpsc, watch};
use tracing::trace;

/// Per-connection counters.
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_handled: AtomicU64,
    unknown_opcodes: AtomicU64,
    decode_failures: AtomicU64,
    delivery_failures: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_handled: u64,
    pub unknown_opcodes: u64,
    pub decode_failures: u64,
    pub delivery_failures: u64,
}

impl SessionStats {
    pub fn record_handled(&self) {
        self.frames_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_opcode(&self) {
        self.unknown_opcodes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_handled: self.frames_handled.load(Ordering::Relaxed),
            unknown_opcodes: self.unknown_opcodes.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

impl std::ops::AddAssign for StatsSnapshot {
    fn add_assign(&mut self, rhs: Self) {
        self.frames_handled += rhs.frames_handled;
        self.unknown_opcodes += rhs.unknown_opcodes;
        self.decode_failures += rhs.decode_failures;
        self.delivery_failures += rhs.delivery_failures;
    }
}

/// One client connection.
///
/// Outbound frames go through a bounded FIFO drained by the connection's
/// writer task, so enqueueing never waits on the socket. Once [`Session::close`]
/// has run the queue is gone and every later send is a silent no-op.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    remote_addr: SocketAddr,
    revision: u8,
    connected_at: SystemTime,
    entity: Mutex<Option<EntityHandle>>,
    outbound: Mutex<Option<mpsc::Sender<Bytes>>>,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    consecutive_decode_failures: AtomicU32,
    stats: SessionStats,
}

impl Session {
    /// Creates a session and the receiving end of its outbound queue.
    pub fn new(
        id: ConnectionId,
        remote_addr: SocketAddr,
        revision: u8,
        queue_capacity: usize,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (closed_tx, _) = watch::channel(false);
        let session = Self {
            id,
            remote_addr,
            revision,
            connected_at: SystemTime::now(),
            entity: Mutex::new(None),
            outbound: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
            closed_tx,
            consecutive_decode_failures: AtomicU32::new(0),
            stats: SessionStats::default(),
        };
        (session, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn revision(&self) -> u8 {
        self.revision
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// The entity this connection controls, if one is attached.
    pub fn entity(&self) -> Option<EntityHandle> {
        *self.entity.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_entity(&self, entity: Option<EntityHandle>) -> Option<EntityHandle> {
        let mut slot = self.entity.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, entity)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Resolves once the session has been closed.
    pub async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Marks the session closed and drops its outbound queue. Frames already
    /// queued are still written. Returns `true` only for the call that
    /// actually closed it.
    pub fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.closed_tx.send_replace(true);
        true
    }

    /// Queues pre-encoded frame bytes. A closed session swallows the frame.
    pub fn enqueue(&self, frame: Bytes) -> Result<(), DeliveryError> {
        let guard = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            trace!("Dropping frame for closed connection {}", self.id);
            return Ok(());
        };
        tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::WriterGone,
        })
    }

    /// Encodes `packet` and queues it for this connection.
    pub fn send<P: OutboundPacket>(&self, packet: &P) -> Result<(), SendError> {
        if self.is_closed() {
            return Ok(());
        }
        let bytes = packet.to_frame()?.to_bytes()?;
        Ok(self.enqueue(bytes)?)
    }

    /// Counts an undecodable frame and returns the consecutive total.
    pub fn record_decode_failure(&self) -> u32 {
        self.stats.record_decode_failure();
        self.consecutive_decode_failures.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn reset_decode_failures(&self) {
        self.consecutive_decode_failures.store(0, Ordering::Release);
    }

    pub fn consecutive_decode_failures(&self) -> u32 {
        self.consecutive_decode_failures.load(Ordering::Acquire)
    }
}
