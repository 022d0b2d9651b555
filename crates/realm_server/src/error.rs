//! Error types for the server.
//!
//! Transport and lifecycle failures are [`ServerError`]s. Failures inside a
//! packet handler are [`HandlerError`]s and never leave the connection that
//! caused them. Building a dispatch table can fail with a [`DispatchError`].

use realm_protocol::{ErrorMessageType, ProtocolError, RevisionRange};

/// Enumeration of possible server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding, accepting or socket IO failures
    #[error("Network error: {0}")]
    Network(String),

    /// Internal server errors such as a broken invariant in shared state
    #[error("Internal error: {0}")]
    Internal(String),

    /// A new session was refused by the bootstrap
    #[error("Session rejected: {0}")]
    Rejected(String),
}

/// Why a packet handler did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandlerError {
    /// The request was understood but refused. The client is told with an
    /// error notification carrying `error` and `context`.
    #[error("domain error {error} (context {context})")]
    Domain {
        error: ErrorMessageType,
        context: u32,
    },

    /// The connection has no entity attached, or its entity left the world.
    #[error("connection has no live entity")]
    NoEntity,

    /// An outbound packet could not be encoded.
    #[error("encode failed: {0}")]
    Encode(#[from] ProtocolError),
}

impl HandlerError {
    pub fn domain(error: ErrorMessageType, context: u32) -> Self {
        Self::Domain { error, context }
    }
}

/// Errors raised while registering routes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("opcode {opcode:#06x}: revisions {new} overlap existing route `{existing}` ({existing_range})")]
    OverlappingRoute {
        opcode: u16,
        new: RevisionRange,
        existing: &'static str,
        existing_range: RevisionRange,
    },

    #[error("`{packet}` is a server-to-client packet and cannot be routed")]
    NotInbound { packet: &'static str },
}

/// An outbound frame could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("outbound queue full")]
    QueueFull,

    #[error("writer has gone away")]
    WriterGone,
}

/// A unicast send failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("encode failed: {0}")]
    Encode(#[from] ProtocolError),

    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}
