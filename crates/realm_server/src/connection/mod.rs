//! Connection management for client sessions.
//!
//! A [`Session`] is one client connection: its outbound queue, the entity it
//! controls and its counters. The [`ConnectionManager`] owns every live
//! session, the entity-to-connection mapping and broadcast fan-out.

pub mod manager;
pub mod session;

pub use manager::{BroadcastReport, ConnectionManager};
pub use session::{Session, SessionStats, StatsSnapshot};

/// Type alias for connection identifiers.
///
/// Connection ids are unique for the lifetime of the process and are never
/// reused.
pub type ConnectionId = usize;
