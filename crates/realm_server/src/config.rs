//! Server configuration types and defaults.
//!
//! [`ServerConfig`] is the runtime view the server works from. The binary
//! builds it from its TOML file; tests construct it directly.

use realm_protocol::{opcodes::CURRENT_REVISION, MAX_PAYLOAD_LEN};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Configuration structure for the realm server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The socket address to bind the server to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrent connections allowed. Accepts beyond this
    /// are closed immediately.
    pub max_connections: usize,

    /// Largest frame payload accepted from a client, in bytes
    pub max_frame_payload: usize,

    /// Capacity of each connection's outbound frame queue
    pub outbound_queue_capacity: usize,

    /// Consecutive undecodable frames tolerated before a connection is closed
    pub max_decode_failures: u32,

    /// Protocol revision new sessions speak. Frames stamped with another
    /// revision are dropped.
    pub protocol_revision: u8,

    /// Radius within which units observe each other
    pub visibility_radius: f32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 1239)),
            max_connections: 1000,
            max_frame_payload: MAX_PAYLOAD_LEN,
            outbound_queue_capacity: 256,
            max_decode_failures: 8,
            protocol_revision: CURRENT_REVISION,
            visibility_radius: 100.0,
        }
    }
}
