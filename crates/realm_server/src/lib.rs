//! # Realm server
//!
//! Session handling and packet dispatch for the realm game server.
//!
//! ## Message flow
//!
//! 1. The accept loop registers a [`Session`](connection::Session) and spawns
//!    its reader and writer tasks.
//! 2. A [`SessionBootstrap`] picks the entity the connection controls.
//! 3. The reader pulls one frame at a time and hands it to the
//!    [`DispatchTable`], which decodes the body and runs the handler for its
//!    opcode and revision.
//! 4. Handlers act on the [`World`] and answer through the
//!    [`HandlerContext`]: unicast, broadcast to observers or an error
//!    notification.
//! 5. Outbound frames are queued per connection and written by that
//!    connection's writer task.
//!
//! ## Failure isolation
//!
//! Frames with an unknown opcode are dropped. Undecodable frames are dropped
//! and counted; enough of them in a row close the connection. A recipient
//! whose queue cannot take a broadcast is torn down and the broadcast
//! continues. Nothing here stops the process.

pub use bootstrap::{SessionBootstrap, SpawnOnConnect};
pub use config::ServerConfig;
pub use connection::{BroadcastReport, ConnectionId, ConnectionManager, Session};
pub use context::{HandlerContext, ServerContext};
pub use dispatch::{DispatchOutcome, DispatchTable};
pub use doodad::{DoodadFunc, DoodadFuncBinding, DoodadFuncKind, DoodadFuncRegistry};
pub use error::{DeliveryError, DispatchError, HandlerError, SendError, ServerError};
pub use server::RealmServer;
pub use shutdown::ShutdownState;
pub use world::{EntityHandle, InMemoryWorld, Position, World};

pub mod bootstrap;
pub mod config;
pub mod connection;
pub mod context;
pub mod dispatch;
pub mod doodad;
pub mod error;
pub mod handlers;
pub mod server;
pub mod shutdown;
pub mod world;

#[cfg(test)]
mod tests;
