//! Accept loop and per-connection tasks.

pub mod connection;
pub mod core;

pub use connection::{handle_connection, ConnectionLimits};
pub use core::RealmServer;
