//! Concrete packet layouts.
//!
//! `CS*` types travel client to server, `SC*` server to client. Every type
//! implements both codec directions so tooling and tests can produce the
//! frames a real client would send.

mod active_weapon;
mod doodad;
mod error_msg;

pub use active_weapon::{CSActiveWeaponChanged, SCActiveWeaponChanged};
pub use doodad::{CSUseDoodad, SCDoodadPhaseChanged};
pub use error_msg::SCErrorMsg;
