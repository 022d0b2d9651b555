//! Opcode catalogue.
//!
//! Client-to-server opcodes sit below [`SERVER_OPCODE_BASE`]; server-to-client
//! opcodes at or above it. Values are the wire contract and never change once
//! shipped. Layouts are documented on each packet type.

/// First opcode of the server-to-client range.
pub const SERVER_OPCODE_BASE: u16 = 0x0100;

/// Protocol revision spoken by current clients.
pub const CURRENT_REVISION: u8 = 1;

// Client to server
pub const CS_ACTIVE_WEAPON_CHANGED: u16 = 0x008c;
pub const CS_USE_DOODAD: u16 = 0x0094;

// Server to client
pub const SC_ERROR_MSG: u16 = 0x0100;
pub const SC_ACTIVE_WEAPON_CHANGED: u16 = 0x0116;
pub const SC_DOODAD_PHASE_CHANGED: u16 = 0x01a2;

/// Returns `true` for opcodes in the client-to-server range.
pub const fn is_client_opcode(opcode: u16) -> bool {
    opcode < SERVER_OPCODE_BASE
}
