//! Packet handlers for client requests.

mod active_weapon;
mod doodad;

pub use active_weapon::on_active_weapon_changed;
pub use doodad::on_use_doodad;

use crate::dispatch::DispatchTable;
use crate::error::DispatchError;
use realm_protocol::packets::{CSActiveWeaponChanged, CSUseDoodad};

/// Routes every client packet this server understands.
pub fn register_defaults(table: &mut DispatchTable) -> Result<(), DispatchError> {
    table.register::<CSActiveWeaponChanged, _>(on_active_weapon_changed)?;
    table.register::<CSUseDoodad, _>(on_use_doodad)?;
    Ok(())
}

/// A table with [`register_defaults`] applied.
pub fn default_table() -> Result<DispatchTable, DispatchError> {
    let mut table = DispatchTable::new();
    register_defaults(&mut table)?;
    Ok(table)
}
