use crate::context::HandlerContext;
use crate::error::HandlerError;
use realm_protocol::packets::{CSActiveWeaponChanged, SCActiveWeaponChanged};
use tracing::debug;

/// Records the new weapon set on the connection's unit and shows it to every
/// observer, the sender included.
pub fn on_active_weapon_changed(
    ctx: &HandlerContext,
    packet: CSActiveWeaponChanged,
) -> Result<(), HandlerError> {
    let unit = ctx.require_entity()?;
    let world = ctx.world();
    if !world.set_active_weapon(unit, packet.active_weapon) {
        return Err(HandlerError::NoEntity);
    }
    let object_id = world.object_id(unit).ok_or(HandlerError::NoEntity)?;

    let report = ctx.broadcast(
        &SCActiveWeaponChanged {
            object_id,
            active_weapon: packet.active_weapon,
        },
        unit,
        true,
    )?;
    debug!(
        "Unit {} switched to weapon set {} ({} recipients)",
        unit, packet.active_weapon, report.delivered
    );
    Ok(())
}
