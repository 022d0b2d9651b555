use crate::context::HandlerContext;
use crate::error::HandlerError;
use realm_protocol::packets::CSUseDoodad;
use realm_protocol::ErrorMessageType;
use tracing::trace;

/// Runs the functions bound to a doodad for the cast skill.
///
/// The caster is always the connection's own unit. The target has to be a
/// doodad within the caster's reach.
pub fn on_use_doodad(ctx: &HandlerContext, packet: CSUseDoodad) -> Result<(), HandlerError> {
    let caster = ctx.require_entity()?;
    let world = ctx.world();
    let doodad = world
        .resolve_object(packet.doodad_id)
        .filter(|&target| world.is_doodad(target))
        .ok_or(HandlerError::domain(
            ErrorMessageType::DoodadNotFound,
            packet.doodad_id,
        ))?;
    if !world.can_target(caster, doodad) {
        return Err(HandlerError::domain(
            ErrorMessageType::TooFarAway,
            packet.doodad_id,
        ));
    }

    let summary = ctx
        .doodads()
        .dispatch(ctx, caster, doodad, packet.skill_id)
        .map_err(|error| HandlerError::domain(error, packet.skill_id))?;
    if summary.invoked > 0 {
        trace!(
            "Doodad {} used by {}: {} functions invoked",
            doodad,
            caster,
            summary.invoked
        );
    }
    Ok(())
}
