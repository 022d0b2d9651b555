//! Built-in doodad functions.

use super::{DoodadFunc, FuncContext};
use crate::world::EntityHandle;
use realm_protocol::packets::SCDoodadPhaseChanged;
use realm_protocol::ErrorMessageType;
use tracing::{debug, warn};

/// Plain interaction. Accepted and logged; it has no world effect yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseFunc;

impl DoodadFunc for UseFunc {
    fn use_func(
        &self,
        _ctx: &FuncContext<'_>,
        caster: EntityHandle,
        owner: EntityHandle,
        skill_id: u32,
    ) -> Result<(), ErrorMessageType> {
        debug!("DoodadFuncUse: {} used {} (skill {})", caster, owner, skill_id);
        Ok(())
    }
}

/// Moves the doodad to the phase in the binding's `param` and tells every
/// observer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseChangeFunc;

impl DoodadFunc for PhaseChangeFunc {
    fn use_func(
        &self,
        ctx: &FuncContext<'_>,
        _caster: EntityHandle,
        owner: EntityHandle,
        _skill_id: u32,
    ) -> Result<(), ErrorMessageType> {
        let world = ctx.handler.world();
        let phase = ctx.binding.param;
        if !world.set_doodad_phase(owner, phase) {
            return Err(ErrorMessageType::DoodadNotFound);
        }
        let object_id = world
            .object_id(owner)
            .ok_or(ErrorMessageType::DoodadNotFound)?;

        let packet = SCDoodadPhaseChanged { object_id, phase };
        match ctx.handler.broadcast(&packet, owner, false) {
            Ok(report) => debug!(
                "Doodad {} entered phase {} ({} observers notified)",
                owner, phase, report.delivered
            ),
            Err(e) => warn!("Failed to announce phase of doodad {}: {}", owner, e),
        }
        Ok(())
    }
}
