//! The world seen from the network layer.
//!
//! Sessions and handlers never hold world objects, only [`EntityHandle`]s.
//! Every query and single-entity mutation goes through the [`World`] trait and
//! is atomic with respect to other callers.

mod memory;

pub use memory::InMemoryWorld;

use crate::doodad::DoodadFuncBinding;

/// Generational reference to an entity in a world arena.
///
/// A handle outlives the entity it names; lookups through a stale handle miss
/// instead of aliasing whatever reused the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle {
    index: u32,
    generation: u32,
}

impl EntityHandle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const fn index(self) -> u32 {
        self.index
    }

    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// World-space position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_squared(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }
}

/// Queries and mutations the packet handlers need from the world.
pub trait World: Send + Sync + 'static {
    /// Units that currently observe `entity`, not including `entity` itself.
    fn observers_of(&self, entity: EntityHandle) -> Vec<EntityHandle>;

    /// Whether `caster` may act on `target`: both exist and `target` is in range.
    fn can_target(&self, caster: EntityHandle, target: EntityHandle) -> bool;

    /// Object id the client knows `entity` by.
    fn object_id(&self, entity: EntityHandle) -> Option<u32>;

    /// Reverse of [`World::object_id`].
    fn resolve_object(&self, object_id: u32) -> Option<EntityHandle>;

    /// Records the active weapon set of a unit. Returns `false` when the
    /// entity is gone or is not a unit.
    fn set_active_weapon(&self, entity: EntityHandle, slot: u8) -> bool;

    /// Whether `entity` exists and is a doodad.
    fn is_doodad(&self, entity: EntityHandle) -> bool;

    /// Function bindings attached to a doodad, in template order.
    fn doodad_funcs(&self, doodad: EntityHandle) -> Vec<DoodadFuncBinding>;

    /// Moves a doodad to `phase`. Returns `false` when it does not exist.
    fn set_doodad_phase(&self, doodad: EntityHandle, phase: u32) -> bool;

    /// Removes an entity whose controlling connection went away.
    fn detach(&self, entity: EntityHandle);
}
