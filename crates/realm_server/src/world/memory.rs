use super::{EntityHandle, Position, World};
use crate::doodad::DoodadFuncBinding;
use realm_protocol::stream::MAX_BC;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

#[derive(Debug)]
enum EntityKind {
    Unit { active_weapon: u8 },
    Doodad { phase: u32, funcs: Vec<DoodadFuncBinding> },
}

#[derive(Debug)]
struct Entity {
    object_id: u32,
    position: Position,
    kind: EntityKind,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entity: Option<Entity>,
}

#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_object_id: HashMap<u32, EntityHandle>,
    next_object_id: u32,
}

impl Arena {
    fn get(&self, handle: EntityHandle) -> Option<&Entity> {
        let slot = self.slots.get(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.entity.as_ref()
    }

    fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut Entity> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.entity.as_mut()
    }

    /// Object ids wrap inside the 24-bit range and skip ids still in use.
    fn allocate_object_id(&mut self) -> Option<u32> {
        for _ in 0..MAX_BC {
            self.next_object_id = if self.next_object_id >= MAX_BC {
                1
            } else {
                self.next_object_id + 1
            };
            if !self.by_object_id.contains_key(&self.next_object_id) {
                return Some(self.next_object_id);
            }
        }
        None
    }

    fn insert(&mut self, position: Position, kind: EntityKind) -> Option<EntityHandle> {
        let object_id = self.allocate_object_id()?;
        let entity = Entity {
            object_id,
            position,
            kind,
        };

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entity = Some(entity);
                EntityHandle::new(index, slot.generation)
            }
            None => {
                let index = u32::try_from(self.slots.len()).ok()?;
                self.slots.push(Slot {
                    generation: 0,
                    entity: Some(entity),
                });
                EntityHandle::new(index, 0)
            }
        };
        self.by_object_id.insert(object_id, handle);
        Some(handle)
    }

    fn remove(&mut self, handle: EntityHandle) -> Option<Entity> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if slot.generation != handle.generation() {
            return None;
        }
        let entity = slot.entity.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index());
        self.by_object_id.remove(&entity.object_id);
        Some(entity)
    }
}

/// Arena-backed world with radius visibility.
///
/// Units observe every other unit within `visibility_radius`. Doodads can be
/// observed but never observe.
#[derive(Debug)]
pub struct InMemoryWorld {
    arena: RwLock<Arena>,
    visibility_radius: f32,
}

impl InMemoryWorld {
    pub fn new(visibility_radius: f32) -> Self {
        Self {
            arena: RwLock::new(Arena::default()),
            visibility_radius,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Arena> {
        self.arena.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Arena> {
        self.arena.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn in_range(&self, a: &Position, b: &Position) -> bool {
        a.distance_squared(b) <= self.visibility_radius * self.visibility_radius
    }

    /// Spawns a unit. Returns `None` once every object id is taken.
    pub fn spawn_unit(&self, position: Position) -> Option<EntityHandle> {
        let handle = self
            .write()
            .insert(position, EntityKind::Unit { active_weapon: 0 })?;
        trace!("Spawned unit {} at {:?}", handle, position);
        Some(handle)
    }

    pub fn spawn_doodad(
        &self,
        position: Position,
        phase: u32,
        funcs: Vec<DoodadFuncBinding>,
    ) -> Option<EntityHandle> {
        let handle = self
            .write()
            .insert(position, EntityKind::Doodad { phase, funcs })?;
        trace!("Spawned doodad {} at {:?}", handle, position);
        Some(handle)
    }

    pub fn move_to(&self, entity: EntityHandle, position: Position) -> bool {
        match self.write().get_mut(entity) {
            Some(e) => {
                e.position = position;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, entity: EntityHandle) -> bool {
        self.read().get(entity).is_some()
    }

    pub fn len(&self) -> usize {
        self.read().by_object_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_weapon(&self, entity: EntityHandle) -> Option<u8> {
        match self.read().get(entity)?.kind {
            EntityKind::Unit { active_weapon } => Some(active_weapon),
            EntityKind::Doodad { .. } => None,
        }
    }

    pub fn doodad_phase(&self, doodad: EntityHandle) -> Option<u32> {
        match self.read().get(doodad)?.kind {
            EntityKind::Doodad { phase, .. } => Some(phase),
            EntityKind::Unit { .. } => None,
        }
    }
}

impl World for InMemoryWorld {
    fn observers_of(&self, entity: EntityHandle) -> Vec<EntityHandle> {
        let arena = self.read();
        let Some(origin) = arena.get(entity) else {
            return Vec::new();
        };

        arena
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let other = slot.entity.as_ref()?;
                let handle = EntityHandle::new(index as u32, slot.generation);
                let observes = handle != entity
                    && matches!(other.kind, EntityKind::Unit { .. })
                    && self.in_range(&origin.position, &other.position);
                observes.then_some(handle)
            })
            .collect()
    }

    fn can_target(&self, caster: EntityHandle, target: EntityHandle) -> bool {
        let arena = self.read();
        match (arena.get(caster), arena.get(target)) {
            (Some(c), Some(t)) => self.in_range(&c.position, &t.position),
            _ => false,
        }
    }

    fn object_id(&self, entity: EntityHandle) -> Option<u32> {
        self.read().get(entity).map(|e| e.object_id)
    }

    fn resolve_object(&self, object_id: u32) -> Option<EntityHandle> {
        self.read().by_object_id.get(&object_id).copied()
    }

    fn set_active_weapon(&self, entity: EntityHandle, slot: u8) -> bool {
        match self.write().get_mut(entity).map(|e| &mut e.kind) {
            Some(EntityKind::Unit { active_weapon }) => {
                *active_weapon = slot;
                true
            }
            _ => false,
        }
    }

    fn is_doodad(&self, entity: EntityHandle) -> bool {
        matches!(
            self.read().get(entity).map(|e| &e.kind),
            Some(EntityKind::Doodad { .. })
        )
    }

    fn doodad_funcs(&self, doodad: EntityHandle) -> Vec<DoodadFuncBinding> {
        match self.read().get(doodad).map(|e| &e.kind) {
            Some(EntityKind::Doodad { funcs, .. }) => funcs.clone(),
            _ => Vec::new(),
        }
    }

    fn set_doodad_phase(&self, doodad: EntityHandle, phase: u32) -> bool {
        match self.write().get_mut(doodad).map(|e| &mut e.kind) {
            Some(EntityKind::Doodad { phase: current, .. }) => {
                *current = phase;
                true
            }
            _ => false,
        }
    }

    fn detach(&self, entity: EntityHandle) {
        if let Some(removed) = self.write().remove(entity) {
            debug!("Removed entity {} (object {})", entity, removed.object_id);
        }
    }
}
