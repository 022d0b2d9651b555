//! World-object behaviours.
//!
//! A doodad carries a list of [`DoodadFuncBinding`]s. When a player uses the
//! doodad, each binding whose skill matches the cast is dispatched through the
//! [`DoodadFuncRegistry`] to the [`DoodadFunc`] registered for its kind.
//! Registering a new kind needs no change to the dispatcher.

mod funcs;

pub use funcs::{PhaseChangeFunc, UseFunc};

use crate::context::HandlerContext;
use crate::world::EntityHandle;
use dashmap::DashMap;
use realm_protocol::ErrorMessageType;
use std::sync::Arc;
use tracing::debug;

/// Stable identifier of a doodad function kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DoodadFuncKind(pub u32);

impl DoodadFuncKind {
    pub const USE: Self = Self(1);
    pub const PHASE_CHANGE: Self = Self(2);
}

impl std::fmt::Display for DoodadFuncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::USE => f.write_str("use"),
            Self::PHASE_CHANGE => f.write_str("phase_change"),
            Self(other) => write!(f, "kind#{other}"),
        }
    }
}

/// One function attached to a doodad template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DoodadFuncBinding {
    pub kind: DoodadFuncKind,
    /// Skill that triggers this function. `0` matches any skill.
    pub skill_id: u32,
    /// Kind-specific argument, such as the target phase of a phase change.
    pub param: u32,
}

impl DoodadFuncBinding {
    pub const fn new(kind: DoodadFuncKind, skill_id: u32) -> Self {
        Self {
            kind,
            skill_id,
            param: 0,
        }
    }

    pub const fn with_param(mut self, param: u32) -> Self {
        self.param = param;
        self
    }

    pub fn matches(&self, skill_id: u32) -> bool {
        self.skill_id == 0 || self.skill_id == skill_id
    }
}

/// Everything a doodad function sees of the request that triggered it.
pub struct FuncContext<'a> {
    pub handler: &'a HandlerContext,
    pub binding: &'a DoodadFuncBinding,
}

/// Behaviour of one doodad function kind.
pub trait DoodadFunc: Send + Sync + 'static {
    fn use_func(
        &self,
        ctx: &FuncContext<'_>,
        caster: EntityHandle,
        owner: EntityHandle,
        skill_id: u32,
    ) -> Result<(), ErrorMessageType>;
}

/// What a dispatch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FuncDispatch {
    /// Bindings that ran a registered function.
    pub invoked: usize,
    /// Matching bindings whose kind has no registered function.
    pub unimplemented: usize,
}

/// Registry of doodad function implementations, keyed by kind.
#[derive(Default)]
pub struct DoodadFuncRegistry {
    funcs: DashMap<DoodadFuncKind, Arc<dyn DoodadFunc>>,
}

impl std::fmt::Debug for DoodadFuncRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<DoodadFuncKind> = self.funcs.iter().map(|e| *e.key()).collect();
        kinds.sort();
        f.debug_struct("DoodadFuncRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

impl DoodadFuncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `use` and `phase_change` functions.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(DoodadFuncKind::USE, Arc::new(UseFunc));
        registry.register(DoodadFuncKind::PHASE_CHANGE, Arc::new(PhaseChangeFunc));
        registry
    }

    /// Registers `func` for `kind`, returning the implementation it replaced.
    pub fn register(
        &self,
        kind: DoodadFuncKind,
        func: Arc<dyn DoodadFunc>,
    ) -> Option<Arc<dyn DoodadFunc>> {
        debug!("Registered doodad func {}", kind);
        self.funcs.insert(kind, func)
    }

    pub fn unregister(&self, kind: DoodadFuncKind) -> Option<Arc<dyn DoodadFunc>> {
        self.funcs.remove(&kind).map(|(_, func)| func)
    }

    pub fn get(&self, kind: DoodadFuncKind) -> Option<Arc<dyn DoodadFunc>> {
        self.funcs.get(&kind).map(|f| f.value().clone())
    }

    pub fn contains(&self, kind: DoodadFuncKind) -> bool {
        self.funcs.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }

    /// Runs every function bound to `owner` that matches `skill_id`, in
    /// binding order. Stops at the first domain error.
    pub fn dispatch(
        &self,
        handler: &HandlerContext,
        caster: EntityHandle,
        owner: EntityHandle,
        skill_id: u32,
    ) -> Result<FuncDispatch, ErrorMessageType> {
        let mut summary = FuncDispatch::default();
        for binding in handler.world().doodad_funcs(owner) {
            if !binding.matches(skill_id) {
                continue;
            }
            let Some(func) = self.get(binding.kind) else {
                debug!(
                    "Doodad func {} on {} has no implementation, skipping",
                    binding.kind, owner
                );
                summary.unimplemented += 1;
                continue;
            };
            let ctx = FuncContext {
                handler,
                binding: &binding,
            };
            func.use_func(&ctx, caster, owner, skill_id)?;
            summary.invoked += 1;
        }
        Ok(summary)
    }
}
