// src/effective_field/mod.rs
//
// Generic field-module interface.
//
// The solvers themselves (exchange, anisotropy, demag, ...) are external to this crate;
// they plug in through `FieldModule` and are looked up by `ModuleKind`. The only
// concrete module shipped here is the Zeeman-type module, because stray-field
// coupling writes into it.
pub mod zeeman;

use std::fmt::Debug;

use crate::error::TrackResult;
use crate::region::Rect3;
use crate::vector_field::FieldGrid;

pub use zeeman::Zeeman;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Zeeman,
    Demag,
    Exchange,
    Anisotropy,
    Dmi,
}

/// Everything a module may read or write when updating its field contribution.
///
/// Grids are the mesh's active copies.
pub struct FieldContext<'a> {
    pub rect: Rect3,
    pub m: &'a dyn FieldGrid,
    pub m2: Option<&'a dyn FieldGrid>,
    pub heff: &'a mut dyn FieldGrid,
    pub heff2: Option<&'a mut dyn FieldGrid>,
}

pub trait FieldModule: Debug {
    fn kind(&self) -> ModuleKind;

    /// Add this module's contribution to the effective field(s).
    fn update_field(&mut self, ctx: FieldContext<'_>) -> TrackResult<()>;

    fn as_zeeman(&self) -> Option<&Zeeman> {
        None
    }

    fn as_zeeman_mut(&mut self) -> Option<&mut Zeeman> {
        None
    }
}

/// Modules set on one mesh; at most one per kind.
#[derive(Debug, Default)]
pub struct ModuleSet {
    modules: Vec<Box<dyn FieldModule>>,
}

impl ModuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a module, replacing any existing module of the same kind.
    pub fn set(&mut self, module: Box<dyn FieldModule>) {
        let kind = module.kind();
        self.modules.retain(|m| m.kind() != kind);
        self.modules.push(module);
    }

    pub fn remove(&mut self, kind: ModuleKind) -> Option<Box<dyn FieldModule>> {
        let pos = self.modules.iter().position(|m| m.kind() == kind)?;
        Some(self.modules.remove(pos))
    }

    pub fn is_set(&self, kind: ModuleKind) -> bool {
        self.modules.iter().any(|m| m.kind() == kind)
    }

    pub fn get(&self, kind: ModuleKind) -> Option<&dyn FieldModule> {
        self.modules.iter().find(|m| m.kind() == kind).map(|m| m.as_ref())
    }

    pub fn get_mut(&mut self, kind: ModuleKind) -> Option<&mut (dyn FieldModule + 'static)> {
        self.modules.iter_mut().find(|m| m.kind() == kind).map(|m| m.as_mut())
    }

    pub fn zeeman(&self) -> Option<&Zeeman> {
        self.get(ModuleKind::Zeeman).and_then(|m| m.as_zeeman())
    }

    pub fn zeeman_mut(&mut self) -> Option<&mut Zeeman> {
        self.get_mut(ModuleKind::Zeeman).and_then(|m| m.as_zeeman_mut())
    }
}
