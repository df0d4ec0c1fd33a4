// src/mesh.rs
//
// A magnetic mesh: geometry, field grids, field modules, and the per-mesh state used
// by track shifting (tracking configuration and host/device shape sync flag).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::device::DeviceContext;
use crate::effective_field::{FieldContext, ModuleKind, ModuleSet};
use crate::error::{GridResult, TrackError, TrackResult};
use crate::region::{Axis, Rect3};
use crate::registry::{MeshId, MeshLookup, StepClock};
use crate::spatial_grid::SpatialGrid;
use crate::sync::ShapeSync;
use crate::track::{self, ShiftOutcome, TrackState};
use crate::vec3::scale;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeshKind {
    Ferromagnetic,
    /// Two sublattices: carries M2 and Heff2 alongside M and Heff.
    Antiferromagnetic,
    /// Fixed-magnetisation mesh; never takes part in track shifting.
    Dipole,
}

impl MeshKind {
    pub fn has_second_sublattice(self) -> bool {
        matches!(self, MeshKind::Antiferromagnetic)
    }

    /// Number of sublattices relocated during track shifting, or `None` if meshes of this
    /// kind cannot act as holder or window.
    pub fn track_window_sublattices(self) -> Option<usize> {
        match self {
            MeshKind::Ferromagnetic => Some(1),
            MeshKind::Antiferromagnetic => Some(2),
            MeshKind::Dipole => None,
        }
    }

    pub fn supports_dual_sublattice_track_window(self) -> bool {
        self.track_window_sublattices() == Some(2)
    }

    /// Whether a holder of this kind can relocate data of a window of kind `window`.
    pub fn accepts_track_window(self, window: MeshKind) -> bool {
        match (self.track_window_sublattices(), window.track_window_sublattices()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug)]
pub struct Mesh {
    id: MeshId,
    pub name: String,
    kind: MeshKind,
    rect: Rect3,
    m: SpatialGrid,
    m2: Option<SpatialGrid>,
    heff: SpatialGrid,
    heff2: Option<SpatialGrid>,
    pub modules: ModuleSet,
    dormant: bool,
    pub track: TrackState,
    pub shape_sync: ShapeSync,
}

impl Mesh {
    /// Empty mesh (all cells unoccupied) tiling `rect` with the given cell size.
    pub fn new(
        id: MeshId,
        name: impl Into<String>,
        kind: MeshKind,
        rect: Rect3,
        cellsize: [f64; 3],
    ) -> Self {
        let second = || kind.has_second_sublattice().then(|| SpatialGrid::new(rect, cellsize));
        Self {
            id,
            name: name.into(),
            kind,
            rect,
            m: SpatialGrid::new(rect, cellsize),
            m2: second(),
            heff: SpatialGrid::new(rect, cellsize),
            heff2: second(),
            modules: ModuleSet::new(),
            dormant: false,
            track: TrackState::default(),
            shape_sync: ShapeSync::default(),
        }
    }

    pub fn id(&self) -> MeshId {
        self.id
    }

    pub fn kind(&self) -> MeshKind {
        self.kind
    }

    pub fn rect(&self) -> Rect3 {
        self.rect
    }

    pub fn cellsize(&self) -> [f64; 3] {
        self.m.host().grid.cellsize()
    }

    /// A dormant mesh has no physics of its own; it only holds data for track shifting.
    pub fn is_dormant(&self) -> bool {
        self.dormant
    }

    pub fn set_dormant(&mut self, dormant: bool) {
        self.dormant = dormant;
    }

    pub fn magnetization(&self) -> &SpatialGrid {
        &self.m
    }

    pub fn sublattice2(&self) -> Option<&SpatialGrid> {
        self.m2.as_ref()
    }

    pub fn effective_field(&self) -> &SpatialGrid {
        &self.heff
    }

    pub fn effective_field2(&self) -> Option<&SpatialGrid> {
        self.heff2.as_ref()
    }

    /// Initialise the host copy from a function of absolute cell-centre position.
    /// The second sublattice, if any, is set antiparallel.
    ///
    /// Call before attaching a device.
    pub fn init_with<F>(&mut self, f: F)
    where
        F: Fn([f64; 3]) -> [f64; 3],
    {
        self.m.host_mut().fill_with(&f);
        if let Some(m2) = self.m2.as_mut() {
            m2.host_mut().fill_with(|p| scale(f(p), -1.0));
        }
    }

    pub fn init_uniform(&mut self, v: [f64; 3]) {
        self.init_with(|_| v);
    }

    /// Mirror every grid of this mesh on `ctx`.
    pub fn attach_device(&mut self, ctx: &Arc<DeviceContext>) -> GridResult<()> {
        for g in self.grids_mut() {
            g.attach_mirror(ctx)?;
        }
        Ok(())
    }

    /// Pull device data back to the host and drop all mirrors.
    pub fn detach_device(&mut self) -> GridResult<()> {
        for g in self.grids_mut() {
            g.detach_mirrors()?;
        }
        self.shape_sync = ShapeSync::default();
        Ok(())
    }

    pub fn has_device(&self) -> bool {
        self.m.has_mirror()
    }

    /// Grids whose occupancy defines the mesh shape.
    pub fn shape_grids_mut(&mut self) -> Vec<&mut SpatialGrid> {
        let mut v = vec![&mut self.m];
        if let Some(m2) = self.m2.as_mut() {
            v.push(m2);
        }
        v
    }

    fn grids_mut(&mut self) -> Vec<&mut SpatialGrid> {
        let mut v = vec![&mut self.m, &mut self.heff];
        if let Some(m2) = self.m2.as_mut() {
            v.push(m2);
        }
        if let Some(h2) = self.heff2.as_mut() {
            v.push(h2);
        }
        v
    }

    /// Move the mesh rectangle and every grid with it.
    pub fn translate(&mut self, delta: [f64; 3]) {
        self.rect = self.rect.translated(delta);
        for g in self.grids_mut() {
            g.translate(delta);
        }
    }

    /// Copy magnetisation (both sublattices where both meshes carry them) from `src`
    /// over the absolute `region`.
    pub fn copy_magnetization_from(&mut self, src: &Mesh, region: &Rect3) -> GridResult<usize> {
        let n = self.m.active_mut().copy_values(src.m.active(), region)?;
        if let (Some(dst2), Some(src2)) = (self.m2.as_mut(), src.m2.as_ref()) {
            dst2.active_mut().copy_values(src2.active(), region)?;
        }
        Ok(n)
    }

    pub fn clear_magnetization(&mut self, region: &Rect3) -> GridResult<usize> {
        let n = self.m.active_mut().clear_region(region)?;
        if let Some(m2) = self.m2.as_mut() {
            m2.active_mut().clear_region(region)?;
        }
        Ok(n)
    }

    pub fn shift_magnetization(&mut self, axis: Axis, delta: f64) -> GridResult<()> {
        self.m.active_mut().shift(axis, delta)?;
        if let Some(m2) = self.m2.as_mut() {
            m2.active_mut().shift(axis, delta)?;
        }
        Ok(())
    }

    /// Recompute shape flags on the active copies. With a device attached the host copy
    /// is now stale, so the shape sync flag is set.
    pub fn refresh_shape(&mut self) -> GridResult<()> {
        for g in self.shape_grids_mut() {
            g.active_mut().recompute_shape_flags()?;
        }
        if self.has_device() {
            self.shape_sync.mark_dirty();
        }
        Ok(())
    }

    pub fn clear_effective_field(&mut self) -> GridResult<()> {
        self.heff.active_mut().set_uniform([0.0; 3])?;
        if let Some(h2) = self.heff2.as_mut() {
            h2.active_mut().set_uniform([0.0; 3])?;
        }
        Ok(())
    }

    pub fn is_module_set(&self, kind: ModuleKind) -> bool {
        self.modules.is_set(kind)
    }

    /// Run the module of `kind` against this mesh's active grids.
    ///
    /// Returns `Ok(false)` if no such module is set.
    pub fn update_module(&mut self, kind: ModuleKind) -> TrackResult<bool> {
        let Some(module) = self.modules.get_mut(kind) else {
            return Ok(false);
        };
        let ctx = FieldContext {
            rect: self.rect,
            m: self.m.active(),
            m2: self.m2.as_ref().map(|g| g.active()),
            heff: self.heff.active_mut(),
            heff2: self.heff2.as_mut().map(|g| g.active_mut()),
        };
        module.update_field(ctx)?;
        Ok(true)
    }

    /// Per-iteration hook.
    ///
    /// A dormant mesh runs the track shift algorithm. An active mesh without a Zeeman
    /// module has its effective field buffers zeroed, ready for the field modules.
    pub fn prepare_new_iteration(
        &mut self,
        meshes: &mut dyn MeshLookup,
        clock: StepClock,
    ) -> TrackResult<ShiftOutcome> {
        if self.dormant {
            return track::step_shift(self, meshes, clock);
        }
        if !self.is_module_set(ModuleKind::Zeeman) {
            let id = self.id;
            self.clear_effective_field()
                .map_err(|e| TrackError::critical(id, e))?;
        }
        Ok(ShiftOutcome::Idle)
    }
}
