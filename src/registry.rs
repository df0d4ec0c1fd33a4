// src/registry.rs
//
// Mesh ownership and lookup.
//
// Track shifting needs the holder mesh and its windows mutably at the same time.
// `MeshSet::split_mut` hands out the holder plus a `MeshView` over every other mesh;
// the controller resolves window ids through the `MeshLookup` trait on each use and
// never keeps references across steps.

use log::info;

use crate::config::TrackWindowConfig;
use crate::error::{TrackError, TrackResult};
use crate::mesh::Mesh;
use crate::sync;
use crate::track::{self, ConfigureReport, ShiftOutcome};

pub type MeshId = u32;

/// Global time-stepper state for one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepClock {
    /// Current simulation time.
    pub time: f64,
    /// Whether the step that just finished was accepted (not rejected or being retried).
    pub step_accepted: bool,
}

impl StepClock {
    pub fn new(time: f64, step_accepted: bool) -> Self {
        Self {
            time,
            step_accepted,
        }
    }
}

/// Resolve mesh ids to live meshes.
pub trait MeshLookup {
    fn resolve(&self, id: MeshId) -> Option<&Mesh>;
    fn resolve_mut(&mut self, id: MeshId) -> Option<&mut Mesh>;
}

/// Every mesh of a `MeshSet` except one.
pub struct MeshView<'a> {
    before: &'a mut [Mesh],
    after: &'a mut [Mesh],
}

impl MeshLookup for MeshView<'_> {
    fn resolve(&self, id: MeshId) -> Option<&Mesh> {
        self.before
            .iter()
            .chain(self.after.iter())
            .find(|m| m.id() == id)
    }

    fn resolve_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.before
            .iter_mut()
            .chain(self.after.iter_mut())
            .find(|m| m.id() == id)
    }
}

/// In-memory mesh registry with the global clock.
#[derive(Debug)]
pub struct MeshSet {
    meshes: Vec<Mesh>,
    time: f64,
    step_accepted: bool,
}

impl Default for MeshSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshSet {
    pub fn new() -> Self {
        Self {
            meshes: Vec::new(),
            time: 0.0,
            step_accepted: true,
        }
    }

    /// Add a mesh; ids must be unique.
    pub fn add(&mut self, mesh: Mesh) -> TrackResult<MeshId> {
        let id = mesh.id();
        if self.contains(id) {
            return Err(TrackError::DuplicateMesh(id));
        }
        self.meshes.push(mesh);
        Ok(id)
    }

    pub fn remove(&mut self, id: MeshId) -> Option<Mesh> {
        let pos = self.meshes.iter().position(|m| m.id() == id)?;
        Some(self.meshes.remove(pos))
    }

    pub fn contains(&self, id: MeshId) -> bool {
        self.meshes.iter().any(|m| m.id() == id)
    }

    pub fn get(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.iter().find(|m| m.id() == id)
    }

    pub fn get_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.meshes.iter_mut().find(|m| m.id() == id)
    }

    pub fn ids(&self) -> Vec<MeshId> {
        self.meshes.iter().map(|m| m.id()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mesh> {
        self.meshes.iter()
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn current_step_solved(&self) -> bool {
        self.step_accepted
    }

    /// Record the outcome of a time step.
    pub fn set_step(&mut self, time: f64, accepted: bool) {
        self.time = time;
        self.step_accepted = accepted;
    }

    pub fn clock(&self) -> StepClock {
        StepClock::new(self.time, self.step_accepted)
    }

    /// The mesh `id` and a view over all other meshes.
    pub fn split_mut(&mut self, id: MeshId) -> Option<(&mut Mesh, MeshView<'_>)> {
        let pos = self.meshes.iter().position(|m| m.id() == id)?;
        let (before, rest) = self.meshes.split_at_mut(pos);
        let (mesh, after) = rest.split_first_mut()?;
        Some((mesh, MeshView { before, after }))
    }

    /// Configure track shifting on `holder`.
    pub fn setup_track_shifting(
        &mut self,
        holder: MeshId,
        windows: &[MeshId],
        velocity: [f64; 3],
        clip: [f64; 3],
    ) -> TrackResult<ConfigureReport> {
        let (mesh, mut view) = self
            .split_mut(holder)
            .ok_or(TrackError::UnknownMesh(holder))?;
        track::configure(mesh, &mut view, windows, velocity, clip)
    }

    pub fn apply_config(&mut self, cfg: &TrackWindowConfig) -> TrackResult<ConfigureReport> {
        cfg.validate()?;
        self.setup_track_shifting(cfg.holder, &cfg.windows, cfg.velocity, cfg.clip)
    }

    /// Start-of-iteration hook for every mesh, in insertion order.
    ///
    /// Returns the outcome for each mesh that shifted. A critical error stops the loop.
    pub fn prepare_new_iteration(&mut self) -> TrackResult<Vec<(MeshId, ShiftOutcome)>> {
        let clock = self.clock();
        let mut shifted = Vec::new();
        for id in self.ids() {
            let Some((mesh, mut view)) = self.split_mut(id) else {
                continue;
            };
            let outcome = mesh.prepare_new_iteration(&mut view, clock)?;
            if matches!(outcome, ShiftOutcome::Shifted { .. }) {
                shifted.push((id, outcome));
            }
        }
        Ok(shifted)
    }

    /// Resynchronize every mesh whose host and device shapes diverged.
    ///
    /// Call once when a simulation run (re)starts. Returns the number of meshes
    /// resynchronized; any failure is critical.
    pub fn initialize_run(&mut self) -> TrackResult<usize> {
        let mut n = 0;
        for mesh in &mut self.meshes {
            if sync::resynchronize(mesh)? {
                n += 1;
            }
        }
        if n > 0 {
            info!("resynchronized shapes of {n} mesh(es) before run");
        }
        Ok(n)
    }
}

impl MeshLookup for MeshSet {
    fn resolve(&self, id: MeshId) -> Option<&Mesh> {
        self.get(id)
    }

    fn resolve_mut(&mut self, id: MeshId) -> Option<&mut Mesh> {
        self.get_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshKind;
    use crate::region::Rect3;

    fn set() -> MeshSet {
        let mut s = MeshSet::new();
        for id in 0..3 {
            let r = Rect3::new([10.0 * id as f64, 0.0, 0.0], [10.0 * id as f64 + 10.0, 5.0, 1.0]);
            s.add(Mesh::new(id, format!("m{id}"), MeshKind::Ferromagnetic, r, [5.0, 5.0, 1.0]))
                .unwrap();
        }
        s
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut s = set();
        let r = Rect3::new([0.0; 3], [1.0; 3]);
        let dup = Mesh::new(1, "dup", MeshKind::Ferromagnetic, r, [1.0; 3]);
        assert_eq!(s.add(dup), Err(TrackError::DuplicateMesh(1)));
        assert_eq!(s.ids(), vec![0, 1, 2]);
    }

    #[test]
    fn split_view_excludes_the_holder() {
        let mut s = set();
        let (holder, mut view) = s.split_mut(1).unwrap();
        assert_eq!(holder.id(), 1);
        assert!(view.resolve(1).is_none());
        assert!(view.resolve_mut(0).is_some());
        assert!(view.resolve(2).is_some());
        assert!(s.split_mut(7).is_none());
    }

    #[test]
    fn unknown_holder_is_an_error() {
        let mut s = set();
        let err = s.setup_track_shifting(9, &[0], [1.0, 0.0, 0.0], [0.0; 3]);
        assert_eq!(err, Err(TrackError::UnknownMesh(9)));
    }

    #[test]
    fn removed_meshes_no_longer_resolve() {
        let mut s = set();
        assert!(s.remove(2).is_some());
        assert!(s.resolve(2).is_none());
        assert!(s.remove(2).is_none());
    }
}
