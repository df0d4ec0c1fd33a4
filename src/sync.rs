// src/sync.rs
//
// Host/device shape synchronization.
//
// Track shifting changes which cells of a mesh are occupied. When the mesh runs on a
// device, those changes are made on the device copy only, and the host copy's
// shape-derived data is stale until `resynchronize` runs. The flag belongs to the
// mesh, not to a single grid: M and M2 share it.

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::error::{TrackError, TrackResult};
use crate::mesh::Mesh;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeSync {
    lost: bool,
}

impl ShapeSync {
    /// Record that host and device copies disagree on shape. Idempotent.
    pub fn mark_dirty(&mut self) {
        self.lost = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.lost
    }
}

/// Flag `mesh` as out of sync with its device copy.
pub fn mark_dirty(mesh: &mut Mesh) {
    mesh.shape_sync.mark_dirty();
}

/// Bring the copies of a dirty mesh back in line and clear the flag.
///
/// Returns `Ok(true)` if a resynchronization was performed. Any failure is critical:
/// the flag stays set and the device state cannot be trusted.
pub fn resynchronize(mesh: &mut Mesh) -> TrackResult<bool> {
    if !mesh.shape_sync.is_dirty() {
        return Ok(false);
    }
    let id = mesh.id();
    for grid in mesh.shape_grids_mut() {
        grid.resynchronize().map_err(|e| {
            error!("mesh {id}: shape resynchronization failed: {e}");
            TrackError::critical(id, e)
        })?;
    }
    mesh.shape_sync.lost = false;
    debug!("mesh {id}: shape resynchronized");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceContext;
    use crate::mesh::MeshKind;
    use crate::region::{Axis, Rect3};
    use crate::vector_field::FieldGrid;

    fn afm_mesh() -> Mesh {
        let rect = Rect3::new([0.0; 3], [30.0, 10.0, 1.0]);
        let mut m = Mesh::new(1, "afm", MeshKind::Antiferromagnetic, rect, [5.0, 5.0, 1.0]);
        m.init_uniform([1.0, 0.0, 0.0]);
        m
    }

    #[test]
    fn clean_mesh_is_a_no_op() {
        let mut m = afm_mesh();
        assert_eq!(resynchronize(&mut m), Ok(false));
    }

    #[test]
    fn dirty_mesh_pulls_both_sublattices_back() {
        let mut m = afm_mesh();
        let ctx = DeviceContext::new(0, "gpu0");
        m.attach_device(&ctx).unwrap();

        m.shift_magnetization(Axis::X, -5.0).unwrap();
        m.refresh_shape().unwrap();
        assert!(m.shape_sync.is_dirty());
        assert_eq!(m.magnetization().host().n_occupied(), 12);

        assert_eq!(resynchronize(&mut m), Ok(true));
        assert!(!m.shape_sync.is_dirty());
        assert_eq!(m.magnetization().host().n_occupied(), 10);
        let m2 = m.sublattice2().unwrap();
        assert_eq!(m2.host().values(), m2.active().values());
    }

    #[test]
    fn failed_resynchronization_is_critical_and_keeps_flag() {
        let mut m = afm_mesh();
        let ctx = DeviceContext::new(0, "gpu0");
        m.attach_device(&ctx).unwrap();
        mark_dirty(&mut m);
        mark_dirty(&mut m);

        ctx.mark_lost();
        let err = resynchronize(&mut m).unwrap_err();
        assert!(err.is_critical());
        assert!(m.shape_sync.is_dirty());
    }
}
