// src/device.rs
//
// Accelerator contexts and device-resident field mirrors.
//
// A `DeviceMirror` holds its own copy of a field's values and flags and implements
// `FieldGrid` with data-parallel kernels (rayon). Every kernel joins before the call
// returns, so successive operations observe each other's output. Once the owning
// context is lost, every operation fails with `GridError::ContextLost`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::error;
use rayon::prelude::*;

use crate::error::{GridError, GridResult};
use crate::grid::Grid3D;
use crate::region::{Axis, Rect3};
use crate::vec3::add;
use crate::vector_field::{
    check_len, copy_plan, region_cells, shape_flags, shift_source, Backend, CellFlags, FieldGrid,
};

pub type DeviceId = u32;

/// One accelerator context.
#[derive(Debug)]
pub struct DeviceContext {
    id: DeviceId,
    name: String,
    lost: AtomicBool,
}

impl DeviceContext {
    pub fn new(id: DeviceId, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            lost: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Record that the context was reset or removed.
    ///
    /// Memory held on a lost context cannot be read back, so every mirror on it fails
    /// from now on.
    pub fn mark_lost(&self) {
        if !self.lost.swap(true, Ordering::SeqCst) {
            error!("device {} ({}) lost", self.id, self.name);
        }
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    fn check(&self) -> GridResult<()> {
        if self.is_lost() {
            Err(GridError::ContextLost { device: self.id })
        } else {
            Ok(())
        }
    }
}

/// Device-resident copy of a field.
#[derive(Debug)]
pub struct DeviceMirror {
    ctx: Arc<DeviceContext>,
    grid: Grid3D,
    rect: Rect3,
    data: Vec<[f64; 3]>,
    flags: Vec<CellFlags>,
}

impl DeviceMirror {
    /// Allocate a mirror of `src` on `ctx` and upload its values and flags.
    pub fn upload(ctx: &Arc<DeviceContext>, src: &dyn FieldGrid) -> GridResult<Self> {
        ctx.check()?;
        src.ready()?;
        Ok(Self {
            ctx: Arc::clone(ctx),
            grid: src.grid(),
            rect: src.rect(),
            data: src.values().to_vec(),
            flags: src.flags().to_vec(),
        })
    }

    pub fn device(&self) -> DeviceId {
        self.ctx.id()
    }

    /// Overwrite this mirror's values with those of `src` (same layout) and recompute
    /// flags on the device.
    pub fn load_from(&mut self, src: &dyn FieldGrid) -> GridResult<()> {
        self.ctx.check()?;
        src.ready()?;
        let values = src.values();
        check_len(self.data.len(), values.len())?;
        self.data.par_iter_mut().zip(values.par_iter()).for_each(|(d, s)| *d = *s);
        self.rect = src.rect();
        self.recompute_shape_flags()
    }
}

impl FieldGrid for DeviceMirror {
    fn backend(&self) -> Backend {
        Backend::Device(self.ctx.id())
    }

    fn grid(&self) -> Grid3D {
        self.grid
    }

    fn rect(&self) -> Rect3 {
        self.rect
    }

    fn values(&self) -> &[[f64; 3]] {
        &self.data
    }

    fn flags(&self) -> &[CellFlags] {
        &self.flags
    }

    fn ready(&self) -> GridResult<()> {
        self.ctx.check()
    }

    fn translate(&mut self, delta: [f64; 3]) {
        self.rect = self.rect.translated(delta);
    }

    fn set_uniform(&mut self, v: [f64; 3]) -> GridResult<()> {
        self.ctx.check()?;
        self.data.par_iter_mut().for_each(|cell| *cell = v);
        Ok(())
    }

    fn add_values(&mut self, values: &[[f64; 3]]) -> GridResult<()> {
        self.ctx.check()?;
        check_len(self.data.len(), values.len())?;
        self.data
            .par_iter_mut()
            .zip(values.par_iter())
            .for_each(|(d, v)| *d = add(*d, *v));
        Ok(())
    }

    fn copy_values(&mut self, src: &dyn FieldGrid, region: &Rect3) -> GridResult<usize> {
        self.ctx.check()?;
        src.ready()?;
        let plan = copy_plan(&self.grid, &self.rect, src, region);

        // Gather form so each destination cell is written by exactly one task.
        let mut gather: Vec<Option<usize>> = vec![None; self.data.len()];
        for &(dst, s) in &plan {
            gather[dst] = Some(s);
        }
        let src_values = src.values();
        self.data
            .par_iter_mut()
            .zip(gather.par_iter())
            .for_each(|(d, s)| {
                if let Some(s) = *s {
                    *d = src_values[s];
                }
            });
        Ok(plan.len())
    }

    fn shift(&mut self, axis: Axis, delta: f64) -> GridResult<()> {
        self.ctx.check()?;
        let n = self.grid.cells_for_shift(axis, delta);
        if n == 0 {
            return Ok(());
        }
        let grid = self.grid;
        let old = self.data.clone();
        self.data.par_iter_mut().enumerate().for_each(|(idx, v)| {
            *v = match shift_source(&grid, axis, n, idx) {
                Some(s) => old[s],
                None => [0.0; 3],
            };
        });
        Ok(())
    }

    fn clear_region(&mut self, region: &Rect3) -> GridResult<usize> {
        self.ctx.check()?;
        let cells = region_cells(&self.grid, &self.rect, region);
        let mut mask = vec![false; self.data.len()];
        for &idx in &cells {
            mask[idx] = true;
        }
        self.data.par_iter_mut().zip(mask.par_iter()).for_each(|(v, &m)| {
            if m {
                *v = [0.0; 3];
            }
        });
        Ok(cells.len())
    }

    fn recompute_shape_flags(&mut self) -> GridResult<()> {
        self.ctx.check()?;
        let grid = self.grid;
        let data = &self.data;
        self.flags
            .par_iter_mut()
            .enumerate()
            .for_each(|(idx, f)| *f = shape_flags(&grid, data, idx));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_field::VectorField3D;

    fn host() -> VectorField3D {
        let mut f = VectorField3D::new(Rect3::new([0.0; 3], [30.0, 10.0, 1.0]), [5.0, 5.0, 1.0]);
        f.fill_with(|p| [p[0], p[1], 1.0]);
        f
    }

    #[test]
    fn upload_copies_values_and_flags() {
        let ctx = DeviceContext::new(0, "sim0");
        let h = host();
        let d = DeviceMirror::upload(&ctx, &h).unwrap();
        assert_eq!(d.values(), h.values());
        assert_eq!(d.flags(), h.flags());
        assert_eq!(d.backend(), Backend::Device(0));
    }

    #[test]
    fn lost_context_fails_every_operation() {
        let ctx = DeviceContext::new(3, "sim3");
        let h = host();
        let mut d = DeviceMirror::upload(&ctx, &h).unwrap();
        ctx.mark_lost();

        assert_eq!(d.ready(), Err(GridError::ContextLost { device: 3 }));
        assert!(d.shift(Axis::X, 5.0).is_err());
        assert!(d.set_uniform([0.0; 3]).is_err());
        assert!(d.recompute_shape_flags().is_err());

        // Reading from a lost mirror fails on the host side too.
        let mut other = host();
        assert!(other.copy_values(&d, &h.rect).is_err());
        assert!(DeviceMirror::upload(&ctx, &h).is_err());
    }

    #[test]
    fn load_from_rejects_layout_mismatch() {
        let ctx = DeviceContext::new(1, "sim1");
        let mut d = DeviceMirror::upload(&ctx, &host()).unwrap();
        let small = VectorField3D::new(Rect3::new([0.0; 3], [10.0, 10.0, 1.0]), [5.0, 5.0, 1.0]);
        assert_eq!(
            d.load_from(&small),
            Err(GridError::LayoutMismatch { expected: 12, found: 4 })
        );
    }
}
