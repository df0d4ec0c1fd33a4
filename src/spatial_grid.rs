// src/spatial_grid.rs
//
// A mesh quantity as the rest of the crate sees it: the host copy plus at most one
// mirror per device context.
//
// The *active* copy is the one computation runs on: the first (primary) mirror when
// there is one, the host copy otherwise. Shape-changing operations are applied to the
// active copy only, so the owning mesh must flag the divergence (see `sync`) and call
// `resynchronize` before the other copies are used again.

use std::sync::Arc;

use log::debug;

use crate::device::{DeviceContext, DeviceMirror};
use crate::error::{GridError, GridResult};
use crate::region::Rect3;
use crate::vector_field::{FieldGrid, VectorField3D};

#[derive(Debug)]
pub struct SpatialGrid {
    host: VectorField3D,
    mirrors: Vec<DeviceMirror>,
}

impl SpatialGrid {
    pub fn new(rect: Rect3, cellsize: [f64; 3]) -> Self {
        Self::from_host(VectorField3D::new(rect, cellsize))
    }

    pub fn from_host(host: VectorField3D) -> Self {
        Self {
            host,
            mirrors: Vec::new(),
        }
    }

    pub fn host(&self) -> &VectorField3D {
        &self.host
    }

    /// Direct access to the host copy. Writes here are not seen by mirrors until
    /// they are re-attached.
    pub fn host_mut(&mut self) -> &mut VectorField3D {
        &mut self.host
    }

    pub fn active(&self) -> &dyn FieldGrid {
        match self.mirrors.first() {
            Some(m) => m as &dyn FieldGrid,
            None => &self.host,
        }
    }

    pub fn active_mut(&mut self) -> &mut dyn FieldGrid {
        match self.mirrors.first_mut() {
            Some(m) => m as &mut dyn FieldGrid,
            None => &mut self.host,
        }
    }

    pub fn has_mirror(&self) -> bool {
        !self.mirrors.is_empty()
    }

    /// Upload the host copy to a new mirror on `ctx`.
    pub fn attach_mirror(&mut self, ctx: &Arc<DeviceContext>) -> GridResult<()> {
        if self.mirrors.iter().any(|m| m.device() == ctx.id()) {
            return Err(GridError::MirrorExists { device: ctx.id() });
        }
        let m = DeviceMirror::upload(ctx, &self.host)?;
        self.mirrors.push(m);
        Ok(())
    }

    /// Pull the active data back to the host and drop all mirrors.
    pub fn detach_mirrors(&mut self) -> GridResult<()> {
        self.resynchronize()?;
        self.mirrors.clear();
        Ok(())
    }

    /// Move the footprint of every copy.
    pub fn translate(&mut self, delta: [f64; 3]) {
        self.host.translate(delta);
        for m in &mut self.mirrors {
            m.translate(delta);
        }
    }

    /// Bring every copy in line with the primary mirror: values are copied, flags are
    /// recomputed on each side. No-op without mirrors.
    pub fn resynchronize(&mut self) -> GridResult<()> {
        let Some((primary, rest)) = self.mirrors.split_first_mut() else {
            return Ok(());
        };
        primary.ready()?;
        self.host.load_values(primary.values())?;
        self.host.rect = primary.rect();
        self.host.recompute_shape_flags()?;
        for m in rest {
            m.load_from(&*primary)?;
        }
        debug!(
            "resynchronized {} cells from device {}",
            self.host.data.len(),
            primary.device()
        );
        Ok(())
    }
}
