// src/effective_field/zeeman.rs

use crate::effective_field::{FieldContext, FieldModule, ModuleKind};
use crate::error::{TrackError, TrackResult};
use crate::grid::Grid3D;
use crate::region::Rect3;
use crate::vec3::add;
use crate::vector_field::{FieldGrid, VectorField3D};

/// Applied field: a uniform part plus an optional per-cell part supplied from outside
/// (e.g. the stray field of a neighbouring mesh).
#[derive(Debug, Clone, PartialEq)]
pub struct Zeeman {
    pub h_ext: [f64; 3],
    field_vec: Option<VectorField3D>,
}

impl Zeeman {
    pub fn new(h_ext: [f64; 3]) -> Self {
        Self {
            h_ext,
            field_vec: None,
        }
    }

    pub fn field_vec(&self) -> Option<&VectorField3D> {
        self.field_vec.as_ref()
    }

    /// Replace the per-cell field with `source` sampled at each cell centre of a grid
    /// with layout (`grid`, `rect`). Cells outside `source` get zero.
    ///
    /// Returns the number of cells that found a source value.
    pub fn set_field_vec_from(&mut self, grid: Grid3D, rect: Rect3, source: &dyn FieldGrid) -> usize {
        let mut f = VectorField3D::new(rect, grid.cellsize());
        let mut hits = 0;
        for idx in 0..f.data.len() {
            let p = f.grid.cell_center(rect.s, f.grid.ijk(idx));
            if let Some(h) = source.sample(p) {
                f.data[idx] = h;
                hits += 1;
            }
        }
        self.field_vec = Some(f);
        hits
    }
}

impl FieldModule for Zeeman {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Zeeman
    }

    fn update_field(&mut self, ctx: FieldContext<'_>) -> TrackResult<()> {
        let n = ctx.heff.values().len();
        let contribution: Vec<[f64; 3]> = match &self.field_vec {
            Some(f) if f.data.len() == n => f.data.iter().map(|&h| add(h, self.h_ext)).collect(),
            Some(f) => {
                return Err(TrackError::Module {
                    kind: ModuleKind::Zeeman,
                    message: format!("field vector has {} cells, mesh has {}", f.data.len(), n),
                })
            }
            None => vec![self.h_ext; n],
        };
        ctx.heff.add_values(&contribution)?;
        if let Some(heff2) = ctx.heff2 {
            heff2.add_values(&contribution)?;
        }
        Ok(())
    }

    fn as_zeeman(&self) -> Option<&Zeeman> {
        Some(self)
    }

    fn as_zeeman_mut(&mut self) -> Option<&mut Zeeman> {
        Some(self)
    }
}
