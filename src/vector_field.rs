// src/vector_field.rs
//
// Cell-centred 3-vector fields (magnetisation, effective field) and the backend
// interface shared by the host copy and device mirrors.
//
// Conventions:
// - `rect` is the absolute footprint of the field; `grid` tiles it exactly.
// - A cell is *occupied* (part of the mesh shape) when its vector is non-zero.
//   Shape flags are derived from occupancy only, never from physics.
// - Copies, shifts and clears go through the `FieldGrid` trait so relocation code is
//   written once for both backends. The geometric planning (which cell goes where)
//   lives in the plan helpers at the bottom of this file and is shared by both.

use crate::device::DeviceId;
use crate::error::{GridError, GridResult};
use crate::grid::Grid3D;
use crate::region::{Axis, Rect3};
use crate::vec3::{add, is_zero};

/// Per-cell shape flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellFlags(pub u8);

impl CellFlags {
    pub const NOT_EMPTY: u8 = 1 << 0;
    pub const NGBR_PX: u8 = 1 << 1;
    pub const NGBR_NX: u8 = 1 << 2;
    pub const NGBR_PY: u8 = 1 << 3;
    pub const NGBR_NY: u8 = 1 << 4;
    pub const NGBR_PZ: u8 = 1 << 5;
    pub const NGBR_NZ: u8 = 1 << 6;

    const ALL_NGBR: u8 = Self::NGBR_PX
        | Self::NGBR_NX
        | Self::NGBR_PY
        | Self::NGBR_NY
        | Self::NGBR_PZ
        | Self::NGBR_NZ;

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 & Self::NOT_EMPTY == 0
    }

    #[inline]
    pub fn has(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    /// Occupied cell with at least one empty (or out-of-grid) neighbour.
    ///
    /// Along an axis with a single cell there are no neighbours to require, so that
    /// axis never makes a cell a boundary cell.
    #[inline]
    pub fn is_boundary(self, grid: &Grid3D) -> bool {
        if self.is_empty() {
            return false;
        }
        let mut need = Self::ALL_NGBR;
        if grid.nx == 1 {
            need &= !(Self::NGBR_PX | Self::NGBR_NX);
        }
        if grid.ny == 1 {
            need &= !(Self::NGBR_PY | Self::NGBR_NY);
        }
        if grid.nz == 1 {
            need &= !(Self::NGBR_PZ | Self::NGBR_NZ);
        }
        self.0 & need != need
    }
}

/// Where a grid's data lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Host,
    Device(DeviceId),
}

/// Operations every field backend supports with identical semantics.
///
/// All regions are absolute. Implementations for device memory complete the work
/// before returning, so a caller may read the output of one call in the next.
pub trait FieldGrid {
    fn backend(&self) -> Backend;
    fn grid(&self) -> Grid3D;
    fn rect(&self) -> Rect3;
    fn values(&self) -> &[[f64; 3]];
    fn flags(&self) -> &[CellFlags];

    /// Fails if the backing storage can no longer be used.
    fn ready(&self) -> GridResult<()> {
        Ok(())
    }

    /// Move the footprint; the data moves with it.
    fn translate(&mut self, delta: [f64; 3]);

    fn set_uniform(&mut self, v: [f64; 3]) -> GridResult<()>;

    /// Add `values` (one per cell, same layout) to the current contents.
    fn add_values(&mut self, values: &[[f64; 3]]) -> GridResult<()>;

    /// Copy values of `src` into this grid over `region`, matching cells by absolute
    /// position. Returns the number of cells written.
    fn copy_values(&mut self, src: &dyn FieldGrid, region: &Rect3) -> GridResult<usize>;

    /// Shift the contents by `delta` along `axis` (whole cells), zero-filling vacated cells.
    fn shift(&mut self, axis: Axis, delta: f64) -> GridResult<()>;

    /// Zero every cell in `region`. Returns the number of cells cleared.
    fn clear_region(&mut self, region: &Rect3) -> GridResult<usize>;

    /// Recompute shape flags from the current occupancy.
    fn recompute_shape_flags(&mut self) -> GridResult<()>;

    /// Value of the cell containing absolute point `p`, if inside the grid.
    fn sample(&self, p: [f64; 3]) -> Option<[f64; 3]> {
        let g = self.grid();
        let ijk = g.cell_containing(self.rect().s, p)?;
        Some(self.values()[g.idx(ijk[0], ijk[1], ijk[2])])
    }

    fn n_occupied(&self) -> usize {
        self.flags().iter().filter(|f| !f.is_empty()).count()
    }
}

/// Host-resident field.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorField3D {
    pub grid: Grid3D,
    pub rect: Rect3,
    pub data: Vec<[f64; 3]>,
    flags: Vec<CellFlags>,
}

impl VectorField3D {
    /// New zero field tiling `rect` with (approximately) the given cell size.
    pub fn new(rect: Rect3, cellsize: [f64; 3]) -> Self {
        let grid = Grid3D::covering(&rect, cellsize);
        let n = grid.n_cells();
        Self {
            grid,
            rect,
            data: vec![[0.0; 3]; n],
            flags: vec![CellFlags::default(); n],
        }
    }

    /// Flat index for grid indices (i, j, k).
    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        self.grid.idx(i, j, k)
    }

    /// Set every cell from a function of its absolute centre, then refresh flags.
    pub fn fill_with<F>(&mut self, f: F)
    where
        F: Fn([f64; 3]) -> [f64; 3],
    {
        let origin = self.rect.s;
        for idx in 0..self.data.len() {
            let c = self.grid.cell_center(origin, self.grid.ijk(idx));
            self.data[idx] = f(c);
        }
        self.refresh_flags();
    }

    /// Overwrite the contents with another field's values (same layout required).
    pub fn load_values(&mut self, values: &[[f64; 3]]) -> GridResult<()> {
        check_len(self.data.len(), values.len())?;
        self.data.copy_from_slice(values);
        Ok(())
    }

    fn refresh_flags(&mut self) {
        for idx in 0..self.data.len() {
            self.flags[idx] = shape_flags(&self.grid, &self.data, idx);
        }
    }
}

impl FieldGrid for VectorField3D {
    fn backend(&self) -> Backend {
        Backend::Host
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

    fn translate(&mut self, delta: [f64; 3]) {
        self.rect = self.rect.translated(delta);
    }

    fn set_uniform(&mut self, v: [f64; 3]) -> GridResult<()> {
        for cell in &mut self.data {
            *cell = v;
        }
        Ok(())
    }

    fn add_values(&mut self, values: &[[f64; 3]]) -> GridResult<()> {
        check_len(self.data.len(), values.len())?;
        for (d, v) in self.data.iter_mut().zip(values) {
            *d = add(*d, *v);
        }
        Ok(())
    }

    fn copy_values(&mut self, src: &dyn FieldGrid, region: &Rect3) -> GridResult<usize> {
        src.ready()?;
        let plan = copy_plan(&self.grid, &self.rect, src, region);
        let src_values = src.values();
        for &(dst, s) in &plan {
            self.data[dst] = src_values[s];
        }
        Ok(plan.len())
    }

    fn shift(&mut self, axis: Axis, delta: f64) -> GridResult<()> {
        let n = self.grid.cells_for_shift(axis, delta);
        if n == 0 {
            return Ok(());
        }
        let old = self.data.clone();
        for idx in 0..self.data.len() {
            self.data[idx] = match shift_source(&self.grid, axis, n, idx) {
                Some(s) => old[s],
                None => [0.0; 3],
            };
        }
        Ok(())
    }

    fn clear_region(&mut self, region: &Rect3) -> GridResult<usize> {
        let cells = region_cells(&self.grid, &self.rect, region);
        for &idx in &cells {
            self.data[idx] = [0.0; 3];
        }
        Ok(cells.len())
    }

    fn recompute_shape_flags(&mut self) -> GridResult<()> {
        self.refresh_flags();
        Ok(())
    }
}

// ------------------------------------------------------------
// Plans shared by all backends.
// ------------------------------------------------------------

pub(crate) fn check_len(expected: usize, found: usize) -> GridResult<()> {
    if expected == found {
        Ok(())
    } else {
        Err(GridError::LayoutMismatch { expected, found })
    }
}

/// (dst_idx, src_idx) pairs for copying `src` into a grid (`dst_grid` over `dst_rect`)
/// across the absolute `region`. Destination cells are matched to the source cell
/// containing their centre; cells with no source cell are left out.
pub(crate) fn copy_plan(
    dst_grid: &Grid3D,
    dst_rect: &Rect3,
    src: &dyn FieldGrid,
    region: &Rect3,
) -> Vec<(usize, usize)> {
    let Some(region) = region.intersection(dst_rect) else {
        return Vec::new();
    };
    let src_grid = src.grid();
    let src_origin = src.rect().s;
    let bx = dst_grid.box_from_rect(dst_rect.s, &region);

    bx.cells()
        .filter_map(|ijk| {
            let p = dst_grid.cell_center(dst_rect.s, ijk);
            let s = src_grid.cell_containing(src_origin, p)?;
            Some((
                dst_grid.idx(ijk[0], ijk[1], ijk[2]),
                src_grid.idx(s[0], s[1], s[2]),
            ))
        })
        .collect()
}

/// Flat indices of the cells of a grid covered by the absolute `region`.
pub(crate) fn region_cells(grid: &Grid3D, rect: &Rect3, region: &Rect3) -> Vec<usize> {
    grid.box_from_rect(rect.s, region)
        .cells()
        .map(|[i, j, k]| grid.idx(i, j, k))
        .collect()
}

/// Source cell whose value lands in `dst_idx` after shifting by `n` cells along `axis`.
#[inline]
pub(crate) fn shift_source(grid: &Grid3D, axis: Axis, n: isize, dst_idx: usize) -> Option<usize> {
    let mut ijk = grid.ijk(dst_idx);
    let c = axis.index();
    let s = ijk[c] as isize - n;
    if s < 0 || s >= grid.n_along(axis) as isize {
        return None;
    }
    ijk[c] = s as usize;
    Some(grid.idx(ijk[0], ijk[1], ijk[2]))
}

/// Shape flags of one cell, from occupancy of the cell and its face neighbours.
pub(crate) fn shape_flags(grid: &Grid3D, data: &[[f64; 3]], idx: usize) -> CellFlags {
    if is_zero(data[idx]) {
        return CellFlags::default();
    }
    let [i, j, k] = grid.ijk(idx);
    let occupied = |i: usize, j: usize, k: usize| !is_zero(data[grid.idx(i, j, k)]);

    let mut f = CellFlags::NOT_EMPTY;
    if i + 1 < grid.nx && occupied(i + 1, j, k) {
        f |= CellFlags::NGBR_PX;
    }
    if i > 0 && occupied(i - 1, j, k) {
        f |= CellFlags::NGBR_NX;
    }
    if j + 1 < grid.ny && occupied(i, j + 1, k) {
        f |= CellFlags::NGBR_PY;
    }
    if j > 0 && occupied(i, j - 1, k) {
        f |= CellFlags::NGBR_NY;
    }
    if k + 1 < grid.nz && occupied(i, j, k + 1) {
        f |= CellFlags::NGBR_PZ;
    }
    if k > 0 && occupied(i, j, k - 1) {
        f |= CellFlags::NGBR_NZ;
    }
    CellFlags(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_field() -> VectorField3D {
        // 6 × 2 × 1 cells of 5 × 5 × 1 over [20,50]×[0,10]×[0,1].
        let rect = Rect3::new([20.0, 0.0, 0.0], [50.0, 10.0, 1.0]);
        let mut f = VectorField3D::new(rect, [5.0, 5.0, 1.0]);
        f.fill_with(|p| [p[0], 0.0, 1.0]);
        f
    }

    #[test]
    fn shift_moves_content_and_zero_fills() {
        let mut f = strip_field();
        f.shift(Axis::X, -5.0).unwrap();

        // Cell i now holds what cell i+1 held; the last column is vacated.
        for j in 0..2 {
            for i in 0..5 {
                let expected = 20.0 + (i as f64 + 1.5) * 5.0;
                assert_eq!(f.data[f.idx(i, j, 0)][0], expected);
            }
            assert_eq!(f.data[f.idx(5, j, 0)], [0.0; 3]);
        }
    }

    #[test]
    fn sub_cell_shift_is_a_no_op() {
        let mut f = strip_field();
        let before = f.data.clone();
        f.shift(Axis::X, 1.0).unwrap();
        assert_eq!(f.data, before);
    }

    #[test]
    fn copy_matches_cells_by_absolute_position() {
        let src = strip_field();
        let holder_rect = Rect3::new([0.0, 0.0, 0.0], [100.0, 10.0, 1.0]);
        let mut holder = VectorField3D::new(holder_rect, [5.0, 5.0, 1.0]);

        let region = Rect3::new([20.0, 0.0, 0.0], [25.0, 10.0, 1.0]);
        let n = holder.copy_values(&src, &region).unwrap();
        assert_eq!(n, 2);
        assert_eq!(holder.data[holder.idx(4, 0, 0)], [22.5, 0.0, 1.0]);
        assert_eq!(holder.data[holder.idx(4, 1, 0)], [22.5, 0.0, 1.0]);
        assert_eq!(holder.data[holder.idx(5, 0, 0)], [0.0; 3]);
    }

    #[test]
    fn copy_outside_source_leaves_destination_untouched() {
        let src = strip_field();
        let mut holder = VectorField3D::new(Rect3::new([0.0; 3], [100.0, 10.0, 1.0]), [5.0, 5.0, 1.0]);
        holder.set_uniform([0.0, 1.0, 0.0]).unwrap();

        let n = holder
            .copy_values(&src, &Rect3::new([60.0, 0.0, 0.0], [70.0, 10.0, 1.0]))
            .unwrap();
        assert_eq!(n, 0);
        assert!(holder.data.iter().all(|&v| v == [0.0, 1.0, 0.0]));
    }

    #[test]
    fn clear_region_and_flags_track_occupancy() {
        let mut f = strip_field();
        f.recompute_shape_flags().unwrap();
        assert_eq!(f.n_occupied(), 12);

        let cleared = f
            .clear_region(&Rect3::new([20.0, 0.0, 0.0], [30.0, 10.0, 1.0]))
            .unwrap();
        assert_eq!(cleared, 4);
        f.recompute_shape_flags().unwrap();
        assert_eq!(f.n_occupied(), 8);

        let g = f.grid;
        let first = f.flags()[f.idx(2, 0, 0)];
        assert!(!first.is_empty());
        assert!(!first.has(CellFlags::NGBR_NX));
        assert!(first.has(CellFlags::NGBR_PX));
        assert!(first.is_boundary(&g));
        assert!(f.flags()[f.idx(0, 0, 0)].is_empty());
    }

    #[test]
    fn interior_cells_are_not_boundary() {
        let rect = Rect3::new([0.0; 3], [3.0, 3.0, 1.0]);
        let mut f = VectorField3D::new(rect, [1.0; 3]);
        f.set_uniform([1.0, 0.0, 0.0]).unwrap();
        f.recompute_shape_flags().unwrap();
        let g = f.grid;
        assert!(!f.flags()[f.idx(1, 1, 0)].is_boundary(&g));
        assert!(f.flags()[f.idx(0, 1, 0)].is_boundary(&g));
    }

    #[test]
    fn sample_reads_by_position_and_follows_translation() {
        let mut f = strip_field();
        assert_eq!(f.sample([21.0, 1.0, 0.5]), Some([22.5, 0.0, 1.0]));
        f.translate([-5.0, 0.0, 0.0]);
        assert_eq!(f.sample([16.0, 1.0, 0.5]), Some([22.5, 0.0, 1.0]));
        assert_eq!(f.sample([47.0, 1.0, 0.5]), None);
    }
}
