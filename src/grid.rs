// src/grid.rs

use serde::{Deserialize, Serialize};

use crate::region::{Axis, Rect3};

/// Tolerance (in cells) used when snapping continuous coordinates to cell boundaries.
const SNAP_EPS: f64 = 1e-9;

/// Simple 3D finite-difference grid: nx × ny × nz cells of size dx × dy × dz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grid3D {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl Grid3D {
    pub fn new(nx: usize, ny: usize, nz: usize, dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            nx,
            ny,
            nz,
            dx,
            dy,
            dz,
        }
    }

    /// Grid covering `rect` with (approximately) the requested cell size.
    ///
    /// Cell counts are rounded to the nearest integer (at least 1) and the cell size is
    /// then adjusted so the cells tile `rect` exactly.
    pub fn covering(rect: &Rect3, cellsize: [f64; 3]) -> Self {
        let size = rect.size();
        let mut n = [1usize; 3];
        let mut h = [0.0; 3];
        for c in 0..3 {
            n[c] = ((size[c] / cellsize[c]).round() as usize).max(1);
            h[c] = size[c] / n[c] as f64;
        }
        Self::new(n[0], n[1], n[2], h[0], h[1], h[2])
    }

    /// Total number of cells.
    pub fn n_cells(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    #[inline]
    pub fn cellsize(&self) -> [f64; 3] {
        [self.dx, self.dy, self.dz]
    }

    #[inline]
    pub fn dims(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    #[inline]
    pub fn n_along(&self, axis: Axis) -> usize {
        self.dims()[axis.index()]
    }

    /// Convert (i, j, k) indices to a flat index into a 1D array.
    #[inline]
    pub fn idx(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.nx && j < self.ny && k < self.nz);
        (k * self.ny + j) * self.nx + i
    }

    /// Inverse of `idx`.
    #[inline]
    pub fn ijk(&self, idx: usize) -> [usize; 3] {
        let i = idx % self.nx;
        let j = (idx / self.nx) % self.ny;
        let k = idx / (self.nx * self.ny);
        [i, j, k]
    }

    /// Cell centre in absolute coordinates, for a grid whose lower corner is `origin`.
    #[inline]
    pub fn cell_center(&self, origin: [f64; 3], ijk: [usize; 3]) -> [f64; 3] {
        let h = self.cellsize();
        [
            origin[0] + (ijk[0] as f64 + 0.5) * h[0],
            origin[1] + (ijk[1] as f64 + 0.5) * h[1],
            origin[2] + (ijk[2] as f64 + 0.5) * h[2],
        ]
    }

    /// Cell containing the absolute point `p`, if it lies inside the grid.
    pub fn cell_containing(&self, origin: [f64; 3], p: [f64; 3]) -> Option<[usize; 3]> {
        let h = self.cellsize();
        let n = self.dims();
        let mut ijk = [0usize; 3];
        for c in 0..3 {
            let f = ((p[c] - origin[c]) / h[c]).floor();
            if f < 0.0 || f >= n[c] as f64 {
                return None;
            }
            ijk[c] = f as usize;
        }
        Some(ijk)
    }

    /// Cells covered by the absolute region `rect`, for a grid whose lower corner is `origin`.
    ///
    /// Region boundaries snap to the nearest cell boundary and the result is clamped to the
    /// grid, so a region outside the grid yields an empty box.
    pub fn box_from_rect(&self, origin: [f64; 3], rect: &Rect3) -> Box3i {
        let h = self.cellsize();
        let n = self.dims();
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        for c in 0..3 {
            lo[c] = snap_clamped((rect.s[c] - origin[c]) / h[c], n[c]);
            hi[c] = snap_clamped((rect.e[c] - origin[c]) / h[c], n[c]).max(lo[c]);
        }
        Box3i::new(lo, [hi[0] - lo[0], hi[1] - lo[1], hi[2] - lo[2]])
    }

    /// Whole number of cells closest to a displacement `delta` along `axis`.
    pub fn cells_for_shift(&self, axis: Axis, delta: f64) -> isize {
        let h = self.cellsize()[axis.index()];
        let f = delta / h;
        // Round half away from zero, but keep e.g. 2.9999999999 as 3.
        (f + f.signum() * SNAP_EPS).round() as isize
    }
}

#[inline]
fn snap_clamped(f: f64, n: usize) -> usize {
    let r = f.round();
    if r <= 0.0 {
        0
    } else if r >= n as f64 {
        n
    } else {
        r as usize
    }
}

/// Integer box in (i, j, k) index space, using half-open intervals:
/// [i0, i0+nx) × [j0, j0+ny) × [k0, k0+nz)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Box3i {
    pub lo: [usize; 3],
    pub n: [usize; 3],
}

impl Box3i {
    #[inline]
    pub fn new(lo: [usize; 3], n: [usize; 3]) -> Self {
        Self { lo, n }
    }

    #[inline]
    pub fn hi(&self) -> [usize; 3] {
        [
            self.lo[0] + self.n[0],
            self.lo[1] + self.n[1],
            self.lo[2] + self.n[2],
        ]
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n.iter().any(|&n| n == 0)
    }

    /// All cells in the box, in flat-index order (i fastest).
    pub fn cells(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let hi = self.hi();
        (self.lo[2]..hi[2]).flat_map(move |k| {
            (self.lo[1]..hi[1]).flat_map(move |j| (self.lo[0]..hi[0]).map(move |i| [i, j, k]))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_indexing_is_consistent() {
        let g = Grid3D::new(4, 3, 2, 1.0, 1.0, 1.0);
        assert_eq!(g.idx(0, 0, 0), 0);
        assert_eq!(g.idx(1, 0, 0), 1);
        assert_eq!(g.idx(0, 1, 0), 4);
        assert_eq!(g.idx(3, 2, 1), 23);
        assert_eq!(g.n_cells(), 24);
        for idx in 0..g.n_cells() {
            let [i, j, k] = g.ijk(idx);
            assert_eq!(g.idx(i, j, k), idx);
        }
    }

    #[test]
    fn covering_grid_tiles_rect() {
        let r = Rect3::new([0.0; 3], [100.0, 10.0, 1.0]);
        let g = Grid3D::covering(&r, [5.0, 5.0, 1.0]);
        assert_eq!(g.dims(), [20, 2, 1]);
        assert_eq!(g.cellsize(), [5.0, 5.0, 1.0]);
    }

    #[test]
    fn box_from_rect_snaps_and_clamps() {
        let g = Grid3D::new(20, 2, 1, 5.0, 5.0, 1.0);
        let origin = [0.0; 3];
        let b = g.box_from_rect(origin, &Rect3::new([20.0, 0.0, 0.0], [25.0, 10.0, 1.0]));
        assert_eq!(b, Box3i::new([4, 0, 0], [1, 2, 1]));

        // Partially outside: clamped.
        let b = g.box_from_rect(origin, &Rect3::new([-10.0, 0.0, 0.0], [5.0, 10.0, 1.0]));
        assert_eq!(b, Box3i::new([0, 0, 0], [1, 2, 1]));

        // Entirely outside: empty.
        let b = g.box_from_rect(origin, &Rect3::new([120.0, 0.0, 0.0], [130.0, 10.0, 1.0]));
        assert!(b.is_empty());
    }

    #[test]
    fn cell_lookup_round_trips_centres() {
        let g = Grid3D::new(6, 2, 1, 5.0, 5.0, 1.0);
        let origin = [20.0, 0.0, 0.0];
        let c = g.cell_center(origin, [3, 1, 0]);
        assert_eq!(c, [37.5, 7.5, 0.5]);
        assert_eq!(g.cell_containing(origin, c), Some([3, 1, 0]));
        assert_eq!(g.cell_containing(origin, [19.0, 1.0, 0.5]), None);
    }

    #[test]
    fn shift_cells_round_to_nearest() {
        let g = Grid3D::new(6, 2, 1, 5.0, 5.0, 1.0);
        assert_eq!(g.cells_for_shift(Axis::X, 5.0), 1);
        assert_eq!(g.cells_for_shift(Axis::X, -10.0), -2);
        assert_eq!(g.cells_for_shift(Axis::X, 14.999_999_999), 3);
        assert_eq!(g.cells_for_shift(Axis::X, 1.0), 0);
    }

    #[test]
    fn box_cells_iterate_in_flat_order() {
        let b = Box3i::new([1, 0, 0], [2, 2, 1]);
        let cells: Vec<_> = b.cells().collect();
        assert_eq!(cells, vec![[1, 0, 0], [2, 0, 0], [1, 1, 0], [2, 1, 0]]);
        assert_eq!(b.hi(), [3, 2, 1]);
    }
}
