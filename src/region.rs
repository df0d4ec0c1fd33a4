// src/region.rs
//
// Axis-aligned boxes in continuous (physical) coordinates.
//
// A `Rect3` is the footprint of a mesh, a field grid, or a sub-region that is
// being copied between grids. All rects are in absolute simulation coordinates;
// converting to cell indices is the grid's business (see `grid::Grid3D`).

use serde::{Deserialize, Serialize};

use crate::vec3::{add, sub};

/// Cartesian axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// Vector of length `len` along this axis.
    #[inline]
    pub fn vector(self, len: f64) -> [f64; 3] {
        let mut v = [0.0; 3];
        v[self.index()] = len;
        v
    }
}

/// Axis-aligned rectangular region `[s, e]`, with `s <= e` componentwise.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect3 {
    pub s: [f64; 3],
    pub e: [f64; 3],
}

impl Rect3 {
    /// Build a rect from two corners; the corners are sorted per axis.
    pub fn new(a: [f64; 3], b: [f64; 3]) -> Self {
        let mut s = [0.0; 3];
        let mut e = [0.0; 3];
        for c in 0..3 {
            s[c] = a[c].min(b[c]);
            e[c] = a[c].max(b[c]);
        }
        Self { s, e }
    }

    #[inline]
    pub fn size(&self) -> [f64; 3] {
        sub(self.e, self.s)
    }

    /// Zero (or negative) extent on at least one axis.
    #[inline]
    pub fn is_null(&self) -> bool {
        (0..3).any(|c| self.e[c] <= self.s[c])
    }

    pub fn translated(&self, delta: [f64; 3]) -> Rect3 {
        Rect3 {
            s: add(self.s, delta),
            e: add(self.e, delta),
        }
    }

    /// Overlap of two rects, or `None` if they do not overlap with positive volume.
    pub fn intersection(&self, other: &Rect3) -> Option<Rect3> {
        let mut s = [0.0; 3];
        let mut e = [0.0; 3];
        for c in 0..3 {
            s[c] = self.s[c].max(other.s[c]);
            e[c] = self.e[c].min(other.e[c]);
            if e[c] <= s[c] {
                return None;
            }
        }
        Some(Rect3 { s, e })
    }

    /// Same rect with the extent along `axis` replaced by `[from, to]`.
    pub fn with_axis_range(&self, axis: Axis, from: f64, to: f64) -> Rect3 {
        let mut r = *self;
        let c = axis.index();
        r.s[c] = from.min(to);
        r.e[c] = from.max(to);
        r
    }

    /// Express this rect relative to `origin` (subtract it from both corners).
    pub fn relative_to(&self, origin: [f64; 3]) -> Rect3 {
        Rect3 {
            s: sub(self.s, origin),
            e: sub(self.e, origin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_of_window_and_holder() {
        let holder = Rect3::new([0.0, 0.0, 0.0], [100.0, 10.0, 1.0]);
        let window = Rect3::new([20.0, 0.0, 0.0], [50.0, 10.0, 1.0]);
        assert_eq!(holder.intersection(&window), Some(window));

        let outside = window.translated([200.0, 0.0, 0.0]);
        assert_eq!(holder.intersection(&outside), None);
    }

    #[test]
    fn touching_rects_do_not_intersect() {
        let a = Rect3::new([0.0; 3], [1.0; 3]);
        let b = a.translated([1.0, 0.0, 0.0]);
        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn new_sorts_corners_and_null_is_zero_volume() {
        let r = Rect3::new([5.0, 1.0, 1.0], [2.0, 0.0, 0.0]);
        assert_eq!(r.s, [2.0, 0.0, 0.0]);
        assert_eq!(r.e, [5.0, 1.0, 1.0]);
        assert!(!r.is_null());
        assert!(r.with_axis_range(Axis::X, 3.0, 3.0).is_null());
    }

    #[test]
    fn axis_range_keeps_other_axes() {
        let r = Rect3::new([20.0, 0.0, 0.0], [50.0, 10.0, 1.0]);
        let strip = r.with_axis_range(Axis::X, 25.0, 20.0);
        assert_eq!(strip.s, [20.0, 0.0, 0.0]);
        assert_eq!(strip.e, [25.0, 10.0, 1.0]);
        assert_eq!(strip.relative_to([20.0, 0.0, 0.0]).e, [5.0, 10.0, 1.0]);
    }
}
