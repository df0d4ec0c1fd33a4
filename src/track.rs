// src/track.rs
//
// Moving-window track shifting.
//
// A dormant holder mesh stores magnetisation for the parts of a long track that are not
// inside any active window mesh. Each accepted step, the holder accumulates
// `velocity * dt` as shift debt; once the debt reaches the clip granularity on an axis,
// data is relocated so the windows appear to slide along the track:
//
//   1. trailing strip of each window  -> holder
//   2. window contents shift by -s (vacated cells zero-filled)
//   3. holder rectangle translates by -s
//   4. holder data now under the leading strip -> window; cleared in the holder
//
// All regions are absolute. Windows never move; the holder does.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::coupling;
use crate::effective_field::ModuleKind;
use crate::error::{TrackError, TrackResult};
use crate::mesh::Mesh;
use crate::region::{Axis, Rect3};
use crate::registry::{MeshId, MeshLookup, StepClock};
use crate::sync;
use crate::vec3::{add, is_zero, scale, sub};

/// Tolerance used when comparing |debt| against a multiple of the clip.
const CLIP_EPS: f64 = 1e-9;

/// Whether tracking is running.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Motion {
    #[default]
    Stopped,
    Moving { velocity: [f64; 3] },
}

/// Tracking configuration and accumulator of one holder mesh.
///
/// Invariant: `windows` is non-empty iff `motion` is `Moving` with a non-zero velocity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackState {
    windows: Vec<MeshId>,
    motion: Motion,
    clip: [f64; 3],
    shift_debt: [f64; 3],
    last_time: f64,
}

impl TrackState {
    pub fn windows(&self) -> &[MeshId] {
        &self.windows
    }

    pub fn motion(&self) -> Motion {
        self.motion
    }

    /// Zero when stopped.
    pub fn velocity(&self) -> [f64; 3] {
        match self.motion {
            Motion::Stopped => [0.0; 3],
            Motion::Moving { velocity } => velocity,
        }
    }

    pub fn clip(&self) -> [f64; 3] {
        self.clip
    }

    pub fn shift_debt(&self) -> [f64; 3] {
        self.shift_debt
    }

    pub fn last_time(&self) -> f64 {
        self.last_time
    }

    pub fn is_active(&self) -> bool {
        matches!(self.motion, Motion::Moving { .. }) && !self.windows.is_empty()
    }

    fn reset_accumulator(&mut self) {
        self.shift_debt = [0.0; 3];
        self.last_time = 0.0;
    }
}

/// Shift granularity on each axis: `clip` rounded up to whole cells of size `h`, and
/// never less than one cell. A zero clip therefore moves one cell at a time.
pub fn shift_quantum(clip: [f64; 3], h: [f64; 3]) -> [f64; 3] {
    let mut q = [0.0; 3];
    for c in 0..3 {
        let cells = (clip[c] / h[c] - CLIP_EPS).ceil().max(1.0);
        q[c] = cells * h[c];
    }
    q
}

/// Part of `debt` that may be applied now on a grid with cell size `h`: the largest
/// multiple of the shift quantum not exceeding |debt|, with the sign of the debt.
pub fn eligible_shift(debt: [f64; 3], clip: [f64; 3], h: [f64; 3]) -> [f64; 3] {
    let q = shift_quantum(clip, h);
    let mut shift = [0.0; 3];
    for c in 0..3 {
        let n = (debt[c].abs() / q[c] + CLIP_EPS).floor();
        shift[c] = n * q[c] * debt[c].signum();
    }
    shift
}

/// Strip of `window` whose data leaves it during a shift by `s` along `axis`.
pub fn trailing_strip(window: &Rect3, axis: Axis, s: f64) -> Rect3 {
    let c = axis.index();
    if s > 0.0 {
        window.with_axis_range(axis, window.s[c], window.s[c] + s)
    } else {
        window.with_axis_range(axis, window.e[c] + s, window.e[c])
    }
}

/// Strip of `window` vacated by a shift and refilled from the holder.
pub fn leading_strip(window: &Rect3, axis: Axis, s: f64) -> Rect3 {
    let c = axis.index();
    if s > 0.0 {
        window.with_axis_range(axis, window.e[c] - s, window.e[c])
    } else {
        window.with_axis_range(axis, window.s[c], window.s[c] - s)
    }
}

/// What a configure call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigureReport {
    /// Windows tracked after the call.
    pub tracked: Vec<MeshId>,
    /// Windows released (disable request).
    pub released: Vec<MeshId>,
    /// Requested or previously tracked ids that did not resolve to a mesh.
    pub unresolved: Vec<MeshId>,
    /// Magnetisation cells copied between holder and windows.
    pub cells_copied: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShiftOutcome {
    /// Nothing to do this step.
    Idle,
    /// Debt accumulated but below the clip.
    Accumulated { debt: [f64; 3] },
    Shifted {
        shift: [f64; 3],
        /// Windows whose data was relocated.
        windows: Vec<MeshId>,
        /// Windows that received the holder's recomputed stray field.
        stray_field_targets: Vec<MeshId>,
    },
}

/// Set up, replace or disable tracking on `holder`.
///
/// A zero `velocity` releases every tracked window: its data over the overlap with the
/// holder is copied back into the holder. A non-zero `velocity` replaces the tracked
/// set with `ids`: holder data over each overlap is moved into the window.
///
/// Copy failures are collected into `TrackError::Configure`; copies already applied
/// are kept and the new state is committed regardless.
pub fn configure(
    holder: &mut Mesh,
    meshes: &mut dyn MeshLookup,
    ids: &[MeshId],
    velocity: [f64; 3],
    clip: [f64; 3],
) -> TrackResult<ConfigureReport> {
    if clip.iter().any(|c| !c.is_finite() || *c < 0.0) {
        return Err(TrackError::InvalidClip { clip });
    }
    if velocity.iter().any(|v| !v.is_finite()) {
        return Err(TrackError::InvalidVelocity { velocity });
    }

    let hid = holder.id();
    let mut report = ConfigureReport::default();
    let mut failures = Vec::new();

    if is_zero(velocity) {
        for id in std::mem::take(&mut holder.track.windows) {
            let Some(window) = meshes.resolve(id) else {
                report.unresolved.push(id);
                continue;
            };
            if let Some(overlap) = window.rect().intersection(&holder.rect()) {
                match holder.copy_magnetization_from(window, &overlap) {
                    Ok(n) => report.cells_copied += n,
                    Err(e) => failures.push(TrackError::critical(hid, e)),
                }
            }
            report.released.push(id);
        }
        holder.track.motion = Motion::Stopped;
        holder.track.clip = clip;
        holder.track.reset_accumulator();
        if let Err(e) = holder.refresh_shape() {
            failures.push(TrackError::critical(hid, e));
        }
        info!(
            "mesh {hid}: track shifting disabled, released {:?}",
            report.released
        );
    } else {
        holder.track.windows.clear();
        holder.track.reset_accumulator();
        for &id in ids {
            if holder.track.windows.contains(&id) {
                continue;
            }
            let Some(window) = meshes.resolve_mut(id) else {
                warn!("mesh {hid}: track window {id} does not exist, skipped");
                if !report.unresolved.contains(&id) {
                    report.unresolved.push(id);
                }
                continue;
            };
            holder.track.reset_accumulator();
            holder.track.windows.push(id);

            if let Some(overlap) = window.rect().intersection(&holder.rect()) {
                match window.copy_magnetization_from(holder, &overlap) {
                    Ok(n) => {
                        report.cells_copied += n;
                        if let Err(e) = holder.clear_magnetization(&overlap) {
                            failures.push(TrackError::critical(hid, e));
                        }
                    }
                    Err(e) => failures.push(TrackError::critical(id, e)),
                }
            }
            if let Err(e) = window.refresh_shape() {
                failures.push(TrackError::critical(id, e));
            }
        }
        if let Err(e) = holder.refresh_shape() {
            failures.push(TrackError::critical(hid, e));
        }

        holder.track.clip = clip;
        holder.track.motion = if holder.track.windows.is_empty() {
            Motion::Stopped
        } else {
            Motion::Moving { velocity }
        };
        report.tracked = holder.track.windows.clone();
        info!(
            "mesh {hid}: tracking {:?} at velocity {velocity:?}, clip {clip:?}",
            report.tracked
        );
    }

    if failures.is_empty() {
        Ok(report)
    } else {
        Err(TrackError::Configure { failures })
    }
}

/// One step of track shifting for `holder`, at `clock`.
///
/// Returns `Idle` unless the holder is dormant, tracking is active and the step was
/// accepted. A time regression resets the accumulator and applies nothing. Any grid
/// failure during relocation is critical; meshes with a device stay flagged dirty.
pub fn step_shift(
    holder: &mut Mesh,
    meshes: &mut dyn MeshLookup,
    clock: StepClock,
) -> TrackResult<ShiftOutcome> {
    if !holder.is_dormant() || !holder.track.is_active() || !clock.step_accepted {
        return Ok(ShiftOutcome::Idle);
    }
    let hid = holder.id();
    let t = clock.time;

    if t < holder.track.last_time {
        warn!(
            "mesh {hid}: time went back from {} to {t}, shift debt reset",
            holder.track.last_time
        );
        holder.track.shift_debt = [0.0; 3];
        holder.track.last_time = t;
        return Ok(ShiftOutcome::Idle);
    }

    let dt = t - holder.track.last_time;
    let debt = add(holder.track.shift_debt, scale(holder.track.velocity(), dt));
    let shift = eligible_shift(debt, holder.track.clip, holder.cellsize());

    if is_zero(shift) {
        debug!("mesh {hid}: shift debt {debt:?}");
        holder.track.shift_debt = debt;
        holder.track.last_time = t;
        return Ok(ShiftOutcome::Accumulated { debt });
    }

    let windows = compatible_windows(holder, meshes);

    // Set before touching any data so an aborted pass still forces a resync.
    if holder.has_device() {
        sync::mark_dirty(holder);
    }
    for &id in &windows {
        if let Some(w) = meshes.resolve_mut(id) {
            if w.has_device() {
                sync::mark_dirty(w);
            }
        }
    }

    for axis in Axis::ALL {
        let s = shift[axis.index()];
        if s != 0.0 {
            relocate_along(holder, meshes, &windows, axis, s)?;
        }
    }

    for &id in &windows {
        if let Some(w) = meshes.resolve_mut(id) {
            w.refresh_shape().map_err(|e| TrackError::critical(id, e))?;
        }
    }
    holder
        .refresh_shape()
        .map_err(|e| TrackError::critical(hid, e))?;

    let mut stray_field_targets = Vec::new();
    if holder.is_module_set(ModuleKind::Demag) {
        holder
            .clear_effective_field()
            .map_err(|e| TrackError::critical(hid, e))?;
        holder.update_module(ModuleKind::Demag)?;
        for &id in &windows {
            let Some(w) = meshes.resolve_mut(id) else {
                continue;
            };
            if coupling::push_stray_field(holder, w)? {
                stray_field_targets.push(id);
            }
        }
    }

    holder.track.shift_debt = sub(debt, shift);
    holder.track.last_time = t;
    info!(
        "mesh {hid}: shifted by {shift:?} ({} window(s)), remaining debt {:?}",
        windows.len(),
        holder.track.shift_debt
    );
    Ok(ShiftOutcome::Shifted {
        shift,
        windows,
        stray_field_targets,
    })
}

/// Tracked ids that resolve to a mesh the holder can exchange data with: a compatible
/// kind and the holder's cell size.
fn compatible_windows(holder: &Mesh, meshes: &dyn MeshLookup) -> Vec<MeshId> {
    let h = holder.cellsize();
    holder
        .track
        .windows
        .iter()
        .copied()
        .filter(|&id| {
            let Some(w) = meshes.resolve(id) else {
                return false;
            };
            if !holder.kind().accepts_track_window(w.kind()) {
                debug!(
                    "mesh {}: window {id} ({:?}) skipped, incompatible with {:?}",
                    holder.id(),
                    w.kind(),
                    holder.kind()
                );
                return false;
            }
            let wh = w.cellsize();
            if (0..3).any(|c| (wh[c] - h[c]).abs() > CLIP_EPS * h[c]) {
                debug!(
                    "mesh {}: window {id} skipped, cell size {wh:?} differs from {h:?}",
                    holder.id()
                );
                return false;
            }
            true
        })
        .collect()
}

/// Single-axis relocation of every window followed by the holder translation.
fn relocate_along(
    holder: &mut Mesh,
    meshes: &mut dyn MeshLookup,
    windows: &[MeshId],
    axis: Axis,
    s: f64,
) -> TrackResult<()> {
    let hid = holder.id();

    for &id in windows {
        let Some(w) = meshes.resolve(id) else {
            continue;
        };
        let trailing = trailing_strip(&w.rect(), axis, s);
        if let Some(region) = trailing.intersection(&holder.rect()) {
            holder
                .copy_magnetization_from(w, &region)
                .map_err(|e| TrackError::critical(hid, e))?;
        }
        let w = meshes.resolve_mut(id).ok_or(TrackError::UnknownMesh(id))?;
        w.shift_magnetization(axis, -s)
            .map_err(|e| TrackError::critical(id, e))?;
    }

    holder.translate(axis.vector(-s));

    for &id in windows {
        let Some(w) = meshes.resolve_mut(id) else {
            continue;
        };
        let leading = leading_strip(&w.rect(), axis, s);
        let Some(region) = leading.intersection(&holder.rect()) else {
            continue;
        };
        w.copy_magnetization_from(holder, &region)
            .map_err(|e| TrackError::critical(id, e))?;
        holder
            .clear_magnetization(&region)
            .map_err(|e| TrackError::critical(hid, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: [f64; 3] = [5.0, 5.0, 1.0];

    #[test]
    fn eligible_shift_respects_clip() {
        let clip = [5.0, 0.0, 0.0];
        assert_eq!(eligible_shift([6.0, 0.0, 0.0], clip, H), [5.0, 0.0, 0.0]);
        assert_eq!(eligible_shift([4.0, 0.0, 0.0], clip, H), [0.0; 3]);
        assert_eq!(eligible_shift([-11.0, 0.0, 0.0], clip, H), [-10.0, 0.0, 0.0]);
    }

    #[test]
    fn shifts_are_whole_cells() {
        // Zero clip: every whole cell of debt goes through, the rest waits.
        assert_eq!(eligible_shift([7.0, -3.0, 2.5], [0.0; 3], H), [5.0, 0.0, 2.0]);
        // A clip of 3 on 5-unit cells rounds up to one cell.
        assert_eq!(shift_quantum([3.0, 10.0, 0.0], H), [5.0, 10.0, 1.0]);
        assert_eq!(eligible_shift([4.9, 0.0, 0.0], [3.0, 0.0, 0.0], H), [0.0; 3]);
        assert_eq!(eligible_shift([-9.0, 0.0, 0.0], [3.0, 0.0, 0.0], H), [-5.0, 0.0, 0.0]);
    }

    #[test]
    fn debt_equal_to_clip_shifts_within_tolerance() {
        let h = [0.3, 1.0, 1.0];
        let clip = [0.3, 1.0, 1.0];
        let debt = 0.1 + 0.2; // 0.30000000000000004
        assert_eq!(eligible_shift([debt, 0.0, 0.0], clip, h)[0], 0.3);
        let below = 0.3 - 1e-12;
        assert_eq!(eligible_shift([below, 0.0, 0.0], clip, h)[0], 0.3);
        assert_eq!(eligible_shift([0.29, 0.0, 0.0], clip, h)[0], 0.0);
    }

    #[test]
    fn strips_sit_at_opposite_ends() {
        let w = Rect3::new([20.0, 0.0, 0.0], [50.0, 10.0, 1.0]);

        let t = trailing_strip(&w, Axis::X, 5.0);
        let l = leading_strip(&w, Axis::X, 5.0);
        assert_eq!((t.s[0], t.e[0]), (20.0, 25.0));
        assert_eq!((l.s[0], l.e[0]), (45.0, 50.0));

        let t = trailing_strip(&w, Axis::X, -5.0);
        let l = leading_strip(&w, Axis::X, -5.0);
        assert_eq!((t.s[0], t.e[0]), (45.0, 50.0));
        assert_eq!((l.s[0], l.e[0]), (20.0, 25.0));
        assert_eq!((l.s[1], l.e[1]), (0.0, 10.0));
    }

    #[test]
    fn default_state_is_stopped() {
        let s = TrackState::default();
        assert!(!s.is_active());
        assert_eq!(s.velocity(), [0.0; 3]);
        assert_eq!(s.motion(), Motion::Stopped);
        assert!(s.windows().is_empty());
    }
}
