// src/coupling.rs
//
// Stray-field coupling between meshes.

use log::debug;

use crate::error::{TrackError, TrackResult};
use crate::mesh::Mesh;

/// Store the current effective field of `source` as the per-cell external field of
/// `target`'s Zeeman module, replacing whatever was there.
///
/// The field is sampled at the centres of `target`'s cells, by absolute position; cells
/// outside `source` get zero. Returns `Ok(false)` when `target` has no Zeeman module.
pub fn push_stray_field(source: &Mesh, target: &mut Mesh) -> TrackResult<bool> {
    let heff = source.effective_field().active();
    heff.ready()
        .map_err(|e| TrackError::critical(source.id(), e))?;

    let layout = target.effective_field().host();
    let (grid, rect) = (layout.grid, layout.rect);
    let tid = target.id();
    let Some(zeeman) = target.modules.zeeman_mut() else {
        return Ok(false);
    };
    let hits = zeeman.set_field_vec_from(grid, rect, heff);
    debug!(
        "stray field of mesh {} pushed to mesh {tid} ({hits} cells)",
        source.id()
    );
    Ok(true)
}
