// src/session.rs
//
// Saved session state: per-mesh rectangle, tracking configuration and shape sync flag,
// plus the global clock. Field data itself is not part of the session file; restore it
// separately after the geometry.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::{SessionError, TrackError};
use crate::mesh::Mesh;
use crate::region::Rect3;
use crate::registry::{MeshId, MeshSet};
use crate::sync::ShapeSync;
use crate::track::TrackState;
use crate::vec3::sub;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshSession {
    pub id: MeshId,
    /// Mesh rectangle at save time; a shifted holder has moved from where it was built.
    pub rect: Rect3,
    pub track: TrackState,
    pub shape_sync: ShapeSync,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    pub time: f64,
    pub step_accepted: bool,
    pub meshes: Vec<MeshSession>,
}

impl Mesh {
    pub fn session(&self) -> MeshSession {
        MeshSession {
            id: self.id(),
            rect: self.rect(),
            track: self.track.clone(),
            shape_sync: self.shape_sync,
        }
    }

    /// Move the mesh back to its saved position and restore tracking state.
    pub fn restore_session(&mut self, s: &MeshSession) {
        let delta = sub(s.rect.s, self.rect().s);
        if delta != [0.0; 3] {
            self.translate(delta);
        }
        self.track = s.track.clone();
        self.shape_sync = s.shape_sync;
    }
}

impl MeshSet {
    pub fn session(&self) -> SessionFile {
        SessionFile {
            time: self.time(),
            step_accepted: self.current_step_solved(),
            meshes: self.iter().map(Mesh::session).collect(),
        }
    }

    /// Apply a saved session. Every mesh named in it must exist; nothing is changed
    /// otherwise.
    pub fn restore_session(&mut self, file: &SessionFile) -> Result<(), SessionError> {
        if let Some(s) = file.meshes.iter().find(|s| !self.contains(s.id)) {
            return Err(TrackError::UnknownMesh(s.id).into());
        }
        for s in &file.meshes {
            if let Some(mesh) = self.get_mut(s.id) {
                mesh.restore_session(s);
            }
        }
        self.set_step(file.time, file.step_accepted);
        Ok(())
    }

    pub fn save_session(&self, path: &Path) -> Result<(), SessionError> {
        let w = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(w, &self.session())?;
        Ok(())
    }

    pub fn load_session(&mut self, path: &Path) -> Result<(), SessionError> {
        let r = BufReader::new(File::open(path)?);
        let file: SessionFile = serde_json::from_reader(r)?;
        self.restore_session(&file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshKind;
    use crate::region::Rect3;
    use crate::registry::MeshLookup;

    const CS: [f64; 3] = [5.0, 5.0, 1.0];

    fn holder_and_window() -> (Mesh, Mesh) {
        let holder = Rect3::new([0.0; 3], [100.0, 10.0, 1.0]);
        let window = Rect3::new([20.0, 0.0, 0.0], [50.0, 10.0, 1.0]);
        (
            Mesh::new(0, "holder", MeshKind::Ferromagnetic, holder, CS),
            Mesh::new(1, "a", MeshKind::Ferromagnetic, window, CS),
        )
    }

    fn tracked_set() -> MeshSet {
        let mut s = MeshSet::new();
        let (mut holder, window) = holder_and_window();
        holder.set_dormant(true);
        holder.init_uniform([1.0, 0.0, 0.0]);
        s.add(holder).unwrap();
        s.add(window).unwrap();
        s.setup_track_shifting(0, &[1], [0.7, 0.0, 0.0], [5.0, 0.0, 0.0])
            .unwrap();
        // 5.6 units of travel: one 5-unit shift, 0.6 left over.
        s.set_step(8.0, true);
        assert_eq!(s.prepare_new_iteration().unwrap().len(), 1);
        s
    }

    #[test]
    fn session_round_trips_through_json() {
        let s = tracked_set();
        let saved = s.session();
        let debt = saved.meshes[0].track.shift_debt();
        assert!(debt[0] > 0.0 && debt[0] < 5.0);

        let text = serde_json::to_string(&saved).unwrap();
        let back: SessionFile = serde_json::from_str(&text).unwrap();
        assert_eq!(back, saved);

        let mut fresh = MeshSet::new();
        let (holder, window) = holder_and_window();
        fresh.add(holder).unwrap();
        fresh.add(window).unwrap();
        fresh.restore_session(&back).unwrap();
        assert_eq!(fresh.session(), saved);

        let holder = fresh.resolve(0).unwrap();
        assert_eq!(holder.track.windows(), &[1]);
        assert_eq!(holder.rect().s, [-5.0, 0.0, 0.0]);
        assert_eq!(holder.magnetization().host().rect, holder.rect());
        assert_eq!(fresh.resolve(1).unwrap().rect(), s.get(1).unwrap().rect());
    }

    #[test]
    fn restoring_unknown_mesh_changes_nothing() {
        let s = tracked_set();
        let saved = s.session();
        let mut other = MeshSet::new();
        other.add(holder_and_window().0).unwrap();
        let err = other.restore_session(&saved).unwrap_err();
        assert!(matches!(err, SessionError::Invalid(TrackError::UnknownMesh(1))));
        assert!(other.get(0).unwrap().track.windows().is_empty());
        assert_eq!(other.time(), 0.0);
    }

    #[test]
    fn save_and_load_file() {
        let s = tracked_set();
        let name = format!("llg_track_session_{}.json", std::process::id());
        let path = std::env::temp_dir().join(name);
        s.save_session(&path).unwrap();

        let mut fresh = MeshSet::new();
        for m in s.iter() {
            let copy = Mesh::new(m.id(), m.name.clone(), m.kind(), m.rect(), CS);
            fresh.add(copy).unwrap();
        }
        fresh.load_session(&path).unwrap();
        assert_eq!(fresh.session(), s.session());
        std::fs::remove_file(&path).unwrap();
    }
}
