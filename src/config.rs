// src/config.rs
//
// Track-window run configuration, read from and written alongside run output as JSON.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::path::Path;

use crate::error::{SessionError, TrackError, TrackResult};
use crate::registry::MeshId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackWindowConfig {
    /// Dormant mesh holding the off-window part of the track.
    pub holder: MeshId,
    pub windows: Vec<MeshId>,
    /// Window velocity in length units per time unit; zero disables tracking.
    pub velocity: [f64; 3],
    /// Shift granularity per axis; 0 shifts continuously.
    #[serde(default)]
    pub clip: [f64; 3],
}

impl TrackWindowConfig {
    pub fn from_json_str(s: &str) -> Result<Self, SessionError> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> Result<Self, SessionError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> TrackResult<()> {
        if self.clip.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(TrackError::InvalidClip { clip: self.clip });
        }
        if self.velocity.iter().any(|v| !v.is_finite()) {
            return Err(TrackError::InvalidVelocity {
                velocity: self.velocity,
            });
        }
        Ok(())
    }

    pub fn write_to_dir(&self, out_dir: &Path) -> std::io::Result<()> {
        let path = out_dir.join("track_config.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_defaults_to_continuous() {
        let cfg =
            TrackWindowConfig::from_json_str(r#"{"holder":0,"windows":[1,2],"velocity":[2,0,0]}"#)
                .unwrap();
        assert_eq!(cfg.windows, vec![1, 2]);
        assert_eq!(cfg.clip, [0.0; 3]);
    }

    #[test]
    fn negative_clip_is_rejected() {
        let err = TrackWindowConfig::from_json_str(
            r#"{"holder":0,"windows":[1],"velocity":[2,0,0],"clip":[-1,0,0]}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Invalid(TrackError::InvalidClip { .. })
        ));
    }

    #[test]
    fn write_then_read_back() {
        let dir = std::env::temp_dir().join(format!("llg_track_cfg_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let cfg = TrackWindowConfig {
            holder: 3,
            windows: vec![4],
            velocity: [0.0, -1.5, 0.0],
            clip: [0.0, 2.5, 0.0],
        };
        cfg.write_to_dir(&dir).unwrap();
        let back = TrackWindowConfig::from_path(&dir.join("track_config.json")).unwrap();
        assert_eq!(back, cfg);
        fs::remove_dir_all(&dir).unwrap();
    }
}
