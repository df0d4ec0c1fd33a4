// src/error.rs
//
// Error types. Grid backends report `GridError`; everything above the grid layer
// (meshes, registry, track shifting, coupling) reports `TrackError`.

use thiserror::Error;

use crate::device::DeviceId;
use crate::effective_field::ModuleKind;
use crate::registry::MeshId;

pub type GridResult<T> = Result<T, GridError>;
pub type TrackResult<T> = Result<T, TrackError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    /// The accelerator context backing a mirror is gone; its contents cannot be trusted.
    #[error("device {device}: context lost")]
    ContextLost { device: DeviceId },

    #[error("grid already has a mirror on device {device}")]
    MirrorExists { device: DeviceId },

    #[error("layout mismatch: expected {expected} cells, found {found}")]
    LayoutMismatch { expected: usize, found: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    #[error("no mesh with id {0}")]
    UnknownMesh(MeshId),

    #[error("mesh id {0} is already registered")]
    DuplicateMesh(MeshId),

    #[error("clip components must be finite and >= 0, got {clip:?}")]
    InvalidClip { clip: [f64; 3] },

    #[error("velocity components must be finite, got {velocity:?}")]
    InvalidVelocity { velocity: [f64; 3] },

    #[error("grid operation failed: {0}")]
    Grid(#[from] GridError),

    /// Accelerator state of `mesh` is unknown; the run must stop.
    #[error("critical device error on mesh {mesh}: {source}")]
    DeviceCritical { mesh: MeshId, source: GridError },

    #[error("{kind:?} module failed: {message}")]
    Module { kind: ModuleKind, message: String },

    /// Failures collected during a single configure call. Copies applied before a
    /// failure are kept.
    #[error("track configuration finished with {} failure(s)", .failures.len())]
    Configure { failures: Vec<TrackError> },
}

impl TrackError {
    /// True for errors after which the simulation run must not continue.
    pub fn is_critical(&self) -> bool {
        match self {
            TrackError::DeviceCritical { .. } => true,
            TrackError::Configure { failures } => failures.iter().any(TrackError::is_critical),
            _ => false,
        }
    }

    /// Promote a grid failure on `mesh` to a critical device error.
    pub fn critical(mesh: MeshId, err: GridError) -> Self {
        TrackError::DeviceCritical { mesh, source: err }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Invalid(#[from] TrackError),
}
