// src/lib.rs

pub mod config;
pub mod coupling;
pub mod device;
pub mod effective_field;
pub mod error;
pub mod grid;
pub mod mesh;
pub mod region;
pub mod registry;
pub mod session;
pub mod spatial_grid;
pub mod sync;
pub mod track;
pub mod vec3;
pub mod vector_field;
