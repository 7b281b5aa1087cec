//! ef-scene: Acoustic geometry for EchoForge
//!
//! Triangle meshes with per-surface acoustic materials, a median-split /
//! SAH BVH, instanced sub-scenes placed by 4x4 transforms, and the
//! `Scene` capability trait the simulation core queries through.

mod bvh;
mod instanced;
mod material;
mod mesh;
mod ray;
mod scene;

pub use bvh::*;
pub use instanced::*;
pub use material::*;
pub use mesh::*;
pub use ray::*;
pub use scene::*;

use thiserror::Error;

/// Scene construction and loading errors
#[derive(Error, Debug)]
pub enum SceneError {
    /// Per-triangle material index count must match the triangle count
    #[error("material index count {indices} does not match triangle count {triangles}")]
    MaterialIndexCount { triangles: usize, indices: usize },

    /// Triangle references a vertex past the end of the vertex array
    #[error("vertex index {0} out of range")]
    VertexIndexOutOfRange(u32),

    /// Triangle references a material past the end of the palette
    #[error("material index {0} out of range")]
    MaterialIndexOutOfRange(u32),

    /// Malformed or incompatible serialized payload
    #[error(transparent)]
    Payload(#[from] ef_core::CoreError),
}

/// Result type for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
