//! ef-spatial: Spatial rendering for EchoForge
//!
//! ## Spherical harmonics
//! - `sh` - real SH evaluation, projection, Ivanic-Ruedenberg rotation
//!
//! ## HRTF
//! - `hrtf` - measurement database, triangulated bilinear interpolation,
//!   minimum-phase / sphere-ITD / full phase models, loudness
//!   normalization, built-in spherical-head grid
//!
//! ## Effects
//! - `panning` - constant-power and pairwise speaker panning
//! - `binaural` - HRTF convolution with filter crossfade
//! - `virtual_surround` - panned speakers binauralized and summed
//! - `ambisonics` - encode / rotate / speaker decode / binaural
//! - `direct` - distance, air absorption, directivity, occlusion,
//!   transmission
//! - `path_effect` - baked/runtime path rendering into ambisonics

pub mod sh;

mod ambisonics;
mod binaural;
mod direct;
mod hrtf;
mod panning;
mod path_effect;
mod virtual_surround;

pub use ambisonics::*;
pub use binaural::*;
pub use direct::*;
pub use hrtf::*;
pub use panning::*;
pub use path_effect::*;
pub use virtual_surround::*;

// The effect contract is shared with the DSP crate.
pub use ef_dsp::{AudioEffect, AudioEffectState};

use thiserror::Error;

/// Spatial-rendering errors
#[derive(Error, Debug)]
pub enum SpatialError {
    /// Malformed HRTF measurement record
    #[error("invalid HRTF data: {0}")]
    InvalidHrtfData(String),

    /// The HRTF was measured at a different rate than the pipeline runs at
    #[error("HRTF sampling rate {hrtf} does not match pipeline rate {pipeline}")]
    HrtfSampleRateMismatch { hrtf: u32, pipeline: u32 },

    /// Unsupported ambisonics order
    #[error("ambisonics order {0} exceeds the supported maximum")]
    UnsupportedOrder(usize),
}

/// Result type for spatial operations
pub type SpatialResult<T> = Result<T, SpatialError>;
