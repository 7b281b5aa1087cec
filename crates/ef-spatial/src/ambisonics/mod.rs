//! Ambisonics effects
//!
//! Encode, rotate, and render spherical-harmonic soundfields. Everything
//! operates in ACN channel order with N3D-style normalization; external
//! conventions convert through `AudioBuffer::convert_ambisonics`.

mod binaural;
mod decode;
mod encode;
mod panning;
mod rotate;

pub use binaural::*;
pub use decode::*;
pub use encode::*;
pub use panning::*;
pub use rotate::*;
