//! Acoustic materials

use ef_core::NUM_BANDS;
use serde::{Deserialize, Serialize};

/// Per-surface acoustic properties
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Fraction of incident energy absorbed, per band
    pub absorption: [f32; NUM_BANDS],
    /// Fraction of reflected energy scattered diffusely, in [0, 1]
    pub scattering: f32,
    /// Fraction of incident energy transmitted through, per band
    pub transmission: [f32; NUM_BANDS],
}

impl Material {
    pub const fn new(
        absorption: [f32; NUM_BANDS],
        scattering: f32,
        transmission: [f32; NUM_BANDS],
    ) -> Self {
        Self {
            absorption,
            scattering,
            transmission,
        }
    }

    /// A plausible generic interior surface
    pub fn generic() -> Self {
        Self::new([0.10, 0.20, 0.30], 0.05, [0.100, 0.050, 0.030])
    }
}

impl Default for Material {
    fn default() -> Self {
        Self::generic()
    }
}
