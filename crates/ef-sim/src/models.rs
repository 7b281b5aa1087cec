//! Acoustic propagation models
//!
//! Distance attenuation, frequency-dependent air absorption, and source
//! directivity. Each has a default analytic form plus a host-supplied
//! callback variant; callbacks carry a dirty flag so IR-dependent state
//! can be refreshed when the host changes the model.

use ef_core::{CoordinateSpace3, Vector3, NUM_BANDS};
use std::sync::Arc;

/// Distance-to-gain model
#[derive(Clone)]
pub enum DistanceAttenuationModel {
    /// Inverse distance, clamped below `min_distance`
    Default { min_distance: f32 },
    /// Host-supplied curve; `dirty` marks baked data as stale
    Callback {
        callback: Arc<dyn Fn(f32) -> f32 + Send + Sync>,
        dirty: bool,
    },
}

impl DistanceAttenuationModel {
    pub fn evaluate(&self, distance: f32) -> f32 {
        match self {
            DistanceAttenuationModel::Default { min_distance } => {
                1.0 / distance.max(*min_distance).max(1e-6)
            }
            DistanceAttenuationModel::Callback { callback, .. } => callback(distance),
        }
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self, DistanceAttenuationModel::Callback { dirty: true, .. })
    }
}

impl Default for DistanceAttenuationModel {
    fn default() -> Self {
        DistanceAttenuationModel::Default { min_distance: 1.0 }
    }
}

impl std::fmt::Debug for DistanceAttenuationModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceAttenuationModel::Default { min_distance } => f
                .debug_struct("Default")
                .field("min_distance", min_distance)
                .finish(),
            DistanceAttenuationModel::Callback { dirty, .. } => {
                f.debug_struct("Callback").field("dirty", dirty).finish()
            }
        }
    }
}

/// Default per-band exponential air absorption coefficients (1/m)
pub const DEFAULT_AIR_ABSORPTION: [f32; NUM_BANDS] = [0.0002, 0.0017, 0.0182];

/// Frequency-dependent air absorption over distance
#[derive(Clone)]
pub enum AirAbsorptionModel {
    Default,
    /// Custom exponential coefficients per band
    Exponential { coefficients: [f32; NUM_BANDS] },
    /// Host-supplied per-band curve
    Callback {
        callback: Arc<dyn Fn(f32, usize) -> f32 + Send + Sync>,
        dirty: bool,
    },
}

impl AirAbsorptionModel {
    pub fn evaluate(&self, distance: f32, band: usize) -> f32 {
        match self {
            AirAbsorptionModel::Default => (-DEFAULT_AIR_ABSORPTION[band] * distance).exp(),
            AirAbsorptionModel::Exponential { coefficients } => {
                (-coefficients[band] * distance).exp()
            }
            AirAbsorptionModel::Callback { callback, .. } => callback(distance, band),
        }
    }
}

impl Default for AirAbsorptionModel {
    fn default() -> Self {
        AirAbsorptionModel::Default
    }
}

impl std::fmt::Debug for AirAbsorptionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AirAbsorptionModel::Default => write!(f, "Default"),
            AirAbsorptionModel::Exponential { coefficients } => f
                .debug_struct("Exponential")
                .field("coefficients", coefficients)
                .finish(),
            AirAbsorptionModel::Callback { dirty, .. } => {
                f.debug_struct("Callback").field("dirty", dirty).finish()
            }
        }
    }
}

/// Weighted-dipole source directivity: `|(1 - w) + w cos(theta)|^power`
#[derive(Clone)]
pub struct Directivity {
    /// 0 = omnidirectional, 1 = pure dipole
    pub dipole_weight: f32,
    pub dipole_power: f32,
    /// Host-supplied pattern overriding the dipole
    pub callback: Option<Arc<dyn Fn(Vector3) -> f32 + Send + Sync>>,
}

impl Directivity {
    /// Evaluate toward a world-space direction from a source frame.
    pub fn evaluate(&self, source: &CoordinateSpace3, direction: Vector3) -> f32 {
        let local = source.direction_to_local(direction.normalized());
        if let Some(callback) = &self.callback {
            return callback(local);
        }
        if self.dipole_weight <= 0.0 {
            return 1.0;
        }
        // Local -z is the source's facing direction.
        let cos_theta = -local.z;
        ((1.0 - self.dipole_weight) + self.dipole_weight * cos_theta)
            .abs()
            .powf(self.dipole_power.max(0.0))
    }
}

impl Default for Directivity {
    fn default() -> Self {
        Self {
            dipole_weight: 0.0,
            dipole_power: 1.0,
            callback: None,
        }
    }
}

impl std::fmt::Debug for Directivity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Directivity")
            .field("dipole_weight", &self.dipole_weight)
            .field("dipole_power", &self.dipole_power)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_attenuation_clamps() {
        let model = DistanceAttenuationModel::Default { min_distance: 1.0 };
        // Below min distance the gain clamps to 1/min.
        assert_eq!(model.evaluate(0.5), 1.0);
        assert_eq!(model.evaluate(2.0), 0.5);
    }

    #[test]
    fn test_air_absorption_decays_with_distance_and_band() {
        let model = AirAbsorptionModel::Default;
        for band in 0..NUM_BANDS {
            assert!(model.evaluate(100.0, band) < model.evaluate(10.0, band));
        }
        // Higher bands absorb more.
        assert!(model.evaluate(100.0, 2) < model.evaluate(100.0, 0));
    }

    #[test]
    fn test_omni_directivity() {
        let directivity = Directivity::default();
        let source = CoordinateSpace3::default();
        assert_eq!(directivity.evaluate(&source, Vector3::UNIT_X), 1.0);
        assert_eq!(directivity.evaluate(&source, -Vector3::UNIT_Z), 1.0);
    }

    #[test]
    fn test_dipole_nulls_sideways() {
        let directivity = Directivity {
            dipole_weight: 1.0,
            dipole_power: 1.0,
            callback: None,
        };
        let source = CoordinateSpace3::default();
        // Facing direction (-Z): full gain. Sideways: null.
        let front = directivity.evaluate(&source, -Vector3::UNIT_Z);
        let side = directivity.evaluate(&source, Vector3::UNIT_X);
        assert!((front - 1.0).abs() < 1e-5);
        assert!(side < 1e-5);
    }
}
