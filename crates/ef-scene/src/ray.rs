//! Rays and hit records

use crate::Material;
use ef_core::Vector3;

/// A ray with unit direction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vector3,
    pub direction: Vector3,
}

impl Ray {
    pub fn new(origin: Vector3, direction: Vector3) -> Self {
        Self { origin, direction }
    }

    /// Point at parameter `t`
    #[inline]
    pub fn at(&self, t: f32) -> Vector3 {
        self.origin + self.direction * t
    }
}

/// Result of a closest-hit query. A miss has infinite distance.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub distance: f32,
    pub normal: Vector3,
    pub material: Material,
}

impl Hit {
    /// The miss sentinel
    pub fn invalid() -> Self {
        Self {
            distance: f32::INFINITY,
            normal: Vector3::ZERO,
            material: Material::default(),
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.distance.is_finite()
    }
}

impl Default for Hit {
    fn default() -> Self {
        Self::invalid()
    }
}
