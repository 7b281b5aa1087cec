//! 3-D math primitives
//!
//! Right-handed coordinate system, listener convention:
//! +X right, +Y up, -Z ahead.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// Threshold below which a vector is treated as zero
pub const NEARLY_ZERO: f32 = 1e-5;

/// 3-D vector
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const UNIT_X: Self = Self::new(1.0, 0.0, 0.0);
    pub const UNIT_Y: Self = Self::new(0.0, 1.0, 0.0);
    pub const UNIT_Z: Self = Self::new(0.0, 0.0, 1.0);

    /// Create new vector
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Dot product
    #[inline]
    pub fn dot(&self, other: &Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product
    #[inline]
    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Euclidean length
    #[inline]
    pub fn length(&self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Squared length
    #[inline]
    pub fn length_squared(&self) -> f32 {
        self.dot(self)
    }

    /// Unit vector in the same direction. Near-zero input normalizes to zero.
    pub fn normalized(&self) -> Self {
        let len = self.length();
        if len < NEARLY_ZERO {
            Self::ZERO
        } else {
            *self / len
        }
    }

    /// True if shorter than the near-zero threshold
    #[inline]
    pub fn is_nearly_zero(&self) -> bool {
        self.length() < NEARLY_ZERO
    }

    /// Linear interpolation
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        *self + (*other - *self) * t
    }

    /// Distance to another point
    #[inline]
    pub fn distance(&self, other: &Self) -> f32 {
        (*other - *self).length()
    }

    /// Component-wise minimum
    pub fn min(&self, other: &Self) -> Self {
        Self::new(
            self.x.min(other.x),
            self.y.min(other.y),
            self.z.min(other.z),
        )
    }

    /// Component-wise maximum
    pub fn max(&self, other: &Self) -> Self {
        Self::new(
            self.x.max(other.x),
            self.y.max(other.y),
            self.z.max(other.z),
        )
    }

    /// Component by index (0 = x, 1 = y, 2 = z)
    #[inline]
    pub fn component(&self, axis: usize) -> f32 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }
}

impl Add for Vector3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vector3 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for Vector3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vector3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f32> for Vector3 {
    type Output = Self;
    fn div(self, rhs: f32) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vector3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Row-major 4x4 transform matrix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix4 {
    pub rows: [[f32; 4]; 4],
}

impl Matrix4 {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        rows: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Element access (row, column)
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.rows[row][col]
    }

    /// Translation-only transform
    pub fn translation(offset: Vector3) -> Self {
        let mut m = Self::IDENTITY;
        m.rows[0][3] = offset.x;
        m.rows[1][3] = offset.y;
        m.rows[2][3] = offset.z;
        m
    }

    /// Non-uniform scale transform
    pub fn scaling(sx: f32, sy: f32, sz: f32) -> Self {
        let mut m = Self::IDENTITY;
        m.rows[0][0] = sx;
        m.rows[1][1] = sy;
        m.rows[2][2] = sz;
        m
    }

    /// Matrix product `self * other`
    pub fn multiply(&self, other: &Self) -> Self {
        let mut out = Self::IDENTITY;
        for r in 0..4 {
            for c in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += self.rows[r][k] * other.rows[k][c];
                }
                out.rows[r][c] = sum;
            }
        }
        out
    }

    /// Transform a point (w = 1)
    pub fn transform_point(&self, p: Vector3) -> Vector3 {
        Vector3::new(
            self.rows[0][0] * p.x + self.rows[0][1] * p.y + self.rows[0][2] * p.z + self.rows[0][3],
            self.rows[1][0] * p.x + self.rows[1][1] * p.y + self.rows[1][2] * p.z + self.rows[1][3],
            self.rows[2][0] * p.x + self.rows[2][1] * p.y + self.rows[2][2] * p.z + self.rows[2][3],
        )
    }

    /// Transform a direction (w = 0)
    pub fn transform_direction(&self, d: Vector3) -> Vector3 {
        Vector3::new(
            self.rows[0][0] * d.x + self.rows[0][1] * d.y + self.rows[0][2] * d.z,
            self.rows[1][0] * d.x + self.rows[1][1] * d.y + self.rows[1][2] * d.z,
            self.rows[2][0] * d.x + self.rows[2][1] * d.y + self.rows[2][2] * d.z,
        )
    }

    /// Length of each basis column (the transform's scale factors)
    pub fn column_scales(&self) -> (f32, f32, f32) {
        let sx = Vector3::new(self.rows[0][0], self.rows[1][0], self.rows[2][0]).length();
        let sy = Vector3::new(self.rows[0][1], self.rows[1][1], self.rows[2][1]).length();
        let sz = Vector3::new(self.rows[0][2], self.rows[1][2], self.rows[2][2]).length();
        (sx, sy, sz)
    }

    /// Inverse of an affine transform (general 3x3 block plus translation).
    ///
    /// Returns identity if the linear part is singular.
    pub fn affine_inverse(&self) -> Self {
        let m = &self.rows;
        let a = m[0][0];
        let b = m[0][1];
        let c = m[0][2];
        let d = m[1][0];
        let e = m[1][1];
        let f = m[1][2];
        let g = m[2][0];
        let h = m[2][1];
        let i = m[2][2];

        let co_a = e * i - f * h;
        let co_b = f * g - d * i;
        let co_c = d * h - e * g;
        let det = a * co_a + b * co_b + c * co_c;
        if det.abs() < 1e-12 {
            return Self::IDENTITY;
        }
        let inv_det = 1.0 / det;

        let mut out = Self::IDENTITY;
        out.rows[0][0] = co_a * inv_det;
        out.rows[0][1] = (c * h - b * i) * inv_det;
        out.rows[0][2] = (b * f - c * e) * inv_det;
        out.rows[1][0] = co_b * inv_det;
        out.rows[1][1] = (a * i - c * g) * inv_det;
        out.rows[1][2] = (c * d - a * f) * inv_det;
        out.rows[2][0] = co_c * inv_det;
        out.rows[2][1] = (b * g - a * h) * inv_det;
        out.rows[2][2] = (a * e - b * d) * inv_det;

        let t = Vector3::new(m[0][3], m[1][3], m[2][3]);
        let it = out.transform_direction(t);
        out.rows[0][3] = -it.x;
        out.rows[1][3] = -it.y;
        out.rows[2][3] = -it.z;
        out
    }
}

impl Default for Matrix4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Orthonormal coordinate frame with an origin
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateSpace3 {
    /// +X basis
    pub right: Vector3,
    /// +Y basis
    pub up: Vector3,
    /// Forward direction (-Z basis is `ahead`)
    pub ahead: Vector3,
    /// Frame origin in world space
    pub origin: Vector3,
}

impl CoordinateSpace3 {
    /// Frame from a forward direction and an origin; `up` is derived.
    pub fn from_ahead(ahead: Vector3, origin: Vector3) -> Self {
        let ahead = ahead.normalized();
        let reference = if ahead.cross(&Vector3::UNIT_Y).is_nearly_zero() {
            Vector3::UNIT_Z
        } else {
            Vector3::UNIT_Y
        };
        let right = ahead.cross(&reference).normalized();
        let up = right.cross(&ahead).normalized();
        Self {
            right,
            up,
            ahead,
            origin,
        }
    }

    /// Frame from explicit ahead and up vectors.
    pub fn from_vectors(ahead: Vector3, up: Vector3, origin: Vector3) -> Self {
        let ahead = ahead.normalized();
        let right = ahead.cross(&up.normalized()).normalized();
        let up = right.cross(&ahead).normalized();
        Self {
            right,
            up,
            ahead,
            origin,
        }
    }

    /// World-space direction into this frame's local coordinates.
    pub fn direction_to_local(&self, world: Vector3) -> Vector3 {
        Vector3::new(
            world.dot(&self.right),
            world.dot(&self.up),
            -world.dot(&self.ahead),
        )
    }

    /// Local direction back into world coordinates.
    pub fn direction_to_world(&self, local: Vector3) -> Vector3 {
        self.right * local.x + self.up * local.y - self.ahead * local.z
    }
}

impl Default for CoordinateSpace3 {
    fn default() -> Self {
        Self {
            right: Vector3::UNIT_X,
            up: Vector3::UNIT_Y,
            ahead: -Vector3::UNIT_Z,
            origin: Vector3::ZERO,
        }
    }
}

/// Sphere (probe influence volumes, endpoint regions)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Vector3,
    pub radius: f32,
}

impl Sphere {
    pub const fn new(center: Vector3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// True if the point lies inside the sphere
    pub fn contains(&self, point: Vector3) -> bool {
        (point - self.center).length_squared() <= self.radius * self.radius
    }

    /// Smooth falloff weight in [0, 1]: 1 at the center, 0 at the surface.
    pub fn falloff(&self, point: Vector3) -> f32 {
        if self.radius <= 0.0 {
            return 0.0;
        }
        let t = ((point - self.center).length() / self.radius).clamp(0.0, 1.0);
        // Smoothstep from surface toward center.
        let s = 1.0 - t;
        s * s * (3.0 - 2.0 * s)
    }
}
