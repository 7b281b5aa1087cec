//! Instanced sub-scenes
//!
//! An instanced mesh places a whole sub-scene somewhere else in the world
//! through a 4x4 transform. Updating the transform never rebuilds the
//! sub-scene's BVH: rays are taken into sub-scene space for the query and
//! results are brought back out. Transform updates stage into a pending
//! slot and take effect at `commit`.

use crate::{Hit, Ray, Scene};
use ef_core::{Matrix4, Vector3};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct TransformPair {
    forward: Matrix4,
    inverse: Matrix4,
}

impl TransformPair {
    fn new(forward: Matrix4) -> Self {
        Self {
            forward,
            inverse: forward.affine_inverse(),
        }
    }
}

/// A sub-scene placed by a transform
pub struct InstancedMesh {
    sub_scene: Arc<dyn Scene>,
    current: RwLock<TransformPair>,
    pending: RwLock<Option<Matrix4>>,
}

impl InstancedMesh {
    pub fn new(sub_scene: Arc<dyn Scene>, transform: Matrix4) -> Self {
        Self {
            sub_scene,
            current: RwLock::new(TransformPair::new(transform)),
            pending: RwLock::new(None),
        }
    }

    /// Stage a new transform; applied at the next `commit`.
    pub fn update_transform(&self, transform: Matrix4) {
        *self.pending.write() = Some(transform);
    }

    /// Apply a staged transform, if any.
    pub fn commit(&self) {
        if let Some(transform) = self.pending.write().take() {
            *self.current.write() = TransformPair::new(transform);
        }
    }

    pub fn closest_hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> Hit {
        let pair = *self.current.read();
        let (local_ray, scale) = to_local(&pair.inverse, ray);
        let mut hit =
            self.sub_scene
                .closest_hit(&local_ray, t_min * scale, t_max * scale);
        if hit.is_valid() {
            hit.distance /= scale;
            hit.normal = transform_normal(&pair.inverse, hit.normal);
        }
        hit
    }

    pub fn any_hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> bool {
        let pair = *self.current.read();
        let (local_ray, scale) = to_local(&pair.inverse, ray);
        self.sub_scene
            .any_hit(&local_ray, t_min * scale, t_max * scale)
    }
}

/// Ray into sub-scene space. Returns the local ray (unit direction) and
/// the local-per-world distance scale.
fn to_local(inverse: &Matrix4, ray: &Ray) -> (Ray, f32) {
    let origin = inverse.transform_point(ray.origin);
    let raw = inverse.transform_direction(ray.direction);
    let scale = raw.length().max(1e-12);
    (Ray::new(origin, raw / scale), scale)
}

/// Normals transform by the inverse transpose of the forward matrix,
/// which is the transpose of the inverse.
fn transform_normal(inverse: &Matrix4, n: Vector3) -> Vector3 {
    Vector3::new(
        inverse.rows[0][0] * n.x + inverse.rows[1][0] * n.y + inverse.rows[2][0] * n.z,
        inverse.rows[0][1] * n.x + inverse.rows[1][1] * n.y + inverse.rows[2][1] * n.z,
        inverse.rows[0][2] * n.x + inverse.rows[1][2] * n.y + inverse.rows[2][2] * n.z,
    )
    .normalized()
}

impl std::fmt::Debug for InstancedMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstancedMesh").finish()
    }
}
