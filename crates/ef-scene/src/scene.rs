//! Scene capability trait and the software implementation
//!
//! The simulation core only needs closest-hit and any-hit queries plus
//! bulk variants; alternative acceleration back-ends implement the same
//! trait and the core works unchanged against any of them.

use crate::{Hit, InstancedMesh, Ray, StaticMesh};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::sync::Arc;

/// Ray-query capability required by the simulation core.
///
/// Mutating implementors (adding meshes, moving instances) must only do
/// so between simulation runs, followed by `commit`.
pub trait Scene: Send + Sync {
    /// Nearest intersection in `[t_min, t_max]`, or an invalid hit.
    fn closest_hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> Hit;

    /// Whether any intersection exists in `[t_min, t_max]`.
    fn any_hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> bool;

    /// Bulk closest-hit; implementations may parallelize internally.
    fn closest_hits(&self, rays: &[Ray], t_min: f32, t_max: f32, hits: &mut [Hit]) {
        debug_assert_eq!(rays.len(), hits.len());
        for (ray, hit) in rays.iter().zip(hits.iter_mut()) {
            *hit = self.closest_hit(ray, t_min, t_max);
        }
    }

    /// Bulk any-hit; implementations may parallelize internally.
    fn any_hits(&self, rays: &[Ray], t_min: f32, t_max: f32, occluded: &mut [bool]) {
        debug_assert_eq!(rays.len(), occluded.len());
        for (ray, flag) in rays.iter().zip(occluded.iter_mut()) {
            *flag = self.any_hit(ray, t_min, t_max);
        }
    }
}

/// Rays per parallel batch in the bulk query paths
const RAY_BATCH: usize = 1024;

#[derive(Default)]
struct SceneContents {
    static_meshes: Vec<Arc<StaticMesh>>,
    instanced_meshes: Vec<Arc<InstancedMesh>>,
}

/// Software scene: static and instanced meshes behind their own BVHs
#[derive(Default)]
pub struct SceneAccel {
    /// Edited by the host between simulation runs
    staged: RwLock<SceneContents>,
    /// Snapshot visible to queries
    committed: RwLock<Arc<SceneContents>>,
}

impl SceneAccel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_static_mesh(&self, mesh: Arc<StaticMesh>) {
        self.staged.write().static_meshes.push(mesh);
    }

    pub fn remove_static_mesh(&self, mesh: &Arc<StaticMesh>) {
        self.staged
            .write()
            .static_meshes
            .retain(|m| !Arc::ptr_eq(m, mesh));
    }

    pub fn add_instanced_mesh(&self, mesh: Arc<InstancedMesh>) {
        self.staged.write().instanced_meshes.push(mesh);
    }

    pub fn remove_instanced_mesh(&self, mesh: &Arc<InstancedMesh>) {
        self.staged
            .write()
            .instanced_meshes
            .retain(|m| !Arc::ptr_eq(m, mesh));
    }

    /// Publish staged edits (mesh membership and instance transforms) to
    /// the query side.
    pub fn commit(&self) {
        let staged = self.staged.read();
        for instance in &staged.instanced_meshes {
            instance.commit();
        }
        let snapshot = Arc::new(SceneContents {
            static_meshes: staged.static_meshes.clone(),
            instanced_meshes: staged.instanced_meshes.clone(),
        });
        *self.committed.write() = snapshot;
    }

    fn snapshot(&self) -> Arc<SceneContents> {
        Arc::clone(&self.committed.read())
    }
}

impl Scene for SceneAccel {
    fn closest_hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> Hit {
        let contents = self.snapshot();
        let mut best = Hit::invalid();
        let mut limit = t_max;
        for mesh in &contents.static_meshes {
            let hit = mesh.closest_hit(ray, t_min, limit);
            if hit.distance < best.distance {
                limit = hit.distance;
                best = hit;
            }
        }
        for instance in &contents.instanced_meshes {
            let hit = instance.closest_hit(ray, t_min, limit);
            if hit.distance < best.distance {
                limit = hit.distance;
                best = hit;
            }
        }
        best
    }

    fn any_hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> bool {
        let contents = self.snapshot();
        contents
            .static_meshes
            .iter()
            .any(|mesh| mesh.any_hit(ray, t_min, t_max))
            || contents
                .instanced_meshes
                .iter()
                .any(|instance| instance.any_hit(ray, t_min, t_max))
    }

    fn closest_hits(&self, rays: &[Ray], t_min: f32, t_max: f32, hits: &mut [Hit]) {
        debug_assert_eq!(rays.len(), hits.len());
        rays.par_chunks(RAY_BATCH)
            .zip(hits.par_chunks_mut(RAY_BATCH))
            .for_each(|(ray_batch, hit_batch)| {
                for (ray, hit) in ray_batch.iter().zip(hit_batch.iter_mut()) {
                    *hit = self.closest_hit(ray, t_min, t_max);
                }
            });
    }

    fn any_hits(&self, rays: &[Ray], t_min: f32, t_max: f32, occluded: &mut [bool]) {
        debug_assert_eq!(rays.len(), occluded.len());
        rays.par_chunks(RAY_BATCH)
            .zip(occluded.par_chunks_mut(RAY_BATCH))
            .for_each(|(ray_batch, flag_batch)| {
                for (ray, flag) in ray_batch.iter().zip(flag_batch.iter_mut()) {
                    *flag = self.any_hit(ray, t_min, t_max);
                }
            });
    }
}

impl std::fmt::Debug for SceneAccel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let contents = self.snapshot();
        f.debug_struct("SceneAccel")
            .field("static_meshes", &contents.static_meshes.len())
            .field("instanced_meshes", &contents.instanced_meshes.len())
            .finish()
    }
}
