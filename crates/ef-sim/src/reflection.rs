//! Stochastic reflection simulation
//!
//! Traces ray paths from each source through the scene, accumulating a
//! directional energy field at each listener. Outgoing directions come
//! from a low-discrepancy spherical sequence; bounce decisions draw from
//! a per-ray counter-seeded generator, so results are bitwise
//! deterministic for a given seed regardless of thread scheduling: rays
//! are batched into jobs, each job fills a private field, and partial
//! fields merge in batch order.

use crate::{Directivity, EnergyField, ENERGY_BIN_DURATION};
use ef_core::{CoordinateSpace3, JobGraph, ThreadPool, Vector3, NUM_BANDS, SPEED_OF_SOUND};
use ef_scene::{Ray, Scene};
use ef_spatial::sh;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Rays per job; balances scheduler overhead against cache residency
const RAYS_PER_BATCH: usize = 4096;

/// Shadow/bounce ray origin offset
const RAY_EPSILON: f32 = 1e-3;

/// Inputs for one simulation run
pub struct ReflectionSimulationInputs<'a> {
    pub scene: &'a dyn Scene,
    pub sources: &'a [CoordinateSpace3],
    pub listeners: &'a [CoordinateSpace3],
    pub directivities: &'a [Directivity],
    pub num_rays: usize,
    pub num_bounces: usize,
    pub duration: f32,
    pub order: usize,
    /// Clamp for the irradiance 1/r^2 term, meters
    pub irradiance_min_distance: f32,
    /// Base seed; identical seeds give identical fields
    pub seed: u64,
}

/// Monte-Carlo reflection simulator
#[derive(Debug, Clone)]
pub struct ReflectionSimulator {
    max_num_rays: usize,
    max_order: usize,
}

impl ReflectionSimulator {
    pub fn new(max_num_rays: usize, max_order: usize) -> Self {
        Self {
            max_num_rays,
            max_order,
        }
    }

    /// Run one simulation. `fields` holds one energy field per
    /// source-listener pair, flattened source-major; each is reset first.
    pub fn simulate(&self, inputs: &ReflectionSimulationInputs, fields: &mut [EnergyField]) {
        self.run(inputs, fields, None);
    }

    /// Like `simulate`, but one job per ray batch executed on the given
    /// worker pool instead of the ambient rayon pool.
    pub fn simulate_with_pool(
        &self,
        inputs: &ReflectionSimulationInputs,
        pool: &ThreadPool,
        fields: &mut [EnergyField],
    ) {
        self.run(inputs, fields, Some(pool));
    }

    fn run(
        &self,
        inputs: &ReflectionSimulationInputs,
        fields: &mut [EnergyField],
        pool: Option<&ThreadPool>,
    ) {
        debug_assert_eq!(
            fields.len(),
            inputs.sources.len() * inputs.listeners.len()
        );
        let num_rays = inputs.num_rays.min(self.max_num_rays);
        let order = inputs.order.min(self.max_order);

        for (pair_index, field) in fields.iter_mut().enumerate() {
            let source_index = pair_index / inputs.listeners.len();
            let listener_index = pair_index % inputs.listeners.len();
            field.reset();
            self.simulate_pair(
                inputs,
                &inputs.sources[source_index],
                &inputs.listeners[listener_index],
                inputs
                    .directivities
                    .get(source_index)
                    .cloned()
                    .unwrap_or_default(),
                num_rays,
                order,
                field,
                pool,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn simulate_pair(
        &self,
        inputs: &ReflectionSimulationInputs,
        source: &CoordinateSpace3,
        listener: &CoordinateSpace3,
        directivity: Directivity,
        num_rays: usize,
        order: usize,
        field: &mut EnergyField,
        pool: Option<&ThreadPool>,
    ) {
        let num_batches = num_rays.div_ceil(RAYS_PER_BATCH);
        let order = order.min(field_order(field));

        // Each batch accumulates privately; merging in batch order keeps
        // the result independent of scheduling.
        let partials = match pool {
            Some(pool) => {
                let mut partials: Vec<EnergyField> =
                    (0..num_batches).map(|_| EnergyField::like(field)).collect();
                let mut graph = JobGraph::new();
                for (batch, partial) in partials.iter_mut().enumerate() {
                    let directivity = directivity.clone();
                    graph.add_job(move || {
                        let first_ray = batch * RAYS_PER_BATCH;
                        let last_ray = ((batch + 1) * RAYS_PER_BATCH).min(num_rays);
                        for ray_index in first_ray..last_ray {
                            self.trace_ray(
                                inputs,
                                source,
                                listener,
                                &directivity,
                                ray_index,
                                num_rays,
                                order,
                                partial,
                            );
                        }
                    });
                }
                pool.process(graph);
                partials
            }
            None => (0..num_batches)
                .into_par_iter()
                .map(|batch| {
                    let mut partial = EnergyField::like(field);
                    let first_ray = batch * RAYS_PER_BATCH;
                    let last_ray = ((batch + 1) * RAYS_PER_BATCH).min(num_rays);
                    for ray_index in first_ray..last_ray {
                        self.trace_ray(
                            inputs,
                            source,
                            listener,
                            &directivity,
                            ray_index,
                            num_rays,
                            order,
                            &mut partial,
                        );
                    }
                    partial
                })
                .collect(),
        };

        for partial in &partials {
            field.add(partial);
        }
        field.scale(4.0 * std::f32::consts::PI / num_rays.max(1) as f32);
    }

    #[allow(clippy::too_many_arguments)]
    fn trace_ray(
        &self,
        inputs: &ReflectionSimulationInputs,
        source: &CoordinateSpace3,
        listener: &CoordinateSpace3,
        directivity: &Directivity,
        ray_index: usize,
        num_rays: usize,
        order: usize,
        field: &mut EnergyField,
    ) {
        let mut rng =
            ChaCha8Rng::seed_from_u64(inputs.seed ^ (ray_index as u64).wrapping_mul(0x9E3779B9));

        let mut direction = fibonacci_direction(ray_index, num_rays);
        let mut origin = source.origin;
        let mut throughput = [directivity.evaluate(source, direction); NUM_BANDS];
        let mut delay_seconds = 0.0f32;

        let min_r2 = inputs.irradiance_min_distance * inputs.irradiance_min_distance;

        for _ in 0..inputs.num_bounces {
            let ray = Ray::new(origin, direction);
            let hit = inputs.scene.closest_hit(&ray, RAY_EPSILON, f32::INFINITY);
            if !hit.is_valid() {
                return;
            }
            let hit_point = ray.at(hit.distance);
            // Two-sided geometry: flip the normal against the ray.
            let normal = if hit.normal.dot(&direction) > 0.0 {
                -hit.normal
            } else {
                hit.normal
            };
            delay_seconds += hit.distance / SPEED_OF_SOUND;

            for band in 0..NUM_BANDS {
                throughput[band] *= 1.0 - hit.material.absorption[band];
            }

            // Irradiance toward the listener.
            let to_listener = listener.origin - hit_point;
            let r = to_listener.length();
            if r > 1e-6 {
                let shadow_direction = to_listener / r;
                let shadow = Ray::new(hit_point + normal * RAY_EPSILON, shadow_direction);
                if !inputs.scene.any_hit(&shadow, RAY_EPSILON, r - RAY_EPSILON) {
                    let cos_theta = normal.dot(&shadow_direction).max(0.0);
                    let geometry = cos_theta / (r * r).max(min_r2);
                    let arrival = delay_seconds + r / SPEED_OF_SOUND;
                    let bin = (arrival / ENERGY_BIN_DURATION) as usize;
                    if bin < field.num_bins() && geometry > 0.0 {
                        // Incoming energy direction at the listener.
                        let energy_direction = (hit_point - listener.origin) / r;
                        for l in 0..=order as i32 {
                            for m in -l..=l {
                                let basis = sh::evaluate(l, m, energy_direction);
                                let channel = sh::acn_index(l, m);
                                for band in 0..NUM_BANDS {
                                    field.add_energy(
                                        channel,
                                        band,
                                        bin,
                                        basis * throughput[band] * geometry,
                                    );
                                }
                            }
                        }
                    }
                }
            }

            if throughput.iter().all(|&e| e < 1e-9) {
                return;
            }

            // Next bounce: diffuse with probability `scattering`, else
            // specular.
            direction = if rng.random::<f32>() < hit.material.scattering {
                cosine_sample(normal, &mut rng)
            } else {
                reflect(direction, normal)
            };
            origin = hit_point + normal * RAY_EPSILON;
        }
    }
}

/// Highest order a field's channel count can hold.
fn field_order(field: &EnergyField) -> usize {
    ((field.num_channels() as f32).sqrt() as usize).saturating_sub(1)
}

/// Low-discrepancy spherical direction `i` of `count` (Fibonacci
/// lattice).
fn fibonacci_direction(i: usize, count: usize) -> Vector3 {
    let golden = std::f32::consts::PI * (3.0 - 5.0f32.sqrt());
    let y = 1.0 - 2.0 * (i as f32 + 0.5) / count.max(1) as f32;
    let r = (1.0 - y * y).max(0.0).sqrt();
    let theta = golden * i as f32;
    Vector3::new(r * theta.cos(), y, r * theta.sin())
}

fn reflect(direction: Vector3, normal: Vector3) -> Vector3 {
    direction - normal * (2.0 * direction.dot(&normal))
}

/// Cosine-weighted hemisphere sample around `normal`.
fn cosine_sample(normal: Vector3, rng: &mut ChaCha8Rng) -> Vector3 {
    let u1: f32 = rng.random();
    let u2: f32 = rng.random();
    let r = u1.sqrt();
    let phi = 2.0 * std::f32::consts::PI * u2;
    let x = r * phi.cos();
    let y = r * phi.sin();
    let z = (1.0 - u1).max(0.0).sqrt();

    // Build a tangent frame around the normal.
    let tangent = if normal.x.abs() < 0.9 {
        Vector3::UNIT_X.cross(&normal).normalized()
    } else {
        Vector3::UNIT_Y.cross(&normal).normalized()
    };
    let bitangent = normal.cross(&tangent);
    (tangent * x + bitangent * y + normal * z).normalized()
}
