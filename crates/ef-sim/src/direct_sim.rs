//! Direct-path simulation
//!
//! Produces a `DirectSoundPath` per source: distance attenuation, 3-band
//! air absorption, directivity, occlusion (single raycast or volumetric
//! sphere sampling), and transmission through the closest occluder.

use crate::{AirAbsorptionModel, DistanceAttenuationModel, Directivity};
use ef_core::{CoordinateSpace3, Vector3, NUM_BANDS};
use ef_scene::{Ray, Scene};
use ef_spatial::{DirectApplyFlags, DirectSoundPath};

/// Offset applied to shadow-ray origins to avoid self-intersection
const RAY_EPSILON: f32 = 1e-3;

/// Occlusion sampling strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum OcclusionType {
    /// Single source-to-listener shadow ray
    #[default]
    Raycast,
    /// Sphere sampling yielding partial occlusion
    Volumetric,
}

/// Per-source settings consumed by `DirectSimulator::simulate`
#[derive(Clone)]
pub struct DirectSimulationInputs {
    pub flags: DirectApplyFlags,
    pub source: CoordinateSpace3,
    pub distance_attenuation: DistanceAttenuationModel,
    pub air_absorption: AirAbsorptionModel,
    pub directivity: Directivity,
    pub occlusion_type: OcclusionType,
    /// Source radius for volumetric occlusion, meters
    pub occlusion_radius: f32,
    /// Sample count for volumetric occlusion
    pub num_occlusion_samples: usize,
}

impl Default for DirectSimulationInputs {
    fn default() -> Self {
        Self {
            flags: DirectApplyFlags::default(),
            source: CoordinateSpace3::default(),
            distance_attenuation: DistanceAttenuationModel::default(),
            air_absorption: AirAbsorptionModel::default(),
            directivity: Directivity::default(),
            occlusion_type: OcclusionType::Raycast,
            occlusion_radius: 1.0,
            num_occlusion_samples: 16,
        }
    }
}

/// Computes direct-path parameters for sources
#[derive(Debug, Default)]
pub struct DirectSimulator {
    /// Precomputed unit sphere samples for volumetric occlusion
    sphere_samples: Vec<Vector3>,
}

impl DirectSimulator {
    pub fn new(max_occlusion_samples: usize) -> Self {
        Self {
            sphere_samples: fibonacci_sphere(max_occlusion_samples.max(1)),
        }
    }

    pub fn simulate(
        &self,
        scene: Option<&dyn Scene>,
        inputs: &DirectSimulationInputs,
        listener: &CoordinateSpace3,
        out: &mut DirectSoundPath,
    ) {
        let source_pos = inputs.source.origin;
        let listener_pos = listener.origin;
        let offset = listener_pos - source_pos;
        let distance = offset.length();

        *out = DirectSoundPath::default();

        if inputs.flags.distance_attenuation {
            out.distance_attenuation = inputs.distance_attenuation.evaluate(distance);
        }
        if inputs.flags.air_absorption {
            for band in 0..NUM_BANDS {
                out.air_absorption[band] = inputs.air_absorption.evaluate(distance, band);
            }
        }
        if inputs.flags.directivity {
            out.directivity = inputs.directivity.evaluate(&inputs.source, offset);
        }

        let Some(scene) = scene else {
            return;
        };

        if inputs.flags.occlusion {
            out.occlusion = match inputs.occlusion_type {
                OcclusionType::Raycast => {
                    if occluded(scene, source_pos, listener_pos) {
                        1.0
                    } else {
                        0.0
                    }
                }
                OcclusionType::Volumetric => self.volumetric_occlusion(
                    scene,
                    source_pos,
                    listener_pos,
                    inputs.occlusion_radius,
                    inputs.num_occlusion_samples,
                ),
            };
        }

        if inputs.flags.transmission && out.occlusion > 0.0 {
            out.transmission = transmission(scene, listener_pos, source_pos);
        }
    }

    /// Fraction of sphere sample points around the source hidden from the
    /// listener.
    fn volumetric_occlusion(
        &self,
        scene: &dyn Scene,
        source: Vector3,
        listener: Vector3,
        radius: f32,
        num_samples: usize,
    ) -> f32 {
        let num_samples = num_samples.clamp(1, self.sphere_samples.len());
        let mut hidden = 0usize;
        for sample in &self.sphere_samples[..num_samples] {
            let point = source + *sample * radius;
            if occluded(scene, point, listener) {
                hidden += 1;
            }
        }
        hidden as f32 / num_samples as f32
    }
}

fn occluded(scene: &dyn Scene, from: Vector3, to: Vector3) -> bool {
    let offset = to - from;
    let distance = offset.length();
    if distance < RAY_EPSILON {
        return false;
    }
    let ray = Ray::new(from, offset / distance);
    scene.any_hit(&ray, RAY_EPSILON, distance - RAY_EPSILON)
}

/// Per-band transmission through the closest occluder between listener
/// and source. Unoccluded paths transmit fully.
fn transmission(scene: &dyn Scene, listener: Vector3, source: Vector3) -> [f32; NUM_BANDS] {
    let offset = source - listener;
    let distance = offset.length();
    if distance < RAY_EPSILON {
        return [1.0; NUM_BANDS];
    }
    let ray = Ray::new(listener, offset / distance);
    let hit = scene.closest_hit(&ray, RAY_EPSILON, distance - RAY_EPSILON);
    if hit.is_valid() {
        hit.material.transmission
    } else {
        [1.0; NUM_BANDS]
    }
}

/// Deterministic, roughly uniform unit-sphere samples.
fn fibonacci_sphere(count: usize) -> Vec<Vector3> {
    let golden = std::f32::consts::PI * (3.0 - 5.0f32.sqrt());
    (0..count)
        .map(|i| {
            let y = 1.0 - 2.0 * (i as f32 + 0.5) / count as f32;
            let r = (1.0 - y * y).max(0.0).sqrt();
            let theta = golden * i as f32;
            Vector3::new(r * theta.cos(), y, r * theta.sin())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ef_scene::{box_mesh, Material, SceneAccel};
    use std::sync::Arc;

    fn wall_scene() -> SceneAccel {
        // A thin wall at x = 0 spanning y/z.
        let scene = SceneAccel::new();
        let mesh = box_mesh(
            Vector3::new(-0.1, -10.0, -10.0),
            Vector3::new(0.1, 10.0, 10.0),
            Material::new([0.1; 3], 0.1, [0.2, 0.1, 0.05]),
        )
        .unwrap();
        scene.add_static_mesh(Arc::new(mesh));
        scene.commit();
        scene
    }

    fn listener_at(position: Vector3) -> CoordinateSpace3 {
        CoordinateSpace3 {
            origin: position,
            ..Default::default()
        }
    }

    #[test]
    fn test_unoccluded_free_field() {
        let simulator = DirectSimulator::new(64);
        let inputs = DirectSimulationInputs {
            flags: DirectApplyFlags {
                distance_attenuation: true,
                air_absorption: true,
                occlusion: true,
                ..Default::default()
            },
            source: CoordinateSpace3 {
                origin: Vector3::new(2.0, 0.0, 0.0),
                ..Default::default()
            },
            ..Default::default()
        };
        let scene = wall_scene();
        let listener = listener_at(Vector3::new(6.0, 0.0, 0.0));

        let mut path = DirectSoundPath::default();
        simulator.simulate(Some(&scene), &inputs, &listener, &mut path);

        // Same side of the wall: clear path, 1/4 distance gain.
        assert_eq!(path.occlusion, 0.0);
        assert!((path.distance_attenuation - 0.25).abs() < 1e-5);
        assert!(path.air_absorption[2] < path.air_absorption[0]);
    }

    #[test]
    fn test_raycast_occlusion_and_transmission() {
        let simulator = DirectSimulator::new(64);
        let inputs = DirectSimulationInputs {
            flags: DirectApplyFlags {
                occlusion: true,
                transmission: true,
                ..Default::default()
            },
            source: CoordinateSpace3 {
                origin: Vector3::new(-3.0, 0.0, 0.0),
                ..Default::default()
            },
            ..Default::default()
        };
        let scene = wall_scene();
        let listener = listener_at(Vector3::new(3.0, 0.0, 0.0));

        let mut path = DirectSoundPath::default();
        simulator.simulate(Some(&scene), &inputs, &listener, &mut path);

        assert_eq!(path.occlusion, 1.0);
        // Transmission comes from the wall material.
        assert!((path.transmission[0] - 0.2).abs() < 1e-5);
        assert!((path.transmission[2] - 0.05).abs() < 1e-5);
    }

    #[test]
    fn test_volumetric_partial_occlusion() {
        let simulator = DirectSimulator::new(256);
        // Source straddling the wall edge at y ~ 10: some sample points
        // peek over the top.
        let inputs = DirectSimulationInputs {
            flags: DirectApplyFlags {
                occlusion: true,
                ..Default::default()
            },
            source: CoordinateSpace3 {
                origin: Vector3::new(-3.0, 9.9, 0.0),
                ..Default::default()
            },
            occlusion_type: OcclusionType::Volumetric,
            occlusion_radius: 1.0,
            num_occlusion_samples: 128,
            ..Default::default()
        };
        let scene = wall_scene();
        let listener = listener_at(Vector3::new(3.0, 9.9, 0.0));

        let mut path = DirectSoundPath::default();
        simulator.simulate(Some(&scene), &inputs, &listener, &mut path);

        assert!(path.occlusion > 0.05 && path.occlusion < 0.95,
            "expected partial occlusion, got {}", path.occlusion);
    }

    #[test]
    fn test_no_scene_no_occlusion() {
        let simulator = DirectSimulator::new(16);
        let inputs = DirectSimulationInputs {
            flags: DirectApplyFlags {
                occlusion: true,
                distance_attenuation: true,
                ..Default::default()
            },
            source: CoordinateSpace3::default(),
            ..Default::default()
        };
        let listener = listener_at(Vector3::new(0.0, 0.0, -2.0));
        let mut path = DirectSoundPath::default();
        simulator.simulate(None, &inputs, &listener, &mut path);
        assert_eq!(path.occlusion, 0.0);
        assert!((path.distance_attenuation - 0.5).abs() < 1e-5);
    }
}
