//! Offline baking
//!
//! Bakes per-probe reflections (reconstructed IRs or reverb estimates)
//! and probe-graph pathing data into a probe batch. Work fans out across
//! probes; a cancellation flag is polled between probe iterations and
//! leaves partial data intact.

use crate::{
    AirAbsorptionModel, BakedData, BakedDataIdentifier, BakedDataVariation, Directivity,
    EnergyField, ImpulseResponse, PathBakeSettings, PathData, ProbeBatch, Reconstructor,
    ReconstructionType, ReflectionSimulationInputs, ReflectionSimulator, Reverb, ReverbEstimator,
};
use ef_core::{CancelFlag, CoordinateSpace3, Vector3};
use ef_scene::Scene;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Progress callback: fraction completed in [0, 1]
pub type BakeProgressCallback<'a> = &'a (dyn Fn(f32) + Sync);

/// Settings for one reflections bake
#[derive(Debug, Clone, Copy)]
pub struct ReflectionBakeSettings {
    pub num_rays: usize,
    pub num_bounces: usize,
    pub duration: f32,
    pub order: usize,
    pub irradiance_min_distance: f32,
    /// Store reconstructed IRs for convolution rendering
    pub save_convolution: bool,
    /// Store reverb estimates for parametric rendering
    pub save_parametric: bool,
    pub sampling_rate: u32,
    pub seed: u64,
}

impl Default for ReflectionBakeSettings {
    fn default() -> Self {
        Self {
            num_rays: 16384,
            num_bounces: 16,
            duration: 1.0,
            order: 1,
            irradiance_min_distance: 1.0,
            save_convolution: true,
            save_parametric: false,
            sampling_rate: 48000,
            seed: 0,
        }
    }
}

/// Bakes reflections per probe
pub struct ReflectionBaker;

impl ReflectionBaker {
    pub fn bake(
        scene: &dyn Scene,
        identifier: BakedDataIdentifier,
        settings: &ReflectionBakeSettings,
        batch: &mut ProbeBatch,
        cancel: &CancelFlag,
        progress: Option<BakeProgressCallback>,
    ) {
        let num_probes = batch.num_probes();
        let simulator = ReflectionSimulator::new(settings.num_rays, settings.order);
        let reconstructor = Reconstructor::new(settings.sampling_rate);
        let completed = AtomicUsize::new(0);
        let batch_ref: &ProbeBatch = batch;

        let results: Vec<(Option<ImpulseResponse>, Option<Reverb>)> = (0..num_probes)
            .into_par_iter()
            .map(|probe_index| {
                if cancel.is_cancelled() {
                    return (None, None);
                }

                let probe_center = batch_ref.probe(probe_index).influence.center;
                let (source, listener) = endpoints(&identifier, probe_center);

                let sources = [frame_at(source)];
                let listeners = [frame_at(listener)];
                let directivities = [Directivity::default()];
                let inputs = ReflectionSimulationInputs {
                    scene,
                    sources: &sources,
                    listeners: &listeners,
                    directivities: &directivities,
                    num_rays: settings.num_rays,
                    num_bounces: settings.num_bounces,
                    duration: settings.duration,
                    order: settings.order,
                    irradiance_min_distance: settings.irradiance_min_distance,
                    seed: settings.seed ^ probe_index as u64,
                };
                let mut field = EnergyField::new(settings.duration, settings.order);
                simulator.simulate(&inputs, std::slice::from_mut(&mut field));

                let ir = settings.save_convolution.then(|| {
                    let num_samples =
                        (settings.duration * settings.sampling_rate as f32) as usize;
                    let mut ir = ImpulseResponse::new(
                        field.num_channels(),
                        num_samples,
                        settings.sampling_rate,
                    );
                    reconstructor.reconstruct(
                        &field,
                        &AirAbsorptionModel::Default,
                        ReconstructionType::Linear,
                        &mut ir,
                    );
                    ir
                });
                let reverb = settings
                    .save_parametric
                    .then(|| ReverbEstimator::estimate_from_energy_field(&field));

                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(report) = progress {
                    report(done as f32 / num_probes as f32);
                }
                (ir, reverb)
            })
            .collect();

        let irs = settings
            .save_convolution
            .then(|| results.iter().map(|(ir, _)| ir.clone()).collect());
        let reverbs = settings
            .save_parametric
            .then(|| results.iter().map(|(_, reverb)| *reverb).collect());
        batch.set_baked_data(identifier, BakedData::Reflections { irs, reverbs });
    }
}

/// Source/listener placement per baked variation.
fn endpoints(identifier: &BakedDataIdentifier, probe_center: Vector3) -> (Vector3, Vector3) {
    match identifier.variation {
        // Probes act as both endpoints.
        BakedDataVariation::Reverb | BakedDataVariation::Dynamic => (probe_center, probe_center),
        BakedDataVariation::StaticSource => {
            (identifier.endpoint_influence.center, probe_center)
        }
        BakedDataVariation::StaticListener => {
            (probe_center, identifier.endpoint_influence.center)
        }
    }
}

fn frame_at(origin: Vector3) -> CoordinateSpace3 {
    CoordinateSpace3 {
        origin,
        ..Default::default()
    }
}

/// Bakes the probe visibility graph and shortest paths
pub struct PathBaker;

impl PathBaker {
    pub fn bake(
        scene: &dyn Scene,
        identifier: BakedDataIdentifier,
        settings: &PathBakeSettings,
        batch: &mut ProbeBatch,
        cancel: &CancelFlag,
        progress: Option<BakeProgressCallback>,
    ) {
        if cancel.is_cancelled() {
            return;
        }
        if let Some(report) = progress {
            report(0.0);
        }
        let data = PathData::build(scene, batch, settings);
        if cancel.is_cancelled() {
            // Graph construction finished anyway; keep the result.
        }
        if let Some(report) = progress {
            report(1.0);
        }
        batch.set_baked_data(identifier, BakedData::Pathing(data));
    }
}
