//! Simulation orchestration
//!
//! The `SimulationManager` owns the scene, probe batches and sources,
//! runs direct / reflections / pathing passes on background threads, and
//! publishes per-source results through triple buffers. The audio thread
//! only ever reads the committed side of each buffer, at block
//! boundaries; a pass publishes all-or-nothing, never a partial state.
//!
//! `commit()` snapshots staged sources and probe batches into the sets
//! the passes iterate; a pass started before `commit` keeps using the
//! previous snapshot.

use crate::{
    AirAbsorptionModel, BakedData, BakedDataIdentifier, DirectSimulationInputs, DirectSimulator,
    EnergyField, HybridReverbEstimator, HybridReverbParams, ImpulseResponse, PathSimulationInputs,
    PathSimulationResult, PathSimulator, ProbeBatch, ProbeNeighborhood, ReconstructionType,
    Reconstructor, ReflectionSimulationInputs, ReflectionSimulator, Reverb, ReverbEstimator,
};
use ef_core::{
    AudioSettings, CoordinateSpace3, Sample, ThreadPool, TripleBuffer, Vector3, NUM_BANDS,
};
use ef_dsp::{OverlapSaveFIR, OverlapSavePartitioner};
use ef_scene::Scene;
use ef_spatial::sh;
use ef_spatial::DirectSoundPath;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Inputs shared by every source
#[derive(Debug, Clone, Copy)]
pub struct SharedSimulationInputs {
    pub listener: CoordinateSpace3,
    pub num_rays: usize,
    pub num_bounces: usize,
    pub duration: f32,
    pub order: usize,
    pub irradiance_min_distance: f32,
    pub reconstruction: ReconstructionType,
    /// Base seed for the stochastic reflection pass
    pub seed: u64,
}

impl Default for SharedSimulationInputs {
    fn default() -> Self {
        Self {
            listener: CoordinateSpace3::default(),
            num_rays: 4096,
            num_bounces: 8,
            duration: 1.0,
            order: 1,
            irradiance_min_distance: 1.0,
            reconstruction: ReconstructionType::Linear,
            seed: 0,
        }
    }
}

/// How reflections render on the audio side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReflectionEffectMode {
    #[default]
    Convolution,
    Parametric,
    Hybrid,
}

/// Per-source reflection inputs
#[derive(Debug, Clone)]
pub struct ReflectionSimulationSettings {
    pub enabled: bool,
    pub source: CoordinateSpace3,
    pub mode: ReflectionEffectMode,
    /// Per-band multiplier on estimated reverb times
    pub reverb_scale: [f32; NUM_BANDS],
    pub hybrid_transition_time: f32,
    pub hybrid_overlap_fraction: f32,
    /// Use a baked payload instead of tracing live
    pub baked: Option<BakedDataIdentifier>,
}

impl Default for ReflectionSimulationSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            source: CoordinateSpace3::default(),
            mode: ReflectionEffectMode::Convolution,
            reverb_scale: [1.0; NUM_BANDS],
            hybrid_transition_time: 0.25,
            hybrid_overlap_fraction: 0.25,
            baked: None,
        }
    }
}

/// Per-source pathing inputs
#[derive(Debug, Clone, Default)]
pub struct PathingSimulationSettings {
    pub enabled: bool,
    pub source: Vector3,
    pub order: usize,
    pub find_alternate_paths: bool,
    pub simplify_paths: bool,
    pub realtime_validation: bool,
}

/// Reflection outputs published to the audio thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ReverbOutputs {
    pub reverb: Reverb,
    pub hybrid: HybridReverbParams,
}

/// Pathing outputs published to the audio thread
#[derive(Debug, Clone, Default)]
pub struct PathingOutputs {
    pub eq_gains: [f32; NUM_BANDS],
    pub sh_coeffs: Vec<f32>,
    pub avg_direction: Vector3,
    pub distance_ratio: f32,
}

/// Triple-buffered per-source results
pub struct SimulationOutputs {
    pub direct: TripleBuffer<DirectSoundPath>,
    /// Shared with the source's convolution effect
    pub fir: Arc<TripleBuffer<OverlapSaveFIR>>,
    pub reverb: TripleBuffer<ReverbOutputs>,
    pub pathing: TripleBuffer<PathingOutputs>,
}

/// One source registered with the manager
pub struct SimulationData {
    direct_inputs: Mutex<DirectSimulationInputs>,
    reflection_inputs: Mutex<ReflectionSimulationSettings>,
    pathing_inputs: Mutex<PathingSimulationSettings>,
    outputs: SimulationOutputs,
    max_ir_samples: usize,
}

impl SimulationData {
    pub fn new(audio: AudioSettings, max_order: usize, max_duration: f32) -> Self {
        let max_ir_samples =
            ((max_duration * audio.sampling_rate() as f32) as usize).max(audio.frame_size());
        Self {
            direct_inputs: Mutex::new(DirectSimulationInputs::default()),
            reflection_inputs: Mutex::new(ReflectionSimulationSettings::default()),
            pathing_inputs: Mutex::new(PathingSimulationSettings::default()),
            outputs: SimulationOutputs {
                direct: TripleBuffer::new(DirectSoundPath::default()),
                fir: OverlapSaveFIR::triple_buffer(
                    sh::num_coeffs(max_order),
                    max_ir_samples,
                    audio.frame_size(),
                ),
                reverb: TripleBuffer::new(ReverbOutputs::default()),
                pathing: TripleBuffer::new(PathingOutputs::default()),
            },
            max_ir_samples,
        }
    }

    pub fn set_direct_inputs(&self, inputs: DirectSimulationInputs) {
        *self.direct_inputs.lock() = inputs;
    }

    pub fn set_reflection_inputs(&self, inputs: ReflectionSimulationSettings) {
        *self.reflection_inputs.lock() = inputs;
    }

    pub fn set_pathing_inputs(&self, inputs: PathingSimulationSettings) {
        *self.pathing_inputs.lock() = inputs;
    }

    pub fn outputs(&self) -> &SimulationOutputs {
        &self.outputs
    }

    /// IR capacity of this source's convolution buffer, for sizing the
    /// audio-side effect.
    pub fn max_ir_samples(&self) -> usize {
        self.max_ir_samples
    }
}

/// Construction-time limits for the manager
#[derive(Debug, Clone, Copy)]
pub struct SimulationManagerSettings {
    pub audio: AudioSettings,
    pub max_num_rays: usize,
    pub max_order: usize,
    pub max_duration: f32,
    /// Worker threads for ray and baking fan-out; 0 picks a default
    pub num_threads: usize,
    pub max_occlusion_samples: usize,
}

/// Owns sources, the scene, and the simulation passes
pub struct SimulationManager {
    settings: SimulationManagerSettings,
    scene: RwLock<Option<Arc<dyn Scene>>>,
    shared: Mutex<SharedSimulationInputs>,
    staged_sources: Mutex<Vec<Arc<SimulationData>>>,
    committed_sources: RwLock<Vec<Arc<SimulationData>>>,
    staged_batches: Mutex<Vec<Arc<ProbeBatch>>>,
    committed_batches: RwLock<Vec<Arc<ProbeBatch>>>,
    direct_simulator: DirectSimulator,
    reflection_simulator: ReflectionSimulator,
    reconstructor: Reconstructor,
    hybrid_estimator: HybridReverbEstimator,
    path_simulator: PathSimulator,
    partitioner: Mutex<OverlapSavePartitioner>,
    thread_pool: ThreadPool,
    /// Diagnostic callback for pathing validation rays
    path_visualization: Mutex<Option<Arc<dyn Fn(Vector3, Vector3, bool) + Send + Sync>>>,
}

impl SimulationManager {
    pub fn new(settings: SimulationManagerSettings) -> Self {
        Self {
            scene: RwLock::new(None),
            shared: Mutex::new(SharedSimulationInputs::default()),
            staged_sources: Mutex::new(Vec::new()),
            committed_sources: RwLock::new(Vec::new()),
            staged_batches: Mutex::new(Vec::new()),
            committed_batches: RwLock::new(Vec::new()),
            direct_simulator: DirectSimulator::new(settings.max_occlusion_samples),
            reflection_simulator: ReflectionSimulator::new(
                settings.max_num_rays,
                settings.max_order,
            ),
            reconstructor: Reconstructor::new(settings.audio.sampling_rate()),
            hybrid_estimator: HybridReverbEstimator::new(settings.audio),
            path_simulator: PathSimulator::new(settings.max_order),
            partitioner: Mutex::new(OverlapSavePartitioner::new(settings.audio.frame_size())),
            thread_pool: ThreadPool::new(settings.num_threads),
            path_visualization: Mutex::new(None),
            settings,
        }
    }

    /// Install (or clear) the validation-ray visualization callback used
    /// by pathing diagnostics.
    pub fn set_path_visualization(
        &self,
        callback: Option<Arc<dyn Fn(Vector3, Vector3, bool) + Send + Sync>>,
    ) {
        *self.path_visualization.lock() = callback;
    }

    pub fn settings(&self) -> &SimulationManagerSettings {
        &self.settings
    }

    pub fn set_scene(&self, scene: Arc<dyn Scene>) {
        *self.scene.write() = Some(scene);
    }

    pub fn set_shared_inputs(&self, inputs: SharedSimulationInputs) {
        *self.shared.lock() = inputs;
    }

    pub fn add_source(&self, source: Arc<SimulationData>) {
        self.staged_sources.lock().push(source);
    }

    pub fn remove_source(&self, source: &Arc<SimulationData>) {
        self.staged_sources
            .lock()
            .retain(|s| !Arc::ptr_eq(s, source));
    }

    pub fn add_probe_batch(&self, batch: Arc<ProbeBatch>) {
        self.staged_batches.lock().push(batch);
    }

    pub fn remove_probe_batch(&self, batch: &Arc<ProbeBatch>) {
        self.staged_batches
            .lock()
            .retain(|b| !Arc::ptr_eq(b, batch));
    }

    /// Rebind staged sources and probe batches into the sets the passes
    /// iterate.
    pub fn commit(&self) {
        *self.committed_sources.write() = self.staged_sources.lock().clone();
        *self.committed_batches.write() = self.staged_batches.lock().clone();
    }

    /// One direct pass over every committed source.
    pub fn simulate_direct(&self) {
        let scene = self.scene.read().clone();
        let shared = *self.shared.lock();
        let sources = self.committed_sources.read().clone();

        for source in &sources {
            let inputs = source.direct_inputs.lock().clone();
            let mut path = DirectSoundPath::default();
            self.direct_simulator.simulate(
                scene.as_deref(),
                &inputs,
                &shared.listener,
                &mut path,
            );
            *source.outputs.direct.write() = path;
            source.outputs.direct.publish();
        }
    }

    /// One reflections pass: trace (or fetch baked data), reconstruct,
    /// estimate, and publish per-source IRs and reverb parameters.
    pub fn simulate_indirect(&self) {
        let Some(scene) = self.scene.read().clone() else {
            return;
        };
        let shared = *self.shared.lock();
        let sources = self.committed_sources.read().clone();
        let batches = self.committed_batches.read().clone();

        self.thread_pool.install(|| {
            for source in &sources {
                let inputs = source.reflection_inputs.lock().clone();
                if !inputs.enabled {
                    continue;
                }
                match &inputs.baked {
                    Some(identifier) => {
                        self.apply_baked_reflections(
                            source, &inputs, identifier, &shared, &batches,
                        );
                    }
                    None => {
                        self.simulate_live_reflections(source, &inputs, &shared, scene.as_ref());
                    }
                }
            }
        });
    }

    fn simulate_live_reflections(
        &self,
        source: &Arc<SimulationData>,
        inputs: &ReflectionSimulationSettings,
        shared: &SharedSimulationInputs,
        scene: &dyn Scene,
    ) {
        let duration = shared.duration.min(self.settings.max_duration);
        let order = shared.order.min(self.settings.max_order);

        let sources = [inputs.source];
        let listeners = [shared.listener];
        let directivities = [crate::Directivity::default()];
        let sim_inputs = ReflectionSimulationInputs {
            scene,
            sources: &sources,
            listeners: &listeners,
            directivities: &directivities,
            num_rays: shared.num_rays,
            num_bounces: shared.num_bounces,
            duration,
            order,
            irradiance_min_distance: shared.irradiance_min_distance,
            seed: shared.seed,
        };
        let mut field = EnergyField::new(duration, order);
        self.reflection_simulator.simulate_with_pool(
            &sim_inputs,
            &self.thread_pool,
            std::slice::from_mut(&mut field),
        );

        let mut reverb = ReverbEstimator::estimate_from_energy_field(&field);
        for (time, &scale) in reverb.reverb_times.iter_mut().zip(&inputs.reverb_scale) {
            *time *= scale;
        }

        match inputs.mode {
            ReflectionEffectMode::Parametric => {
                self.publish_reverb(source, reverb, HybridReverbParams::default());
            }
            ReflectionEffectMode::Convolution => {
                let ir = self.reconstruct(&field, shared, duration);
                self.publish_ir(source, &ir);
            }
            ReflectionEffectMode::Hybrid => {
                let ir = self.reconstruct(&field, shared, duration);
                let hybrid = self.hybrid_estimator.estimate(
                    &reverb,
                    &ir,
                    inputs.hybrid_transition_time,
                    inputs.hybrid_overlap_fraction,
                );
                self.publish_ir_head(source, &ir, inputs.hybrid_transition_time);
                self.publish_reverb(source, reverb, hybrid);
            }
        }
    }

    fn apply_baked_reflections(
        &self,
        source: &Arc<SimulationData>,
        inputs: &ReflectionSimulationSettings,
        identifier: &BakedDataIdentifier,
        shared: &SharedSimulationInputs,
        batches: &[Arc<ProbeBatch>],
    ) {
        // Baked payloads are looked up at the listener position.
        let query = shared.listener.origin;
        for batch in batches {
            let Some(BakedData::Reflections { irs, reverbs }) = batch.baked_data(identifier)
            else {
                continue;
            };
            let mut neighborhood = ProbeNeighborhood::default();
            batch.get_influencing_probes(query, &mut neighborhood);
            neighborhood.calc_weights(batch.probes(), query);
            let Some(best) = neighborhood.best_probe() else {
                continue;
            };

            if let Some(irs) = irs {
                if let Some(Some(ir)) = irs.get(best) {
                    match inputs.mode {
                        ReflectionEffectMode::Hybrid => {
                            let reverb = scaled_reverb(
                                reverbs.as_ref().and_then(|r| r.get(best).copied().flatten()),
                                inputs,
                                ir,
                            );
                            let hybrid = self.hybrid_estimator.estimate(
                                &reverb,
                                ir,
                                inputs.hybrid_transition_time,
                                inputs.hybrid_overlap_fraction,
                            );
                            self.publish_ir_head(source, ir, inputs.hybrid_transition_time);
                            self.publish_reverb(source, reverb, hybrid);
                        }
                        _ => self.publish_ir(source, ir),
                    }
                    return;
                }
            }
            if let Some(reverbs) = reverbs {
                // Parametric payloads blend over the neighborhood.
                let mut blended = [0.0f32; NUM_BANDS];
                let mut total = 0.0f32;
                for (slot, &index) in neighborhood.indices.iter().enumerate() {
                    if let Some(Some(reverb)) = reverbs.get(index) {
                        let weight = neighborhood.weights[slot];
                        for (acc, &t) in blended.iter_mut().zip(&reverb.reverb_times) {
                            *acc += weight * t;
                        }
                        total += weight;
                    }
                }
                if total > 1e-6 {
                    let mut reverb = Reverb::default();
                    for (out, (&acc, &scale)) in reverb
                        .reverb_times
                        .iter_mut()
                        .zip(blended.iter().zip(&inputs.reverb_scale))
                    {
                        *out = acc / total * scale;
                    }
                    self.publish_reverb(source, reverb, HybridReverbParams::default());
                    return;
                }
            }
        }
        log::warn!("no baked reflections found for identifier {identifier:?}");
    }

    fn reconstruct(
        &self,
        field: &EnergyField,
        shared: &SharedSimulationInputs,
        duration: f32,
    ) -> ImpulseResponse {
        let num_samples = ((duration * self.settings.audio.sampling_rate() as f32) as usize)
            .min(self.max_ir_samples());
        let mut ir = ImpulseResponse::new(
            field.num_channels(),
            num_samples,
            self.settings.audio.sampling_rate(),
        );
        self.reconstructor.reconstruct(
            field,
            &AirAbsorptionModel::Default,
            shared.reconstruction,
            &mut ir,
        );
        ir
    }

    fn max_ir_samples(&self) -> usize {
        ((self.settings.max_duration * self.settings.audio.sampling_rate() as f32) as usize)
            .max(self.settings.audio.frame_size())
    }

    fn publish_ir(&self, source: &Arc<SimulationData>, ir: &ImpulseResponse) {
        let channels = ir.channels();
        let mut partitioner = self.partitioner.lock();
        let fir = source.outputs.fir.write();
        partitioner.partition(&channels, fir);
        source.outputs.fir.publish();
    }

    /// Publish only the first `transition_time` seconds of the IR (the
    /// hybrid convolution head).
    fn publish_ir_head(
        &self,
        source: &Arc<SimulationData>,
        ir: &ImpulseResponse,
        transition_time: f32,
    ) {
        let head_samples = ((transition_time * ir.sampling_rate() as f32) as usize)
            .clamp(1, ir.num_samples());
        let channels: Vec<&[Sample]> = ir
            .channels()
            .iter()
            .map(|c| &c[..head_samples])
            .collect();
        let mut partitioner = self.partitioner.lock();
        let fir = source.outputs.fir.write();
        partitioner.partition(&channels, fir);
        source.outputs.fir.publish();
    }

    fn publish_reverb(
        &self,
        source: &Arc<SimulationData>,
        reverb: Reverb,
        hybrid: HybridReverbParams,
    ) {
        *source.outputs.reverb.write() = ReverbOutputs { reverb, hybrid };
        source.outputs.reverb.publish();
    }

    /// One pathing pass over every committed source.
    pub fn simulate_pathing(&self) {
        let scene = self.scene.read().clone();
        let shared = *self.shared.lock();
        let sources = self.committed_sources.read().clone();
        let batches = self.committed_batches.read().clone();
        let visualization = self.path_visualization.lock().clone();

        for source in &sources {
            let inputs = source.pathing_inputs.lock().clone();
            if !inputs.enabled {
                continue;
            }

            let mut result = PathSimulationResult::default();
            let mut found = false;
            for batch in &batches {
                let path_data = batch.baked_identifiers().find_map(|id| {
                    match batch.baked_data(id) {
                        Some(BakedData::Pathing(data)) => Some(data),
                        _ => None,
                    }
                });
                let Some(data) = path_data else {
                    continue;
                };
                let sim_inputs = PathSimulationInputs {
                    source: inputs.source,
                    listener: shared.listener.origin,
                    order: inputs.order.min(self.settings.max_order),
                    find_alternate_paths: inputs.find_alternate_paths,
                    simplify_paths: inputs.simplify_paths,
                    realtime_validation: inputs.realtime_validation,
                    visualization: visualization.as_ref().map(|callback| {
                        callback.as_ref() as &(dyn Fn(Vector3, Vector3, bool) + Sync)
                    }),
                };
                self.path_simulator.simulate(
                    scene.as_deref(),
                    batch,
                    data,
                    &sim_inputs,
                    &mut result,
                );
                found = true;
                break;
            }
            if !found {
                continue;
            }

            let outputs = source.outputs.pathing.write();
            outputs.eq_gains = result.eq_gains;
            outputs.sh_coeffs.clear();
            outputs.sh_coeffs.extend_from_slice(&result.sh_coeffs);
            outputs.avg_direction = result.avg_direction;
            outputs.distance_ratio = result.distance_ratio;
            source.outputs.pathing.publish();
        }
    }
}

fn scaled_reverb(
    baked: Option<Reverb>,
    inputs: &ReflectionSimulationSettings,
    ir: &ImpulseResponse,
) -> Reverb {
    let mut reverb = baked.unwrap_or_else(|| ReverbEstimator::estimate_from_ir(ir));
    for (time, &scale) in reverb.reverb_times.iter_mut().zip(&inputs.reverb_scale) {
        *time *= scale;
    }
    reverb
}

#[cfg(test)]
mod tests {
    use super::*;
    use ef_core::Sphere;
    use ef_scene::{box_mesh, Material, SceneAccel};
    use ef_spatial::DirectApplyFlags;

    fn manager() -> SimulationManager {
        SimulationManager::new(SimulationManagerSettings {
            audio: AudioSettings::new(48000, 1024).unwrap(),
            max_num_rays: 4096,
            max_order: 1,
            max_duration: 1.0,
            num_threads: 2,
            max_occlusion_samples: 32,
        })
    }

    fn room_scene() -> Arc<SceneAccel> {
        let scene = SceneAccel::new();
        let mesh = box_mesh(
            Vector3::new(-6.0, 0.0, -6.0),
            Vector3::new(6.0, 3.0, 6.0),
            Material::new([0.3, 0.3, 0.3], 0.5, [0.0; 3]),
        )
        .unwrap();
        scene.add_static_mesh(Arc::new(mesh));
        scene.commit();
        Arc::new(scene)
    }

    fn source_at(manager: &SimulationManager, position: Vector3) -> Arc<SimulationData> {
        let source = Arc::new(SimulationData::new(
            manager.settings.audio,
            manager.settings.max_order,
            manager.settings.max_duration,
        ));
        source.set_direct_inputs(DirectSimulationInputs {
            flags: DirectApplyFlags {
                distance_attenuation: true,
                air_absorption: true,
                occlusion: true,
                ..Default::default()
            },
            source: CoordinateSpace3 {
                origin: position,
                ..Default::default()
            },
            ..Default::default()
        });
        manager.add_source(Arc::clone(&source));
        source
    }

    #[test]
    fn test_direct_pass_publishes() {
        let manager = manager();
        manager.set_scene(room_scene());
        let source = source_at(&manager, Vector3::new(2.0, 1.5, 0.0));
        manager.set_shared_inputs(SharedSimulationInputs {
            listener: CoordinateSpace3 {
                origin: Vector3::new(0.0, 1.5, 0.0),
                ..Default::default()
            },
            ..Default::default()
        });
        manager.commit();
        manager.simulate_direct();

        let path = source.outputs().direct.acquire_read();
        assert!((path.distance_attenuation - 0.5).abs() < 1e-4);
        assert_eq!(path.occlusion, 0.0);
    }

    #[test]
    fn test_uncommitted_source_not_simulated() {
        let manager = manager();
        manager.set_scene(room_scene());
        let source = source_at(&manager, Vector3::new(2.0, 1.5, 0.0));
        // No commit: the pass sees no sources.
        manager.simulate_direct();
        assert!(!source.outputs().direct.has_pending());
    }

    #[test]
    fn test_indirect_pass_publishes_ir() {
        let manager = manager();
        manager.set_scene(room_scene());
        let source = source_at(&manager, Vector3::new(1.0, 1.5, 0.0));
        source.set_reflection_inputs(ReflectionSimulationSettings {
            enabled: true,
            source: CoordinateSpace3 {
                origin: Vector3::new(1.0, 1.5, 0.0),
                ..Default::default()
            },
            mode: ReflectionEffectMode::Convolution,
            ..Default::default()
        });
        manager.set_shared_inputs(SharedSimulationInputs {
            listener: CoordinateSpace3 {
                origin: Vector3::new(-1.0, 1.5, 0.0),
                ..Default::default()
            },
            num_rays: 2048,
            num_bounces: 4,
            duration: 0.5,
            order: 1,
            ..Default::default()
        });
        manager.commit();
        manager.simulate_indirect();

        let fir = source.outputs().fir.acquire_read();
        assert!(fir.num_valid_blocks() > 0, "no IR was published");
    }

    #[test]
    fn test_parametric_mode_publishes_reverb() {
        let manager = manager();
        manager.set_scene(room_scene());
        let source = source_at(&manager, Vector3::new(1.0, 1.5, 0.0));
        source.set_reflection_inputs(ReflectionSimulationSettings {
            enabled: true,
            source: CoordinateSpace3 {
                origin: Vector3::new(1.0, 1.5, 0.0),
                ..Default::default()
            },
            mode: ReflectionEffectMode::Parametric,
            reverb_scale: [2.0, 1.0, 1.0],
            ..Default::default()
        });
        manager.set_shared_inputs(SharedSimulationInputs {
            listener: CoordinateSpace3 {
                origin: Vector3::new(-1.0, 1.5, 0.0),
                ..Default::default()
            },
            num_rays: 2048,
            num_bounces: 8,
            duration: 1.0,
            order: 0,
            ..Default::default()
        });
        manager.commit();
        manager.simulate_indirect();

        let outputs = source.outputs().reverb.acquire_read();
        let times = outputs.reverb.reverb_times;
        assert!(times.iter().all(|&t| t > 0.0));
        // Band 0 was scaled 2x relative to its own estimate; with equal
        // materials the scaled band dominates.
        assert!(times[0] > times[1]);
    }

    #[test]
    fn test_baked_parametric_lookup() {
        use crate::{BakedDataType, BakedDataVariation, Probe, ProbeArray};

        let manager = manager();
        manager.set_scene(room_scene());

        let identifier = BakedDataIdentifier {
            kind: BakedDataType::Reflections,
            variation: BakedDataVariation::Reverb,
            endpoint_influence: Sphere::default(),
        };
        let mut array = ProbeArray::default();
        array.probes.push(Probe {
            influence: Sphere::new(Vector3::new(0.0, 1.5, 0.0), 10.0),
        });
        let mut batch = ProbeBatch::from_array(&array);
        batch.set_baked_data(
            identifier,
            BakedData::Reflections {
                irs: None,
                reverbs: Some(vec![Some(Reverb {
                    reverb_times: [0.9, 0.7, 0.5],
                })]),
            },
        );
        manager.add_probe_batch(Arc::new(batch));

        let source = source_at(&manager, Vector3::new(1.0, 1.5, 0.0));
        source.set_reflection_inputs(ReflectionSimulationSettings {
            enabled: true,
            mode: ReflectionEffectMode::Parametric,
            baked: Some(identifier),
            ..Default::default()
        });
        manager.set_shared_inputs(SharedSimulationInputs {
            listener: CoordinateSpace3 {
                origin: Vector3::new(0.0, 1.5, 0.0),
                ..Default::default()
            },
            ..Default::default()
        });
        manager.commit();
        manager.simulate_indirect();

        let outputs = source.outputs().reverb.acquire_read();
        assert!((outputs.reverb.reverb_times[0] - 0.9).abs() < 1e-5);
    }
}
