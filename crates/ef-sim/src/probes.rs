//! Probes and probe batches
//!
//! Probes are spatial sampling points with influence spheres. A batch
//! owns a set of probes, a uniform-grid spatial index for influence
//! lookups, and baked payloads keyed by what was baked and for which
//! endpoint.

use crate::path::PathData;
use crate::{ImpulseResponse, Reverb, SimError, SimResult};
use ef_core::{Matrix4, SerializedReader, SerializedWriter, Sphere, Vector3};
use ef_scene::{Ray, Scene};
use std::collections::HashMap;

const PROBE_BATCH_MAJOR: u32 = 1;
const PROBE_BATCH_MINOR: u32 = 0;

/// Maximum probes returned by an influence query
pub const MAX_NEIGHBORHOOD_PROBES: usize = 8;

/// Offset used when marching probe rays downward through stacked floors
const DOWNWARD_OFFSET: f32 = 0.01;

/// A sampling point with an influence volume
#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Probe {
    pub influence: Sphere,
}

/// Unordered probe set produced by generation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeArray {
    pub probes: Vec<Probe>,
}

/// Probe placement strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProbeGenerationType {
    /// One probe at the oriented-box center
    Centroid,
    /// Regular grid over the box, snapped down onto scene floors
    UniformFloor,
}

/// Probe placement over an oriented box
pub struct ProbeGenerator;

impl ProbeGenerator {
    /// `obb_transform` maps the unit cube (centered at the origin) onto
    /// the target region. `spacing` and `height` apply to uniform-floor
    /// placement.
    pub fn generate_probes(
        scene: &dyn Scene,
        obb_transform: &Matrix4,
        kind: ProbeGenerationType,
        spacing: f32,
        height: f32,
        probes: &mut ProbeArray,
    ) {
        match kind {
            ProbeGenerationType::Centroid => Self::generate_centroid_probe(obb_transform, probes),
            ProbeGenerationType::UniformFloor => {
                Self::generate_uniform_floor_probes(scene, obb_transform, spacing, height, probes)
            }
        }
    }

    fn generate_centroid_probe(obb_transform: &Matrix4, probes: &mut ProbeArray) {
        let center = Vector3::new(
            obb_transform.get(0, 3),
            obb_transform.get(1, 3),
            obb_transform.get(2, 3),
        );
        let (sx, sy, sz) = obb_transform.column_scales();
        probes.probes.clear();
        probes.probes.push(Probe {
            influence: Sphere::new(center, (sx / 2.0).min(sy / 2.0).min(sz / 2.0)),
        });
    }

    fn generate_uniform_floor_probes(
        scene: &dyn Scene,
        obb_transform: &Matrix4,
        spacing: f32,
        height: f32,
        probes: &mut ProbeArray,
    ) {
        probes.probes.clear();
        let (sx, sy, sz) = obb_transform.column_scales();
        if sx < f32::MIN_POSITIVE || sy < f32::MIN_POSITIVE || sz < f32::MIN_POSITIVE {
            return;
        }

        let num_x = (sx / spacing).floor() as i32 + 1;
        let num_z = (sz / spacing).floor() as i32 + 1;
        let residual_x = (sx - (num_x - 1) as f32 * spacing) / 2.0;
        let residual_z = (sz - (num_z - 1) as f32 * spacing) / 2.0;

        let down = obb_transform
            .transform_direction(Vector3::new(0.0, -1.0, 0.0))
            .normalized();

        for i in 0..num_x {
            for j in 0..num_z {
                let x = -0.5 + (i as f32 * spacing + residual_x) / sx;
                let z = -0.5 + (j as f32 * spacing + residual_z) / sz;
                let top = obb_transform.transform_point(Vector3::new(x, 0.5, z));
                Self::probes_below(scene, top, down, sy, spacing, height, probes);
            }
        }
    }

    /// March downward from `origin`, dropping one probe per floor hit,
    /// continuing through openings until the box is exhausted.
    fn probes_below(
        scene: &dyn Scene,
        origin: Vector3,
        down: Vector3,
        box_height: f32,
        spacing: f32,
        height: f32,
        probes: &mut ProbeArray,
    ) {
        let mut current = origin;
        let mut remaining = box_height;

        while remaining > 0.0 {
            let ray = Ray::new(current, down);
            let hit = scene.closest_hit(&ray, height, remaining + height);
            if !hit.is_valid() {
                break;
            }

            // Raise the hit point back up by the probe height.
            let position = current + down * (hit.distance - height);
            probes.probes.push(Probe {
                influence: Sphere::new(position, spacing),
            });

            current += down * (hit.distance + DOWNWARD_OFFSET);
            remaining -= hit.distance + DOWNWARD_OFFSET;
        }
    }
}

/// What a payload was baked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BakedDataType {
    Reflections,
    Pathing,
}

/// How the baked endpoint varies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum BakedDataVariation {
    /// Source and listener both sweep the probe set
    Reverb,
    /// Fixed source at the endpoint, listener sweeps the probes
    StaticSource,
    /// Fixed listener at the endpoint, sources sweep the probes
    StaticListener,
    Dynamic,
}

/// Key for a baked payload in a probe batch
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct BakedDataIdentifier {
    pub kind: BakedDataType,
    pub variation: BakedDataVariation,
    pub endpoint_influence: Sphere,
}

impl PartialEq for BakedDataIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.variation == other.variation
            && sphere_bits(&self.endpoint_influence) == sphere_bits(&other.endpoint_influence)
    }
}

impl Eq for BakedDataIdentifier {}

impl std::hash::Hash for BakedDataIdentifier {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.variation.hash(state);
        sphere_bits(&self.endpoint_influence).hash(state);
    }
}

fn sphere_bits(sphere: &Sphere) -> [u32; 4] {
    [
        sphere.center.x.to_bits(),
        sphere.center.y.to_bits(),
        sphere.center.z.to_bits(),
        sphere.radius.to_bits(),
    ]
}

/// A baked payload
#[derive(Debug, Clone)]
pub enum BakedData {
    /// Per-probe reflections: reconstructed IRs for convolution
    /// rendering and/or reverb estimates for parametric rendering
    Reflections {
        irs: Option<Vec<Option<ImpulseResponse>>>,
        reverbs: Option<Vec<Option<Reverb>>>,
    },
    /// Probe visibility graph with baked shortest paths
    Pathing(PathData),
}

/// Ordered influence-query result: up to `MAX_NEIGHBORHOOD_PROBES`
/// probes, their line-of-sight validity, and normalized falloff weights.
#[derive(Debug, Clone, Default)]
pub struct ProbeNeighborhood {
    pub indices: Vec<usize>,
    pub valid: Vec<bool>,
    pub weights: Vec<f32>,
}

impl ProbeNeighborhood {
    pub fn reset(&mut self) {
        self.indices.clear();
        self.valid.clear();
        self.weights.clear();
    }

    pub fn num_probes(&self) -> usize {
        self.indices.len()
    }

    /// Mark probes whose line of sight to `point` is blocked.
    pub fn check_occlusion(&mut self, scene: &dyn Scene, probes: &[Probe], point: Vector3) {
        for (slot, &index) in self.indices.iter().enumerate() {
            let center = probes[index].influence.center;
            let offset = center - point;
            let distance = offset.length();
            if distance < 1e-5 {
                self.valid[slot] = true;
                continue;
            }
            let ray = Ray::new(point, offset / distance);
            self.valid[slot] = !scene.any_hit(&ray, 1e-3, distance - 1e-3);
        }
    }

    /// Smooth-falloff weights over the valid probes, normalized to 1.
    pub fn calc_weights(&mut self, probes: &[Probe], point: Vector3) {
        let mut total = 0.0f32;
        for (slot, &index) in self.indices.iter().enumerate() {
            let weight = if self.valid[slot] {
                probes[index].influence.falloff(point)
            } else {
                0.0
            };
            self.weights[slot] = weight;
            total += weight;
        }
        if total > 1e-9 {
            for weight in &mut self.weights {
                *weight /= total;
            }
        }
    }

    /// The valid probe with the largest weight.
    pub fn best_probe(&self) -> Option<usize> {
        self.indices
            .iter()
            .zip(&self.weights)
            .zip(&self.valid)
            .filter(|&(_, &valid)| valid)
            .max_by(|((_, a), _), ((_, b), _)| {
                a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|((&index, _), _)| index)
    }
}

/// Cell size multiplier for the uniform-grid index
const GRID_CELL_SCALE: f32 = 2.0;

#[derive(Debug, Clone, Default)]
struct ProbeGrid {
    origin: Vector3,
    cell_size: f32,
    dims: (usize, usize, usize),
    cells: Vec<Vec<u32>>,
}

impl ProbeGrid {
    fn build(probes: &[Probe]) -> Self {
        if probes.is_empty() {
            return Self::default();
        }
        let mut min = probes[0].influence.center;
        let mut max = min;
        let mut radius_sum = 0.0f32;
        for probe in probes {
            let c = probe.influence.center;
            let r = probe.influence.radius;
            min = min.min(&(c - Vector3::new(r, r, r)));
            max = max.max(&(c + Vector3::new(r, r, r)));
            radius_sum += r;
        }
        let cell_size = (radius_sum / probes.len() as f32 * GRID_CELL_SCALE).max(0.1);
        let extent = max - min;
        let dims = (
            (extent.x / cell_size).ceil().max(1.0) as usize,
            (extent.y / cell_size).ceil().max(1.0) as usize,
            (extent.z / cell_size).ceil().max(1.0) as usize,
        );
        let mut grid = Self {
            origin: min,
            cell_size,
            dims,
            cells: vec![Vec::new(); dims.0 * dims.1 * dims.2],
        };
        for (index, probe) in probes.iter().enumerate() {
            let (lo, hi) = grid.cell_range(&probe.influence);
            for x in lo.0..=hi.0 {
                for y in lo.1..=hi.1 {
                    for z in lo.2..=hi.2 {
                        let cell = grid.cell_index(x, y, z);
                        grid.cells[cell].push(index as u32);
                    }
                }
            }
        }
        grid
    }

    fn cell_of(&self, point: Vector3) -> (usize, usize, usize) {
        let rel = point - self.origin;
        (
            ((rel.x / self.cell_size) as isize).clamp(0, self.dims.0 as isize - 1) as usize,
            ((rel.y / self.cell_size) as isize).clamp(0, self.dims.1 as isize - 1) as usize,
            ((rel.z / self.cell_size) as isize).clamp(0, self.dims.2 as isize - 1) as usize,
        )
    }

    fn cell_range(&self, sphere: &Sphere) -> ((usize, usize, usize), (usize, usize, usize)) {
        let r = Vector3::new(
            sphere.radius,
            sphere.radius,
            sphere.radius,
        );
        (
            self.cell_of(sphere.center - r),
            self.cell_of(sphere.center + r),
        )
    }

    fn cell_index(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.dims.1 + y) * self.dims.2 + z
    }

    fn candidates(&self, point: Vector3) -> &[u32] {
        if self.cells.is_empty() {
            return &[];
        }
        let (x, y, z) = self.cell_of(point);
        &self.cells[self.cell_index(x, y, z)]
    }
}

/// Probes plus spatial index plus baked payloads
#[derive(Debug, Default)]
pub struct ProbeBatch {
    probes: Vec<Probe>,
    grid: ProbeGrid,
    baked: HashMap<BakedDataIdentifier, BakedData>,
}

impl ProbeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_array(array: &ProbeArray) -> Self {
        let mut batch = Self::new();
        batch.add_probe_array(array);
        batch
    }

    pub fn add_probe_array(&mut self, array: &ProbeArray) {
        self.probes.extend_from_slice(&array.probes);
        self.grid = ProbeGrid::build(&self.probes);
    }

    pub fn num_probes(&self) -> usize {
        self.probes.len()
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub fn probe(&self, index: usize) -> &Probe {
        &self.probes[index]
    }

    pub fn set_baked_data(&mut self, identifier: BakedDataIdentifier, data: BakedData) {
        self.baked.insert(identifier, data);
    }

    pub fn baked_data(&self, identifier: &BakedDataIdentifier) -> Option<&BakedData> {
        self.baked.get(identifier)
    }

    pub fn remove_baked_data(&mut self, identifier: &BakedDataIdentifier) {
        self.baked.remove(identifier);
    }

    pub fn baked_identifiers(&self) -> impl Iterator<Item = &BakedDataIdentifier> {
        self.baked.keys()
    }

    /// Up to `MAX_NEIGHBORHOOD_PROBES` probes whose influence spheres
    /// contain `point`, strongest falloff first. Validity defaults to
    /// true until `check_occlusion` runs.
    pub fn get_influencing_probes(&self, point: Vector3, out: &mut ProbeNeighborhood) {
        out.reset();
        let mut influencing: Vec<(usize, f32)> = self
            .grid
            .candidates(point)
            .iter()
            .map(|&i| i as usize)
            .filter(|&i| self.probes[i].influence.contains(point))
            .map(|i| (i, self.probes[i].influence.falloff(point)))
            .collect();
        influencing
            .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        influencing.truncate(MAX_NEIGHBORHOOD_PROBES);

        for (index, _) in influencing {
            out.indices.push(index);
            out.valid.push(true);
            out.weights.push(0.0);
        }
        out.weights.resize(out.indices.len(), 0.0);
    }

    /// Serialize probes and payloads to an enveloped buffer.
    pub fn save(&self) -> Vec<u8> {
        let mut writer = SerializedWriter::new();
        writer.write_u64(self.probes.len() as u64);
        for probe in &self.probes {
            write_sphere(&mut writer, &probe.influence);
        }

        writer.write_u64(self.baked.len() as u64);
        for (identifier, data) in &self.baked {
            write_identifier(&mut writer, identifier);
            match data {
                BakedData::Reflections { irs, reverbs } => {
                    writer.write_u32(0);
                    match irs {
                        Some(irs) => {
                            writer.write_u32(1);
                            writer.write_u64(irs.len() as u64);
                            for ir in irs {
                                match ir {
                                    Some(ir) => {
                                        writer.write_u32(1);
                                        ir.save(&mut writer);
                                    }
                                    None => writer.write_u32(0),
                                }
                            }
                        }
                        None => writer.write_u32(0),
                    }
                    match reverbs {
                        Some(reverbs) => {
                            writer.write_u32(1);
                            writer.write_u64(reverbs.len() as u64);
                            for reverb in reverbs {
                                match reverb {
                                    Some(r) => {
                                        writer.write_u32(1);
                                        for &t in &r.reverb_times {
                                            writer.write_f32(t);
                                        }
                                    }
                                    None => writer.write_u32(0),
                                }
                            }
                        }
                        None => writer.write_u32(0),
                    }
                }
                BakedData::Pathing(path_data) => {
                    writer.write_u32(2);
                    path_data.save(&mut writer);
                }
            }
        }
        writer.finish(PROBE_BATCH_MAJOR, PROBE_BATCH_MINOR)
    }

    pub fn load(bytes: &[u8]) -> SimResult<Self> {
        let mut reader = SerializedReader::open(bytes, PROBE_BATCH_MAJOR)?;

        let num_probes = reader.read_u64()? as usize;
        let mut probes = Vec::with_capacity(num_probes);
        for _ in 0..num_probes {
            probes.push(Probe {
                influence: read_sphere(&mut reader)?,
            });
        }

        let num_baked = reader.read_u64()? as usize;
        let mut baked = HashMap::new();
        for _ in 0..num_baked {
            let identifier = read_identifier(&mut reader)?;
            let tag = reader.read_u32()?;
            let data = match tag {
                0 => {
                    let irs = if reader.read_u32()? == 1 {
                        let count = reader.read_u64()? as usize;
                        let mut irs = Vec::with_capacity(count);
                        for _ in 0..count {
                            irs.push(if reader.read_u32()? == 1 {
                                Some(ImpulseResponse::load(&mut reader)?)
                            } else {
                                None
                            });
                        }
                        Some(irs)
                    } else {
                        None
                    };
                    let reverbs = if reader.read_u32()? == 1 {
                        let count = reader.read_u64()? as usize;
                        let mut reverbs = Vec::with_capacity(count);
                        for _ in 0..count {
                            reverbs.push(if reader.read_u32()? == 1 {
                                let mut times = [0.0f32; 3];
                                for t in &mut times {
                                    *t = reader.read_f32()?;
                                }
                                Some(Reverb {
                                    reverb_times: times,
                                })
                            } else {
                                None
                            });
                        }
                        Some(reverbs)
                    } else {
                        None
                    };
                    BakedData::Reflections { irs, reverbs }
                }
                2 => BakedData::Pathing(PathData::load(&mut reader)?),
                other => {
                    return Err(SimError::MalformedBakedData(format!(
                        "unknown baked payload tag {other}"
                    )))
                }
            };
            baked.insert(identifier, data);
        }

        let grid = ProbeGrid::build(&probes);
        Ok(Self {
            probes,
            grid,
            baked,
        })
    }
}

fn write_sphere(writer: &mut SerializedWriter, sphere: &Sphere) {
    writer.write_f32(sphere.center.x);
    writer.write_f32(sphere.center.y);
    writer.write_f32(sphere.center.z);
    writer.write_f32(sphere.radius);
}

fn read_sphere(reader: &mut SerializedReader) -> SimResult<Sphere> {
    let x = reader.read_f32()?;
    let y = reader.read_f32()?;
    let z = reader.read_f32()?;
    let radius = reader.read_f32()?;
    Ok(Sphere::new(Vector3::new(x, y, z), radius))
}

fn write_identifier(writer: &mut SerializedWriter, identifier: &BakedDataIdentifier) {
    writer.write_u32(match identifier.kind {
        BakedDataType::Reflections => 0,
        BakedDataType::Pathing => 1,
    });
    writer.write_u32(match identifier.variation {
        BakedDataVariation::Reverb => 0,
        BakedDataVariation::StaticSource => 1,
        BakedDataVariation::StaticListener => 2,
        BakedDataVariation::Dynamic => 3,
    });
    write_sphere(writer, &identifier.endpoint_influence);
}

fn read_identifier(reader: &mut SerializedReader) -> SimResult<BakedDataIdentifier> {
    let kind = match reader.read_u32()? {
        0 => BakedDataType::Reflections,
        _ => BakedDataType::Pathing,
    };
    let variation = match reader.read_u32()? {
        0 => BakedDataVariation::Reverb,
        1 => BakedDataVariation::StaticSource,
        2 => BakedDataVariation::StaticListener,
        _ => BakedDataVariation::Dynamic,
    };
    let endpoint_influence = read_sphere(reader)?;
    Ok(BakedDataIdentifier {
        kind,
        variation,
        endpoint_influence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ef_scene::{box_mesh, Material, SceneAccel};
    use std::sync::Arc;

    fn floor_scene() -> SceneAccel {
        let scene = SceneAccel::new();
        let mesh = box_mesh(
            Vector3::new(-10.0, -0.5, -10.0),
            Vector3::new(10.0, 0.0, 10.0),
            Material::generic(),
        )
        .unwrap();
        scene.add_static_mesh(Arc::new(mesh));
        scene.commit();
        scene
    }

    fn region(size: f32, center_y: f32) -> Matrix4 {
        let mut m = Matrix4::scaling(size, size, size);
        m.rows[1][3] = center_y;
        m
    }

    #[test]
    fn test_centroid_probe() {
        let scene = floor_scene();
        let mut probes = ProbeArray::default();
        ProbeGenerator::generate_probes(
            &scene,
            &region(10.0, 2.0),
            ProbeGenerationType::Centroid,
            0.0,
            0.0,
            &mut probes,
        );
        assert_eq!(probes.probes.len(), 1);
        assert_eq!(probes.probes[0].influence.center.y, 2.0);
        assert!((probes.probes[0].influence.radius - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_uniform_floor_probes_land_on_floor() {
        let scene = floor_scene();
        let mut probes = ProbeArray::default();
        ProbeGenerator::generate_probes(
            &scene,
            &region(8.0, 2.0),
            ProbeGenerationType::UniformFloor,
            2.0,
            1.5,
            &mut probes,
        );
        assert!(!probes.probes.is_empty());
        for probe in &probes.probes {
            // Floor at y = 0, probe height 1.5 above it.
            assert!((probe.influence.center.y - 1.5).abs() < 0.05);
            assert_eq!(probe.influence.radius, 2.0);
        }
    }

    #[test]
    fn test_influence_lookup_and_weights() {
        let mut array = ProbeArray::default();
        for i in 0..5 {
            array.probes.push(Probe {
                influence: Sphere::new(Vector3::new(i as f32 * 2.0, 0.0, 0.0), 3.0),
            });
        }
        let batch = ProbeBatch::from_array(&array);

        let mut neighborhood = ProbeNeighborhood::default();
        batch.get_influencing_probes(Vector3::new(1.0, 0.0, 0.0), &mut neighborhood);
        assert!(neighborhood.num_probes() >= 2);

        neighborhood
            .valid
            .iter_mut()
            .for_each(|valid| *valid = true);
        neighborhood.calc_weights(batch.probes(), Vector3::new(1.0, 0.0, 0.0));
        let total: f32 = neighborhood.weights.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_occlusion_invalidates_probes() {
        // Wall between the query point and a probe.
        let scene = SceneAccel::new();
        let wall = box_mesh(
            Vector3::new(-0.1, -5.0, -5.0),
            Vector3::new(0.1, 5.0, 5.0),
            Material::generic(),
        )
        .unwrap();
        scene.add_static_mesh(Arc::new(wall));
        scene.commit();

        let mut array = ProbeArray::default();
        array.probes.push(Probe {
            influence: Sphere::new(Vector3::new(3.0, 0.0, 0.0), 10.0),
        });
        array.probes.push(Probe {
            influence: Sphere::new(Vector3::new(-3.0, 0.0, 0.0), 10.0),
        });
        let batch = ProbeBatch::from_array(&array);

        let point = Vector3::new(-2.0, 0.0, 0.0);
        let mut neighborhood = ProbeNeighborhood::default();
        batch.get_influencing_probes(point, &mut neighborhood);
        neighborhood.check_occlusion(&scene, batch.probes(), point);

        for (slot, &index) in neighborhood.indices.iter().enumerate() {
            // Probe 0 is across the wall, probe 1 on the same side.
            assert_eq!(neighborhood.valid[slot], index == 1);
        }
    }

    #[test]
    fn test_batch_serialization_roundtrip() {
        let mut array = ProbeArray::default();
        for i in 0..3 {
            array.probes.push(Probe {
                influence: Sphere::new(Vector3::new(i as f32, 0.5, 0.0), 1.5),
            });
        }
        let mut batch = ProbeBatch::from_array(&array);

        let identifier = BakedDataIdentifier {
            kind: BakedDataType::Reflections,
            variation: BakedDataVariation::Reverb,
            endpoint_influence: Sphere::default(),
        };
        batch.set_baked_data(
            identifier,
            BakedData::Reflections {
                irs: None,
                reverbs: Some(vec![
                    Some(Reverb {
                        reverb_times: [1.0, 0.8, 0.6],
                    }),
                    None,
                    Some(Reverb {
                        reverb_times: [0.5, 0.4, 0.3],
                    }),
                ]),
            },
        );

        let bytes = batch.save();
        let loaded = ProbeBatch::load(&bytes).unwrap();
        assert_eq!(loaded.num_probes(), 3);
        assert_eq!(loaded.probe(1).influence.center, Vector3::new(1.0, 0.5, 0.0));

        match loaded.baked_data(&identifier) {
            Some(BakedData::Reflections {
                irs: None,
                reverbs: Some(reverbs),
            }) => {
                assert_eq!(reverbs.len(), 3);
                assert_eq!(reverbs[0].unwrap().reverb_times, [1.0, 0.8, 0.6]);
                assert!(reverbs[1].is_none());
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }
}
