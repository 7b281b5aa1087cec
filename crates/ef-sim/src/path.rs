//! Probe-graph pathing
//!
//! Baking builds a visibility graph over a probe batch (optionally with
//! thick visibility tests) and Dijkstra first-hop tables for every probe
//! pair. At runtime, candidate paths between the source-side and
//! listener-side neighborhoods are looked up, optionally re-routed
//! around edges the live scene now blocks, simplified, and aggregated
//! into 3-band EQ gains plus SH coefficients for the path effect.

use crate::{AirAbsorptionModel, ProbeBatch, ProbeNeighborhood, SimError, SimResult};
use ef_core::{EngineSettings, SerializedReader, SerializedWriter, Vector3, NUM_BANDS};
use ef_scene::{Ray, Scene};
use ef_spatial::sh;
use rayon::prelude::*;
use std::collections::BinaryHeap;

/// Unreachable marker in the first-hop table
const NO_HOP: u32 = u32::MAX;

/// Visibility-graph edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathEdge {
    pub to: u32,
    pub length: f32,
}

/// Settings for graph construction
#[derive(Debug, Clone, Copy)]
pub struct PathBakeSettings {
    /// Maximum probe separation for an edge, meters
    pub visibility_range: f32,
    /// Thick-visibility sampling radius; 0 = single segment test
    pub visibility_radius: f32,
    /// Fraction of samples that must be clear for a thick edge
    pub visibility_threshold: f32,
    /// Sample count for thick visibility
    pub num_visibility_samples: usize,
}

impl Default for PathBakeSettings {
    fn default() -> Self {
        Self {
            visibility_range: 50.0,
            visibility_radius: 0.0,
            visibility_threshold: 0.5,
            num_visibility_samples: 4,
        }
    }
}

/// Baked pathing payload: adjacency plus all-pairs first hops
#[derive(Debug, Clone, Default)]
pub struct PathData {
    pub adjacency: Vec<Vec<PathEdge>>,
    /// `first_hop[from][to]`: next node on the shortest path, `NO_HOP`
    /// when unreachable
    first_hop: Vec<Vec<u32>>,
    /// `distance[from][to]`: shortest path length
    distance: Vec<Vec<f32>>,
}

impl PathData {
    /// Build the graph and shortest-path tables.
    pub fn build(scene: &dyn Scene, batch: &ProbeBatch, settings: &PathBakeSettings) -> Self {
        let probes = batch.probes();
        let n = probes.len();

        let adjacency: Vec<Vec<PathEdge>> = (0..n)
            .into_par_iter()
            .map(|from| {
                let mut edges = Vec::new();
                for to in 0..n {
                    if to == from {
                        continue;
                    }
                    let a = probes[from].influence.center;
                    let b = probes[to].influence.center;
                    let length = a.distance(&b);
                    if length > settings.visibility_range {
                        continue;
                    }
                    if segment_visible(scene, a, b, settings) {
                        edges.push(PathEdge {
                            to: to as u32,
                            length,
                        });
                    }
                }
                edges
            })
            .collect();

        let tables: Vec<(Vec<u32>, Vec<f32>)> = (0..n)
            .into_par_iter()
            .map(|from| dijkstra(&adjacency, from))
            .collect();

        let mut first_hop = Vec::with_capacity(n);
        let mut distance = Vec::with_capacity(n);
        for (hops, dists) in tables {
            first_hop.push(hops);
            distance.push(dists);
        }

        Self {
            adjacency,
            first_hop,
            distance,
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.adjacency.len()
    }

    /// Shortest path length between probes, infinite if unreachable.
    pub fn path_length(&self, from: usize, to: usize) -> f32 {
        if from == to {
            return 0.0;
        }
        self.distance
            .get(from)
            .and_then(|row| row.get(to))
            .copied()
            .unwrap_or(f32::INFINITY)
    }

    /// Reconstruct the baked node chain from `from` to `to` (inclusive).
    pub fn path_nodes(&self, from: usize, to: usize) -> Option<Vec<usize>> {
        if from == to {
            return Some(vec![from]);
        }
        let mut nodes = vec![from];
        let mut current = from;
        while current != to {
            let next = self.first_hop[current][to];
            if next == NO_HOP || nodes.len() > self.num_nodes() {
                return None;
            }
            current = next as usize;
            nodes.push(current);
        }
        Some(nodes)
    }

    pub fn save(&self, writer: &mut SerializedWriter) {
        let n = self.adjacency.len();
        writer.write_u64(n as u64);
        for edges in &self.adjacency {
            writer.write_u64(edges.len() as u64);
            for edge in edges {
                writer.write_u32(edge.to);
                writer.write_f32(edge.length);
            }
        }
        for row in &self.first_hop {
            writer.write_u32_slice(row);
        }
        for row in &self.distance {
            writer.write_f32_slice(row);
        }
    }

    pub fn load(reader: &mut SerializedReader) -> SimResult<Self> {
        let n = reader.read_u64()? as usize;
        let mut adjacency = Vec::with_capacity(n);
        for _ in 0..n {
            let count = reader.read_u64()? as usize;
            let mut edges = Vec::with_capacity(count);
            for _ in 0..count {
                let to = reader.read_u32()?;
                let length = reader.read_f32()?;
                edges.push(PathEdge { to, length });
            }
            adjacency.push(edges);
        }
        let mut first_hop = Vec::with_capacity(n);
        for _ in 0..n {
            let row = reader.read_u32_vec()?;
            if row.len() != n {
                return Err(SimError::MalformedBakedData(
                    "first-hop table has wrong width".into(),
                ));
            }
            first_hop.push(row);
        }
        let mut distance = Vec::with_capacity(n);
        for _ in 0..n {
            let row = reader.read_f32_vec()?;
            if row.len() != n {
                return Err(SimError::MalformedBakedData(
                    "distance table has wrong width".into(),
                ));
            }
            distance.push(row);
        }
        Ok(Self {
            adjacency,
            first_hop,
            distance,
        })
    }
}

/// Thick (or thin) segment visibility.
fn segment_visible(scene: &dyn Scene, a: Vector3, b: Vector3, settings: &PathBakeSettings) -> bool {
    let offset = b - a;
    let distance = offset.length();
    if distance < 1e-5 {
        return true;
    }
    let direction = offset / distance;

    if settings.visibility_radius <= 0.0 || settings.num_visibility_samples <= 1 {
        let ray = Ray::new(a, direction);
        return !scene.any_hit(&ray, 1e-3, distance - 1e-3);
    }

    // Parallel segments offset perpendicular to the axis.
    let tangent = if direction.x.abs() < 0.9 {
        Vector3::UNIT_X.cross(&direction).normalized()
    } else {
        Vector3::UNIT_Y.cross(&direction).normalized()
    };
    let bitangent = direction.cross(&tangent);

    let mut clear = 0usize;
    for i in 0..settings.num_visibility_samples {
        let angle = 2.0 * std::f32::consts::PI * i as f32 / settings.num_visibility_samples as f32;
        let offset =
            (tangent * angle.cos() + bitangent * angle.sin()) * settings.visibility_radius;
        let ray = Ray::new(a + offset, direction);
        if !scene.any_hit(&ray, 1e-3, distance - 1e-3) {
            clear += 1;
        }
    }
    clear as f32 / settings.num_visibility_samples as f32 >= settings.visibility_threshold
}

/// Dijkstra from one node: `(first_hop, distance)` rows.
fn dijkstra(adjacency: &[Vec<PathEdge>], from: usize) -> (Vec<u32>, Vec<f32>) {
    let (first_hop, distance, _) = dijkstra_full(adjacency, from);
    (first_hop, distance)
}

/// Dijkstra with the predecessor table kept for path reconstruction.
fn dijkstra_full(adjacency: &[Vec<PathEdge>], from: usize) -> (Vec<u32>, Vec<f32>, Vec<u32>) {
    let n = adjacency.len();
    let mut distance = vec![f32::INFINITY; n];
    let mut previous = vec![NO_HOP; n];
    distance[from] = 0.0;

    #[derive(PartialEq)]
    struct Entry(f32, usize);
    impl Eq for Entry {}
    impl PartialOrd for Entry {
        fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for Entry {
        fn cmp(&self, other: &Self) -> std::cmp::Ordering {
            // Min-heap on distance.
            other
                .0
                .partial_cmp(&self.0)
                .unwrap_or(std::cmp::Ordering::Equal)
        }
    }

    let mut heap = BinaryHeap::new();
    heap.push(Entry(0.0, from));
    while let Some(Entry(d, node)) = heap.pop() {
        if d > distance[node] {
            continue;
        }
        for edge in &adjacency[node] {
            let next = edge.to as usize;
            let candidate = d + edge.length;
            if candidate < distance[next] {
                distance[next] = candidate;
                previous[next] = node as u32;
                heap.push(Entry(candidate, next));
            }
        }
    }

    // Convert predecessor links into first hops out of `from`.
    let mut first_hop = vec![NO_HOP; n];
    for to in 0..n {
        if to == from || !distance[to].is_finite() {
            continue;
        }
        let mut current = to;
        while previous[current] != NO_HOP && previous[current] as usize != from {
            current = previous[current] as usize;
        }
        if previous[current] as usize == from || current == to {
            first_hop[to] = current as u32;
        }
    }
    (first_hop, distance, previous)
}

/// Runtime inputs for one pathing query
pub struct PathSimulationInputs<'a> {
    pub source: Vector3,
    pub listener: Vector3,
    pub order: usize,
    /// Re-route around edges the live scene blocks
    pub find_alternate_paths: bool,
    /// Drop intermediate probes with clear line of sight past them
    pub simplify_paths: bool,
    /// Validate baked edges against the live scene even without
    /// re-routing
    pub realtime_validation: bool,
    /// Diagnostic callback for every validation ray: `(from, to,
    /// occluded)`
    pub visualization: Option<&'a (dyn Fn(Vector3, Vector3, bool) + Sync)>,
}

/// Aggregated result for the path effect
#[derive(Debug, Clone, Default)]
pub struct PathSimulationResult {
    pub eq_gains: [f32; NUM_BANDS],
    /// `(order+1)^2` coefficients encoding the arrival distribution
    pub sh_coeffs: Vec<f32>,
    pub avg_direction: Vector3,
    /// Straight-line distance over path length; 0 when nothing was found
    pub distance_ratio: f32,
}

/// Runtime path finder over a baked probe graph
#[derive(Debug, Clone)]
pub struct PathSimulator {
    max_order: usize,
    air_absorption: AirAbsorptionModel,
}

impl PathSimulator {
    pub fn new(max_order: usize) -> Self {
        Self {
            max_order,
            air_absorption: AirAbsorptionModel::Default,
        }
    }

    pub fn simulate(
        &self,
        scene: Option<&dyn Scene>,
        batch: &ProbeBatch,
        data: &PathData,
        inputs: &PathSimulationInputs,
        result: &mut PathSimulationResult,
    ) {
        let order = inputs.order.min(self.max_order);
        let num_coeffs = sh::num_coeffs(order);
        result.eq_gains = [1.0; NUM_BANDS];
        result.sh_coeffs.clear();
        result.sh_coeffs.resize(num_coeffs, 0.0);
        result.avg_direction = Vector3::ZERO;
        result.distance_ratio = 0.0;

        let straight = inputs.source.distance(&inputs.listener);

        // Direct line of sight needs no graph.
        if let Some(scene) = scene {
            let clear = !segment_occluded(scene, inputs.listener, inputs.source, inputs, true);
            if clear {
                let direction = (inputs.source - inputs.listener).normalized();
                sh::project(direction, order, &mut result.sh_coeffs);
                for band in 0..NUM_BANDS {
                    result.eq_gains[band] = self.air_absorption.evaluate(straight, band);
                }
                result.avg_direction = direction;
                result.distance_ratio = 1.0;
                return;
            }
        }

        let mut source_neighborhood = ProbeNeighborhood::default();
        let mut listener_neighborhood = ProbeNeighborhood::default();
        batch.get_influencing_probes(inputs.source, &mut source_neighborhood);
        batch.get_influencing_probes(inputs.listener, &mut listener_neighborhood);
        if let Some(scene) = scene {
            source_neighborhood.check_occlusion(scene, batch.probes(), inputs.source);
            listener_neighborhood.check_occlusion(scene, batch.probes(), inputs.listener);
        }
        source_neighborhood.calc_weights(batch.probes(), inputs.source);
        listener_neighborhood.calc_weights(batch.probes(), inputs.listener);

        // Source-side candidates: all probes or the strongest only.
        let source_candidates: Vec<(usize, f32)> =
            if EngineSettings::paths_from_all_source_probes() {
                source_neighborhood
                    .indices
                    .iter()
                    .zip(&source_neighborhood.weights)
                    .zip(&source_neighborhood.valid)
                    .filter(|&(_, &valid)| valid)
                    .map(|((&index, &weight), _)| (index, weight))
                    .collect()
            } else {
                source_neighborhood
                    .best_probe()
                    .map(|index| (index, 1.0))
                    .into_iter()
                    .collect()
            };

        let mut total_weight = 0.0f32;
        let mut eq_acc = [0.0f32; NUM_BANDS];
        let mut ratio_acc = 0.0f32;
        let mut direction_acc = Vector3::ZERO;
        let mut sh_acc = vec![0.0f32; num_coeffs];
        let mut coeff_scratch = vec![0.0f32; num_coeffs];

        for &(source_probe, source_weight) in &source_candidates {
            for (slot, &listener_probe) in listener_neighborhood.indices.iter().enumerate() {
                if !listener_neighborhood.valid[slot] {
                    continue;
                }
                let listener_weight = listener_neighborhood.weights[slot];
                if listener_weight <= 0.0 {
                    continue;
                }

                let Some(nodes) =
                    self.find_path(scene, batch, data, source_probe, listener_probe, inputs)
                else {
                    continue;
                };

                let nodes = match scene {
                    Some(scene) if inputs.simplify_paths => {
                        simplify(scene, batch, nodes, inputs)
                    }
                    _ => nodes,
                };

                // Path runs listener-side first.
                let mut length = inputs
                    .listener
                    .distance(&batch.probe(listener_probe).influence.center);
                for pair in nodes.windows(2) {
                    length += batch
                        .probe(pair[0])
                        .influence
                        .center
                        .distance(&batch.probe(pair[1]).influence.center);
                }
                length += batch
                    .probe(source_probe)
                    .influence
                    .center
                    .distance(&inputs.source);
                if length < 1e-5 {
                    continue;
                }

                let first = batch.probe(nodes[0]).influence.center;
                let arrival = (first - inputs.listener).normalized();
                let arrival = if arrival.is_nearly_zero() {
                    (inputs.source - inputs.listener).normalized()
                } else {
                    arrival
                };

                let weight = source_weight * listener_weight;
                total_weight += weight;
                ratio_acc += weight * (straight / length).min(1.0);
                direction_acc += arrival * weight;
                for band in 0..NUM_BANDS {
                    eq_acc[band] += weight * self.air_absorption.evaluate(length, band);
                }
                sh::project(arrival, order, &mut coeff_scratch);
                for (acc, &c) in sh_acc.iter_mut().zip(&coeff_scratch) {
                    *acc += weight * c;
                }
            }
        }

        if total_weight > 1e-9 {
            for band in 0..NUM_BANDS {
                result.eq_gains[band] = eq_acc[band] / total_weight;
            }
            for (out, &acc) in result.sh_coeffs.iter_mut().zip(&sh_acc) {
                *out = acc / total_weight;
            }
            result.avg_direction = direction_acc.normalized();
            result.distance_ratio = ratio_acc / total_weight;
        } else {
            // No viable path: silence.
            result.eq_gains = [0.0; NUM_BANDS];
        }
    }

    /// Baked path from listener probe to source probe, optionally
    /// re-routed around live blockers.
    fn find_path(
        &self,
        scene: Option<&dyn Scene>,
        batch: &ProbeBatch,
        data: &PathData,
        source_probe: usize,
        listener_probe: usize,
        inputs: &PathSimulationInputs,
    ) -> Option<Vec<usize>> {
        let baked = data.path_nodes(listener_probe, source_probe)?;

        let validate = inputs.find_alternate_paths || inputs.realtime_validation;
        let Some(scene) = scene.filter(|_| validate) else {
            return Some(baked);
        };

        let mut blocked = Vec::new();
        for pair in baked.windows(2) {
            let a = batch.probe(pair[0]).influence.center;
            let b = batch.probe(pair[1]).influence.center;
            if segment_occluded(scene, a, b, inputs, false) {
                blocked.push((pair[0], pair[1]));
            }
        }
        if blocked.is_empty() {
            return Some(baked);
        }
        if !inputs.find_alternate_paths {
            return None;
        }

        // Re-route on a filtered adjacency.
        let filtered: Vec<Vec<PathEdge>> = data
            .adjacency
            .iter()
            .enumerate()
            .map(|(from, edges)| {
                edges
                    .iter()
                    .filter(|edge| {
                        let pair = (from, edge.to as usize);
                        !blocked.contains(&pair) && !blocked.contains(&(pair.1, pair.0))
                    })
                    .copied()
                    .collect()
            })
            .collect();
        dijkstra_path(&filtered, listener_probe, source_probe)
    }
}

/// One Dijkstra run; reconstructs the node chain from the predecessor
/// links.
fn dijkstra_path(adjacency: &[Vec<PathEdge>], from: usize, to: usize) -> Option<Vec<usize>> {
    if from == to {
        return Some(vec![from]);
    }
    let (_, distance, previous) = dijkstra_full(adjacency, from);
    if !distance[to].is_finite() {
        return None;
    }
    let mut nodes = vec![to];
    let mut current = to;
    while current != from {
        let prev = previous[current];
        if prev == NO_HOP || nodes.len() > adjacency.len() {
            return None;
        }
        current = prev as usize;
        nodes.push(current);
    }
    nodes.reverse();
    Some(nodes)
}

/// Drop intermediate probes when the scene allows skipping past them.
fn simplify(
    scene: &dyn Scene,
    batch: &ProbeBatch,
    nodes: Vec<usize>,
    inputs: &PathSimulationInputs,
) -> Vec<usize> {
    if nodes.len() < 3 {
        return nodes;
    }
    let mut out = vec![nodes[0]];
    let mut i = 0;
    while i + 1 < nodes.len() {
        let mut next = i + 1;
        // Greedily extend past probes that are directly visible.
        while next + 1 < nodes.len() {
            let a = batch.probe(nodes[i]).influence.center;
            let b = batch.probe(nodes[next + 1]).influence.center;
            if segment_occluded(scene, a, b, inputs, false) {
                break;
            }
            next += 1;
        }
        out.push(nodes[next]);
        i = next;
    }
    out
}

/// Segment occlusion test with optional visualization reporting.
fn segment_occluded(
    scene: &dyn Scene,
    from: Vector3,
    to: Vector3,
    inputs: &PathSimulationInputs,
    always_report: bool,
) -> bool {
    let offset = to - from;
    let distance = offset.length();
    if distance < 1e-5 {
        return false;
    }
    let ray = Ray::new(from, offset / distance);
    let occluded = scene.any_hit(&ray, 1e-3, distance - 1e-3);
    if inputs.realtime_validation || always_report {
        if let Some(callback) = inputs.visualization {
            callback(from, to, occluded);
        }
    }
    occluded
}
