//! Bounding volume hierarchy over triangles
//!
//! Median split over triangle centroids along the longest axis, with an
//! optional binned surface-area-heuristic split. Leaves store triangles
//! with precomputed edge vectors and normals for fast intersection tests.
//! Traversal is iterative with a fixed-size stack.

use crate::Ray;
use ef_core::Vector3;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector3,
    pub max: Vector3,
}

impl Aabb {
    pub fn empty() -> Self {
        Self {
            min: Vector3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Vector3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn grow(&mut self, point: Vector3) {
        self.min = self.min.min(&point);
        self.max = self.max.max(&point);
    }

    pub fn union(&mut self, other: &Aabb) {
        self.min = self.min.min(&other.min);
        self.max = self.max.max(&other.max);
    }

    pub fn centroid(&self) -> Vector3 {
        (self.min + self.max) * 0.5
    }

    pub fn surface_area(&self) -> f32 {
        let d = self.max - self.min;
        if d.x < 0.0 || d.y < 0.0 || d.z < 0.0 {
            return 0.0;
        }
        2.0 * (d.x * d.y + d.y * d.z + d.z * d.x)
    }

    /// Slab test. Returns the entry distance if the ray overlaps
    /// `[t_min, t_max]` inside the box.
    #[inline]
    pub fn hit(&self, ray: &Ray, inv_dir: Vector3, t_min: f32, t_max: f32) -> Option<f32> {
        let mut t0 = t_min;
        let mut t1 = t_max;
        for axis in 0..3 {
            let inv = inv_dir.component(axis);
            let origin = ray.origin.component(axis);
            let mut near = (self.min.component(axis) - origin) * inv;
            let mut far = (self.max.component(axis) - origin) * inv;
            if inv < 0.0 {
                std::mem::swap(&mut near, &mut far);
            }
            t0 = t0.max(near);
            t1 = t1.min(far);
            if t0 > t1 {
                return None;
            }
        }
        Some(t0)
    }
}

/// Precomputed triangle for the intersection kernel
#[derive(Debug, Clone, Copy)]
pub struct PackedTriangle {
    pub v0: Vector3,
    pub edge1: Vector3,
    pub edge2: Vector3,
    pub normal: Vector3,
    /// Index into the owning mesh's material palette
    pub material_index: u32,
}

impl PackedTriangle {
    pub fn new(v0: Vector3, v1: Vector3, v2: Vector3, material_index: u32) -> Self {
        let edge1 = v1 - v0;
        let edge2 = v2 - v0;
        Self {
            v0,
            edge1,
            edge2,
            normal: edge1.cross(&edge2).normalized(),
            material_index,
        }
    }

    /// Möller-Trumbore intersection, two-sided.
    #[inline]
    pub fn intersect(&self, ray: &Ray) -> Option<f32> {
        let p = ray.direction.cross(&self.edge2);
        let det = self.edge1.dot(&p);
        if det.abs() < 1e-9 {
            return None;
        }
        let inv_det = 1.0 / det;
        let s = ray.origin - self.v0;
        let u = s.dot(&p) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(&self.edge1);
        let v = ray.direction.dot(&q) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = self.edge2.dot(&q) * inv_det;
        if t > 0.0 {
            Some(t)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    bounds: Aabb,
    /// Interior: index of the left child (right is left + 1 in storage
    /// order is not guaranteed, so both are stored). Leaf: first triangle.
    left_or_first: u32,
    right: u32,
    /// 0 for interior nodes; leaf triangle count otherwise
    count: u32,
}

/// Split strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BvhSplit {
    /// Median split along the longest centroid axis
    #[default]
    Median,
    /// Binned surface-area heuristic
    SurfaceAreaHeuristic,
}

const MAX_LEAF_TRIANGLES: usize = 4;
const SAH_BINS: usize = 12;
const TRAVERSAL_STACK: usize = 64;

/// Flattened BVH owning its reordered triangle array
#[derive(Debug, Clone)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    triangles: Vec<PackedTriangle>,
}

impl Bvh {
    /// Build over a triangle soup.
    pub fn build(mut triangles: Vec<PackedTriangle>, split: BvhSplit) -> Self {
        if triangles.is_empty() {
            return Self {
                nodes: Vec::new(),
                triangles,
            };
        }

        let mut nodes = Vec::with_capacity(triangles.len() * 2);
        let count = triangles.len();
        Self::build_recursive(&mut triangles, 0, count, split, &mut nodes);
        Self { nodes, triangles }
    }

    fn node_bounds(triangles: &[PackedTriangle], start: usize, end: usize) -> Aabb {
        let mut bounds = Aabb::empty();
        for tri in &triangles[start..end] {
            bounds.grow(tri.v0);
            bounds.grow(tri.v0 + tri.edge1);
            bounds.grow(tri.v0 + tri.edge2);
        }
        bounds
    }

    fn centroid(tri: &PackedTriangle) -> Vector3 {
        tri.v0 + (tri.edge1 + tri.edge2) / 3.0
    }

    /// Returns the index of the created node.
    fn build_recursive(
        triangles: &mut [PackedTriangle],
        start: usize,
        end: usize,
        split: BvhSplit,
        nodes: &mut Vec<BvhNode>,
    ) -> u32 {
        let bounds = Self::node_bounds(triangles, start, end);
        let node_index = nodes.len() as u32;
        nodes.push(BvhNode {
            bounds,
            left_or_first: start as u32,
            right: 0,
            count: (end - start) as u32,
        });

        if end - start <= MAX_LEAF_TRIANGLES {
            return node_index;
        }

        // Centroid bounds pick the split axis.
        let mut centroid_bounds = Aabb::empty();
        for tri in &triangles[start..end] {
            centroid_bounds.grow(Self::centroid(tri));
        }
        let extent = centroid_bounds.max - centroid_bounds.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        if extent.component(axis) < 1e-7 {
            return node_index; // Degenerate spread; keep as a leaf.
        }

        let mid = match split {
            BvhSplit::Median => {
                let mid = (start + end) / 2;
                triangles[start..end].select_nth_unstable_by(mid - start, |a, b| {
                    Self::centroid(a)
                        .component(axis)
                        .partial_cmp(&Self::centroid(b).component(axis))
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                mid
            }
            BvhSplit::SurfaceAreaHeuristic => {
                Self::sah_partition(triangles, start, end, axis, &centroid_bounds)
                    .unwrap_or((start + end) / 2)
            }
        };
        let mid = mid.clamp(start + 1, end - 1);
        if mid == start || mid == end {
            return node_index;
        }

        let left = Self::build_recursive(triangles, start, mid, split, nodes);
        let right = Self::build_recursive(triangles, mid, end, split, nodes);
        nodes[node_index as usize].left_or_first = left;
        nodes[node_index as usize].right = right;
        nodes[node_index as usize].count = 0;
        node_index
    }

    /// Binned SAH: choose the bin boundary minimizing area-weighted
    /// triangle counts, then partition around it.
    fn sah_partition(
        triangles: &mut [PackedTriangle],
        start: usize,
        end: usize,
        axis: usize,
        centroid_bounds: &Aabb,
    ) -> Option<usize> {
        let lo = centroid_bounds.min.component(axis);
        let hi = centroid_bounds.max.component(axis);
        let scale = SAH_BINS as f32 / (hi - lo);

        let mut bin_counts = [0usize; SAH_BINS];
        let mut bin_bounds = [Aabb::empty(); SAH_BINS];
        for tri in &triangles[start..end] {
            let c = Self::centroid(tri).component(axis);
            let bin = (((c - lo) * scale) as usize).min(SAH_BINS - 1);
            bin_counts[bin] += 1;
            bin_bounds[bin].grow(tri.v0);
            bin_bounds[bin].grow(tri.v0 + tri.edge1);
            bin_bounds[bin].grow(tri.v0 + tri.edge2);
        }

        let mut best_cost = f32::INFINITY;
        let mut best_bin = None;
        for boundary in 1..SAH_BINS {
            let mut left = Aabb::empty();
            let mut right = Aabb::empty();
            let mut left_count = 0;
            let mut right_count = 0;
            for (bin, bounds) in bin_bounds.iter().enumerate() {
                if bin < boundary {
                    left.union(bounds);
                    left_count += bin_counts[bin];
                } else {
                    right.union(bounds);
                    right_count += bin_counts[bin];
                }
            }
            if left_count == 0 || right_count == 0 {
                continue;
            }
            let cost =
                left.surface_area() * left_count as f32 + right.surface_area() * right_count as f32;
            if cost < best_cost {
                best_cost = cost;
                best_bin = Some(boundary);
            }
        }

        let boundary = best_bin?;
        let pivot = lo + boundary as f32 / scale;
        let mid = start
            + partition_in_place(&mut triangles[start..end], |tri| {
                Self::centroid(tri).component(axis) < pivot
            });
        Some(mid)
    }

    /// Closest intersection in `[t_min, t_max]`, front-to-back.
    pub fn closest_hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<(f32, &PackedTriangle)> {
        if self.nodes.is_empty() {
            return None;
        }
        let inv_dir = Vector3::new(
            1.0 / ray.direction.x,
            1.0 / ray.direction.y,
            1.0 / ray.direction.z,
        );

        let mut best_t = t_max;
        let mut best_tri: Option<&PackedTriangle> = None;
        let mut stack = [0u32; TRAVERSAL_STACK];
        let mut stack_len = 1usize;
        stack[0] = 0;

        while stack_len > 0 {
            stack_len -= 1;
            let node = &self.nodes[stack[stack_len] as usize];
            if node.bounds.hit(ray, inv_dir, t_min, best_t).is_none() {
                continue;
            }
            if node.count > 0 {
                let first = node.left_or_first as usize;
                for tri in &self.triangles[first..first + node.count as usize] {
                    if let Some(t) = tri.intersect(ray) {
                        if t >= t_min && t < best_t {
                            best_t = t;
                            best_tri = Some(tri);
                        }
                    }
                }
            } else {
                // Push the farther child last so the nearer one pops first.
                let left = node.left_or_first;
                let right = node.right;
                let dl = self.nodes[left as usize].bounds.hit(ray, inv_dir, t_min, best_t);
                let dr = self.nodes[right as usize].bounds.hit(ray, inv_dir, t_min, best_t);
                match (dl, dr) {
                    (Some(a), Some(b)) => {
                        let (near, far) = if a <= b { (left, right) } else { (right, left) };
                        if stack_len + 2 <= TRAVERSAL_STACK {
                            stack[stack_len] = far;
                            stack[stack_len + 1] = near;
                            stack_len += 2;
                        }
                    }
                    (Some(_), None) => {
                        stack[stack_len] = left;
                        stack_len += 1;
                    }
                    (None, Some(_)) => {
                        stack[stack_len] = right;
                        stack_len += 1;
                    }
                    (None, None) => {}
                }
            }
        }

        best_tri.map(|tri| (best_t, tri))
    }

    /// True if any intersection exists in `[t_min, t_max]`.
    pub fn any_hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> bool {
        if self.nodes.is_empty() {
            return false;
        }
        let inv_dir = Vector3::new(
            1.0 / ray.direction.x,
            1.0 / ray.direction.y,
            1.0 / ray.direction.z,
        );

        let mut stack = [0u32; TRAVERSAL_STACK];
        let mut stack_len = 1usize;
        stack[0] = 0;

        while stack_len > 0 {
            stack_len -= 1;
            let node = &self.nodes[stack[stack_len] as usize];
            if node.bounds.hit(ray, inv_dir, t_min, t_max).is_none() {
                continue;
            }
            if node.count > 0 {
                let first = node.left_or_first as usize;
                for tri in &self.triangles[first..first + node.count as usize] {
                    if let Some(t) = tri.intersect(ray) {
                        if t >= t_min && t <= t_max {
                            return true;
                        }
                    }
                }
            } else if stack_len + 2 <= TRAVERSAL_STACK {
                stack[stack_len] = node.left_or_first;
                stack[stack_len + 1] = node.right;
                stack_len += 2;
            }
        }
        false
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }
}

/// Stable-enough in-place partition; returns the split index.
fn partition_in_place<T>(slice: &mut [T], mut pred: impl FnMut(&T) -> bool) -> usize {
    let mut split = 0;
    for i in 0..slice.len() {
        if pred(&slice[i]) {
            slice.swap(split, i);
            split += 1;
        }
    }
    split
}
