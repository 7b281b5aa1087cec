//! Static triangle meshes

use crate::{Bvh, BvhSplit, Hit, Material, PackedTriangle, Ray, SceneError, SceneResult};
use ef_core::{SerializedReader, SerializedWriter, Vector3, NUM_BANDS};

/// Serialization version of the static-mesh payload
const MESH_MAJOR: u32 = 1;
const MESH_MINOR: u32 = 0;

/// Triangle as three vertex indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Triangle {
    pub indices: [u32; 3],
}

/// Immutable triangle mesh with a material palette and its own BVH
pub struct StaticMesh {
    vertices: Vec<Vector3>,
    triangles: Vec<Triangle>,
    material_indices: Vec<u32>,
    materials: Vec<Material>,
    bvh: Bvh,
}

impl StaticMesh {
    /// Build a mesh and its acceleration structure.
    pub fn new(
        vertices: Vec<Vector3>,
        triangles: Vec<Triangle>,
        material_indices: Vec<u32>,
        materials: Vec<Material>,
    ) -> SceneResult<Self> {
        if material_indices.len() != triangles.len() {
            return Err(SceneError::MaterialIndexCount {
                triangles: triangles.len(),
                indices: material_indices.len(),
            });
        }
        for triangle in &triangles {
            for &index in &triangle.indices {
                if index as usize >= vertices.len() {
                    return Err(SceneError::VertexIndexOutOfRange(index));
                }
            }
        }
        for &index in &material_indices {
            if index as usize >= materials.len() {
                return Err(SceneError::MaterialIndexOutOfRange(index));
            }
        }

        let packed: Vec<PackedTriangle> = triangles
            .iter()
            .zip(&material_indices)
            .map(|(tri, &mat)| {
                PackedTriangle::new(
                    vertices[tri.indices[0] as usize],
                    vertices[tri.indices[1] as usize],
                    vertices[tri.indices[2] as usize],
                    mat,
                )
            })
            .collect();

        let degenerate = packed.iter().filter(|t| t.normal.is_nearly_zero()).count();
        if degenerate > 0 {
            log::warn!("mesh contains {degenerate} degenerate triangles");
        }

        Ok(Self {
            vertices,
            triangles,
            material_indices,
            materials,
            bvh: Bvh::build(packed, BvhSplit::Median),
        })
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn closest_hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> Hit {
        match self.bvh.closest_hit(ray, t_min, t_max) {
            Some((t, tri)) => Hit {
                distance: t,
                normal: tri.normal,
                material: self.materials[tri.material_index as usize],
            },
            None => Hit::invalid(),
        }
    }

    pub fn any_hit(&self, ray: &Ray, t_min: f32, t_max: f32) -> bool {
        self.bvh.any_hit(ray, t_min, t_max)
    }

    /// Serialize to an enveloped byte buffer.
    pub fn save(&self) -> Vec<u8> {
        let mut writer = SerializedWriter::new();

        let mut flat_vertices = Vec::with_capacity(self.vertices.len() * 3);
        for v in &self.vertices {
            flat_vertices.extend_from_slice(&[v.x, v.y, v.z]);
        }
        writer.write_f32_slice(&flat_vertices);

        let mut flat_indices = Vec::with_capacity(self.triangles.len() * 3);
        for t in &self.triangles {
            flat_indices.extend_from_slice(&t.indices);
        }
        writer.write_u32_slice(&flat_indices);
        writer.write_u32_slice(&self.material_indices);

        writer.write_u64(self.materials.len() as u64);
        for m in &self.materials {
            for &a in &m.absorption {
                writer.write_f32(a);
            }
            writer.write_f32(m.scattering);
            for &t in &m.transmission {
                writer.write_f32(t);
            }
        }

        writer.finish(MESH_MAJOR, MESH_MINOR)
    }

    /// Deserialize and rebuild the BVH.
    pub fn load(bytes: &[u8]) -> SceneResult<Self> {
        let mut reader = SerializedReader::open(bytes, MESH_MAJOR)?;

        let flat_vertices = reader.read_f32_vec()?;
        let vertices: Vec<Vector3> = flat_vertices
            .chunks_exact(3)
            .map(|c| Vector3::new(c[0], c[1], c[2]))
            .collect();

        let flat_indices = reader.read_u32_vec()?;
        let triangles: Vec<Triangle> = flat_indices
            .chunks_exact(3)
            .map(|c| Triangle {
                indices: [c[0], c[1], c[2]],
            })
            .collect();
        let material_indices = reader.read_u32_vec()?;

        let num_materials = reader.read_u64()? as usize;
        let mut materials = Vec::with_capacity(num_materials);
        for _ in 0..num_materials {
            let mut absorption = [0.0f32; NUM_BANDS];
            for a in &mut absorption {
                *a = reader.read_f32()?;
            }
            let scattering = reader.read_f32()?;
            let mut transmission = [0.0f32; NUM_BANDS];
            for t in &mut transmission {
                *t = reader.read_f32()?;
            }
            materials.push(Material::new(absorption, scattering, transmission));
        }

        Self::new(vertices, triangles, material_indices, materials)
    }
}

impl std::fmt::Debug for StaticMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticMesh")
            .field("vertices", &self.vertices.len())
            .field("triangles", &self.triangles.len())
            .field("materials", &self.materials.len())
            .finish()
    }
}

/// An axis-aligned box room with inward-facing walls, used by probes and
/// baking tests as a canonical environment.
pub fn box_mesh(min: Vector3, max: Vector3, material: Material) -> SceneResult<StaticMesh> {
    let corners = [
        Vector3::new(min.x, min.y, min.z),
        Vector3::new(max.x, min.y, min.z),
        Vector3::new(max.x, max.y, min.z),
        Vector3::new(min.x, max.y, min.z),
        Vector3::new(min.x, min.y, max.z),
        Vector3::new(max.x, min.y, max.z),
        Vector3::new(max.x, max.y, max.z),
        Vector3::new(min.x, max.y, max.z),
    ];
    let faces: [[u32; 4]; 6] = [
        [0, 1, 2, 3], // -z
        [5, 4, 7, 6], // +z
        [4, 0, 3, 7], // -x
        [1, 5, 6, 2], // +x
        [4, 5, 1, 0], // -y
        [3, 2, 6, 7], // +y
    ];
    let mut triangles = Vec::with_capacity(12);
    for face in faces {
        triangles.push(Triangle {
            indices: [face[0], face[1], face[2]],
        });
        triangles.push(Triangle {
            indices: [face[0], face[2], face[3]],
        });
    }
    let material_indices = vec![0; triangles.len()];
    StaticMesh::new(corners.to_vec(), triangles, material_indices, vec![material])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_mesh_queries() {
        let mesh = box_mesh(
            Vector3::new(-5.0, 0.0, -5.0),
            Vector3::new(5.0, 3.0, 5.0),
            Material::generic(),
        )
        .unwrap();
        assert_eq!(mesh.num_triangles(), 12);

        // From inside, looking down: floor at y = 0.
        let ray = Ray::new(Vector3::new(0.0, 1.5, 0.0), Vector3::new(0.0, -1.0, 0.0));
        let hit = mesh.closest_hit(&ray, 1e-4, f32::INFINITY);
        assert!(hit.is_valid());
        assert!((hit.distance - 1.5).abs() < 1e-4);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mesh = box_mesh(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(2.0, 2.0, 2.0),
            Material::new([0.2, 0.3, 0.4], 0.5, [0.01, 0.02, 0.03]),
        )
        .unwrap();
        let bytes = mesh.save();
        let loaded = StaticMesh::load(&bytes).unwrap();

        assert_eq!(loaded.num_vertices(), mesh.num_vertices());
        assert_eq!(loaded.num_triangles(), mesh.num_triangles());
        assert_eq!(loaded.materials(), mesh.materials());

        // Same query answers.
        let ray = Ray::new(Vector3::new(1.0, 1.0, 1.0), Vector3::new(1.0, 0.0, 0.0));
        let a = mesh.closest_hit(&ray, 1e-4, f32::INFINITY);
        let b = loaded.closest_hit(&ray, 1e-4, f32::INFINITY);
        assert!((a.distance - b.distance).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let bad = StaticMesh::new(
            vec![Vector3::ZERO],
            vec![Triangle { indices: [0, 1, 2] }],
            vec![0],
            vec![Material::generic()],
        );
        assert!(bad.is_err());
    }
}
