//! Triangle mesh assets.
//!
//! Meshes are stored in object space. Each vertex carries a position, a
//! normal and a UV; faces index into the vertex arrays three at a time.

use std::path::Path;

use tessera_math::{Aabb, Vec2, Vec3};

use crate::assets::{resolve_path, AssetError, AssetResult};
use crate::config::ConfigNode;

#[derive(Debug, Clone)]
pub struct TriangleMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub faces: Vec<u32>,
}

impl TriangleMesh {
    /// Build a mesh, filling in smooth normals and zero UVs when absent.
    pub fn new(
        positions: Vec<Vec3>,
        normals: Option<Vec<Vec3>>,
        uvs: Option<Vec<Vec2>>,
        faces: Vec<u32>,
    ) -> AssetResult<Self> {
        if faces.len() % 3 != 0 {
            return Err(AssetError::InvalidMesh(format!(
                "face index count {} is not a multiple of 3",
                faces.len()
            )));
        }
        if let Some(&i) = faces.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(AssetError::InvalidMesh(format!(
                "face index {} out of range ({} vertices)",
                i,
                positions.len()
            )));
        }

        let n = positions.len();
        let normals = match normals {
            Some(normals) if normals.len() == n => normals,
            Some(normals) => {
                log::warn!(
                    "Normal count {} does not match vertex count {}, recomputing",
                    normals.len(),
                    n
                );
                smooth_normals(&positions, &faces)
            }
            None => smooth_normals(&positions, &faces),
        };
        let uvs = match uvs {
            Some(uvs) if uvs.len() == n => uvs,
            _ => vec![Vec2::ZERO; n],
        };

        Ok(Self {
            positions,
            normals,
            uvs,
            faces,
        })
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len() / 3
    }

    /// Vertex indices of face `i`.
    #[inline]
    pub fn face(&self, i: usize) -> [usize; 3] {
        [
            self.faces[3 * i] as usize,
            self.faces[3 * i + 1] as usize,
            self.faces[3 * i + 2] as usize,
        ]
    }

    pub fn bounds(&self) -> Aabb {
        self.positions.iter().fold(Aabb::EMPTY, |b, &p| b.grow(p))
    }

    /// Mesh from inline arrays: `positions`, `normals`, `uvs` and `faces`.
    pub fn from_raw(node: &ConfigNode<'_>) -> AssetResult<Self> {
        let positions: Vec<f32> = node.child_value("positions")?;
        let faces: Vec<u32> = node.child_value("faces")?;
        let normals = node
            .child("normals")
            .map(|n| n.parse::<Vec<f32>>())
            .transpose()?;
        let uvs = node.child("uvs").map(|n| n.parse::<Vec<f32>>()).transpose()?;

        Self::new(
            positions.chunks_exact(3).map(Vec3::from_slice).collect(),
            normals.map(|v| v.chunks_exact(3).map(Vec3::from_slice).collect()),
            uvs.map(|v| v.chunks_exact(2).map(Vec2::from_slice).collect()),
            faces,
        )
    }

    /// Load all models of an OBJ file into one mesh.
    pub fn load_obj(path: &Path) -> AssetResult<Self> {
        let (models, _materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                single_index: true,
                triangulate: true,
                ..Default::default()
            },
        )
        .map_err(|e| AssetError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        if models.is_empty() {
            return Err(AssetError::Load {
                path: path.display().to_string(),
                message: "no models found in OBJ file".to_string(),
            });
        }

        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();
        let mut faces = Vec::new();
        let mut has_normals = true;
        let mut has_uvs = true;

        for model in &models {
            let mesh = &model.mesh;
            let base = positions.len() as u32;
            let count = mesh.positions.len() / 3;
            has_normals &= mesh.normals.len() == mesh.positions.len();
            has_uvs &= mesh.texcoords.len() / 2 == count;

            positions.extend(mesh.positions.chunks_exact(3).map(Vec3::from_slice));
            normals.extend(mesh.normals.chunks_exact(3).map(Vec3::from_slice));
            uvs.extend(mesh.texcoords.chunks_exact(2).map(Vec2::from_slice));
            faces.extend(mesh.indices.iter().map(|&i| base + i));
        }

        log::debug!(
            "Loaded OBJ: {} ({} models, {} vertices, {} faces)",
            path.display(),
            models.len(),
            positions.len(),
            faces.len() / 3
        );

        Self::new(
            positions,
            has_normals.then_some(normals),
            has_uvs.then_some(uvs),
            faces,
        )
    }
}

/// Area-weighted vertex normals for counter-clockwise faces.
fn smooth_normals(positions: &[Vec3], faces: &[u32]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for face in faces.chunks_exact(3) {
        let [i0, i1, i2] = [face[0] as usize, face[1] as usize, face[2] as usize];
        let n = (positions[i1] - positions[i0]).cross(positions[i2] - positions[i0]);
        normals[i0] += n;
        normals[i1] += n;
        normals[i2] += n;
    }
    for n in &mut normals {
        *n = n.try_normalize().unwrap_or(Vec3::Y);
    }
    normals
}

/// Create a mesh from its asset definition.
pub fn create(ty: &str, node: &ConfigNode<'_>, base_path: &Path) -> AssetResult<TriangleMesh> {
    match ty {
        "raw" => TriangleMesh::from_raw(node),
        "obj" => {
            let path: String = node.child_value("path")?;
            TriangleMesh::load_obj(&resolve_path(base_path, &path))
        }
        _ => Err(AssetError::UnknownType {
            kind: "triangle_mesh",
            ty: ty.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_raw_mesh() {
        let value = json!({
            "positions": [0, 0, 0, 1, 0, 0, 1, 1, 0, 0, 1, 0],
            "faces": [0, 1, 2, 0, 2, 3],
            "uvs": [0, 0, 1, 0, 1, 1, 0, 1],
        });
        let mesh = TriangleMesh::from_raw(&ConfigNode::new("mesh", &value)).unwrap();
        assert_eq!(mesh.num_faces(), 2);
        assert_eq!(mesh.face(1), [0, 2, 3]);
        assert_eq!(mesh.uvs[2], Vec2::new(1.0, 1.0));
        // Computed normals face +z for counter-clockwise winding
        for n in &mesh.normals {
            assert!((*n - Vec3::Z).length() < 1e-5);
        }
        assert_eq!(mesh.bounds().max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_invalid_faces() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        assert!(TriangleMesh::new(positions.clone(), None, None, vec![0, 1]).is_err());
        assert!(TriangleMesh::new(positions, None, None, vec![0, 1, 5]).is_err());
    }

    #[test]
    fn test_mismatched_normals_are_recomputed() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let mesh = TriangleMesh::new(positions, Some(vec![Vec3::X]), None, vec![0, 1, 2]).unwrap();
        assert_eq!(mesh.normals.len(), 3);
        assert!((mesh.normals[0] - Vec3::Z).length() < 1e-5);
    }
}
