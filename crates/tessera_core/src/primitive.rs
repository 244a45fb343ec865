//! Scene graph flattening.
//!
//! The node tree of the scene description is flattened into a list of
//! primitives, each carrying its world transform and the assets it
//! references. Only nodes with a camera, light or mesh become primitives.

use std::collections::HashSet;
use std::sync::Arc;

use tessera_math::{transform, Mat3, Mat4, Mat4Ext, Vec3};

use crate::assets::Assets;
use crate::config::{ConfigError, NodeDesc, TransformDesc};
use crate::mesh::TriangleMesh;
use crate::scene::{SceneError, SceneResult};

/// Index of a BSDF in the scene.
pub type BsdfId = usize;
/// Index of a light in the scene.
pub type LightId = usize;
/// Index of a camera in the scene.
pub type CameraId = usize;

/// A transformed reference to a mesh, light or camera.
#[derive(Debug, Clone)]
pub struct Primitive {
    pub id: Option<String>,
    pub transform: Mat4,
    pub normal_transform: Mat3,
    pub mesh: Option<Arc<TriangleMesh>>,
    pub bsdf: Option<BsdfId>,
    pub light: Option<LightId>,
    pub camera: Option<CameraId>,
}

impl Primitive {
    pub fn with_transform(transform: Mat4) -> Self {
        Self {
            id: None,
            transform,
            normal_transform: transform.normal_matrix(),
            mesh: None,
            bsdf: None,
            light: None,
            camera: None,
        }
    }
}

impl TransformDesc {
    /// Local transform matrix.
    ///
    /// `matrix` (column-major) takes precedence, then `lookat`, otherwise
    /// translate, rotate and scale compose as `T * R * S`.
    pub fn to_matrix(&self) -> SceneResult<Mat4> {
        if let Some(m) = &self.matrix {
            let cols: [f32; 16] = m.as_slice().try_into().map_err(|_| {
                SceneError::Config(ConfigError::InvalidValue {
                    path: "transform.matrix".to_string(),
                    message: format!("expected 16 numbers, found {}", m.len()),
                })
            })?;
            return Ok(Mat4::from_cols_array(&cols));
        }

        if let Some(lookat) = &self.lookat {
            // Object-to-world matrix of a frame at `position` facing `center`
            let view = transform::look_at(
                Vec3::from(lookat.position),
                Vec3::from(lookat.center),
                Vec3::from(lookat.up),
            );
            return Ok(view.inverse());
        }

        let t = self
            .translate
            .map(|t| Mat4::from_translation(Vec3::from(t)))
            .unwrap_or(Mat4::IDENTITY);
        let r = self
            .rotate
            .as_ref()
            .map(|r| transform::rotate(r.angle, Vec3::from(r.axis)))
            .unwrap_or(Mat4::IDENTITY);
        let s = self
            .scale
            .map(|s| Mat4::from_scale(Vec3::from(s)))
            .unwrap_or(Mat4::IDENTITY);
        Ok(t * r * s)
    }
}

/// Result of flattening the scene graph.
#[derive(Debug, Default)]
pub struct Primitives {
    pub primitives: Vec<Primitive>,
    pub main_camera: Option<CameraId>,
}

impl Primitives {
    /// Flatten the node tree rooted at `root`.
    pub fn build(root: &NodeDesc, assets: &Assets) -> SceneResult<Self> {
        let mut builder = Builder {
            assets,
            out: Primitives::default(),
            ids: HashSet::new(),
        };
        builder.traverse(root, Mat4::IDENTITY)?;
        Ok(builder.out)
    }
}

struct Builder<'a> {
    assets: &'a Assets,
    out: Primitives,
    ids: HashSet<String>,
}

impl Builder<'_> {
    fn traverse(&mut self, node: &NodeDesc, parent: Mat4) -> SceneResult<()> {
        if let Some(id) = &node.id {
            if !self.ids.insert(id.clone()) {
                return Err(SceneError::Graph(format!("duplicate node id '{}'", id)));
            }
        }

        let transform = match (&node.global_transform, &node.transform) {
            (Some(global), _) => global.to_matrix()?,
            (None, Some(local)) => parent * local.to_matrix()?,
            (None, None) => parent,
        };

        let is_leaf = node.camera.is_some() || node.light.is_some() || node.triangle_mesh.is_some();
        if is_leaf {
            if !node.children.is_empty() {
                return Err(SceneError::Graph(format!(
                    "node '{}' references a camera, light or mesh and cannot have children",
                    node.id.as_deref().unwrap_or("<unnamed>")
                )));
            }
            self.create_primitive(node, transform)?;
            return Ok(());
        }

        for child in &node.children {
            self.traverse(child, transform)?;
        }
        Ok(())
    }

    fn create_primitive(&mut self, node: &NodeDesc, transform: Mat4) -> SceneResult<()> {
        let name = node.id.as_deref().unwrap_or("<unnamed>");
        if node.camera.is_some() && node.light.is_some() {
            return Err(SceneError::Graph(format!(
                "node '{}' cannot have both a camera and a light",
                name
            )));
        }

        let mut primitive = Primitive::with_transform(transform);
        primitive.id = node.id.clone();

        if let Some(camera) = &node.camera {
            let index = self.assets.cameras.index_of(&camera.id)?;
            primitive.camera = Some(index);
            if self.out.main_camera.is_none() {
                self.out.main_camera = Some(index);
            } else {
                log::warn!("Main camera is already set, ignoring camera '{}'", camera.id);
            }
        }

        if let Some(light) = &node.light {
            primitive.light = Some(self.assets.lights.index_of(&light.id)?);
        }

        if let Some(mesh) = &node.triangle_mesh {
            primitive.mesh = Some(Arc::clone(self.assets.triangle_meshes.resolve(&mesh.id)?));
            let Some(bsdf) = &node.bsdf else {
                return Err(SceneError::Graph(format!(
                    "node '{}' has a triangle mesh but no bsdf",
                    name
                )));
            };
            primitive.bsdf = Some(self.assets.bsdfs.index_of(&bsdf.id)?);
        }

        self.out.primitives.push(primitive);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LookAtDesc, RotateDesc};
    use crate::testing;

    fn node(json: &str) -> NodeDesc {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_trs_order() {
        let desc = TransformDesc {
            translate: Some([1.0, 0.0, 0.0]),
            rotate: Some(RotateDesc {
                angle: 90.0,
                axis: [0.0, 0.0, 1.0],
            }),
            scale: Some([2.0, 2.0, 2.0]),
            ..Default::default()
        };
        let m = desc.to_matrix().unwrap();
        // Scale, then rotate x onto y, then translate
        let p = m.transform_point3(Vec3::X);
        assert!((p - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_lookat_places_frame() {
        let desc = TransformDesc {
            lookat: Some(LookAtDesc {
                position: [0.0, 0.0, 5.0],
                center: [0.0, 0.0, 0.0],
                up: [0.0, 1.0, 0.0],
            }),
            ..Default::default()
        };
        let m = desc.to_matrix().unwrap();
        assert!((m.transform_point3(Vec3::ZERO) - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-5);
        assert!((m.transform_vector3(-Vec3::Z) - (-Vec3::Z)).length() < 1e-5);
    }

    #[test]
    fn test_parent_transform_accumulates() {
        let assets = testing::stub_assets();
        let root = node(
            r#"{
                "transform": { "translate": [0, 0, 1] },
                "children": [
                    { "transform": { "translate": [1, 0, 0] }, "triangle_mesh": { "ref": "quad" }, "bsdf": { "ref": "white" } },
                    { "global_transform": { "translate": [0, 2, 0] }, "triangle_mesh": { "ref": "quad" }, "bsdf": { "ref": "white" } }
                ]
            }"#,
        );
        let prims = Primitives::build(&root, &assets).unwrap();
        assert_eq!(prims.primitives.len(), 2);
        let p0 = prims.primitives[0].transform.transform_point3(Vec3::ZERO);
        let p1 = prims.primitives[1].transform.transform_point3(Vec3::ZERO);
        assert!((p0 - Vec3::new(1.0, 0.0, 1.0)).length() < 1e-5);
        assert!((p1 - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_graph_rules() {
        let assets = testing::stub_assets();
        for json in [
            // Duplicate id
            r#"{ "children": [ { "id": "a" }, { "id": "a" } ] }"#,
            // Leaf with children
            r#"{ "light": { "ref": "area" }, "children": [ {} ] }"#,
            // Camera and light together
            r#"{ "camera": { "ref": "cam" }, "light": { "ref": "area" } }"#,
            // Mesh without bsdf
            r#"{ "triangle_mesh": { "ref": "quad" } }"#,
            // Unresolved reference
            r#"{ "triangle_mesh": { "ref": "missing" }, "bsdf": { "ref": "white" } }"#,
        ] {
            assert!(Primitives::build(&node(json), &assets).is_err(), "{}", json);
        }
    }

    #[test]
    fn test_first_camera_is_main() {
        let assets = testing::stub_assets();
        let root = node(
            r#"{ "children": [ { "camera": { "ref": "cam" } }, { "camera": { "ref": "cam2" } } ] }"#,
        );
        let prims = Primitives::build(&root, &assets).unwrap();
        assert_eq!(prims.main_camera, assets.cameras.index_of("cam").ok());
    }
}
