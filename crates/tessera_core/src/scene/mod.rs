//! The renderable scene.
//!
//! A scene owns the flattened primitives together with the BSDFs, lights
//! and cameras they reference, and answers ray queries through one of the
//! intersection structures. It is immutable once built.

mod bvh;
mod naive;
mod qbvh;
mod triangle;

pub use bvh::BvhAccelerator;
pub use naive::NaiveAccelerator;
pub use qbvh::QbvhAccelerator;
pub use triangle::{Triangle, TriangleHit};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tessera_math::{Aabb, Mat4, PdfEval, Ray, Vec3};

use crate::assets::{AssetError, Assets};
use crate::bsdf::GeneralizedBsdf;
use crate::config::{Config, ConfigError, SceneDesc};
use crate::emitter::{Camera, Light};
use crate::geometry::{Intersection, SurfaceGeometry};
use crate::logging::LogIndenter;
use crate::primitive::{CameraId, LightId, Primitive, Primitives};

#[derive(Error, Debug)]
pub enum SceneError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Invalid scene graph: {0}")]
    Graph(String),

    #[error("Emitter registration failed: {0}")]
    Registration(String),

    #[error("Scene has no camera")]
    MissingCamera,

    #[error("Failed to build scene: {0}")]
    Build(String),
}

pub type SceneResult<T> = Result<T, SceneError>;

/// Ray query over the scene triangles.
pub trait Accelerator: Send + Sync {
    /// Closest hit within the ray range.
    fn intersect(&self, triangles: &[Triangle], ray: &Ray) -> Option<TriangleHit>;
}

/// Selectable intersection structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceleratorKind {
    Naive,
    Bvh,
    Qbvh,
}

impl AcceleratorKind {
    pub fn build(self, triangles: &[Triangle]) -> Box<dyn Accelerator> {
        match self {
            AcceleratorKind::Naive => Box::new(NaiveAccelerator),
            AcceleratorKind::Bvh => Box::new(BvhAccelerator::build(triangles)),
            AcceleratorKind::Qbvh => Box::new(QbvhAccelerator::build(triangles)),
        }
    }
}

impl FromStr for AcceleratorKind {
    type Err = SceneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "naive" => Ok(AcceleratorKind::Naive),
            "bvh" => Ok(AcceleratorKind::Bvh),
            "qbvh" => Ok(AcceleratorKind::Qbvh),
            _ => Err(SceneError::Build(format!("unknown scene type '{}'", s))),
        }
    }
}

impl fmt::Display for AcceleratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcceleratorKind::Naive => "naive",
            AcceleratorKind::Bvh => "bvh",
            AcceleratorKind::Qbvh => "qbvh",
        };
        f.write_str(name)
    }
}

/// Environment emitter hit through its bounding sphere.
#[derive(Debug, Clone, Copy)]
struct EmitterShape {
    primitive_index: usize,
    light: LightId,
}

pub struct Scene {
    primitives: Vec<Primitive>,
    bsdfs: Vec<Arc<dyn GeneralizedBsdf>>,
    lights: Vec<Box<dyn Light>>,
    cameras: Vec<Box<dyn Camera>>,
    main_camera: CameraId,
    /// Lights referenced by the scene, in selection order.
    active_lights: Vec<LightId>,
    emitter_shapes: Vec<EmitterShape>,
    triangles: Vec<Triangle>,
    accelerator: Box<dyn Accelerator>,
    bound: Aabb,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("primitives", &self.primitives.len())
            .field("triangles", &self.triangles.len())
            .field("lights", &self.active_lights.len())
            .field("bound", &self.bound)
            .finish()
    }
}

impl Scene {
    /// Load the assets of `config` and build its scene.
    pub fn load(config: &Config) -> SceneResult<Self> {
        let assets = Assets::load(config)?;
        let desc = config.scene()?;
        let kind = desc.scene_type.parse()?;
        Self::build(&desc, assets, kind)
    }

    /// Build a scene from loaded assets.
    ///
    /// Order: flatten the graph, register every emitter with the primitives
    /// referencing it, build the intersection structure, then hand the
    /// scene bounds to the environment lights.
    pub fn build(desc: &SceneDesc, assets: Assets, kind: AcceleratorKind) -> SceneResult<Self> {
        log::info!("Building scene ({})", kind);
        let _indent = LogIndenter::new();

        let Primitives {
            mut primitives,
            main_camera,
        } = Primitives::build(&desc.root, &assets)?;
        let main_camera = main_camera.ok_or(SceneError::MissingCamera)?;

        if let Some(reference) = &desc.environment_light {
            let id = assets.lights.index_of(&reference.id)?;
            let is_environment = assets
                .lights
                .get(id)
                .is_some_and(|light| light.environment_light());
            if !is_environment {
                return Err(SceneError::Graph(format!(
                    "'{}' is not an environment light",
                    reference.id
                )));
            }
            let mut primitive = Primitive::with_transform(Mat4::IDENTITY);
            primitive.id = Some(reference.id.clone());
            primitive.light = Some(id);
            primitives.push(primitive);
        }

        let bsdfs = assets.bsdfs.into_items();
        let mut lights = assets.lights.into_items();
        let mut cameras = assets.cameras.into_items();

        let mut active_lights = Vec::new();
        for (id, light) in lights.iter_mut().enumerate() {
            let referencing: Vec<&Primitive> =
                primitives.iter().filter(|p| p.light == Some(id)).collect();
            if referencing.is_empty() {
                log::warn!("Light #{} is not referenced by the scene", id);
                continue;
            }
            light.register_primitives(&referencing)?;
            active_lights.push(id);
        }
        for (id, camera) in cameras.iter_mut().enumerate() {
            let referencing: Vec<&Primitive> =
                primitives.iter().filter(|p| p.camera == Some(id)).collect();
            if referencing.is_empty() {
                continue;
            }
            camera.register_primitives(&referencing)?;
        }

        let triangles = collect_triangles(&primitives);
        if triangles.is_empty() {
            log::warn!("Scene has no triangles");
        }
        let accelerator = kind.build(&triangles);
        let bound = if triangles.is_empty() {
            Aabb::from_points(Vec3::splat(-1.0), Vec3::ONE)
        } else {
            triangles
                .iter()
                .fold(Aabb::EMPTY, |acc, t| Aabb::surrounding(&acc, &t.bounds()))
        };

        let mut emitter_shapes = Vec::new();
        for &id in &active_lights {
            let light = &mut lights[id];
            if !light.environment_light() {
                continue;
            }
            light.post_configure(&bound);
            if let Some(primitive_index) = primitives.iter().position(|p| p.light == Some(id)) {
                emitter_shapes.push(EmitterShape {
                    primitive_index,
                    light: id,
                });
            }
        }

        log::info!(
            "{} primitives, {} triangles, {} lights",
            primitives.len(),
            triangles.len(),
            active_lights.len()
        );

        Ok(Self {
            primitives,
            bsdfs,
            lights,
            cameras,
            main_camera,
            active_lights,
            emitter_shapes,
            triangles,
            accelerator,
            bound,
        })
    }

    /// Closest intersection with the scene geometry.
    pub fn intersect(&self, ray: &Ray) -> Option<Intersection> {
        let hit = self.accelerator.intersect(&self.triangles, ray)?;
        Some(self.hit_geometry(&hit))
    }

    /// Intersection with the emitter shapes of environment lights.
    ///
    /// Only meaningful for rays that missed the scene geometry.
    pub fn intersect_emitter_shapes(&self, ray: &Ray) -> Option<Intersection> {
        let mut best: Option<Intersection> = None;
        for shape in &self.emitter_shapes {
            let Some(sphere) = self.lights[shape.light].emitter_shape() else {
                continue;
            };
            let Some(t) = sphere.intersect(ray) else {
                continue;
            };
            if best.as_ref().is_some_and(|b| b.t <= t) {
                continue;
            }
            let p = ray.at(t);
            best = Some(Intersection {
                primitive_index: shape.primitive_index,
                triangle_index: 0,
                t,
                geom: SurfaceGeometry::with_normal(p, (sphere.center - p).normalize()),
            });
        }
        best
    }

    /// Intersect the geometry, falling back to the emitter shapes on a miss.
    pub fn intersect_with_emitter_shapes(&self, ray: &Ray) -> Option<Intersection> {
        self.intersect(ray).or_else(|| self.intersect_emitter_shapes(ray))
    }

    /// True when nothing blocks the segment between `p1` and `p2`.
    pub fn visible(&self, p1: Vec3, p2: Vec3) -> bool {
        let (ray, _) = Ray::between(p1, p2);
        self.accelerator.intersect(&self.triangles, &ray).is_none()
    }

    /// Select a light uniformly.
    ///
    /// Returns the light, `u` remapped for reuse, and the selection pdf.
    pub fn sample_light_selection(&self, u: f32) -> Option<(LightId, f32, PdfEval)> {
        let n = self.active_lights.len();
        if n == 0 {
            return None;
        }
        let scaled = u * n as f32;
        let index = (scaled as usize).min(n - 1);
        let reused = (scaled - index as f32).clamp(0.0, 1.0 - f32::EPSILON);
        Some((self.active_lights[index], reused, self.light_selection_pdf()))
    }

    pub fn light_selection_pdf(&self) -> PdfEval {
        match self.active_lights.len() {
            0 => PdfEval::discrete(0.0),
            n => PdfEval::discrete(1.0 / n as f32),
        }
    }

    pub fn num_lights(&self) -> usize {
        self.active_lights.len()
    }

    pub fn bound(&self) -> &Aabb {
        &self.bound
    }

    pub fn main_camera(&self) -> &dyn Camera {
        &*self.cameras[self.main_camera]
    }

    pub fn main_camera_id(&self) -> CameraId {
        self.main_camera
    }

    pub fn camera(&self, id: CameraId) -> &dyn Camera {
        &*self.cameras[id]
    }

    pub fn light(&self, id: LightId) -> &dyn Light {
        &*self.lights[id]
    }

    pub fn primitive(&self, index: usize) -> &Primitive {
        &self.primitives[index]
    }

    pub fn num_primitives(&self) -> usize {
        self.primitives.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Generalized BSDF of a primitive: its surface BSDF, otherwise the
    /// light or camera it carries.
    pub fn generalized_bsdf(&self, primitive: &Primitive) -> Option<&dyn GeneralizedBsdf> {
        if let Some(id) = primitive.bsdf {
            return Some(&*self.bsdfs[id]);
        }
        if let Some(id) = primitive.light {
            return Some(self.lights[id].as_generalized_bsdf());
        }
        primitive.camera.map(|id| self.cameras[id].as_generalized_bsdf())
    }

    fn hit_geometry(&self, hit: &TriangleHit) -> Intersection {
        let tri = &self.triangles[hit.index];
        let primitive = &self.primitives[tri.primitive_index];
        let b0 = 1.0 - hit.b1 - hit.b2;

        let p = tri.p1 * b0 + tri.p2 * hit.b1 + tri.p3 * hit.b2;
        let gn = (tri.p2 - tri.p1).cross(tri.p3 - tri.p1).normalize();

        let mut geom = SurfaceGeometry {
            p,
            gn,
            sn: gn,
            ..Default::default()
        };
        if let Some(mesh) = &primitive.mesh {
            let [i1, i2, i3] = mesh.face(tri.face_index);
            let n = mesh.normals[i1] * b0 + mesh.normals[i2] * hit.b1 + mesh.normals[i3] * hit.b2;
            let sn = (primitive.normal_transform * n).normalize();
            if sn.is_finite() {
                geom.sn = sn;
            }
            geom.uv = mesh.uvs[i1] * b0 + mesh.uvs[i2] * hit.b1 + mesh.uvs[i3] * hit.b2;
        }
        geom.compute_tangent_space();

        Intersection {
            primitive_index: tri.primitive_index,
            triangle_index: tri.face_index,
            t: hit.t,
            geom,
        }
    }
}

fn collect_triangles(primitives: &[Primitive]) -> Vec<Triangle> {
    let mut triangles = Vec::new();
    for (primitive_index, primitive) in primitives.iter().enumerate() {
        let Some(mesh) = &primitive.mesh else {
            continue;
        };
        for face_index in 0..mesh.num_faces() {
            let [i1, i2, i3] = mesh.face(face_index);
            triangles.push(Triangle {
                p1: primitive.transform.transform_point3(mesh.positions[i1]),
                p2: primitive.transform.transform_point3(mesh.positions[i2]),
                p3: primitive.transform.transform_point3(mesh.positions[i3]),
                primitive_index,
                face_index,
            });
        }
    }
    triangles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const KINDS: [AcceleratorKind; 3] = [
        AcceleratorKind::Naive,
        AcceleratorKind::Bvh,
        AcceleratorKind::Qbvh,
    ];

    #[test]
    fn test_unit_quads() {
        for kind in KINDS {
            let scene = testing::two_quads_scene(kind);
            let o = Vec3::new(0.0, 0.0, 1.0);
            for i in 1..10 {
                for j in 1..10 {
                    let (x, y) = (i as f32 / 10.0, j as f32 / 10.0);
                    let ray = Ray::spawn(o, (Vec3::new(x, y, 0.0) - o).normalize());
                    let isect = scene.intersect(&ray).unwrap();
                    assert!((isect.geom.p - Vec3::new(x, y, 0.0)).length() < 1e-5, "{}", kind);
                    assert!((isect.geom.gn - Vec3::Z).length() < 1e-5);
                    assert!((isect.geom.sn - Vec3::Z).length() < 1e-5);
                    assert!((isect.geom.uv.x - x).abs() < 1e-5 && (isect.geom.uv.y - y).abs() < 1e-5);
                    assert!(!isect.geom.degenerated);
                }
            }
        }
    }

    #[test]
    fn test_tilted_quad() {
        for kind in KINDS {
            let scene = testing::tilted_quad_scene(kind);
            let n = Vec3::new(1.0, 0.0, 1.0).normalize();
            for i in 1..10 {
                for j in 1..10 {
                    let (x, y) = (i as f32 / 10.0, j as f32 / 10.0);
                    let ray = Ray::spawn(Vec3::new(x, y, 1.0), -Vec3::Z);
                    let isect = scene.intersect(&ray).unwrap();
                    assert!((isect.geom.p - Vec3::new(x, y, -x)).length() < 1e-5);
                    assert!((isect.geom.gn - n).length() < 1e-5);
                }
            }
        }
    }

    #[test]
    fn test_structures_agree() {
        let scenes: Vec<Scene> = KINDS.iter().map(|&k| testing::random_triangles_scene(k, 300)).collect();
        let mut rng = StdRng::seed_from_u64(42);
        let mut hits = 0;
        for _ in 0..500 {
            let o = Vec3::new(rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0), rng.gen_range(-2.0..2.0));
            let d = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            if d.length() < 1e-3 {
                continue;
            }
            let ray = Ray::spawn(o, d.normalize());
            let expected = scenes[0].intersect(&ray);
            for scene in &scenes[1..] {
                let actual = scene.intersect(&ray);
                match (&expected, &actual) {
                    (None, None) => {}
                    (Some(e), Some(a)) => {
                        assert_eq!(e.primitive_index, a.primitive_index);
                        assert_eq!(e.triangle_index, a.triangle_index);
                        assert!((e.geom.p - a.geom.p).length() < 1e-5);
                    }
                    _ => panic!("structures disagree on {:?}", ray),
                }
            }
            hits += expected.is_some() as usize;
        }
        assert!(hits > 0);
    }

    #[test]
    fn test_ray_range_is_respected() {
        let scene = testing::two_quads_scene(AcceleratorKind::Bvh);
        let mut ray = Ray::spawn(Vec3::new(0.5, 0.5, 1.0), -Vec3::Z);
        ray.max_t = 0.5;
        assert!(scene.intersect(&ray).is_none());
        // The lower quad is behind the upper one
        ray.max_t = f32::INFINITY;
        ray.min_t = 1.5;
        let isect = scene.intersect(&ray).unwrap();
        assert!((isect.geom.p.z + 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_light_selection() {
        let scene = testing::two_quads_scene(AcceleratorKind::Naive);
        let (light, reused, pdf) = scene.sample_light_selection(0.3).unwrap();
        assert_eq!(scene.num_lights(), 1);
        assert!(scene.light(light).emitter_shape().is_none());
        assert!((reused - 0.3).abs() < 1e-6);
        assert_eq!(pdf, PdfEval::discrete(1.0));
    }

    #[test]
    fn test_environment_hit_after_miss() {
        let scene = testing::environment_scene();
        let ray = Ray::spawn(Vec3::new(0.5, 0.5, 1.0), Vec3::Z);
        assert!(scene.intersect(&ray).is_none());
        let isect = scene.intersect_with_emitter_shapes(&ray).unwrap();
        let primitive = scene.primitive(isect.primitive_index);
        let light = scene.light(primitive.light.unwrap());
        assert!(light.environment_light());
        assert!(isect.geom.gn.dot(-Vec3::Z) > 0.99);

        // Geometry in the way wins
        let down = Ray::spawn(Vec3::new(0.5, 0.5, 1.0), -Vec3::Z);
        let isect = scene.intersect_with_emitter_shapes(&down).unwrap();
        assert!(scene.primitive(isect.primitive_index).mesh.is_some());
    }

    #[test]
    fn test_missing_camera() {
        let desc: SceneDesc = serde_json::from_str(
            r#"{ "root": { "triangle_mesh": { "ref": "quad" }, "bsdf": { "ref": "white" } } }"#,
        )
        .unwrap();
        let result = Scene::build(&desc, testing::stub_assets(), AcceleratorKind::Naive);
        assert!(matches!(result, Err(SceneError::MissingCamera)));
    }

    #[test]
    fn test_unknown_scene_type() {
        assert!("embree".parse::<AcceleratorKind>().is_err());
        assert_eq!("qbvh".parse::<AcceleratorKind>().unwrap(), AcceleratorKind::Qbvh);
    }
}
