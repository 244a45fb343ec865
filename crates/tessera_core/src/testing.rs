//! Shared fixtures for unit tests.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera_math::{Mat4, Vec2, Vec3};

use crate::assets::Assets;
use crate::config::{Config, SceneDesc};
use crate::mesh::TriangleMesh;
use crate::primitive::Primitive;
use crate::scene::{AcceleratorKind, Scene};

/// Unit quad `[0, 1]^2` at `z = 0` facing `+z`, with `uv = (x, y)`.
pub fn quad_mesh() -> TriangleMesh {
    let positions = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ];
    let uvs = positions.iter().map(|p| Vec2::new(p.x, p.y)).collect();
    TriangleMesh::new(positions, None, Some(uvs), vec![0, 1, 2, 0, 2, 3]).unwrap()
}

pub fn quad_primitive(transform: Mat4) -> Primitive {
    let mut primitive = Primitive::with_transform(transform);
    primitive.mesh = Some(Arc::new(quad_mesh()));
    primitive
}

const QUAD_MESH: &str = r#"{
    "id": "quad", "type": "raw",
    "positions": [0,0,0, 1,0,0, 1,1,0, 0,1,0],
    "uvs": [0,0, 1,0, 1,1, 0,1],
    "faces": [0,1,2, 0,2,3]
}"#;

/// Document with the stub assets and the given scene element.
fn document(extra_meshes: &str, extra_lights: &str, scene: &str) -> String {
    format!(
        r#"{{
            "assets": {{
                "bsdfs": [ {{ "id": "white", "type": "diffuse", "diffuse_reflectance": {{ "color": 1 }} }} ],
                "triangle_meshes": [ {QUAD_MESH} {extra_meshes} ],
                "films": [ {{ "id": "film", "type": "hdr", "width": 4, "height": 4 }} ],
                "cameras": [
                    {{ "id": "cam", "type": "perspective", "fovy": 90, "film": {{ "ref": "film" }} }},
                    {{ "id": "cam2", "type": "perspective", "fovy": 45, "film": {{ "ref": "film" }} }}
                ],
                "lights": [ {{ "id": "area", "type": "area", "luminance": 1 }} {extra_lights} ]
            }},
            "scene": {scene},
            "renderer": {{ "type": "pt" }}
        }}"#
    )
}

/// Assets with ids `white`, `quad`, `film`, `cam`, `cam2` and `area`.
pub fn stub_assets() -> Assets {
    let config = Config::load_from_str(&document("", "", r#"{ "root": {} }"#), ".").unwrap();
    Assets::load(&config).unwrap()
}

fn scene_from(extra_meshes: &str, extra_lights: &str, scene: &str, kind: AcceleratorKind) -> Scene {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = Config::load_from_str(&document(extra_meshes, extra_lights, scene), ".").unwrap();
    let assets = Assets::load(&config).unwrap();
    let desc: SceneDesc = config.scene().unwrap();
    Scene::build(&desc, assets, kind).unwrap()
}

/// Unit quads at `z = 0` and `z = -1`; the lower one is an area light.
pub fn two_quads_scene(kind: AcceleratorKind) -> Scene {
    scene_from(
        "",
        "",
        r#"{ "root": { "children": [
            { "camera": { "ref": "cam" }, "transform": { "translate": [0, 0, 5] } },
            { "triangle_mesh": { "ref": "quad" }, "bsdf": { "ref": "white" } },
            { "triangle_mesh": { "ref": "quad" }, "bsdf": { "ref": "white" }, "light": { "ref": "area" },
              "transform": { "translate": [0, 0, -1] } }
        ] } }"#,
        kind,
    )
}

/// Quad with corners `(0,0,0)`, `(1,0,-1)`, `(1,1,-1)`, `(0,1,0)`.
pub fn tilted_quad_scene(kind: AcceleratorKind) -> Scene {
    scene_from(
        r#", { "id": "tilted", "type": "raw",
              "positions": [0,0,0, 1,0,-1, 1,1,-1, 0,1,0], "faces": [0,1,2, 0,2,3] }"#,
        "",
        r#"{ "root": { "children": [
            { "camera": { "ref": "cam" }, "transform": { "translate": [0, 0, 5] } },
            { "triangle_mesh": { "ref": "tilted" }, "bsdf": { "ref": "white" } }
        ] } }"#,
        kind,
    )
}

/// `n` random triangles inside `[-1, 1]^3`.
pub fn random_triangles_scene(kind: AcceleratorKind, n: usize) -> Scene {
    let mut rng = StdRng::seed_from_u64(n as u64);
    let positions: Vec<String> = (0..3 * n)
        .map(|_| {
            let p: [f32; 3] = [
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ];
            format!("{},{},{}", p[0], p[1], p[2])
        })
        .collect();
    let faces: Vec<String> = (0..3 * n).map(|i| i.to_string()).collect();
    let mesh = format!(
        r#", {{ "id": "soup", "type": "raw", "positions": [{}], "faces": [{}] }}"#,
        positions.join(","),
        faces.join(",")
    );
    scene_from(
        &mesh,
        "",
        r#"{ "root": { "children": [
            { "camera": { "ref": "cam" }, "transform": { "translate": [0, 0, 5] } },
            { "triangle_mesh": { "ref": "soup" }, "bsdf": { "ref": "white" } }
        ] } }"#,
        kind,
    )
}

/// Unit quad at `z = 0` under a constant environment.
pub fn environment_scene() -> Scene {
    scene_from(
        "",
        r#", { "id": "sky", "type": "env.const", "luminance": 1 }"#,
        r#"{ "root": { "children": [
            { "camera": { "ref": "cam" }, "transform": { "translate": [0, 0, 5] } },
            { "triangle_mesh": { "ref": "quad" }, "bsdf": { "ref": "white" } }
        ] }, "environment_light": { "ref": "sky" } }"#,
        AcceleratorKind::Bvh,
    )
}
