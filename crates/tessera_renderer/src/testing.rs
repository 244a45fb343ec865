//! Scene fixtures for renderer tests.

use tessera_core::{AcceleratorKind, Assets, Config, Film, Scene};
use tessera_core::config::SceneDesc;
use tessera_math::luminance;

use crate::RenderOutput;

const UNIT_QUAD: &str = r#"{
    "id": "unit_quad", "type": "raw",
    "positions": [0,0,0, 1,0,0, 1,1,0, 0,1,0],
    "uvs": [0,0, 1,0, 1,1, 0,1],
    "faces": [0,1,2, 0,2,3]
}"#;

/// `0.2 x 0.2` quad centered at the origin, facing `+z`.
const SMALL_QUAD: &str = r#"{
    "id": "small_quad", "type": "raw",
    "positions": [-0.1,-0.1,0, 0.1,-0.1,0, 0.1,0.1,0, -0.1,0.1,0],
    "faces": [0,1,2, 0,2,3]
}"#;

fn document(film_size: u32, fovy: f32, scene: &str, renderer: &str) -> String {
    format!(
        r#"{{
            "assets": {{
                "bsdfs": [
                    {{ "id": "white", "type": "diffuse", "diffuse_reflectance": {{ "color": 0.8 }} }},
                    {{ "id": "black", "type": "diffuse", "diffuse_reflectance": {{ "color": 0 }} }},
                    {{ "id": "mirror", "type": "mirror", "specular_reflectance": 0.9 }},
                    {{ "id": "glass", "type": "dielectric", "internal_ior": 1.5 }}
                ],
                "triangle_meshes": [ {UNIT_QUAD}, {SMALL_QUAD} ],
                "films": [ {{ "id": "film", "type": "hdr", "width": {film_size}, "height": {film_size} }} ],
                "cameras": [ {{ "id": "cam", "type": "perspective", "fovy": {fovy}, "film": {{ "ref": "film" }} }} ],
                "lights": [ {{ "id": "area", "type": "area", "luminance": 2 }} ]
            }},
            "scene": {scene},
            "renderer": {renderer}
        }}"#
    )
}

/// Parse a document and build its scene with the requested accelerator.
pub fn load(document: &str, kind: AcceleratorKind) -> (Config, Scene) {
    let config = Config::load_from_str(document, ".").unwrap();
    let assets = Assets::load(&config).unwrap();
    let desc: SceneDesc = config.scene().unwrap();
    let scene = Scene::build(&desc, assets, kind).unwrap();
    (config, scene)
}

/// Unit quads at `z = 0` and `z = -1`; the lower one is an area light.
pub fn two_quads_scene(kind: AcceleratorKind) -> Scene {
    let scene = r#"{ "root": { "children": [
        { "camera": { "ref": "cam" }, "transform": { "translate": [0.5, 0.5, 5] } },
        { "triangle_mesh": { "ref": "unit_quad" }, "bsdf": { "ref": "white" } },
        { "triangle_mesh": { "ref": "unit_quad" }, "bsdf": { "ref": "white" }, "light": { "ref": "area" },
          "transform": { "translate": [0, 0, -1] } }
    ] } }"#;
    load(&document(4, 90.0, scene, r#"{ "type": "pt" }"#), kind).1
}

/// A floor at `y = 0`, a back wall at `z = -0.1` and a light at `y = 0.2`
/// facing down, seen by a camera at `(0, 0.1, 0.3)`.
///
/// `floor` names the floor BSDF (`white`, `mirror` or `glass`);
/// `renderer` is the `renderer` element.
pub fn room_document(floor: &str, renderer: &str) -> String {
    let scene = format!(
        r#"{{ "root": {{ "children": [
            {{ "camera": {{ "ref": "cam" }},
               "transform": {{ "lookat": {{ "position": [0, 0.1, 0.3], "center": [0, 0.1, 0], "up": [0, 1, 0] }} }} }},
            {{ "id": "floor", "triangle_mesh": {{ "ref": "small_quad" }}, "bsdf": {{ "ref": "{floor}" }},
               "transform": {{ "rotate": {{ "angle": -90, "axis": [1, 0, 0] }} }} }},
            {{ "id": "wall", "triangle_mesh": {{ "ref": "small_quad" }}, "bsdf": {{ "ref": "white" }},
               "transform": {{ "translate": [0, 0.1, -0.1] }} }},
            {{ "id": "light", "triangle_mesh": {{ "ref": "small_quad" }}, "bsdf": {{ "ref": "black" }},
               "light": {{ "ref": "area" }},
               "transform": {{ "translate": [0, 0.2, 0], "rotate": {{ "angle": 90, "axis": [1, 0, 0] }} }} }}
        ] }} }}"#
    );
    document(4, 45.0, &scene, renderer)
}

/// Render a document through the full configure-preprocess-render pipeline.
pub fn render_document(document: &str) -> RenderOutput {
    let _ = env_logger::builder().is_test(true).try_init();
    let (config, scene) = load(document, AcceleratorKind::Bvh);
    crate::render(&config, &scene, None).unwrap()
}

/// Average pixel luminance.
pub fn mean_luminance(film: &Film) -> f32 {
    let data = film.data();
    data.iter().map(|&c| luminance(c)).sum::<f32>() / data.len() as f32
}

/// No pixel is negative or non-finite.
pub fn is_valid_image(film: &Film) -> bool {
    film.data()
        .iter()
        .all(|c| c.is_finite() && c.x >= 0.0 && c.y >= 0.0 && c.z >= 0.0)
}
