//! Scene description document.
//!
//! The document is JSON with three top-level members:
//!
//! - `assets`: groups of typed asset definitions keyed by group name
//! - `scene`: intersection structure type and the node tree
//! - `renderer`: renderer type and its parameters
//!
//! Structural parts of the document (nodes, transforms, references) are
//! deserialized into typed structs. Component parameters are read through
//! [`ConfigNode`], which lets each component pull its own options and fall
//! back to defaults.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tessera_math::{Mat4, Vec2, Vec3};
use thiserror::Error;

/// Errors raised while reading the scene description.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing element '{name}' in '{path}'")]
    MissingElement { path: String, name: String },

    #[error("Invalid value for '{path}': {message}")]
    InvalidValue { path: String, message: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Values that can be read out of a JSON element.
pub trait FromConfig: Sized {
    fn from_config(value: &Value) -> Option<Self>;
}

impl FromConfig for f32 {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_f64().map(|v| v as f32)
    }
}

impl FromConfig for i32 {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|v| i32::try_from(v).ok())
    }
}

impl FromConfig for i64 {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromConfig for u64 {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_u64()
    }
}

impl FromConfig for usize {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_u64().and_then(|v| usize::try_from(v).ok())
    }
}

impl FromConfig for bool {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromConfig for String {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromConfig for Vec<f32> {
    fn from_config(value: &Value) -> Option<Self> {
        value.as_array()?.iter().map(f32::from_config).collect()
    }
}

impl FromConfig for Vec<u32> {
    fn from_config(value: &Value) -> Option<Self> {
        value
            .as_array()?
            .iter()
            .map(|v| v.as_u64().and_then(|v| u32::try_from(v).ok()))
            .collect()
    }
}

impl FromConfig for Vec2 {
    fn from_config(value: &Value) -> Option<Self> {
        let v = Vec::<f32>::from_config(value)?;
        (v.len() == 2).then(|| Vec2::new(v[0], v[1]))
    }
}

/// A single number is accepted as a splat, so `"luminance": 2` means `[2, 2, 2]`.
impl FromConfig for Vec3 {
    fn from_config(value: &Value) -> Option<Self> {
        if let Some(s) = f32::from_config(value) {
            return Some(Vec3::splat(s));
        }
        let v = Vec::<f32>::from_config(value)?;
        (v.len() == 3).then(|| Vec3::new(v[0], v[1], v[2]))
    }
}

/// Matrices are written as 16 numbers in column-major order.
impl FromConfig for Mat4 {
    fn from_config(value: &Value) -> Option<Self> {
        let v = Vec::<f32>::from_config(value)?;
        let cols: [f32; 16] = v.try_into().ok()?;
        Some(Mat4::from_cols_array(&cols))
    }
}

/// Read-only view of one element of the document.
#[derive(Clone, Copy)]
pub struct ConfigNode<'a> {
    value: &'a Value,
    name: &'a str,
}

impl fmt::Debug for ConfigNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigNode({}: {})", self.name, self.value)
    }
}

impl<'a> ConfigNode<'a> {
    pub fn new(name: &'a str, value: &'a Value) -> Self {
        Self { value, name }
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Child element `name`, if present and not null.
    pub fn child(&self, name: &'a str) -> Option<ConfigNode<'a>> {
        match self.value.get(name) {
            Some(Value::Null) | None => None,
            Some(v) => Some(ConfigNode::new(name, v)),
        }
    }

    /// String attribute such as `id` or `type`.
    pub fn attribute(&self, name: &str) -> Option<&'a str> {
        self.value.get(name).and_then(Value::as_str)
    }

    /// Required string attribute.
    pub fn required_attribute(&self, name: &str) -> ConfigResult<&'a str> {
        self.attribute(name).ok_or_else(|| ConfigError::MissingElement {
            path: self.name.to_string(),
            name: name.to_string(),
        })
    }

    /// Parse this element itself.
    pub fn parse<T: FromConfig>(&self) -> ConfigResult<T> {
        T::from_config(self.value).ok_or_else(|| ConfigError::InvalidValue {
            path: self.name.to_string(),
            message: format!("cannot interpret {} as {}", self.value, std::any::type_name::<T>()),
        })
    }

    /// Required child value.
    pub fn child_value<T: FromConfig>(&self, name: &'a str) -> ConfigResult<T> {
        match self.child(name) {
            Some(node) => node.parse(),
            None => Err(ConfigError::MissingElement {
                path: self.name.to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Optional child value, falling back to `default` when absent.
    ///
    /// A present but malformed value is still an error.
    pub fn child_value_or_default<T: FromConfig + fmt::Debug>(
        &self,
        name: &'a str,
        default: T,
    ) -> ConfigResult<T> {
        match self.child(name) {
            Some(node) => node.parse(),
            None => {
                log::debug!("Element '{}' not found, using default value {:?}", name, default);
                Ok(default)
            }
        }
    }

    /// Identifier of the asset referenced by child `name` (`{"ref": "id"}`).
    pub fn reference(&self, name: &'a str) -> ConfigResult<Option<&'a str>> {
        match self.child(name) {
            None => Ok(None),
            Some(node) => node
                .attribute("ref")
                .map(Some)
                .ok_or_else(|| ConfigError::InvalidValue {
                    path: name.to_string(),
                    message: "expected an object of the form {\"ref\": \"<id>\"}".to_string(),
                }),
        }
    }

    /// Elements of the array child `name`; empty when absent.
    pub fn array(&self, name: &'a str) -> ConfigResult<Vec<ConfigNode<'a>>> {
        match self.child(name) {
            None => Ok(Vec::new()),
            Some(node) => match node.value {
                Value::Array(items) => Ok(items.iter().map(|v| ConfigNode::new(name, v)).collect()),
                _ => Err(ConfigError::InvalidValue {
                    path: name.to_string(),
                    message: "expected an array".to_string(),
                }),
            },
        }
    }
}

/// Asset reference: `{"ref": "<id>"}`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Reference {
    #[serde(rename = "ref")]
    pub id: String,
}

/// `lookat` transform element.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LookAtDesc {
    pub position: [f32; 3],
    pub center: [f32; 3],
    pub up: [f32; 3],
}

/// `rotate` transform element; `angle` in degrees.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RotateDesc {
    pub angle: f32,
    pub axis: [f32; 3],
}

/// Transform element of a scene node.
///
/// `matrix` wins over `lookat`, which wins over translate/rotate/scale.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TransformDesc {
    pub matrix: Option<Vec<f32>>,
    pub lookat: Option<LookAtDesc>,
    pub translate: Option<[f32; 3]>,
    pub rotate: Option<RotateDesc>,
    pub scale: Option<[f32; 3]>,
}

/// A node of the scene graph.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct NodeDesc {
    pub id: Option<String>,
    pub transform: Option<TransformDesc>,
    pub global_transform: Option<TransformDesc>,
    pub camera: Option<Reference>,
    pub light: Option<Reference>,
    pub triangle_mesh: Option<Reference>,
    pub bsdf: Option<Reference>,
    #[serde(default)]
    pub children: Vec<NodeDesc>,
}

/// `scene` element.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SceneDesc {
    #[serde(rename = "type", default = "default_scene_type")]
    pub scene_type: String,
    pub root: NodeDesc,
    pub environment_light: Option<Reference>,
}

fn default_scene_type() -> String {
    "bvh".to_string()
}

/// Parsed scene description.
#[derive(Debug, Clone)]
pub struct Config {
    root: Value,
    base_path: PathBuf,
}

impl Config {
    /// Load a document from disk. Relative asset paths resolve against
    /// `base_path` when given, otherwise against the document's directory.
    pub fn load(path: impl AsRef<Path>, base_path: Option<&Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        log::info!("Loading configuration file: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let base = match base_path {
            Some(base) => base.to_path_buf(),
            None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        Self::load_from_str(&content, base)
    }

    /// Parse a document from a string.
    pub fn load_from_str(content: &str, base_path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let root: Value = serde_json::from_str(content)?;
        if !root.is_object() {
            return Err(ConfigError::InvalidValue {
                path: "<root>".to_string(),
                message: "document must be an object".to_string(),
            });
        }
        Ok(Self {
            root,
            base_path: base_path.into(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn root(&self) -> ConfigNode<'_> {
        ConfigNode::new("<root>", &self.root)
    }

    fn required(&self, name: &'static str) -> ConfigResult<ConfigNode<'_>> {
        self.root().child(name).ok_or_else(|| ConfigError::MissingElement {
            path: "<root>".to_string(),
            name: name.to_string(),
        })
    }

    /// `assets` element; an empty document has no assets.
    pub fn assets(&self) -> Option<ConfigNode<'_>> {
        self.root().child("assets")
    }

    pub fn renderer(&self) -> ConfigResult<ConfigNode<'_>> {
        self.required("renderer")
    }

    /// Typed view of the `scene` element.
    pub fn scene(&self) -> ConfigResult<SceneDesc> {
        let node = self.required("scene")?;
        Ok(SceneDesc::deserialize(node.value())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_child_values() {
        let value = json!({
            "fovy": 45.0,
            "luminance": [1.0, 0.5, 0.25],
            "gray": 0.5,
            "num": 12,
        });
        let node = ConfigNode::new("camera", &value);

        assert_eq!(node.child_value::<f32>("fovy").unwrap(), 45.0);
        assert_eq!(node.child_value::<Vec3>("luminance").unwrap(), Vec3::new(1.0, 0.5, 0.25));
        assert_eq!(node.child_value::<Vec3>("gray").unwrap(), Vec3::splat(0.5));
        assert_eq!(node.child_value::<i32>("num").unwrap(), 12);
        assert_eq!(node.child_value_or_default("missing", 7i32).unwrap(), 7);
    }

    #[test]
    fn test_missing_and_invalid() {
        let value = json!({ "fovy": "wide" });
        let node = ConfigNode::new("camera", &value);

        assert!(matches!(
            node.child_value::<f32>("aspect"),
            Err(ConfigError::MissingElement { .. })
        ));
        assert!(matches!(
            node.child_value::<f32>("fovy"),
            Err(ConfigError::InvalidValue { .. })
        ));
        // Present but malformed values are not silently defaulted
        assert!(node.child_value_or_default("fovy", 1.0f32).is_err());
    }

    #[test]
    fn test_reference() {
        let value = json!({ "film": { "ref": "film_1" }, "bad": 3 });
        let node = ConfigNode::new("camera", &value);
        assert_eq!(node.reference("film").unwrap(), Some("film_1"));
        assert_eq!(node.reference("none").unwrap(), None);
        assert!(node.reference("bad").is_err());
    }

    #[test]
    fn test_matrix_is_column_major() {
        let value = json!([1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 3, 4, 5, 1]);
        let m = ConfigNode::new("matrix", &value).parse::<Mat4>().unwrap();
        assert_eq!(m.transform_point3(Vec3::ZERO), Vec3::new(3.0, 4.0, 5.0));
    }

    #[test]
    fn test_scene_desc() {
        let config = Config::load_from_str(
            r#"{
                "scene": {
                    "type": "naive",
                    "root": {
                        "children": [
                            { "transform": { "translate": [0, 1, 0] }, "camera": { "ref": "cam" } }
                        ]
                    }
                },
                "renderer": { "type": "pt" }
            }"#,
            ".",
        )
        .unwrap();

        let scene = config.scene().unwrap();
        assert_eq!(scene.scene_type, "naive");
        assert_eq!(scene.root.children.len(), 1);
        assert_eq!(scene.root.children[0].camera.as_ref().unwrap().id, "cam");
        assert_eq!(config.renderer().unwrap().attribute("type"), Some("pt"));
    }

    #[test]
    fn test_unknown_node_field_is_rejected() {
        let config = Config::load_from_str(
            r#"{ "scene": { "root": { "lamp": { "ref": "x" } } }, "renderer": {} }"#,
            ".",
        )
        .unwrap();
        assert!(config.scene().is_err());
    }
}
