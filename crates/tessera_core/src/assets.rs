//! Asset loading and lookup by id.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::bsdf::{self, GeneralizedBsdf};
use crate::camera;
use crate::config::{Config, ConfigError, ConfigNode};
use crate::emitter::{Camera, Light};
use crate::film::Film;
use crate::light;
use crate::logging::LogIndenter;
use crate::mesh::{self, TriangleMesh};
use crate::texture::{self, Texture};

#[derive(Error, Debug)]
pub enum AssetError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown {kind} type '{ty}'")]
    UnknownType { kind: &'static str, ty: String },

    #[error("Unresolved reference to {kind} '{id}'")]
    UnresolvedReference { kind: &'static str, id: String },

    #[error("Duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("Failed to load '{path}': {message}")]
    Load { path: String, message: String },

    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    #[error("Invalid {kind}: {message}")]
    Invalid { kind: &'static str, message: String },
}

pub type AssetResult<T> = Result<T, AssetError>;

/// Assets of one kind, addressable by id and by load order index.
pub struct AssetGroup<T> {
    kind: &'static str,
    items: Vec<T>,
    ids: HashMap<String, usize>,
}

impl<T> AssetGroup<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            items: Vec::new(),
            ids: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: impl Into<String>, item: T) -> AssetResult<usize> {
        let id = id.into();
        if self.ids.contains_key(&id) {
            return Err(AssetError::DuplicateId { kind: self.kind, id });
        }
        let index = self.items.len();
        self.items.push(item);
        self.ids.insert(id, index);
        Ok(index)
    }

    pub fn index_of(&self, id: &str) -> AssetResult<usize> {
        self.ids
            .get(id)
            .copied()
            .ok_or_else(|| AssetError::UnresolvedReference {
                kind: self.kind,
                id: id.to_string(),
            })
    }

    pub fn resolve(&self, id: &str) -> AssetResult<&T> {
        self.index_of(id).map(|i| &self.items[i])
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items in load order; indices match [`index_of`](Self::index_of).
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

/// All assets of a scene description.
pub struct Assets {
    pub textures: AssetGroup<Arc<dyn Texture>>,
    pub bsdfs: AssetGroup<Arc<dyn GeneralizedBsdf>>,
    pub triangle_meshes: AssetGroup<Arc<TriangleMesh>>,
    pub films: AssetGroup<Film>,
    pub cameras: AssetGroup<Box<dyn Camera>>,
    pub lights: AssetGroup<Box<dyn Light>>,
}

impl Default for Assets {
    fn default() -> Self {
        Self {
            textures: AssetGroup::new("texture"),
            bsdfs: AssetGroup::new("bsdf"),
            triangle_meshes: AssetGroup::new("triangle_mesh"),
            films: AssetGroup::new("film"),
            cameras: AssetGroup::new("camera"),
            lights: AssetGroup::new("light"),
        }
    }
}

impl Assets {
    /// Load every asset group of `config`.
    ///
    /// Groups load in dependency order, so a reference can only point to an
    /// asset of an earlier group (or an earlier entry of the same group).
    pub fn load(config: &Config) -> AssetResult<Self> {
        log::info!("Loading assets");
        let _indent = LogIndenter::new();

        let mut assets = Assets::default();
        let Some(root) = config.assets() else {
            log::warn!("Missing 'assets' element");
            return Ok(assets);
        };
        let base = config.base_path();

        for node in root.array("textures")? {
            let (id, ty) = Self::header(&node)?;
            let texture: Arc<dyn Texture> = Arc::from(texture::create(ty, &node, base)?);
            assets.textures.insert(id, texture)?;
        }
        for node in root.array("bsdfs")? {
            let (id, ty) = Self::header(&node)?;
            let bsdf = bsdf::create(ty, &node, &assets)?;
            assets.bsdfs.insert(id, bsdf)?;
        }
        for node in root.array("triangle_meshes")? {
            let (id, ty) = Self::header(&node)?;
            let mesh = Arc::new(mesh::create(ty, &node, base)?);
            assets.triangle_meshes.insert(id, mesh)?;
        }
        for node in root.array("films")? {
            let (id, ty) = Self::header(&node)?;
            let film = create_film(ty, &node)?;
            assets.films.insert(id, film)?;
        }
        for node in root.array("cameras")? {
            let (id, ty) = Self::header(&node)?;
            let camera = camera::create(ty, &node, &assets)?;
            assets.cameras.insert(id, camera)?;
        }
        for node in root.array("lights")? {
            let (id, ty) = Self::header(&node)?;
            let light = light::create(ty, &node, &assets)?;
            assets.lights.insert(id, light)?;
        }

        log::info!(
            "Loaded {} textures, {} bsdfs, {} meshes, {} films, {} cameras, {} lights",
            assets.textures.len(),
            assets.bsdfs.len(),
            assets.triangle_meshes.len(),
            assets.films.len(),
            assets.cameras.len(),
            assets.lights.len()
        );
        Ok(assets)
    }

    fn header<'a>(node: &ConfigNode<'a>) -> AssetResult<(&'a str, &'a str)> {
        let id = node.required_attribute("id")?;
        let ty = node.required_attribute("type")?;
        log::debug!("Loading {} '{}' ({})", node.name(), id, ty);
        Ok((id, ty))
    }
}

/// Film asset: `width` and `height` in pixels. `hdr` and `ldr` only
/// differ in the output file format chosen by the caller.
fn create_film(ty: &str, node: &ConfigNode<'_>) -> AssetResult<Film> {
    if ty != "hdr" && ty != "ldr" {
        return Err(AssetError::UnknownType {
            kind: "film",
            ty: ty.to_string(),
        });
    }
    let width: u32 = node.child_value::<u64>("width")?.try_into().map_err(|_| AssetError::Invalid {
        kind: "film",
        message: "width out of range".to_string(),
    })?;
    let height: u32 = node.child_value::<u64>("height")?.try_into().map_err(|_| AssetError::Invalid {
        kind: "film",
        message: "height out of range".to_string(),
    })?;
    if width == 0 || height == 0 {
        return Err(AssetError::Invalid {
            kind: "film",
            message: format!("invalid resolution {}x{}", width, height),
        });
    }
    Ok(Film::new(width, height))
}

/// Resolve a path from the document against the base path.
pub fn resolve_path(base: &Path, path: &str) -> std::path::PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}
