//! Textures looked up by surface UV.

use std::path::Path;

use tessera_math::{Color, Vec2};

use crate::assets::{resolve_path, AssetError, AssetResult};
use crate::config::ConfigNode;

/// A color-valued function over UV space.
pub trait Texture: Send + Sync {
    fn evaluate(&self, uv: Vec2) -> Color;

    /// Pixel resolution for image-backed textures.
    fn resolution(&self) -> Option<(u32, u32)> {
        None
    }
}

/// Texture returning the same color everywhere.
#[derive(Debug, Clone)]
pub struct ConstantTexture {
    color: Color,
}

impl ConstantTexture {
    pub fn new(color: Color) -> Self {
        Self { color }
    }
}

impl Texture for ConstantTexture {
    fn evaluate(&self, _uv: Vec2) -> Color {
        self.color
    }
}

/// Image texture with bilinear filtering and repeat wrapping.
///
/// Pixels are linear RGB, row-major, with the first row at the top of the
/// image. UV (0, 0) is the bottom-left corner.
#[derive(Debug, Clone)]
pub struct BitmapTexture {
    width: u32,
    height: u32,
    pixels: Vec<Color>,
}

impl BitmapTexture {
    pub fn new(width: u32, height: u32, pixels: Vec<Color>) -> Self {
        debug_assert_eq!(pixels.len(), (width * height) as usize);
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Load an image file. 8-bit formats are treated as sRGB encoded,
    /// floating point formats (HDR, EXR) as linear.
    pub fn load(path: &Path) -> AssetResult<Self> {
        let img = image::open(path).map_err(|e| AssetError::Load {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let linear = matches!(
            img.color(),
            image::ColorType::Rgb32F | image::ColorType::Rgba32F
        );

        let rgb = img.to_rgb32f();
        let (width, height) = rgb.dimensions();
        let pixels = rgb
            .pixels()
            .map(|p| {
                let c = Color::new(p[0], p[1], p[2]);
                if linear {
                    c
                } else {
                    Color::new(srgb_to_linear(c.x), srgb_to_linear(c.y), srgb_to_linear(c.z))
                }
            })
            .collect();

        log::debug!("Loaded bitmap texture: {} ({}x{})", path.display(), width, height);
        Ok(Self::new(width, height, pixels))
    }

    fn pixel(&self, x: u32, y: u32) -> Color {
        self.pixels[(y * self.width + x) as usize]
    }
}

impl Texture for BitmapTexture {
    fn evaluate(&self, uv: Vec2) -> Color {
        let u = uv.x.rem_euclid(1.0);
        let v = uv.y.rem_euclid(1.0);

        let x = u * (self.width - 1) as f32;
        let y = (1.0 - v) * (self.height - 1) as f32;

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let top = self.pixel(x0, y0).lerp(self.pixel(x1, y0), fx);
        let bottom = self.pixel(x0, y1).lerp(self.pixel(x1, y1), fx);
        top.lerp(bottom, fy)
    }

    fn resolution(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }
}

fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

/// Create a texture from its asset definition.
pub fn create(ty: &str, node: &ConfigNode<'_>, base_path: &Path) -> AssetResult<Box<dyn Texture>> {
    match ty {
        "constant" => {
            let color = node.child_value_or_default("color", Color::ONE)?;
            Ok(Box::new(ConstantTexture::new(color)))
        }
        "bitmap" => {
            let path: String = node.child_value("path")?;
            Ok(Box::new(BitmapTexture::load(&resolve_path(base_path, &path))?))
        }
        _ => Err(AssetError::UnknownType {
            kind: "texture",
            ty: ty.to_string(),
        }),
    }
}
