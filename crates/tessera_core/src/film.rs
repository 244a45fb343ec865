//! Accumulation buffer for radiance estimates.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::hdr::HdrEncoder;
use image::{DynamicImage, ImageBuffer, Rgb};
use tessera_math::{Color, Vec2};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilmError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Film size mismatch: {0}x{1} vs {2}x{3}")]
    SizeMismatch(u32, u32, u32, u32),
}

pub type FilmResult<T> = Result<T, FilmError>;

/// RGB float image addressed by raster position.
///
/// Raster positions are in `[0, 1]^2` with (0, 0) at the bottom-left. The
/// buffer is row-major starting from the bottom row; saving flips it so
/// the written image is upright.
#[derive(Debug, Clone, PartialEq)]
pub struct Film {
    width: u32,
    height: u32,
    data: Vec<Color>,
}

impl Film {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![Color::ZERO; (width * height) as usize],
        }
    }

    /// A black film with the same resolution.
    pub fn clone_empty(&self) -> Self {
        Self::new(self.width, self.height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn data(&self) -> &[Color] {
        &self.data
    }

    fn index(&self, raster: Vec2) -> usize {
        let x = ((raster.x * self.width as f32) as i64).clamp(0, self.width as i64 - 1) as usize;
        let y = ((raster.y * self.height as f32) as i64).clamp(0, self.height as i64 - 1) as usize;
        y * self.width as usize + x
    }

    /// Pixel at integer coordinates, `y` counted from the bottom.
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        self.data[(y * self.width + x) as usize]
    }

    /// Add `contrib` to the pixel containing `raster`.
    pub fn accumulate_contribution(&mut self, raster: Vec2, contrib: Color) {
        let i = self.index(raster);
        self.data[i] += contrib;
    }

    /// Overwrite the pixel containing `raster`.
    pub fn record_contribution(&mut self, raster: Vec2, contrib: Color) {
        let i = self.index(raster);
        self.data[i] = contrib;
    }

    /// Add another film of the same size.
    pub fn accumulate(&mut self, other: &Film) -> FilmResult<()> {
        if self.width != other.width || self.height != other.height {
            return Err(FilmError::SizeMismatch(self.width, self.height, other.width, other.height));
        }
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += *b;
        }
        Ok(())
    }

    pub fn rescale(&mut self, weight: f32) {
        for c in &mut self.data {
            *c *= weight;
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(Color::ZERO);
    }

    /// Pixels flipped to top-first order.
    fn top_first(&self) -> impl Iterator<Item = &Color> {
        self.data.chunks(self.width as usize).rev().flatten()
    }

    /// Write the film. The format follows the extension: `.hdr`, `.exr`
    /// or `.png` (clamped, gamma 1/2.2).
    pub fn save(&self, path: impl AsRef<Path>) -> FilmResult<()> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        match ext.as_str() {
            "hdr" => {
                let pixels: Vec<Rgb<f32>> = self.top_first().map(|c| Rgb([c.x, c.y, c.z])).collect();
                let writer = BufWriter::new(File::create(path)?);
                HdrEncoder::new(writer).encode(&pixels, self.width as usize, self.height as usize)?;
            }
            "exr" => {
                let buf: Vec<f32> = self.top_first().flat_map(|c| [c.x, c.y, c.z]).collect();
                let img = ImageBuffer::<Rgb<f32>, Vec<f32>>::from_raw(self.width, self.height, buf)
                    .ok_or_else(|| FilmError::UnsupportedFormat("exr".to_string()))?;
                DynamicImage::ImageRgb32F(img).save(path)?;
            }
            "png" => {
                let buf: Vec<u8> = self
                    .top_first()
                    .flat_map(|c| [to_ldr(c.x), to_ldr(c.y), to_ldr(c.z)])
                    .collect();
                let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(self.width, self.height, buf)
                    .ok_or_else(|| FilmError::UnsupportedFormat("png".to_string()))?;
                img.save(path)?;
            }
            other => return Err(FilmError::UnsupportedFormat(other.to_string())),
        }

        log::info!("Saved image: {}", path.display());
        Ok(())
    }
}

fn to_ldr(v: f32) -> u8 {
    (v.clamp(0.0, 1.0).powf(1.0 / 2.2) * 255.0 + 0.5) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_addressing() {
        let mut film = Film::new(4, 2);
        film.accumulate_contribution(Vec2::new(0.0, 0.0), Color::ONE);
        film.accumulate_contribution(Vec2::new(0.99, 0.99), Color::splat(2.0));
        // Raster 1.0 is clamped into the last pixel
        film.accumulate_contribution(Vec2::new(1.0, 1.0), Color::splat(2.0));

        assert_eq!(film.pixel(0, 0), Color::ONE);
        assert_eq!(film.pixel(3, 1), Color::splat(4.0));
        assert_eq!(film.pixel(1, 0), Color::ZERO);
    }

    #[test]
    fn test_accumulate_and_rescale() {
        let mut a = Film::new(2, 2);
        let mut b = a.clone_empty();
        a.record_contribution(Vec2::new(0.1, 0.1), Color::ONE);
        b.record_contribution(Vec2::new(0.1, 0.1), Color::ONE);
        a.accumulate(&b).unwrap();
        a.rescale(0.5);
        assert_eq!(a.pixel(0, 0), Color::ONE);

        assert!(a.accumulate(&Film::new(3, 2)).is_err());
    }

    #[test]
    fn test_save_flips_rows() {
        let mut film = Film::new(1, 2);
        film.record_contribution(Vec2::new(0.5, 0.25), Color::ONE);
        let rows: Vec<Color> = film.top_first().copied().collect();
        assert_eq!(rows, vec![Color::ZERO, Color::ONE]);
    }

    #[test]
    fn test_save_png() {
        let dir = std::env::temp_dir().join("tessera_film_test");
        let path = dir.join("out.png");
        let mut film = Film::new(2, 2);
        film.record_contribution(Vec2::new(0.0, 0.0), Color::ONE);
        film.save(&path).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        // Bottom-left pixel ends up in the last row
        assert_eq!(img.get_pixel(0, 1)[0], 255);
        assert_eq!(img.get_pixel(0, 0)[0], 0);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_unsupported_extension() {
        let film = Film::new(1, 1);
        assert!(matches!(
            film.save(std::env::temp_dir().join("tessera_film.bmp2")),
            Err(FilmError::UnsupportedFormat(_))
        ));
    }
}
