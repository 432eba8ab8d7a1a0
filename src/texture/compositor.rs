//! Flattening a material's textures and tint into one RGBA8 image.

use super::TextureData;
use crate::error::{MergeError, Result};
use crate::scene::Material;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

/// Side length of the square texture used for untextured materials.
pub const DEFAULT_TEXTURE_LENGTH: u32 = 128;

/// Builds one composited texture per material.
#[derive(Debug, Clone)]
pub struct TextureCompositor {
    filter: FilterType,
    default_length: u32,
}

impl Default for TextureCompositor {
    fn default() -> Self {
        Self::new(DEFAULT_TEXTURE_LENGTH)
    }
}

impl TextureCompositor {
    /// Create a compositor using Lanczos resampling.
    pub fn new(default_length: u32) -> Self {
        Self {
            filter: FilterType::Lanczos3,
            default_length,
        }
    }

    /// Override the resampling filter.
    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter = filter;
        self
    }

    /// Composite a material into a single RGBA8 texture.
    ///
    /// Textured: `texel * tint`. Untextured: a square of the default length
    /// filled with the tint.
    pub fn composite(&self, material: &Material) -> Result<TextureData> {
        // Only the albedo slot is baked.
        let slots = [material.albedo_texture.as_ref()];

        let mut width = 0;
        let mut height = 0;
        let mut images = Vec::with_capacity(slots.len());
        for texture in slots.into_iter().flatten() {
            let bytes_per_pixel = texture.color().bytes_per_pixel();
            if bytes_per_pixel > 4 {
                return Err(MergeError::UnsupportedPixelFormat {
                    material: material.name.clone(),
                    bytes_per_pixel,
                });
            }
            if texture.width() == 0 || texture.height() == 0 {
                continue;
            }
            width = width.max(texture.width());
            height = height.max(texture.height());
            images.push(texture.to_rgba8());
        }

        let resized: Vec<RgbaImage> = images
            .into_iter()
            .map(|img| {
                if img.dimensions() == (width, height) {
                    img
                } else {
                    imageops::resize(&img, width, height, self.filter)
                }
            })
            .collect();

        let Some(albedo) = resized.first() else {
            let side = self.default_length;
            return Ok(TextureData::solid(side, side, color_to_rgba8(material.albedo)));
        };

        let mul = material.albedo;
        let add = [0.0; 4];
        let mut out = TextureData::empty(width, height);
        for (x, y, pixel) in albedo.enumerate_pixels() {
            out.set_pixel(x, y, composite_pixel(pixel.0, mul, add));
        }

        Ok(out)
    }
}

/// Create the square fallback texture substituted for untextured materials.
pub fn fallback_texture(material: &Material, side: u32) -> DynamicImage {
    let color = image::Rgba(color_to_rgba8(material.albedo));
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(side, side, color))
}

/// `src * mul + add` in normalized color space.
fn composite_pixel(src: [u8; 4], mul: [f32; 4], add: [f32; 4]) -> [u8; 4] {
    let mut out = [0.0f32; 4];
    for i in 0..4 {
        out[i] = src[i] as f32 / 255.0 * mul[i] + add[i];
    }
    color_to_rgba8(out)
}

/// Quantize a 0-1 color to RGBA8.
pub(crate) fn color_to_rgba8(color: [f32; 4]) -> [u8; 4] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        }))
    }

    #[test]
    fn test_untextured_material_is_flat_tint() {
        let material = Material::new("red", [1.0, 0.0, 0.0, 1.0]);
        let tex = TextureCompositor::new(8).composite(&material).unwrap();

        assert_eq!((tex.width, tex.height), (8, 8));
        assert!(tex.pixels.chunks(4).all(|p| p == [255, 0, 0, 255]));
    }

    #[test]
    fn test_textured_material_with_white_tint_is_identity() {
        let material = Material::new("checker", [1.0; 4]).with_texture(checker(4, 4));
        let tex = TextureCompositor::default().composite(&material).unwrap();

        assert_eq!((tex.width, tex.height), (4, 4));
        assert_eq!(tex.get_pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(tex.get_pixel(1, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn test_tint_multiplies_texture() {
        let material = Material::new("tinted", [0.5, 1.0, 0.0, 1.0]).with_texture(checker(2, 2));
        let tex = TextureCompositor::default().composite(&material).unwrap();

        assert_eq!(tex.get_pixel(0, 0), [128, 255, 0, 255]);
        assert_eq!(tex.get_pixel(1, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn test_non_square_texture_keeps_dimensions() {
        let material = Material::new("wide", [1.0; 4]).with_texture(checker(16, 4));
        let tex = TextureCompositor::default().composite(&material).unwrap();
        assert_eq!((tex.width, tex.height), (16, 4));
    }

    #[test]
    fn test_float_texture_rejected() {
        let material =
            Material::new("hdr", [1.0; 4]).with_texture(DynamicImage::new_rgba32f(2, 2));
        let err = TextureCompositor::default().composite(&material).unwrap_err();
        assert!(matches!(
            err,
            MergeError::UnsupportedPixelFormat { bytes_per_pixel: 16, .. }
        ));
    }

    #[test]
    fn test_fallback_texture() {
        let material = Material::new("blue", [0.0, 0.0, 1.0, 1.0]);
        let fallback = fallback_texture(&material, 16).to_rgba8();
        assert_eq!(fallback.dimensions(), (16, 16));
        assert!(fallback.pixels().all(|p| p.0 == [0, 0, 255, 255]));
    }
}
