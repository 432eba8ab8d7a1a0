//! RGBA8 texture data and per-material texture compositing.

mod compositor;

pub use compositor::{fallback_texture, TextureCompositor, DEFAULT_TEXTURE_LENGTH};

use crate::error::{MergeError, Result};
use image::{ImageEncoder, RgbaImage};

/// Byte length of a `width` x `height` RGBA8 buffer.
pub fn pixel_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

/// Raw RGBA8 texture data, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    /// Texture width in pixels.
    pub width: u32,
    /// Texture height in pixels.
    pub height: u32,
    /// RGBA8 pixel data (4 bytes per pixel).
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Create a new texture from RGBA data.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), pixel_len(width, height));
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Create a fully transparent black texture.
    pub fn empty(width: u32, height: u32) -> Self {
        Self::new(width, height, vec![0; pixel_len(width, height)])
    }

    /// Create a texture filled with a single color.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self::new(width, height, color.repeat(pixel_len(width, height) / 4))
    }

    /// Check if the texture has no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// RGBA of the texel at (x, y).
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        let mut rgba = [0; 4];
        rgba.copy_from_slice(&self.pixels[i..i + 4]);
        rgba
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let i = self.offset(x, y);
        self.pixels[i..i + 4].copy_from_slice(&color);
    }

    /// Force every pixel fully opaque.
    pub fn make_opaque(&mut self) {
        for pixel in self.pixels.chunks_mut(4) {
            pixel[3] = 255;
        }
    }

    /// Convert into an `image` buffer.
    pub fn into_image(self) -> Result<RgbaImage> {
        let (width, height) = (self.width, self.height);
        RgbaImage::from_raw(width, height, self.pixels).ok_or_else(|| {
            MergeError::InvalidBuffer(format!("pixel buffer does not match {}x{}", width, height))
        })
    }

    /// Build from an `image` buffer.
    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, image.into_raw())
    }

    /// Export the texture as PNG bytes.
    pub fn to_png(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        let cursor = std::io::Cursor::new(&mut bytes);
        let encoder = image::codecs::png::PngEncoder::new(cursor);

        encoder.write_image(
            &self.pixels,
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
        )?;

        Ok(bytes)
    }
}

/// Load a texture from encoded image bytes (PNG).
pub fn load_texture_from_bytes(data: &[u8]) -> Result<TextureData> {
    let img = image::load_from_memory(data)?;
    Ok(TextureData::from_image(img.to_rgba8()))
}
