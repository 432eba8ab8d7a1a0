//! Texel baking: copying source texture colors into the atlas.
//!
//! For every pixel a packed triangle covers in atlas space, the baker
//! interpolates the triangle's source UVs with the pixel's barycentric
//! weights, resolves a texel of the material's composited texture and writes
//! it into the atlas, recording where the color came from.

mod address;

pub use address::AddressMode;

use crate::raster::{Sample, Triangle};
use crate::texture::TextureData;
use glam::Vec2;

/// Where an atlas pixel's color was sampled from.
///
/// Source coordinates are stored as `u16`; texels of composited textures
/// beyond 65535 in either axis are still baked but get no provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasTexel {
    /// Merge-local material index.
    pub material_index: u16,
    /// Source texel column.
    pub x: u16,
    /// Source texel row.
    pub y: u16,
}

/// Per-pixel provenance for an atlas, row-major.
#[derive(Debug, Clone)]
pub struct TexelLookup {
    width: u32,
    height: u32,
    texels: Vec<Option<AtlasTexel>>,
}

impl TexelLookup {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            texels: vec![None; (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Provenance of atlas pixel (x, y), if it was baked.
    pub fn get(&self, x: u32, y: u32) -> Option<AtlasTexel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.texels[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, texel: AtlasTexel) {
        let index = self.index(x, y);
        self.texels[index] = Some(texel);
    }

    /// Number of baked pixels.
    pub fn filled_count(&self) -> usize {
        self.texels.iter().filter(|t| t.is_some()).count()
    }
}

/// Per-triangle sampling state: the bound source texture and the source UVs
/// of the triangle's three vertices.
#[derive(Debug, Clone, Copy)]
pub struct TexelBinding<'a> {
    /// Composited texture of the chart's material; `None` when unavailable.
    pub texture: Option<&'a TextureData>,
    pub material_index: u16,
    pub source_uvs: [Vec2; 3],
}

impl TexelBinding<'_> {
    /// Source UV at the given barycentric weights.
    pub fn source_uv(&self, bar: glam::Vec3) -> Vec2 {
        self.source_uvs[0] * bar.x + self.source_uvs[1] * bar.y + self.source_uvs[2] * bar.z
    }
}

/// Writes sampled texels into an atlas image and its provenance lookup.
pub struct TexelBaker<'a> {
    atlas: &'a mut TextureData,
    lookup: &'a mut TexelLookup,
    address_mode: AddressMode,
    texels_written: usize,
}

impl<'a> TexelBaker<'a> {
    pub fn new(atlas: &'a mut TextureData, lookup: &'a mut TexelLookup, address_mode: AddressMode) -> Self {
        debug_assert_eq!((atlas.width, atlas.height), (lookup.width, lookup.height));
        Self {
            atlas,
            lookup,
            address_mode,
            texels_written: 0,
        }
    }

    /// Number of atlas writes performed so far.
    pub fn texels_written(&self) -> usize {
        self.texels_written
    }

    /// Sampling callback for one rasterized pixel.
    ///
    /// Returns `false` without writing when no texture is bound, which stops
    /// the rest of the triangle.
    pub fn set_atlas_texel(&mut self, binding: &TexelBinding<'_>, sample: &Sample) -> bool {
        let Some(texture) = binding.texture else {
            return false;
        };
        if texture.is_empty() {
            return false;
        }
        if sample.x >= self.atlas.width || sample.y >= self.atlas.height {
            return true;
        }

        let uv = binding.source_uv(sample.bar);
        let (sx, sy) = self.address_mode.resolve(uv, texture.width, texture.height);
        let color = texture.get_pixel(sx, sy);

        self.atlas.set_pixel(sample.x, sample.y, color);
        match (u16::try_from(sx), u16::try_from(sy)) {
            (Ok(x), Ok(y)) => self.lookup.set(
                sample.x,
                sample.y,
                AtlasTexel {
                    material_index: binding.material_index,
                    x,
                    y,
                },
            ),
            _ => log::trace!("No provenance for source texel ({}, {})", sx, sy),
        }
        self.texels_written += 1;
        true
    }

    /// Rasterize one atlas-space triangle and bake every covered pixel.
    ///
    /// Returns `false` if the triangle was aborted part-way.
    pub fn bake_triangle(&mut self, binding: &TexelBinding<'_>, atlas_positions: [Vec2; 3]) -> bool {
        let [p0, p1, p2] = atlas_positions;
        let triangle = Triangle::barycentric(p0, p1, p2);
        let extents = [self.atlas.width, self.atlas.height];
        triangle.draw_aa(extents, |sample| self.set_atlas_texel(binding, sample))
    }
}
