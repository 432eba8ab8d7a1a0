//! Merge configuration.

use crate::bake::AddressMode;
use crate::error::Result;
use crate::texture::DEFAULT_TEXTURE_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a scene merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Target texels per world unit, handed to the unwrapper.
    pub texel_density: f32,
    /// Empty texels around every chart.
    pub atlas_padding: u32,
    /// Maximum atlas side length.
    pub atlas_resolution: u32,
    /// Side of the flat-color texture synthesized for untextured materials.
    pub default_texture_length: u32,
    /// How interpolated source UVs map to source texels.
    pub address_mode: AddressMode,
    /// Bleed baked colors into unfilled atlas texels.
    pub dilate: bool,
    /// Composite materials on the rayon pool.
    pub parallel: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            texel_density: 16.0,
            atlas_padding: 16,
            atlas_resolution: 4096,
            default_texture_length: DEFAULT_TEXTURE_LENGTH,
            address_mode: AddressMode::Wrap,
            dilate: true,
            parallel: true,
        }
    }
}

impl MergeConfig {
    /// Parse a JSON config; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn with_texel_density(mut self, density: f32) -> Self {
        self.texel_density = density;
        self
    }

    pub fn with_atlas_padding(mut self, padding: u32) -> Self {
        self.atlas_padding = padding;
        self
    }

    pub fn with_atlas_resolution(mut self, resolution: u32) -> Self {
        self.atlas_resolution = resolution;
        self
    }

    pub fn with_default_texture_length(mut self, length: u32) -> Self {
        self.default_texture_length = length;
        self
    }

    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_mode = mode;
        self
    }

    pub fn with_dilate(mut self, dilate: bool) -> Self {
        self.dilate = dilate;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}
