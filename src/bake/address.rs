//! Source UV to texel addressing.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// How an interpolated source UV is turned into an integer texel coordinate.
///
/// The two modes place seams differently; a merge uses exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressMode {
    /// Repeat: `floor(fract(uv) * size)`. An exact `1.0` wraps to texel 0;
    /// non-finite input maps to texel 0.
    #[default]
    Wrap,
    /// `floor(uv * (size - 1)) mod (size - 1)`, corrected for negative values.
    Modulo,
}

impl AddressMode {
    /// Resolve a UV to a texel of a `width x height` texture.
    pub fn resolve(self, uv: Vec2, width: u32, height: u32) -> (u32, u32) {
        match self {
            AddressMode::Wrap => (wrap_axis(uv.x, width), wrap_axis(uv.y, height)),
            AddressMode::Modulo => (modulo_axis(uv.x, width), modulo_axis(uv.y, height)),
        }
    }
}

fn wrap_axis(u: f32, size: u32) -> u32 {
    if size == 0 || !u.is_finite() {
        return 0;
    }
    let fract = u - u.floor();
    ((fract * size as f32) as u32).min(size - 1)
}

fn modulo_axis(u: f32, size: u32) -> u32 {
    let extent = size.saturating_sub(1);
    if extent == 0 || !u.is_finite() {
        return 0;
    }
    let texel = (u * extent as f32).floor() as i64;
    texel.rem_euclid(extent as i64) as u32
}
