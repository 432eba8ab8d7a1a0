//! UV unwrapping: one chart-normalized UV per surface vertex.

use crate::error::{MergeError, Result};
use crate::scene::Surface;
use glam::{Vec2, Vec3};

/// Produces per-vertex UVs in `[0, 1]` for a surface.
pub trait UvUnwrapper: Send + Sync {
    /// Unwrap `surface`, targeting `texel_density` texels per world unit.
    ///
    /// Must return exactly one UV per vertex.
    fn unwrap(&self, surface: &Surface, texel_density: f32) -> Result<Vec<[f32; 2]>>;
}

/// Reuses the surface's own UVs, moved to the origin and scaled down into
/// `[0, 1]` when their bounding box is wider than one tile.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistingUvUnwrapper;

impl UvUnwrapper for ExistingUvUnwrapper {
    fn unwrap(&self, surface: &Surface, _texel_density: f32) -> Result<Vec<[f32; 2]>> {
        let uvs: Vec<Vec2> = surface.vertices.iter().map(|v| Vec2::from(v.uv)).collect();
        Ok(normalize_points(&uvs))
    }
}

/// Projects positions onto the plane facing the dominant normal axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarUnwrapper;

impl UvUnwrapper for PlanarUnwrapper {
    fn unwrap(&self, surface: &Surface, _texel_density: f32) -> Result<Vec<[f32; 2]>> {
        let normal_sum: Vec3 = surface
            .vertices
            .iter()
            .map(|v| Vec3::from(v.normal))
            .sum();
        let axis = dominant_axis(normal_sum);

        let projected: Vec<Vec2> = surface
            .vertices
            .iter()
            .map(|v| {
                let p = Vec3::from(v.position);
                match axis {
                    0 => Vec2::new(p.z, p.y),
                    1 => Vec2::new(p.x, p.z),
                    _ => Vec2::new(p.x, p.y),
                }
            })
            .collect();

        if projected.iter().any(|p| !p.is_finite()) {
            return Err(MergeError::InvalidBuffer(
                "surface has non-finite vertex positions".to_string(),
            ));
        }
        Ok(normalize_points(&projected))
    }
}

fn dominant_axis(n: Vec3) -> usize {
    let a = n.abs();
    if a.x >= a.y && a.x >= a.z {
        0
    } else if a.y >= a.z {
        1
    } else {
        2
    }
}

/// Fit points into the unit square by their bounds, keeping aspect ratio.
fn normalize_points(points: &[Vec2]) -> Vec<[f32; 2]> {
    let Some(&first) = points.first() else {
        return Vec::new();
    };
    let (min, max) = points
        .iter()
        .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p)));
    let extent = (max - min).max_element();
    let scale = if extent > 1.0 { 1.0 / extent } else { 1.0 };

    points.iter().map(|&p| ((p - min) * scale).to_array()).collect()
}
