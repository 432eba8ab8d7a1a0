//! UV normalization: bringing unwrapped UVs into texel space for the packer,
//! and snapshotting each surface's world-space vertex attributes for
//! reconstruction.

use crate::error::{MergeError, Result};
use crate::scene::Surface;
use glam::{Affine3A, Mat3, Vec2, Vec3};

/// A source vertex in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelVertex {
    pub position: Vec3,
    pub normal: Vec3,
    /// UV into the material's composited texture.
    pub uv: Vec2,
}

/// A surface prepared for packing.
#[derive(Debug, Clone)]
pub struct NormalizedSurface {
    /// World-space vertices, indexed by packed-vertex xref.
    pub model_vertices: Vec<ModelVertex>,
    /// Unwrapped UVs scaled to the composited texture's size, one per vertex.
    pub packer_uvs: Vec<[f32; 2]>,
}

/// Normalize one surface.
///
/// `unwrapped` holds one `[0, 1]` UV per vertex. Each is scaled by
/// `texture_size` so a chart gets as many atlas texels as its material has.
pub fn normalize_surface(
    surface: &Surface,
    world: Affine3A,
    unwrapped: &[[f32; 2]],
    texture_size: (u32, u32),
) -> Result<NormalizedSurface> {
    if unwrapped.len() != surface.vertex_count() {
        return Err(MergeError::InvalidBuffer(format!(
            "unwrapper returned {} UVs for {} vertices",
            unwrapped.len(),
            surface.vertex_count()
        )));
    }

    let normal_matrix = normal_matrix(world);
    let model_vertices = surface
        .vertices
        .iter()
        .map(|v| ModelVertex {
            position: world.transform_point3(Vec3::from(v.position)),
            normal: (normal_matrix * Vec3::from(v.normal)).normalize_or_zero(),
            uv: Vec2::from(v.uv),
        })
        .collect();

    let scale = Vec2::new(texture_size.0 as f32, texture_size.1 as f32);
    let packer_uvs = unwrapped
        .iter()
        .map(|&uv| (Vec2::from(uv) * scale).to_array())
        .collect();

    Ok(NormalizedSurface {
        model_vertices,
        packer_uvs,
    })
}

/// Inverse-transpose of the linear part; the linear part itself when singular.
fn normal_matrix(world: Affine3A) -> Mat3 {
    let linear = Mat3::from(world.matrix3);
    if linear.determinant().abs() <= f32::EPSILON {
        return linear;
    }
    linear.inverse().transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Vertex;
    use crate::types::MaterialId;

    fn triangle() -> Surface {
        let mut surface = Surface::new(MaterialId(0));
        surface.add_vertex(Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]));
        surface.add_vertex(Vertex::new([1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0]));
        surface.add_vertex(Vertex::new([0.0, 1.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0]));
        surface.add_triangle(0, 1, 2);
        surface
    }

    #[test]
    fn test_scales_to_texture_size() {
        let unwrapped = [[0.0, 0.0], [1.0, 0.0], [0.5, 1.0]];
        let out = normalize_surface(&triangle(), Affine3A::IDENTITY, &unwrapped, (64, 32)).unwrap();
        assert_eq!(out.packer_uvs, vec![[0.0, 0.0], [64.0, 0.0], [32.0, 32.0]]);
        assert_eq!(out.model_vertices[1].uv, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_world_transform_applied() {
        let world = Affine3A::from_scale_rotation_translation(
            Vec3::new(2.0, 1.0, 1.0),
            glam::Quat::IDENTITY,
            Vec3::new(10.0, 0.0, 0.0),
        );
        let unwrapped = [[0.0; 2]; 3];
        let out = normalize_surface(&triangle(), world, &unwrapped, (1, 1)).unwrap();
        assert_eq!(out.model_vertices[1].position, Vec3::new(12.0, 0.0, 0.0));
        assert!((out.model_vertices[0].normal - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_non_uniform_scale_keeps_normals_perpendicular() {
        let mut surface = Surface::new(MaterialId(0));
        let n = Vec3::new(1.0, 1.0, 0.0).normalize().to_array();
        surface.add_vertex(Vertex::new([1.0, 0.0, 0.0], n, [0.0, 0.0]));
        surface.add_vertex(Vertex::new([0.0, 1.0, 0.0], n, [0.0, 0.0]));
        surface.add_vertex(Vertex::new([1.0, 0.0, 1.0], n, [0.0, 0.0]));
        surface.add_triangle(0, 1, 2);

        let world = Affine3A::from_scale(Vec3::new(4.0, 1.0, 1.0));
        let out = normalize_surface(&surface, world, &[[0.0; 2]; 3], (1, 1)).unwrap();
        let edge = out.model_vertices[1].position - out.model_vertices[0].position;
        assert!(out.model_vertices[0].normal.dot(edge).abs() < 1e-5);
    }

    #[test]
    fn test_length_mismatch() {
        let result = normalize_surface(&triangle(), Affine3A::IDENTITY, &[[0.0; 2]; 2], (8, 8));
        assert!(matches!(result, Err(MergeError::InvalidBuffer(_))));
    }
}
