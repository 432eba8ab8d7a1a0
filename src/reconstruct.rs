//! Mesh reconstruction: building the merged surface from the packed layout.

use crate::atlas::PackedAtlas;
use crate::error::{MergeError, Result};
use crate::normalize::ModelVertex;
use crate::scene::{Surface, Vertex};
use crate::types::MaterialId;

/// Build one surface from every packed mesh.
///
/// Positions and normals come from `model_vertices[mesh.source][xref]`; UVs
/// are the packed atlas positions divided by the atlas size. Mesh order and
/// per-mesh triangle order are preserved.
pub fn reconstruct_mesh(
    packed: &PackedAtlas,
    model_vertices: &[Vec<ModelVertex>],
    material: MaterialId,
) -> Result<Surface> {
    if packed.is_empty() {
        return Err(MergeError::EmptyAtlas {
            width: packed.width,
            height: packed.height,
        });
    }

    let inv_w = 1.0 / packed.width as f32;
    let inv_h = 1.0 / packed.height as f32;
    let mut merged = Surface::new(material);

    for mesh in &packed.meshes {
        let sources = model_vertices.get(mesh.source).map(Vec::as_slice).unwrap_or(&[]);
        let base = merged.vertex_count() as u32;

        for vertex in &mesh.vertices {
            let model = sources.get(vertex.xref as usize).ok_or_else(|| MergeError::XrefOutOfRange {
                surface: mesh.source,
                xref: vertex.xref,
                vertex_count: sources.len(),
            })?;
            merged.add_vertex(Vertex::new(
                model.position.to_array(),
                model.normal.to_array(),
                [vertex.uv[0] * inv_w, vertex.uv[1] * inv_h],
            ));
        }

        for &index in &mesh.indices {
            if index as usize >= mesh.vertices.len() {
                return Err(MergeError::InvalidBuffer(format!(
                    "packed index {} out of range for {} vertices of surface {}",
                    index,
                    mesh.vertices.len(),
                    mesh.source
                )));
            }
            merged.indices.push(base + index);
        }
    }

    Ok(merged)
}
