//! Shelf (row) packer: one rectangular chart per surface material.

use super::{AtlasPacker, Chart, PackError, PackOptions, PackedAtlas, PackedMesh, PackedVertex, UvMeshDecl};
use std::collections::{BTreeMap, HashMap};

/// Smallest atlas side tried.
const MIN_ATLAS_SIZE: u32 = 64;
/// How many times charts are halved before giving up.
const MAX_SHRINK_STEPS: u32 = 16;

#[derive(Debug, Clone)]
struct QueuedMesh {
    uvs: Vec<[f32; 2]>,
    indices: Vec<u32>,
    face_materials: Vec<u32>,
}

/// A chart before placement.
#[derive(Debug, Clone)]
struct PendingChart {
    mesh: usize,
    material: u32,
    faces: Vec<u32>,
    min: [f32; 2],
    extent: [f32; 2],
}

impl PendingChart {
    fn size(&self, scale: f32) -> (u32, u32) {
        let w = (self.extent[0] * scale).ceil().max(1.0) as u32;
        let h = (self.extent[1] * scale).ceil().max(1.0) as u32;
        (w, h)
    }
}

/// Packs each (surface, material) group as its UV bounding rectangle, in
/// rows of decreasing height, into a square power-of-two atlas.
#[derive(Debug, Default)]
pub struct ShelfPacker {
    meshes: Vec<QueuedMesh>,
}

impl ShelfPacker {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending_charts(&self) -> Vec<PendingChart> {
        let mut charts = Vec::new();
        for (mesh_index, mesh) in self.meshes.iter().enumerate() {
            let mut by_material: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
            for (face, &material) in mesh.face_materials.iter().enumerate() {
                by_material.entry(material).or_default().push(face as u32);
            }

            for (material, faces) in by_material {
                let mut min = [f32::MAX; 2];
                let mut max = [f32::MIN; 2];
                for &face in &faces {
                    for corner in 0..3 {
                        let uv = mesh.uvs[mesh.indices[face as usize * 3 + corner] as usize];
                        for axis in 0..2 {
                            min[axis] = min[axis].min(uv[axis]);
                            max[axis] = max[axis].max(uv[axis]);
                        }
                    }
                }
                charts.push(PendingChart {
                    mesh: mesh_index,
                    material,
                    faces,
                    min,
                    extent: [max[0] - min[0], max[1] - min[1]],
                });
            }
        }
        charts
    }

    fn build_output(
        &self,
        charts: &[PendingChart],
        origins: &[(u32, u32)],
        scale: f32,
        padding: u32,
        atlas_size: u32,
    ) -> PackedAtlas {
        let mut meshes: Vec<PackedMesh> = (0..self.meshes.len())
            .map(|source| PackedMesh {
                source,
                ..Default::default()
            })
            .collect();

        for (chart, &(ox, oy)) in charts.iter().zip(origins) {
            let mesh = &self.meshes[chart.mesh];
            let out = &mut meshes[chart.mesh];
            let chart_index = out.charts.len() as u32;
            let mut remap: HashMap<u32, u32> = HashMap::new();
            let mut faces = Vec::with_capacity(chart.faces.len());

            for &face in &chart.faces {
                faces.push((out.indices.len() / 3) as u32);
                for corner in 0..3 {
                    let xref = mesh.indices[face as usize * 3 + corner];
                    let index = *remap.entry(xref).or_insert_with(|| {
                        let uv = mesh.uvs[xref as usize];
                        out.vertices.push(PackedVertex {
                            uv: [
                                (ox + padding) as f32 + (uv[0] - chart.min[0]) * scale,
                                (oy + padding) as f32 + (uv[1] - chart.min[1]) * scale,
                            ],
                            xref,
                            chart: chart_index,
                        });
                        (out.vertices.len() - 1) as u32
                    });
                    out.indices.push(index);
                }
            }

            out.charts.push(Chart {
                material: chart.material,
                faces,
            });
        }

        PackedAtlas {
            width: atlas_size,
            height: atlas_size,
            meshes,
        }
    }
}

impl AtlasPacker for ShelfPacker {
    fn add_uv_mesh(&mut self, mesh: &UvMeshDecl<'_>) -> Result<(), PackError> {
        mesh.validate()?;
        self.meshes.push(QueuedMesh {
            uvs: mesh.vertex_uvs.to_vec(),
            indices: mesh.indices.to_vec(),
            face_materials: mesh.face_materials.to_vec(),
        });
        Ok(())
    }

    fn pack(&mut self, options: &PackOptions) -> PackedAtlas {
        if self.meshes.is_empty() || options.resolution == 0 {
            return PackedAtlas::default();
        }

        let mut charts = self.pending_charts();
        // Tallest first for better packing
        charts.sort_by(|a, b| b.extent[1].total_cmp(&a.extent[1]));

        let padding = options.padding;
        let mut scale = if options.texel_scale > 0.0 && options.texel_scale.is_finite() {
            options.texel_scale
        } else {
            1.0
        };

        for _ in 0..MAX_SHRINK_STEPS {
            let sizes: Vec<(u32, u32)> = charts
                .iter()
                .map(|c| {
                    let (w, h) = c.size(scale);
                    (w + padding * 2, h + padding * 2)
                })
                .collect();

            let total_area: u64 = sizes.iter().map(|&(w, h)| w as u64 * h as u64).sum();
            let min_size = (total_area as f64).sqrt().ceil() as u32;
            let mut atlas_size = MIN_ATLAS_SIZE.min(options.resolution);
            while atlas_size < min_size && atlas_size < options.resolution {
                atlas_size = atlas_size.saturating_mul(2).min(options.resolution);
            }

            loop {
                if let Some(origins) = try_pack(&sizes, atlas_size) {
                    log::debug!(
                        "Packed {} charts into {}x{} atlas at scale {}",
                        charts.len(),
                        atlas_size,
                        atlas_size,
                        scale
                    );
                    return self.build_output(&charts, &origins, scale, padding, atlas_size);
                }
                if atlas_size >= options.resolution {
                    break;
                }
                atlas_size = atlas_size.saturating_mul(2).min(options.resolution);
            }

            scale *= 0.5;
        }

        log::warn!(
            "Failed to pack {} charts into a {}x{} atlas",
            charts.len(),
            options.resolution,
            options.resolution
        );
        PackedAtlas::default()
    }

    fn release(&mut self) {
        self.meshes.clear();
    }
}

/// Row packing of padded rectangles; `None` if they do not fit.
fn try_pack(sizes: &[(u32, u32)], atlas_size: u32) -> Option<Vec<(u32, u32)>> {
    let mut origins = Vec::with_capacity(sizes.len());
    let mut current_x = 0u32;
    let mut current_y = 0u32;
    let mut row_height = 0u32;

    for &(width, height) in sizes {
        if width > atlas_size {
            return None;
        }
        if current_x + width > atlas_size {
            current_x = 0;
            current_y += row_height;
            row_height = 0;
        }
        if current_y + height > atlas_size {
            return None;
        }

        origins.push((current_x, current_y));
        current_x += width;
        row_height = row_height.max(height);
    }

    Some(origins)
}
