//! Atlas packing contract.
//!
//! A packer receives one UV mesh per surface and lays its charts out,
//! without overlap, in a single atlas. Packers hold per-atlas state between
//! [`AtlasPacker::add_uv_mesh`] and [`AtlasPacker::pack`]; callers go through
//! [`AtlasSession`], which releases that state on every exit path.

mod shelf;

pub use shelf::ShelfPacker;

use thiserror::Error;

/// Why a packer refused a UV mesh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackError {
    #[error("mesh has no vertices or no triangles")]
    EmptyGeometry,

    #[error("index count {0} is not a multiple of 3")]
    InvalidIndexCount(usize),

    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u32, vertex_count: usize },

    #[error("{faces} faces but {materials} face materials")]
    MaterialCountMismatch { faces: usize, materials: usize },
}

/// A UV mesh handed to the packer.
#[derive(Debug, Clone, Copy)]
pub struct UvMeshDecl<'a> {
    /// One UV per vertex, in texel units.
    pub vertex_uvs: &'a [[f32; 2]],
    /// Triangle list indices.
    pub indices: &'a [u32],
    /// Material index of each triangle.
    pub face_materials: &'a [u32],
}

impl UvMeshDecl<'_> {
    /// Check the declaration is well formed.
    pub fn validate(&self) -> Result<(), PackError> {
        if self.vertex_uvs.is_empty() || self.indices.is_empty() {
            return Err(PackError::EmptyGeometry);
        }
        if self.indices.len() % 3 != 0 {
            return Err(PackError::InvalidIndexCount(self.indices.len()));
        }
        if let Some(&index) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= self.vertex_uvs.len())
        {
            return Err(PackError::IndexOutOfRange {
                index,
                vertex_count: self.vertex_uvs.len(),
            });
        }
        let faces = self.indices.len() / 3;
        if self.face_materials.len() != faces {
            return Err(PackError::MaterialCountMismatch {
                faces,
                materials: self.face_materials.len(),
            });
        }
        Ok(())
    }
}

/// Packing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackOptions {
    /// Empty texels kept around every chart.
    pub padding: u32,
    /// Maximum atlas side length.
    pub resolution: u32,
    /// Atlas texels per input UV unit.
    pub texel_scale: f32,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            padding: 16,
            resolution: 4096,
            texel_scale: 1.0,
        }
    }
}

/// A vertex of a packed mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackedVertex {
    /// Atlas position in pixels.
    pub uv: [f32; 2],
    /// Index of the originating vertex in the input UV mesh.
    pub xref: u32,
    /// Chart this vertex belongs to.
    pub chart: u32,
}

/// A group of triangles sharing one material and one atlas region.
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    /// Material index of every face in the chart.
    pub material: u32,
    /// Face indices into the packed mesh's triangle list.
    pub faces: Vec<u32>,
}

/// Packed output for one input UV mesh.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackedMesh {
    /// Caller-side index of the input mesh this was packed from.
    pub source: usize,
    pub vertices: Vec<PackedVertex>,
    pub indices: Vec<u32>,
    pub charts: Vec<Chart>,
}

impl PackedMesh {
    /// Atlas positions and xrefs of a face's three vertices.
    pub fn face(&self, face: u32) -> Option<[PackedVertex; 3]> {
        let base = face as usize * 3;
        let idx = self.indices.get(base..base + 3)?;
        Some([
            *self.vertices.get(idx[0] as usize)?,
            *self.vertices.get(idx[1] as usize)?,
            *self.vertices.get(idx[2] as usize)?,
        ])
    }
}

/// A finished atlas layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackedAtlas {
    pub width: u32,
    pub height: u32,
    pub meshes: Vec<PackedMesh>,
}

impl PackedAtlas {
    /// Whether the atlas has no area.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Total chart count across all meshes.
    pub fn chart_count(&self) -> usize {
        self.meshes.iter().map(|m| m.charts.len()).sum()
    }
}

/// A chart packer.
pub trait AtlasPacker: Send {
    /// Queue a UV mesh. Malformed meshes are rejected without affecting the batch.
    fn add_uv_mesh(&mut self, mesh: &UvMeshDecl<'_>) -> Result<(), PackError>;

    /// Lay out every queued mesh. Output meshes are in the order they were
    /// accepted, with `source` set to that acceptance index.
    fn pack(&mut self, options: &PackOptions) -> PackedAtlas;

    /// Drop all queued state.
    fn release(&mut self);
}

/// Scoped use of a packer; releases it when dropped.
pub struct AtlasSession<'a> {
    packer: &'a mut dyn AtlasPacker,
    accepted: Vec<usize>,
}

impl<'a> AtlasSession<'a> {
    pub fn new(packer: &'a mut dyn AtlasPacker) -> Self {
        Self {
            packer,
            accepted: Vec::new(),
        }
    }

    /// Queue the UV mesh of caller-side surface `source`.
    pub fn add_uv_mesh(&mut self, source: usize, mesh: &UvMeshDecl<'_>) -> Result<(), PackError> {
        self.packer.add_uv_mesh(mesh)?;
        self.accepted.push(source);
        Ok(())
    }

    /// Number of meshes accepted so far.
    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    /// Pack, mapping each output mesh back to its caller-side source index.
    pub fn pack(&mut self, options: &PackOptions) -> PackedAtlas {
        let mut atlas = self.packer.pack(options);
        for mesh in &mut atlas.meshes {
            if let Some(&source) = self.accepted.get(mesh.source) {
                mesh.source = source;
            }
        }
        atlas
    }
}

impl Drop for AtlasSession<'_> {
    fn drop(&mut self) {
        self.packer.release();
    }
}
