//! Wavefront OBJ export of a merged scene.
//!
//! Writes the merged mesh with UVs and normals, a single-material MTL file
//! and the atlas as PNG. Meant for checking merge results in any viewer.

use crate::error::{MergeError, Result};
use crate::merge::MergeOutput;
use crate::scene::Surface;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Write one surface as OBJ text referencing `{name}.mtl`.
pub fn export_obj(surface: &Surface, name: &str) -> Result<String> {
    // ~60 bytes per v/vt/vn line, ~40 per face
    let mut obj = String::with_capacity(256 + surface.vertex_count() * 180 + surface.triangle_count() * 40);

    writeln!(obj, "# Scene Merge OBJ Export")?;
    writeln!(obj, "# Vertices: {}", surface.vertex_count())?;
    writeln!(obj, "# Triangles: {}", surface.triangle_count())?;
    writeln!(obj)?;
    writeln!(obj, "mtllib {}.mtl", name)?;
    writeln!(obj, "o {}", name)?;
    writeln!(obj)?;

    for vertex in &surface.vertices {
        let p = vertex.position;
        writeln!(obj, "v {} {} {}", p[0], p[1], p[2])?;
    }
    writeln!(obj)?;

    // OBJ texture space has its origin at the bottom left.
    for vertex in &surface.vertices {
        writeln!(obj, "vt {} {}", vertex.uv[0], 1.0 - vertex.uv[1])?;
    }
    writeln!(obj)?;

    for vertex in &surface.vertices {
        let n = vertex.normal;
        writeln!(obj, "vn {} {} {}", n[0], n[1], n[2])?;
    }
    writeln!(obj)?;

    writeln!(obj, "usemtl {}_material", name)?;
    for tri in surface.indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] + 1, tri[1] + 1, tri[2] + 1];
        writeln!(obj, "f {0}/{0}/{0} {1}/{1}/{1} {2}/{2}/{2}", i0, i1, i2)?;
    }

    Ok(obj)
}

/// MTL text for the atlas material.
pub fn export_mtl(name: &str, double_sided: bool) -> Result<String> {
    let mut mtl = String::with_capacity(256);
    writeln!(mtl, "# Scene Merge Material")?;
    writeln!(mtl)?;
    writeln!(mtl, "newmtl {}_material", name)?;
    writeln!(mtl, "Ka 1.0 1.0 1.0")?;
    writeln!(mtl, "Kd 1.0 1.0 1.0")?;
    writeln!(mtl, "Ks 0.0 0.0 0.0")?;
    writeln!(mtl, "Ns 10.0")?;
    writeln!(mtl, "d 1.0")?;
    writeln!(mtl, "illum 1")?;
    if double_sided {
        writeln!(mtl, "# double-sided")?;
    }
    writeln!(mtl, "map_Kd {}_atlas.png", name)?;
    Ok(mtl)
}

/// OBJ, MTL and atlas PNG of a merge result.
pub struct ObjExport {
    pub name: String,
    pub obj: String,
    pub mtl: String,
    pub texture_png: Vec<u8>,
}

impl ObjExport {
    pub fn from_output(output: &MergeOutput, name: &str) -> Result<Self> {
        let (Some(node), Some(atlas)) = (output.merged_node, output.atlas.as_ref()) else {
            return Err(MergeError::Export(match &output.report.aborted {
                Some(error) => format!("merge produced no mesh: {}", error),
                None => "merge produced no mesh".to_string(),
            }));
        };

        let scene = &output.scene;
        let mesh_id = scene
            .node(node)
            .mesh
            .ok_or_else(|| MergeError::Export(format!("merged {} has no mesh", node)))?;
        let surface = scene
            .mesh(mesh_id)
            .surfaces
            .first()
            .ok_or_else(|| MergeError::Export("merged mesh has no surface".to_string()))?;
        let double_sided = scene.material(surface.material).double_sided;

        Ok(Self {
            name: name.to_string(),
            obj: export_obj(surface, name)?,
            mtl: export_mtl(name, double_sided)?,
            texture_png: atlas.image.to_png()?,
        })
    }

    /// Write `{name}.obj`, `{name}.mtl` and `{name}_atlas.png` into `dir`.
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let files = [
            (format!("{}.obj", self.name), self.obj.as_bytes()),
            (format!("{}.mtl", self.name), self.mtl.as_bytes()),
            (format!("{}_atlas.png", self.name), self.texture_png.as_slice()),
        ];
        let mut written = Vec::with_capacity(files.len());
        for (file, bytes) in files {
            let path = dir.join(file);
            std::fs::write(&path, bytes)?;
            log::info!("Wrote {}", path.display());
            written.push(path);
        }
        Ok(written)
    }
}
