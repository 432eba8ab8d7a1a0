//! Scene merging: from a scene's surfaces to one mesh on one atlas texture.
//!
//! [`SceneMerger`] runs the stages of [`MergeStage`] in order. Failures of a
//! single material, surface or chart are recorded in the [`MergeReport`] and
//! the rest of the scene carries on; anything fatal leaves the input scene
//! unchanged. `merge` itself never fails.

mod config;
mod progress;

pub use config::MergeConfig;
pub use progress::{CancelToken, LogProgress, NoProgress, ProgressReporter};

use crate::atlas::{AtlasPacker, AtlasSession, PackOptions, PackedAtlas, ShelfPacker, UvMeshDecl};
use crate::bake::{TexelBaker, TexelBinding, TexelLookup};
use crate::dilate::{NearestDilator, SeamDilator};
use crate::error::{MergeError, Result};
use crate::normalize::{normalize_surface, ModelVertex, NormalizedSurface};
use crate::reconstruct::reconstruct_mesh;
use crate::scene::{collect_surfaces, Material, Scene, SceneMesh, SurfaceRecord};
use crate::texture::{fallback_texture, TextureCompositor, TextureData};
use crate::types::{MaterialId, NodeId};
use crate::unwrap::{ExistingUvUnwrapper, UvUnwrapper};
use glam::{Affine3A, Vec2};
use image::DynamicImage;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Pipeline stages, in the only order they can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MergeStage {
    Collected,
    Unwrapped,
    Packed,
    Baked,
    Dilated,
    Reconstructed,
}

impl MergeStage {
    /// The stage that follows this one.
    pub fn next(self) -> Option<MergeStage> {
        match self {
            MergeStage::Collected => Some(MergeStage::Unwrapped),
            MergeStage::Unwrapped => Some(MergeStage::Packed),
            MergeStage::Packed => Some(MergeStage::Baked),
            MergeStage::Baked => Some(MergeStage::Dilated),
            MergeStage::Dilated => Some(MergeStage::Reconstructed),
            MergeStage::Reconstructed => None,
        }
    }
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MergeStage::Collected => "collected",
            MergeStage::Unwrapped => "unwrapped",
            MergeStage::Packed => "packed",
            MergeStage::Baked => "baked",
            MergeStage::Dilated => "dilated",
            MergeStage::Reconstructed => "reconstructed",
        };
        f.write_str(name)
    }
}

/// A material, surface or chart left out of the merge.
#[derive(Debug)]
pub struct SkippedUnit {
    /// Stage that was being worked towards.
    pub stage: MergeStage,
    /// What was skipped, for humans.
    pub subject: String,
    pub error: MergeError,
}

/// What happened during a merge.
#[derive(Debug, Default)]
pub struct MergeReport {
    /// Last stage reached.
    pub stage: Option<MergeStage>,
    pub skipped: Vec<SkippedUnit>,
    /// Why the merge gave up, if it did. The output scene is then the input.
    pub aborted: Option<MergeError>,
    pub atlas_width: u32,
    pub atlas_height: u32,
    pub surfaces_merged: usize,
    pub charts_baked: usize,
    pub texels_written: usize,
    /// Triangles whose rasterization stopped part-way.
    pub triangles_aborted: usize,
}

impl MergeReport {
    fn advance(&mut self, stage: MergeStage) {
        debug_assert!(
            self.stage.map_or(stage == MergeStage::Collected, |s| s.next() == Some(stage)),
            "merge stage {:?} cannot follow {:?}",
            stage,
            self.stage
        );
        log::debug!("Merge stage: {}", stage);
        self.stage = Some(stage);
    }

    fn skip(&mut self, stage: MergeStage, subject: String, error: MergeError) {
        log::warn!("Skipping {} ({}): {}", subject, stage, error);
        self.skipped.push(SkippedUnit {
            stage,
            subject,
            error,
        });
    }

    /// Whether the merge produced a merged mesh.
    pub fn is_merged(&self) -> bool {
        self.aborted.is_none() && self.stage == Some(MergeStage::Reconstructed)
    }
}

/// The baked atlas and where each of its pixels came from.
#[derive(Debug, Clone)]
pub struct BakedAtlas {
    /// Dilated, opaque atlas image.
    pub image: TextureData,
    pub lookup: TexelLookup,
    /// Scene material of each merge-local material index used in `lookup`.
    pub materials: Vec<MaterialId>,
}

impl BakedAtlas {
    /// Scene material baked into atlas pixel (x, y).
    pub fn source_material(&self, x: u32, y: u32) -> Option<MaterialId> {
        let texel = self.lookup.get(x, y)?;
        self.materials.get(texel.material_index as usize).copied()
    }
}

/// Result of a merge.
#[derive(Debug)]
pub struct MergeOutput {
    /// The merged scene, or a copy of the input if the merge aborted.
    pub scene: Scene,
    pub report: MergeReport,
    pub atlas: Option<BakedAtlas>,
    /// Node holding the merged mesh.
    pub merged_node: Option<NodeId>,
}

struct Merged {
    scene: Scene,
    atlas: BakedAtlas,
    node: NodeId,
}

struct PreparedSurface {
    material: u32,
    normalized: NormalizedSurface,
}

/// Merge-local materials, first-seen order.
struct MaterialTable {
    ids: Vec<MaterialId>,
    materials: Vec<Material>,
    /// Local material index of every collected surface.
    per_surface: Vec<u32>,
}

/// Merges all visible surfaces of a scene into one atlas-textured mesh.
pub struct SceneMerger {
    config: MergeConfig,
    unwrapper: Box<dyn UvUnwrapper>,
    packer: Box<dyn AtlasPacker>,
    dilator: Box<dyn SeamDilator>,
    progress: Arc<dyn ProgressReporter>,
}

impl Default for SceneMerger {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneMerger {
    /// Create a merger with default configuration and built-in collaborators.
    pub fn new() -> Self {
        Self::with_config(MergeConfig::default())
    }

    pub fn with_config(config: MergeConfig) -> Self {
        Self {
            config,
            unwrapper: Box::new(ExistingUvUnwrapper),
            packer: Box::new(ShelfPacker::new()),
            dilator: Box::new(NearestDilator::new()),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_unwrapper(mut self, unwrapper: impl UvUnwrapper + 'static) -> Self {
        self.unwrapper = Box::new(unwrapper);
        self
    }

    pub fn with_packer(mut self, packer: impl AtlasPacker + 'static) -> Self {
        self.packer = Box::new(packer);
        self
    }

    pub fn with_dilator(mut self, dilator: impl SeamDilator + 'static) -> Self {
        self.dilator = Box::new(dilator);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Merge every visible surface of `scene`.
    pub fn merge(&mut self, scene: &Scene) -> MergeOutput {
        self.merge_inner(scene, None)
    }

    /// Merge `scene`, taking world transforms from `reference`, a snapshot
    /// of the same scene whose surfaces line up one to one.
    pub fn merge_with_reference(&mut self, scene: &Scene, reference: &Scene) -> MergeOutput {
        self.merge_inner(scene, Some(reference))
    }

    fn merge_inner(&mut self, scene: &Scene, reference: Option<&Scene>) -> MergeOutput {
        let mut report = MergeReport::default();
        match self.run(scene, reference, &mut report) {
            Ok(merged) => {
                log::info!(
                    "Merged {} surfaces into a {}x{} atlas ({} skipped)",
                    report.surfaces_merged,
                    report.atlas_width,
                    report.atlas_height,
                    report.skipped.len()
                );
                MergeOutput {
                    scene: merged.scene,
                    report,
                    atlas: Some(merged.atlas),
                    merged_node: Some(merged.node),
                }
            }
            Err(error) => {
                log::warn!("Merge aborted, returning the scene unchanged: {}", error);
                report.aborted = Some(error);
                MergeOutput {
                    scene: scene.clone(),
                    report,
                    atlas: None,
                    merged_node: None,
                }
            }
        }
    }

    fn run(&mut self, scene: &Scene, reference: Option<&Scene>, report: &mut MergeReport) -> Result<Merged> {
        let records = collect_surfaces(scene);
        if records.is_empty() {
            return Err(MergeError::NoSurfaces);
        }
        let worlds: Vec<Affine3A> = match reference {
            Some(reference) => {
                let reference_records = collect_surfaces(reference);
                if reference_records.len() != records.len() {
                    return Err(MergeError::SurfaceCountMismatch {
                        scene: records.len(),
                        reference: reference_records.len(),
                    });
                }
                reference_records.iter().map(|r| r.world).collect()
            }
            None => records.iter().map(|r| r.world).collect(),
        };
        report.advance(MergeStage::Collected);
        log::debug!("Collected {} surfaces", records.len());

        let table = self.gather_materials(scene, &records)?;
        let textures = self.composite_materials(&table.materials, report)?;
        let prepared = self.prepare_surfaces(scene, &records, &worlds, &table, &textures, report)?;
        report.advance(MergeStage::Unwrapped);

        let packed = self.pack(&records, &prepared, report);
        report.atlas_width = packed.width;
        report.atlas_height = packed.height;
        if packed.is_empty() {
            report.stage = Some(MergeStage::Reconstructed);
            return Err(MergeError::EmptyAtlas {
                width: packed.width,
                height: packed.height,
            });
        }
        report.surfaces_merged = packed.meshes.len();
        log::info!(
            "Packed {} surfaces, {} charts into a {}x{} atlas",
            packed.meshes.len(),
            packed.chart_count(),
            packed.width,
            packed.height
        );
        report.advance(MergeStage::Packed);

        let model_vertices: Vec<Vec<ModelVertex>> = prepared
            .into_iter()
            .map(|p| p.map(|p| p.normalized.model_vertices).unwrap_or_default())
            .collect();

        let (mut image, lookup) = self.bake(&packed, &model_vertices, &textures, report)?;
        report.advance(MergeStage::Baked);

        if self.config.dilate {
            let (width, height) = (image.width, image.height);
            self.dilator
                .dilate(&mut image.pixels, width, height, 3, 4, width as usize * 4)?;
        }
        image.make_opaque();
        report.advance(MergeStage::Dilated);

        let atlas = BakedAtlas {
            image,
            lookup,
            materials: table.ids,
        };
        let (scene, node) = rebuild_scene(scene, &records, &packed, &model_vertices, &atlas)?;
        report.advance(MergeStage::Reconstructed);

        Ok(Merged { scene, atlas, node })
    }

    /// Number the materials of the collected surfaces, substituting the flat
    /// fallback texture for untextured ones.
    fn gather_materials(&self, scene: &Scene, records: &[SurfaceRecord<'_>]) -> Result<MaterialTable> {
        let mut local: HashMap<MaterialId, u32> = HashMap::new();
        let mut table = MaterialTable {
            ids: Vec::new(),
            materials: Vec::new(),
            per_surface: Vec::with_capacity(records.len()),
        };

        for record in records {
            let id = record.surface.material;
            let index = match local.get(&id) {
                Some(&index) => index,
                None => {
                    if table.materials.len() > u16::MAX as usize {
                        return Err(MergeError::InvalidBuffer(format!(
                            "more than {} materials in one merge",
                            u16::MAX as usize + 1
                        )));
                    }
                    let mut material = scene
                        .materials()
                        .get(id.index())
                        .cloned()
                        .ok_or_else(|| MergeError::InvalidBuffer(format!("unknown {}", id)))?;
                    if !material.has_texture() {
                        let side = self.config.default_texture_length;
                        material.albedo_texture = Some(fallback_texture(&material, side));
                        material.albedo = [1.0; 4];
                    }

                    let index = table.materials.len() as u32;
                    table.ids.push(id);
                    table.materials.push(material);
                    local.insert(id, index);
                    index
                }
            };
            table.per_surface.push(index);
        }

        Ok(table)
    }

    fn composite_materials(
        &self,
        materials: &[Material],
        report: &mut MergeReport,
    ) -> Result<Vec<Option<TextureData>>> {
        let compositor = TextureCompositor::new(self.config.default_texture_length);
        let progress: &dyn ProgressReporter = &*self.progress;
        progress.begin("composite", materials.len());

        let composite = |material: &Material| -> Result<TextureData> {
            if progress.is_cancelled() {
                return Err(MergeError::Cancelled);
            }
            compositor.composite(material)
        };
        let results: Vec<Result<TextureData>> = if self.config.parallel {
            materials.par_iter().map(composite).collect()
        } else {
            materials.iter().map(composite).collect()
        };

        let mut textures = Vec::with_capacity(results.len());
        for (index, (material, result)) in materials.iter().zip(results).enumerate() {
            match result {
                Ok(texture) => textures.push(Some(texture)),
                Err(MergeError::Cancelled) => return Err(MergeError::Cancelled),
                Err(error) => {
                    report.skip(MergeStage::Unwrapped, format!("material '{}'", material.name), error);
                    textures.push(None);
                }
            }
            progress.step("composite", index + 1);
        }
        Ok(textures)
    }

    fn prepare_surfaces(
        &self,
        scene: &Scene,
        records: &[SurfaceRecord<'_>],
        worlds: &[Affine3A],
        table: &MaterialTable,
        textures: &[Option<TextureData>],
        report: &mut MergeReport,
    ) -> Result<Vec<Option<PreparedSurface>>> {
        let fallback_side = self.config.default_texture_length;
        let mut prepared = Vec::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            let subject = || format!("surface {} of '{}'", record.surface_index, scene.node(record.node).name);
            if record.surface.is_empty() {
                report.skip(MergeStage::Unwrapped, subject(), MergeError::EmptySurface(index));
                prepared.push(None);
                continue;
            }

            let material = table.per_surface[index];
            let size = textures[material as usize]
                .as_ref()
                .map_or((fallback_side, fallback_side), |t| (t.width, t.height));

            let unwrapped = match self.unwrapper.unwrap(record.surface, self.config.texel_density) {
                Ok(uvs) => uvs,
                Err(error) => {
                    report.skip(MergeStage::Unwrapped, subject(), error);
                    prepared.push(None);
                    continue;
                }
            };
            let normalized = normalize_surface(record.surface, worlds[index], &unwrapped, size)?;
            prepared.push(Some(PreparedSurface {
                material,
                normalized,
            }));
        }

        Ok(prepared)
    }

    fn pack(
        &mut self,
        records: &[SurfaceRecord<'_>],
        prepared: &[Option<PreparedSurface>],
        report: &mut MergeReport,
    ) -> PackedAtlas {
        let options = PackOptions {
            padding: self.config.atlas_padding,
            resolution: self.config.atlas_resolution,
            texel_scale: 1.0,
        };

        let mut session = AtlasSession::new(self.packer.as_mut());
        for (index, entry) in prepared.iter().enumerate() {
            let Some(entry) = entry else {
                continue;
            };
            let indices = &records[index].surface.indices;
            let face_materials = vec![entry.material; indices.len() / 3];
            let decl = UvMeshDecl {
                vertex_uvs: &entry.normalized.packer_uvs,
                indices,
                face_materials: &face_materials,
            };
            if let Err(source) = session.add_uv_mesh(index, &decl) {
                report.skip(
                    MergeStage::Packed,
                    format!("surface {}", index),
                    MergeError::PackRejected {
                        surface: index,
                        source,
                    },
                );
            }
        }
        session.pack(&options)
    }

    fn bake(
        &self,
        packed: &PackedAtlas,
        model_vertices: &[Vec<ModelVertex>],
        textures: &[Option<TextureData>],
        report: &mut MergeReport,
    ) -> Result<(TextureData, TexelLookup)> {
        let mut image = TextureData::empty(packed.width, packed.height);
        let mut lookup = TexelLookup::new(packed.width, packed.height);
        let mut baker = TexelBaker::new(&mut image, &mut lookup, self.config.address_mode);
        self.progress.begin("bake", packed.chart_count());

        let mut step = 0;
        for mesh in &packed.meshes {
            let models = model_vertices.get(mesh.source).map(Vec::as_slice).unwrap_or(&[]);

            for chart in &mesh.charts {
                if self.progress.is_cancelled() {
                    return Err(MergeError::Cancelled);
                }
                step += 1;

                // Charts without a composited texture never reach the rasterizer.
                let Some(texture) = textures.get(chart.material as usize).and_then(Option::as_ref) else {
                    report.skip(
                        MergeStage::Baked,
                        format!("chart of surface {}", mesh.source),
                        MergeError::MissingTexture(chart.material),
                    );
                    continue;
                };

                for &face in &chart.faces {
                    let corners = mesh.face(face).ok_or_else(|| {
                        MergeError::InvalidBuffer(format!("face {} out of range in surface {}", face, mesh.source))
                    })?;
                    let mut source_uvs = [Vec2::ZERO; 3];
                    for (uv, corner) in source_uvs.iter_mut().zip(&corners) {
                        let model = models.get(corner.xref as usize).ok_or_else(|| MergeError::XrefOutOfRange {
                            surface: mesh.source,
                            xref: corner.xref,
                            vertex_count: models.len(),
                        })?;
                        *uv = model.uv;
                    }

                    let binding = TexelBinding {
                        texture: Some(texture),
                        material_index: chart.material as u16,
                        source_uvs,
                    };
                    if !baker.bake_triangle(&binding, corners.map(|c| Vec2::from(c.uv))) {
                        report.triangles_aborted += 1;
                    }
                }

                report.charts_baked += 1;
                self.progress.step("bake", step);
            }
        }

        report.texels_written = baker.texels_written();
        Ok((image, lookup))
    }
}

/// Copy `scene`, strip the merged meshes from their nodes and hang the merged
/// mesh under the root.
fn rebuild_scene(
    scene: &Scene,
    records: &[SurfaceRecord<'_>],
    packed: &PackedAtlas,
    model_vertices: &[Vec<ModelVertex>],
    atlas: &BakedAtlas,
) -> Result<(Scene, NodeId)> {
    let mut merged = scene.clone();

    let texture = DynamicImage::ImageRgba8(atlas.image.clone().into_image()?);
    let mut material = Material::new("Atlas", [1.0; 4]).with_texture(texture);
    material.double_sided = true;
    let material = merged.add_material(material);

    let surface = reconstruct_mesh(packed, model_vertices, material)?;
    if let Some(bounds) = surface.bounds() {
        log::debug!("Merged mesh spans {:?}", bounds.dimensions());
    }

    for record in records {
        merged.node_mut(record.node).mesh = None;
    }

    let root = merged.root();
    let root_name = merged.node(root).name.clone();
    // Vertices are in world space; cancel the root transform.
    let transform = merged.node(root).transform.inverse();
    let mesh = merged.add_mesh(SceneMesh::new(root_name.clone()).with_surface(surface));
    let node = merged.add_mesh_instance(root, root_name, transform, mesh);

    Ok((merged, node))
}

/// Merge `scene` with the built-in collaborators.
pub fn merge_scene(scene: &Scene, config: MergeConfig) -> MergeOutput {
    SceneMerger::with_config(config).merge(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{Chart, PackError, PackedMesh, PackedVertex};
    use crate::scene::{Surface, Vertex};
    use glam::Vec3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    fn unit_quad(material: MaterialId) -> Surface {
        let mut surface = Surface::new(material);
        let n = [0.0, 0.0, 1.0];
        surface.add_vertex(Vertex::new([0.0, 0.0, 0.0], n, [0.0, 0.0]));
        surface.add_vertex(Vertex::new([1.0, 0.0, 0.0], n, [1.0, 0.0]));
        surface.add_vertex(Vertex::new([1.0, 1.0, 0.0], n, [1.0, 1.0]));
        surface.add_vertex(Vertex::new([0.0, 1.0, 0.0], n, [0.0, 1.0]));
        surface.add_quad(0, 1, 2, 3);
        surface
    }

    /// Root with two quad nodes, "A" (red) and "B" (blue, moved +2 in x).
    fn two_quad_scene() -> (Scene, MaterialId, MaterialId) {
        let mut scene = Scene::new("Root");
        let red = scene.add_material(Material::new("red", [1.0, 0.0, 0.0, 1.0]));
        let blue = scene.add_material(Material::new("blue", [0.0, 0.0, 1.0, 1.0]));
        let a = scene.add_mesh(SceneMesh::new("a").with_surface(unit_quad(red)));
        let b = scene.add_mesh(SceneMesh::new("b").with_surface(unit_quad(blue)));
        let root = scene.root();
        scene.add_mesh_instance(root, "A", Affine3A::IDENTITY, a);
        scene.add_mesh_instance(root, "B", Affine3A::from_translation(Vec3::new(2.0, 0.0, 0.0)), b);
        (scene, red, blue)
    }

    fn small_config() -> MergeConfig {
        MergeConfig::default()
            .with_default_texture_length(8)
            .with_atlas_padding(2)
            .with_atlas_resolution(256)
    }

    /// Lays mesh k out over the x range [32k, 32k + 32] of a 64x64 atlas.
    struct HalvesPacker {
        meshes: Vec<(Vec<[f32; 2]>, Vec<u32>, u32)>,
        released: Arc<AtomicUsize>,
    }

    impl HalvesPacker {
        fn new(released: Arc<AtomicUsize>) -> Self {
            Self {
                meshes: Vec::new(),
                released,
            }
        }
    }

    impl AtlasPacker for HalvesPacker {
        fn add_uv_mesh(&mut self, mesh: &UvMeshDecl<'_>) -> std::result::Result<(), PackError> {
            mesh.validate()?;
            self.meshes.push((
                mesh.vertex_uvs.to_vec(),
                mesh.indices.to_vec(),
                mesh.face_materials[0],
            ));
            Ok(())
        }

        fn pack(&mut self, _options: &PackOptions) -> PackedAtlas {
            let meshes = self
                .meshes
                .iter()
                .enumerate()
                .map(|(k, (uvs, indices, material))| {
                    let max = uvs
                        .iter()
                        .fold([f32::MIN; 2], |m, uv| [m[0].max(uv[0]), m[1].max(uv[1])]);
                    PackedMesh {
                        source: k,
                        vertices: uvs
                            .iter()
                            .enumerate()
                            .map(|(i, uv)| PackedVertex {
                                uv: [32.0 * k as f32 + uv[0] / max[0] * 32.0, uv[1] / max[1] * 64.0],
                                xref: i as u32,
                                chart: 0,
                            })
                            .collect(),
                        indices: indices.clone(),
                        charts: vec![Chart {
                            material: *material,
                            faces: (0..indices.len() as u32 / 3).collect(),
                        }],
                    }
                })
                .collect();
            PackedAtlas {
                width: 64,
                height: 64,
                meshes,
            }
        }

        fn release(&mut self) {
            self.meshes.clear();
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Always produces a 0x0 atlas.
    struct ZeroPacker {
        released: Arc<AtomicUsize>,
    }

    impl AtlasPacker for ZeroPacker {
        fn add_uv_mesh(&mut self, mesh: &UvMeshDecl<'_>) -> std::result::Result<(), PackError> {
            mesh.validate()
        }

        fn pack(&mut self, _options: &PackOptions) -> PackedAtlas {
            PackedAtlas::default()
        }

        fn release(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_two_surfaces_red_blue_halves() {
        let (scene, red, blue) = two_quad_scene();
        let released = Arc::new(AtomicUsize::new(0));
        let mut merger = SceneMerger::with_config(small_config().with_parallel(false))
            .with_packer(HalvesPacker::new(released.clone()));

        let output = merger.merge(&scene);
        assert!(output.report.is_merged(), "{:?}", output.report.aborted);
        assert!(output.report.skipped.is_empty());
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(output.report.surfaces_merged, 2);
        assert_eq!(output.report.charts_baked, 2);
        assert_eq!(output.report.triangles_aborted, 0);

        let atlas = output.atlas.as_ref().unwrap();
        assert_eq!((atlas.image.width, atlas.image.height), (64, 64));
        for y in 0..64 {
            for x in 0..64 {
                let expected = if x < 32 { RED } else { BLUE };
                assert_eq!(atlas.image.get_pixel(x, y), expected, "pixel ({}, {})", x, y);
            }
        }
        assert_eq!(atlas.lookup.filled_count(), 64 * 64);
        assert_eq!(atlas.lookup.get(10, 40).unwrap().material_index, 0);
        assert_eq!(atlas.source_material(10, 40), Some(red));
        assert_eq!(atlas.source_material(31, 0), Some(red));
        assert_eq!(atlas.source_material(32, 63), Some(blue));
    }

    #[test]
    fn test_merged_scene_shape() {
        let (scene, _, _) = two_quad_scene();
        let released = Arc::new(AtomicUsize::new(0));
        let mut merger = SceneMerger::with_config(small_config()).with_packer(HalvesPacker::new(released));
        let output = merger.merge(&scene);

        let merged = &output.scene;
        let node_id = output.merged_node.unwrap();
        let node = merged.node(node_id);
        assert_eq!(node.name, "Root");
        assert_eq!(node.parent, Some(merged.root()));

        let mesh = merged.mesh(node.mesh.unwrap());
        assert_eq!(mesh.surfaces.len(), 1);
        let surface = &mesh.surfaces[0];
        assert_eq!(surface.vertex_count(), 8);
        assert_eq!(surface.triangle_count(), 4);
        // B's vertices carry its world translation.
        assert!(surface.vertices[4..].iter().all(|v| v.position[0] >= 2.0));
        assert_eq!(surface.vertices[5].uv, [1.0, 0.0]);

        let material = merged.material(surface.material);
        assert_eq!(material.name, "Atlas");
        assert!(material.double_sided);
        assert!(material.has_texture());

        for name in ["A", "B"] {
            let id = merged.find_node(name).unwrap();
            assert!(merged.node(id).mesh.is_none());
            assert_eq!(merged.node(id).name, name);
            assert!(scene.node(scene.find_node(name).unwrap()).mesh.is_some());
        }
    }

    #[test]
    fn test_root_transform_cancelled() {
        let (mut scene, _, _) = two_quad_scene();
        let root = scene.root();
        scene.node_mut(root).transform = Affine3A::from_translation(Vec3::new(0.0, 5.0, 0.0));

        let output = merge_scene(&scene, small_config());
        assert!(output.report.is_merged());
        let merged = &output.scene;
        let node = output.merged_node.unwrap();
        let world = merged.world_transform(node);
        let mesh = merged.mesh(merged.node(node).mesh.unwrap());
        let p = world.transform_point3(Vec3::from(mesh.surfaces[0].vertices[0].position));
        assert!((p - Vec3::new(0.0, 5.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_shelf_pack_with_dilation_fills_atlas() {
        let mut scene = Scene::new("Root");
        let red = scene.add_material(Material::new("red", [1.0, 0.0, 0.0, 1.0]));
        let mesh = scene.add_mesh(SceneMesh::new("quad").with_surface(unit_quad(red)));
        let root = scene.root();
        scene.add_mesh_instance(root, "quad", Affine3A::IDENTITY, mesh);

        let output = merge_scene(&scene, small_config());
        assert!(output.report.is_merged());
        let atlas = output.atlas.unwrap();
        assert_eq!((atlas.image.width, atlas.image.height), (64, 64));
        assert!(atlas.image.pixels.chunks(4).all(|p| p == RED));
        // Padding was dilated, not baked.
        assert!(atlas.lookup.get(0, 0).is_none());
        assert_eq!(atlas.lookup.filled_count(), 8 * 8);

        let undilated = merge_scene(&scene, small_config().with_dilate(false));
        let atlas = undilated.atlas.unwrap();
        assert_eq!(atlas.image.get_pixel(0, 0), [0, 0, 0, 255]);
        assert_eq!(atlas.image.get_pixel(5, 5), RED);
    }

    #[test]
    fn test_zero_atlas_short_circuits() {
        let (scene, _, _) = two_quad_scene();
        let released = Arc::new(AtomicUsize::new(0));
        let mut merger = SceneMerger::with_config(small_config()).with_packer(ZeroPacker {
            released: released.clone(),
        });

        let output = merger.merge(&scene);
        assert!(matches!(
            output.report.aborted,
            Some(MergeError::EmptyAtlas { width: 0, height: 0 })
        ));
        assert_eq!(output.report.stage, Some(MergeStage::Reconstructed));
        assert_eq!(output.report.charts_baked, 0);
        assert!(output.atlas.is_none());
        assert!(output.merged_node.is_none());
        assert_eq!(released.load(Ordering::SeqCst), 1);

        let a = output.scene.find_node("A").unwrap();
        assert!(output.scene.node(a).mesh.is_some());
        assert_eq!(output.scene.nodes().len(), scene.nodes().len());
    }

    #[test]
    fn test_packer_rejection_skips_surface() {
        let (mut scene, red, _) = two_quad_scene();
        let mut bad = Surface::new(red);
        bad.add_vertex(Vertex::default());
        bad.add_vertex(Vertex::default());
        bad.add_vertex(Vertex::default());
        bad.add_triangle(0, 1, 5);
        let mesh = scene.add_mesh(SceneMesh::new("bad").with_surface(bad));
        let root = scene.root();
        scene.add_mesh_instance(root, "Bad", Affine3A::IDENTITY, mesh);

        let output = merge_scene(&scene, small_config());
        assert!(output.report.is_merged());
        assert_eq!(output.report.skipped.len(), 1);
        let skipped = &output.report.skipped[0];
        assert_eq!(skipped.stage, MergeStage::Packed);
        assert!(matches!(
            skipped.error,
            MergeError::PackRejected {
                surface: 2,
                source: PackError::IndexOutOfRange { index: 5, vertex_count: 3 }
            }
        ));
        assert_eq!(output.report.surfaces_merged, 2);

        // Every collected node loses its mesh, skipped surfaces included.
        let bad_node = output.scene.find_node("Bad").unwrap();
        assert_eq!(output.scene.node(bad_node).mesh, None);
    }

    #[test]
    fn test_empty_surface_skipped() {
        let (mut scene, red, _) = two_quad_scene();
        let mesh = scene.add_mesh(SceneMesh::new("empty").with_surface(Surface::new(red)));
        let root = scene.root();
        scene.add_mesh_instance(root, "Empty", Affine3A::IDENTITY, mesh);

        let output = merge_scene(&scene, small_config());
        assert!(output.report.is_merged());
        assert_eq!(output.report.skipped.len(), 1);
        assert!(matches!(output.report.skipped[0].error, MergeError::EmptySurface(2)));
        assert_eq!(output.report.surfaces_merged, 2);
    }

    #[test]
    fn test_unsupported_texture_skips_material_and_charts() {
        let (mut scene, _, _) = two_quad_scene();
        let float = scene.add_material(
            Material::new("hdr", [1.0; 4]).with_texture(DynamicImage::new_rgba32f(4, 4)),
        );
        let mesh = scene.add_mesh(SceneMesh::new("hdr").with_surface(unit_quad(float)));
        let root = scene.root();
        scene.add_mesh_instance(root, "Hdr", Affine3A::IDENTITY, mesh);

        let output = merge_scene(&scene, small_config());
        assert!(output.report.is_merged());
        let errors: Vec<_> = output.report.skipped.iter().map(|s| &s.error).collect();
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            errors[0],
            MergeError::UnsupportedPixelFormat { bytes_per_pixel: 16, .. }
        ));
        assert!(matches!(errors[1], MergeError::MissingTexture(2)));
        assert_eq!(output.report.charts_baked, 2);

        let atlas = output.atlas.unwrap();
        for y in 0..atlas.lookup.height() {
            for x in 0..atlas.lookup.width() {
                if let Some(texel) = atlas.lookup.get(x, y) {
                    assert!(texel.material_index < 2);
                }
            }
        }
    }

    #[test]
    fn test_cancelled_merge_returns_input() {
        let (scene, _, _) = two_quad_scene();
        let token = CancelToken::new();
        token.cancel();
        let mut merger = SceneMerger::with_config(small_config()).with_progress(Arc::new(token));

        let output = merger.merge(&scene);
        assert!(matches!(output.report.aborted, Some(MergeError::Cancelled)));
        assert_eq!(output.report.stage, Some(MergeStage::Collected));
        assert!(output.atlas.is_none());
        let a = output.scene.find_node("A").unwrap();
        assert!(output.scene.node(a).mesh.is_some());
    }

    #[test]
    fn test_no_surfaces() {
        let scene = Scene::new("Root");
        let output = merge_scene(&scene, MergeConfig::default());
        assert!(matches!(output.report.aborted, Some(MergeError::NoSurfaces)));
        assert_eq!(output.report.stage, None);
        assert_eq!(output.scene.nodes().len(), 1);
    }

    #[test]
    fn test_invisible_nodes_not_merged() {
        let (mut scene, _, _) = two_quad_scene();
        let b = scene.find_node("B").unwrap();
        scene.node_mut(b).visible = false;

        let output = merge_scene(&scene, small_config());
        assert!(output.report.is_merged());
        assert_eq!(output.report.surfaces_merged, 1);
        let b = output.scene.find_node("B").unwrap();
        assert!(output.scene.node(b).mesh.is_some());
    }

    #[test]
    fn test_reference_transforms() {
        let (scene, _, _) = two_quad_scene();
        let mut reference = scene.clone();
        let a = reference.find_node("A").unwrap();
        reference.node_mut(a).transform = Affine3A::from_translation(Vec3::new(10.0, 0.0, 0.0));

        let mut merger = SceneMerger::with_config(small_config());
        let output = merger.merge_with_reference(&scene, &reference);
        assert!(output.report.is_merged());
        let merged = &output.scene;
        let mesh = merged.mesh(merged.node(output.merged_node.unwrap()).mesh.unwrap());
        assert!(mesh.surfaces[0].vertices[..4].iter().all(|v| v.position[0] >= 10.0));
    }

    #[test]
    fn test_reference_count_mismatch() {
        let (scene, red, _) = two_quad_scene();
        let mut reference = Scene::new("Root");
        let mesh = reference.add_mesh(SceneMesh::new("a").with_surface(unit_quad(red)));
        let root = reference.root();
        reference.add_mesh_instance(root, "A", Affine3A::IDENTITY, mesh);

        let output = SceneMerger::new().merge_with_reference(&scene, &reference);
        assert!(matches!(
            output.report.aborted,
            Some(MergeError::SurfaceCountMismatch { scene: 2, reference: 1 })
        ));
    }

    #[test]
    fn test_shared_material_composited_once() {
        let mut scene = Scene::new("Root");
        let red = scene.add_material(Material::new("red", [1.0, 0.0, 0.0, 1.0]));
        let mesh = scene.add_mesh(
            SceneMesh::new("pair")
                .with_surface(unit_quad(red))
                .with_surface(unit_quad(red)),
        );
        let root = scene.root();
        scene.add_mesh_instance(root, "pair", Affine3A::IDENTITY, mesh);

        let output = merge_scene(&scene, small_config());
        assert!(output.report.is_merged());
        let atlas = output.atlas.unwrap();
        assert_eq!(atlas.materials, vec![red]);
    }
}
