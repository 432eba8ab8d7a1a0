//! # Scene Merge
//!
//! A Rust library for merging the textured meshes of a 3D scene into a
//! single mesh that draws from one baked texture atlas.
//!
//! ## Overview
//!
//! Every visible surface is collected from the scene tree, its material is
//! flattened into one RGBA8 texture, its UVs are unwrapped and packed into
//! charts of a shared atlas, and each packed triangle is rasterized with
//! analytic antialiasing to copy source texels into the atlas. Seams are
//! then dilated and a new mesh is built from the packed layout.
//!
//! ## Quick Start
//!
//! ```ignore
//! use scene_merge::{merge_scene, MergeConfig, ObjExport};
//!
//! // Build or load a scene
//! let scene = my_scene();
//!
//! // Merge every visible surface
//! let output = merge_scene(&scene, MergeConfig::default());
//!
//! // Inspect skipped surfaces, then export
//! for skipped in &output.report.skipped {
//!     eprintln!("{}: {}", skipped.subject, skipped.error);
//! }
//! ObjExport::from_output(&output, "merged")?.write_to("out")?;
//! ```
//!
//! ## Collaborators
//!
//! UV unwrapping, chart packing and seam dilation are traits
//! ([`UvUnwrapper`], [`AtlasPacker`], [`SeamDilator`]); plug your own into
//! [`SceneMerger`] or use the built-in implementations.

pub mod error;
pub mod types;
pub mod scene;
pub mod texture;
pub mod unwrap;
pub mod normalize;
pub mod atlas;
pub mod raster;
pub mod bake;
pub mod dilate;
pub mod reconstruct;
pub mod merge;
pub mod export;

// Re-export main types for convenience
pub use error::{MergeError, Result};
pub use types::{BoundingBox, MaterialId, MeshId, NodeId};
pub use scene::{collect_surfaces, Material, Node, Scene, SceneMesh, Surface, SurfaceRecord, Vertex};
pub use texture::{TextureCompositor, TextureData};
pub use unwrap::{ExistingUvUnwrapper, PlanarUnwrapper, UvUnwrapper};
pub use atlas::{AtlasPacker, AtlasSession, PackError, PackOptions, PackedAtlas, ShelfPacker};
pub use raster::{Sample, Triangle};
pub use bake::{AddressMode, AtlasTexel, TexelBaker, TexelLookup};
pub use dilate::{NearestDilator, SeamDilator};
pub use merge::{
    merge_scene, BakedAtlas, CancelToken, MergeConfig, MergeOutput, MergeReport, MergeStage,
    ProgressReporter, SceneMerger,
};
pub use export::obj::ObjExport;

/// Load a scene texture from a file path.
pub fn load_texture<P: AsRef<std::path::Path>>(path: P) -> Result<image::DynamicImage> {
    Ok(image::open(path)?)
}
