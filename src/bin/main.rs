//! Scene Merge CLI
//!
//! Merge textured quads into one mesh with a baked atlas.

use clap::{Parser, Subcommand, ValueEnum};
use glam::{Affine3A, Vec3};
use scene_merge::merge::LogProgress;
use scene_merge::{
    AddressMode, Material, MergeConfig, ObjExport, PlanarUnwrapper, Scene, SceneMerger, SceneMesh,
    Surface, Vertex,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "scene-merge")]
#[command(author, version, about = "Merge textured meshes into one mesh with a baked atlas", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a row of unit quads, one per texture or color
    Quads {
        /// PNG texture for one quad (repeatable)
        #[arg(short, long)]
        texture: Vec<PathBuf>,

        /// Flat color for one quad as RRGGBB or RRGGBBAA (repeatable)
        #[arg(short, long, value_parser = parse_color)]
        color: Vec<[f32; 4]>,

        /// Output path without extension (writes .obj, .mtl and _atlas.png)
        #[arg(short, long)]
        output: PathBuf,

        /// JSON merge configuration
        #[arg(long)]
        config: Option<PathBuf>,

        /// Source texel addressing
        #[arg(long, value_enum)]
        address_mode: Option<AddressArg>,

        /// Maximum atlas size
        #[arg(long)]
        atlas_size: Option<u32>,

        /// Skip seam dilation
        #[arg(long)]
        no_dilate: bool,

        /// Unwrap by planar projection instead of reusing mesh UVs
        #[arg(long)]
        planar: bool,
    },

    /// Print the default merge configuration as JSON
    Config,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum AddressArg {
    /// Repeat, keeping the fractional part
    Wrap,
    /// Modulo over size - 1
    Modulo,
}

impl From<AddressArg> for AddressMode {
    fn from(arg: AddressArg) -> Self {
        match arg {
            AddressArg::Wrap => AddressMode::Wrap,
            AddressArg::Modulo => AddressMode::Modulo,
        }
    }
}

fn parse_color(s: &str) -> Result<[f32; 4], String> {
    let hex = s.trim_start_matches('#');
    if hex.len() != 6 && hex.len() != 8 {
        return Err(format!("Invalid color '{}'. Use RRGGBB or RRGGBBAA", s));
    }
    let mut color = [1.0; 4];
    for (i, channel) in color.iter_mut().enumerate().take(hex.len() / 2) {
        let byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|e| format!("Invalid color '{}': {}", s, e))?;
        *channel = byte as f32 / 255.0;
    }
    Ok(color)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Quads {
            texture,
            color,
            output,
            config,
            address_mode,
            atlas_size,
            no_dilate,
            planar,
        } => {
            let mut merge_config = match config {
                Some(path) => MergeConfig::from_path(path)?,
                None => MergeConfig::default(),
            };
            if let Some(mode) = address_mode {
                merge_config.address_mode = mode.into();
            }
            if let Some(size) = atlas_size {
                merge_config.atlas_resolution = size;
            }
            if no_dilate {
                merge_config.dilate = false;
            }
            merge_quads(&texture, &color, &output, merge_config, planar)?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&MergeConfig::default())?);
        }
    }

    Ok(())
}

fn merge_quads(
    textures: &[PathBuf],
    colors: &[[f32; 4]],
    output: &Path,
    config: MergeConfig,
    planar: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut scene = Scene::new("Root");
    let mut materials = Vec::new();

    for path in textures {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "texture".to_string());
        let image = scene_merge::load_texture(path)?;
        materials.push(scene.add_material(Material::new(name, [1.0; 4]).with_texture(image)));
    }
    for (i, color) in colors.iter().enumerate() {
        materials.push(scene.add_material(Material::new(format!("color_{}", i), *color)));
    }
    if materials.is_empty() {
        return Err("Give at least one --texture or --color".into());
    }

    let root = scene.root();
    for (i, &material) in materials.iter().enumerate() {
        let mut surface = Surface::new(material);
        let n = [0.0, 0.0, 1.0];
        surface.add_vertex(Vertex::new([0.0, 0.0, 0.0], n, [0.0, 1.0]));
        surface.add_vertex(Vertex::new([1.0, 0.0, 0.0], n, [1.0, 1.0]));
        surface.add_vertex(Vertex::new([1.0, 1.0, 0.0], n, [1.0, 0.0]));
        surface.add_vertex(Vertex::new([0.0, 1.0, 0.0], n, [0.0, 0.0]));
        surface.add_quad(0, 1, 2, 3);

        let mesh = scene.add_mesh(SceneMesh::new(format!("quad_{}", i)).with_surface(surface));
        let offset = Affine3A::from_translation(Vec3::new(i as f32 * 1.25, 0.0, 0.0));
        scene.add_mesh_instance(root, format!("quad_{}", i), offset, mesh);
    }

    let mut merger = SceneMerger::with_config(config).with_progress(Arc::new(LogProgress));
    if planar {
        merger = merger.with_unwrapper(PlanarUnwrapper);
    }
    let result = merger.merge(&scene);

    for skipped in &result.report.skipped {
        eprintln!("Skipped {}: {}", skipped.subject, skipped.error);
    }
    if let Some(error) = &result.report.aborted {
        return Err(format!("Merge aborted: {}", error).into());
    }

    let name = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "merged".to_string());
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let export = ObjExport::from_output(&result, &name)?;
    for path in export.write_to(dir)? {
        println!("Wrote {}", path.display());
    }

    println!(
        "Merged {} quads into a {}x{} atlas ({} texels baked)",
        result.report.surfaces_merged,
        result.report.atlas_width,
        result.report.atlas_height,
        result.report.texels_written
    );

    Ok(())
}
