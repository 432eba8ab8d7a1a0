//! Error types for scene merging.

use crate::atlas::PackError;
use thiserror::Error;

/// Result type alias using MergeError.
pub type Result<T> = std::result::Result<T, MergeError>;

/// Main error type for scene merging operations.
#[derive(Error, Debug)]
pub enum MergeError {
    /// Failed to read, decode or encode an image.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse JSON configuration.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A surface has no vertices or no triangles.
    #[error("Surface {0} has no geometry")]
    EmptySurface(usize),

    /// The atlas packer rejected a surface.
    #[error("Packer rejected surface {surface}: {source}")]
    PackRejected {
        surface: usize,
        #[source]
        source: PackError,
    },

    /// A texture uses more than 4 bytes per pixel (float formats).
    #[error("Unsupported pixel size of {bytes_per_pixel} bytes for material '{material}'")]
    UnsupportedPixelFormat {
        material: String,
        bytes_per_pixel: u8,
    },

    /// A chart references a material with no composited texture.
    #[error("No texture available for material {0}")]
    MissingTexture(u32),

    /// The scene contains no visible surfaces to merge.
    #[error("Scene contains no surfaces to merge")]
    NoSurfaces,

    /// The packer produced an atlas with zero area.
    #[error("Atlas packer produced an empty {width}x{height} atlas")]
    EmptyAtlas { width: u32, height: u32 },

    /// Two scene snapshots that must line up have different surface counts.
    #[error("Surface count mismatch: scene has {scene}, reference has {reference}")]
    SurfaceCountMismatch { scene: usize, reference: usize },

    /// A packed vertex points outside its surface's vertex range.
    #[error("Packed vertex xref {xref} out of range for surface {surface} ({vertex_count} vertices)")]
    XrefOutOfRange {
        surface: usize,
        xref: u32,
        vertex_count: usize,
    },

    /// A buffer required by a component was malformed.
    #[error("Invalid buffer: {0}")]
    InvalidBuffer(String),

    /// The host asked for the merge to stop.
    #[error("Merge cancelled")]
    Cancelled,

    /// Export failed or had nothing to export.
    #[error("Export error: {0}")]
    Export(String),

    /// Formatting into an in-memory buffer failed.
    #[error("Format error: {0}")]
    Fmt(#[from] std::fmt::Error),
}
