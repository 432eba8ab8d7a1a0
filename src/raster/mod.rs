//! Analytic antialiased triangle rasterization.
//!
//! [`Triangle::draw_aa`] visits every pixel a triangle overlaps and reports the
//! exact covered fraction of the pixel, computed by clipping the pixel cell
//! against the triangle's edges, together with the attribute vector
//! interpolated at the centroid of the covered region.

mod clip;
mod triangle;

pub use clip::ClippedPolygon;
pub use triangle::{Sample, Triangle};
