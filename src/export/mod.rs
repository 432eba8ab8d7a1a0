//! Export of merge results.

pub mod obj;

pub use obj::{export_mtl, export_obj, ObjExport};
