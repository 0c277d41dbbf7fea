//! Raster grids and georeferencing

mod geotransform;
mod grid;

pub use geotransform::GeoTransform;
pub use grid::{is_nodata, GridStatistics, RawGrid};
