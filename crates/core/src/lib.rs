//! # Tessera Core
//!
//! Raster access, coordinate handling and tile math for the tessera
//! raster-to-web-map engine.
//!
//! This crate provides:
//! - `RawGrid`: georeferenced 2D grid of raster values
//! - `GeoTransform` and `BBox`: affine georeferencing and extents
//! - `CRS` and `Reprojector`: coordinate reference systems via proj4rs
//! - `RasterBackend` / `RasterHandle`: memory-bounded raster reads
//! - `TileCoord` / `TileRange`: XYZ slippy-map tile addressing
//! - `Deadline`: cooperative per-operation time limits

pub mod bbox;
pub mod crs;
pub mod deadline;
pub mod error;
pub mod io;
pub mod raster;
pub mod tile;

pub use bbox::BBox;
pub use crs::{reproject_bounds, Reprojector, CRS};
pub use deadline::Deadline;
pub use error::{Error, Result};
pub use io::{GeoTiffBackend, MemoryBackend, MemoryRaster, RasterBackend, RasterHandle, RasterInfo};
pub use raster::{GeoTransform, GridStatistics, RawGrid};
pub use tile::{TileCoord, TileRange};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bbox::BBox;
    pub use crate::crs::CRS;
    pub use crate::deadline::Deadline;
    pub use crate::error::{Error, Result};
    pub use crate::io::{RasterBackend, RasterHandle, RasterInfo};
    pub use crate::raster::{GeoTransform, RawGrid};
    pub use crate::tile::{TileCoord, TileRange};
}
