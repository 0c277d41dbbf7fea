//! Raster sources: opening rasters and memory-bounded decimated reads.
//!
//! A [`RasterBackend`] opens paths into [`RasterHandle`]s. Handles never load
//! the full-resolution raster; both read operations produce a grid of exactly
//! the requested size by nearest-neighbour sampling during I/O, so peak
//! memory is proportional to the output size.
//!
//! Backends:
//! - [`GeoTiffBackend`]: pure-Rust GeoTIFF reader (strip or tile layout)
//! - [`MemoryBackend`]: rasters held in memory, registered by path
//! - `GdalBackend`: any GDAL-readable raster (`gdal` feature)

mod cache;
mod geokeys;
mod memory;
mod native;
#[cfg(feature = "gdal")]
mod gdal_io;

pub use cache::{Chunk, ChunkCache};
pub use memory::{MemoryBackend, MemoryRaster};
pub use native::{write_geotiff, GeoTiffBackend, GeoTiffHandle, GeoTiffOptions, DEFAULT_CHUNK_CACHE_CAPACITY};
#[cfg(feature = "gdal")]
pub use gdal_io::GdalBackend;

use crate::bbox::BBox;
use crate::crs::{self, Reprojector, CRS};
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RawGrid};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Geospatial metadata of an opened raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    pub path: PathBuf,
    /// Native coordinate reference system, if the file declares one
    pub crs: Option<CRS>,
    /// Native width in pixels
    pub width: usize,
    /// Native height in pixels
    pub height: usize,
    pub transform: GeoTransform,
    pub nodata: Option<f64>,
}

impl RasterInfo {
    /// Native bounding box in the native CRS
    pub fn bounds(&self) -> BBox {
        self.transform.bounds(self.width, self.height)
    }

    /// Value used for output pixels with no source pixel behind them.
    pub fn fill_value(&self) -> f64 {
        self.nodata.unwrap_or(f64::NAN)
    }

    /// Native CRS, or a reprojection error naming the file.
    pub fn require_crs(&self) -> Result<&CRS> {
        self.crs.as_ref().ok_or_else(|| {
            Error::Reprojection(format!("{} declares no coordinate reference system", self.path.display()))
        })
    }
}

/// Opens raster files. One backend is chosen at construction time and
/// injected wherever rasters are read.
pub trait RasterBackend {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Open a raster, failing with [`Error::SourceNotFound`] if the path is
    /// missing or unreadable.
    fn open(&self, path: &Path, deadline: Deadline) -> Result<Box<dyn RasterHandle>>;

    /// Reproject a bbox in `crs` into WGS84 longitude/latitude.
    fn reproject_bounds(&self, crs: &CRS, bbox: &BBox, deadline: Deadline) -> Result<BBox> {
        deadline.check("reproject bounds")?;
        crs::reproject_bounds(crs, bbox)
    }
}

/// An open raster. Released when dropped.
pub trait RasterHandle {
    fn info(&self) -> &RasterInfo;

    /// Read the whole raster decimated to exactly `width x height`.
    fn read_decimated(&mut self, width: usize, height: usize, deadline: Deadline) -> Result<RawGrid>;

    /// Read the area `window` (expressed in `window_crs`) into a
    /// `width x height` grid. Output pixels falling outside the raster carry
    /// [`RasterInfo::fill_value`].
    fn read_window(
        &mut self,
        window: &BBox,
        window_crs: &CRS,
        width: usize,
        height: usize,
        deadline: Deadline,
    ) -> Result<RawGrid>;
}

/// Source index sampled for each of `dst` output positions over `src` inputs.
///
/// Output position `j` takes the source cell under its centre, which matches
/// nearest-neighbour resampling with an `out_shape`. The result is monotone
/// non-decreasing.
pub fn decimation_indices(src: usize, dst: usize) -> Vec<usize> {
    if src == 0 {
        return Vec::new();
    }
    let scale = src as f64 / dst as f64;
    (0..dst)
        .map(|j| (((j as f64 + 0.5) * scale).floor() as usize).min(src - 1))
        .collect()
}

/// Split monotone `indices` into runs that fall in the same chunk of
/// `chunk_len` source cells. Returns `(chunk number, output range)` pairs.
pub(crate) fn chunk_runs(indices: &[usize], chunk_len: usize) -> Vec<(usize, Range<usize>)> {
    let mut runs: Vec<(usize, Range<usize>)> = Vec::new();
    for (pos, &idx) in indices.iter().enumerate() {
        let chunk = idx / chunk_len;
        match runs.last_mut() {
            Some((c, range)) if *c == chunk => range.end = pos + 1,
            _ => runs.push((chunk, pos..pos + 1)),
        }
    }
    runs
}

pub(crate) fn check_output_size(width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidDimensions { width, height });
    }
    Ok(())
}

/// Geotransform of a `width x height` decimated read of the full raster.
pub(crate) fn decimated_transform(info: &RasterInfo, width: usize, height: usize) -> GeoTransform {
    let sx = info.width as f64 / width as f64;
    let sy = info.height as f64 / height as f64;
    let t = info.transform;
    GeoTransform {
        pixel_width: t.pixel_width * sx,
        pixel_height: t.pixel_height * sy,
        row_rotation: t.row_rotation * sy,
        col_rotation: t.col_rotation * sx,
        ..t
    }
}

/// For every output pixel of a window read, the native `(col, row)` under
/// its centre, or `None` outside the raster. Row-major.
pub(crate) fn window_pixel_map(
    info: &RasterInfo,
    window: &BBox,
    window_crs: &CRS,
    width: usize,
    height: usize,
    deadline: Deadline,
) -> Result<Vec<Option<(usize, usize)>>> {
    check_output_size(width, height)?;
    let native = info.require_crs()?;
    let to_native = Reprojector::new(window_crs, native)?;
    let out = GeoTransform::from_bounds(window, width, height);

    let mut map = Vec::with_capacity(width * height);
    for row in 0..height {
        deadline.check("read window")?;
        for col in 0..width {
            let (x, y) = out.pixel_to_geo(col, row);
            let pixel = to_native
                .transform(x, y)
                .ok()
                .and_then(|(nx, ny)| info.transform.pixel_at(nx, ny, info.width, info.height));
            map.push(pixel);
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimation_picks_centres() {
        assert_eq!(decimation_indices(10, 5), vec![1, 3, 5, 7, 9]);
        assert_eq!(decimation_indices(4, 4), vec![0, 1, 2, 3]);
        assert_eq!(decimation_indices(3, 6), vec![0, 0, 1, 1, 2, 2]);
        assert!(decimation_indices(0, 3).is_empty());
    }

    #[test]
    fn decimation_stays_in_bounds() {
        for (src, dst) in [(1, 7), (7, 1), (100_003, 4096), (4096, 4096)] {
            let idx = decimation_indices(src, dst);
            assert_eq!(idx.len(), dst);
            assert!(idx.iter().all(|&i| i < src));
            assert!(idx.windows(2).all(|w| w[0] <= w[1]));
        }
    }

    #[test]
    fn runs_group_by_chunk() {
        let runs = chunk_runs(&[0, 3, 4, 7, 8, 9, 20], 4);
        assert_eq!(runs, vec![(0, 0..2), (1, 2..4), (2, 4..6), (5, 6..7)]);
    }

    #[test]
    fn decimated_transform_scales_pixels() {
        let info = RasterInfo {
            path: PathBuf::from("x.tif"),
            crs: Some(CRS::wgs84()),
            width: 1000,
            height: 500,
            transform: GeoTransform::new(70.0, 20.0, 0.01, -0.01),
            nodata: None,
        };
        let t = decimated_transform(&info, 100, 50);
        assert!((t.pixel_width - 0.1).abs() < 1e-12);
        assert!((t.pixel_height + 0.1).abs() < 1e-12);
        assert_eq!(t.bounds(100, 50), info.bounds());
    }
}
