//! In-memory rasters, addressed by path like files on disk.

use super::{
    check_output_size, decimated_transform, decimation_indices, window_pixel_map, RasterBackend,
    RasterHandle, RasterInfo,
};
use crate::bbox::BBox;
use crate::crs::CRS;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RawGrid};
use ndarray::Array2;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A georeferenced single-band raster held in memory.
#[derive(Debug, Clone)]
pub struct MemoryRaster {
    pub data: Array2<f64>,
    pub transform: GeoTransform,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
}

impl MemoryRaster {
    pub fn new(data: Array2<f64>, transform: GeoTransform, crs: Option<CRS>) -> Self {
        Self {
            data,
            transform,
            crs,
            nodata: None,
        }
    }

    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.nodata = Some(nodata);
        self
    }

    /// Raster covering `bounds` exactly with `data`'s shape.
    pub fn from_bounds(data: Array2<f64>, bounds: &BBox, crs: CRS) -> Self {
        let (rows, cols) = data.dim();
        Self::new(data, GeoTransform::from_bounds(bounds, cols, rows), Some(crs))
    }
}

/// Backend serving registered [`MemoryRaster`]s.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    rasters: HashMap<PathBuf, Arc<MemoryRaster>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `raster` openable at `path`.
    pub fn insert(&mut self, path: impl Into<PathBuf>, raster: MemoryRaster) {
        self.rasters.insert(path.into(), Arc::new(raster));
    }

    pub fn with_raster(mut self, path: impl Into<PathBuf>, raster: MemoryRaster) -> Self {
        self.insert(path, raster);
        self
    }
}

impl RasterBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(&self, path: &Path, deadline: Deadline) -> Result<Box<dyn RasterHandle>> {
        deadline.check("open raster")?;
        let raster = self.rasters.get(path).cloned().ok_or_else(|| Error::SourceNotFound {
            path: path.to_path_buf(),
        })?;
        let (height, width) = raster.data.dim();
        let info = RasterInfo {
            path: path.to_path_buf(),
            crs: raster.crs.clone(),
            width,
            height,
            transform: raster.transform,
            nodata: raster.nodata,
        };
        Ok(Box::new(MemoryHandle { raster, info }))
    }
}

struct MemoryHandle {
    raster: Arc<MemoryRaster>,
    info: RasterInfo,
}

impl RasterHandle for MemoryHandle {
    fn info(&self) -> &RasterInfo {
        &self.info
    }

    fn read_decimated(&mut self, width: usize, height: usize, deadline: Deadline) -> Result<RawGrid> {
        check_output_size(width, height)?;
        deadline.check("read decimated")?;
        let rows = decimation_indices(self.info.height, height);
        let cols = decimation_indices(self.info.width, width);
        let data = Array2::from_shape_fn((height, width), |(i, j)| self.raster.data[[rows[i], cols[j]]]);
        Ok(RawGrid::from_array(data)
            .with_georef(decimated_transform(&self.info, width, height), self.info.crs.clone())
            .with_nodata(self.info.nodata))
    }

    fn read_window(
        &mut self,
        window: &BBox,
        window_crs: &CRS,
        width: usize,
        height: usize,
        deadline: Deadline,
    ) -> Result<RawGrid> {
        let pixels = window_pixel_map(&self.info, window, window_crs, width, height, deadline)?;
        let fill = self.info.fill_value();
        let data = pixels
            .into_iter()
            .map(|p| p.map_or(fill, |(col, row)| self.raster.data[[row, col]]))
            .collect();
        Ok(RawGrid::from_vec(data, height, width)?
            .with_georef(GeoTransform::from_bounds(window, width, height), Some(window_crs.clone()))
            .with_nodata(self.info.nodata))
    }
}
