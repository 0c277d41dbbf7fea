//! Raster access through GDAL
//!
//! GDAL calls block until complete, so deadlines are checked between calls
//! rather than during them.

use super::{
    check_output_size, decimated_transform, window_pixel_map, RasterBackend, RasterHandle, RasterInfo,
};
use crate::bbox::BBox;
use crate::crs::CRS;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RawGrid};
use gdal::raster::ResampleAlg;
use gdal::Dataset;
use std::path::Path;

/// Opens any raster format GDAL can read.
#[derive(Debug, Clone, Default)]
pub struct GdalBackend;

impl GdalBackend {
    pub fn new() -> Self {
        Self
    }
}

impl RasterBackend for GdalBackend {
    fn name(&self) -> &'static str {
        "gdal"
    }

    fn open(&self, path: &Path, deadline: Deadline) -> Result<Box<dyn RasterHandle>> {
        deadline.check("open raster")?;
        if !path.exists() {
            return Err(Error::SourceNotFound {
                path: path.to_path_buf(),
            });
        }
        let dataset = Dataset::open(path).map_err(|_| Error::SourceNotFound {
            path: path.to_path_buf(),
        })?;
        let (width, height) = dataset.raster_size();
        let transform = dataset
            .geo_transform()
            .map(GeoTransform::from_gdal)
            .unwrap_or_default();
        let crs = dataset.spatial_ref().ok().and_then(|srs| {
            if let Ok(code) = srs.auth_code() {
                return Some(CRS::from_epsg(code as u32));
            }
            srs.to_proj4()
                .ok()
                .map(CRS::from_proj)
                .or_else(|| srs.to_wkt().ok().map(CRS::from_wkt))
        });
        let nodata = dataset.rasterband(1)?.no_data_value();
        deadline.check("open raster")?;

        let info = RasterInfo {
            path: path.to_path_buf(),
            crs,
            width,
            height,
            transform,
            nodata,
        };
        Ok(Box::new(GdalHandle { dataset, info }))
    }
}

struct GdalHandle {
    dataset: Dataset,
    info: RasterInfo,
}

impl GdalHandle {
    /// Read the native block `(col0, row0, cols, rows)` into a `bw x bh`
    /// buffer with nearest-neighbour resampling.
    fn read_block(&self, block: (usize, usize, usize, usize), bw: usize, bh: usize) -> Result<Vec<f64>> {
        let band = self.dataset.rasterband(1)?;
        let (col0, row0, cols, rows) = block;
        let buffer = band.read_as::<f64>(
            (col0 as isize, row0 as isize),
            (cols, rows),
            (bw, bh),
            Some(ResampleAlg::NearestNeighbour),
        )?;
        Ok(buffer.data().to_vec())
    }
}

impl RasterHandle for GdalHandle {
    fn info(&self) -> &RasterInfo {
        &self.info
    }

    fn read_decimated(&mut self, width: usize, height: usize, deadline: Deadline) -> Result<RawGrid> {
        check_output_size(width, height)?;
        deadline.check("read decimated")?;
        let data = self.read_block((0, 0, self.info.width, self.info.height), width, height)?;
        deadline.check("read decimated")?;
        Ok(RawGrid::from_vec(data, height, width)?
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

        let hits = pixels.iter().flatten();
        let Some((col0, row0, col1, row1)) = hits.fold(None, |acc, &(c, r)| match acc {
            None => Some((c, r, c, r)),
            Some((c0, r0, c1, r1)) => Some((c0.min(c), r0.min(r), c1.max(c), r1.max(r))),
        }) else {
            let grid = RawGrid::filled(height, width, fill);
            return Ok(grid
                .with_georef(GeoTransform::from_bounds(window, width, height), Some(window_crs.clone()))
                .with_nodata(self.info.nodata));
        };

        // Read the covered block, decimated to at most twice the output
        // resolution so memory follows the output size.
        let (cols, rows) = (col1 - col0 + 1, row1 - row0 + 1);
        let bw = cols.min(width * 2);
        let bh = rows.min(height * 2);
        let block = self.read_block((col0, row0, cols, rows), bw, bh)?;
        deadline.check("read window")?;

        let data = pixels
            .into_iter()
            .map(|p| {
                p.map_or(fill, |(c, r)| {
                    let bc = ((c - col0) * bw / cols).min(bw - 1);
                    let br = ((r - row0) * bh / rows).min(bh - 1);
                    block[br * bw + bc]
                })
            })
            .collect();
        Ok(RawGrid::from_vec(data, height, width)?
            .with_georef(GeoTransform::from_bounds(window, width, height), Some(window_crs.clone()))
            .with_nodata(self.info.nodata))
    }
}
