//! Decimated raster grid produced by raster sources

use crate::bbox::BBox;
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::GeoTransform;
use ndarray::{Array2, ArrayView2};

/// Relative tolerance when comparing floating values to a nodata sentinel.
const NODATA_RELATIVE_TOLERANCE: f64 = 1e-9;

/// Check if `value` represents no-data.
///
/// NaN is always no-data. Otherwise the value must equal the sentinel, with a
/// small relative tolerance so that float sentinels written as decimal text
/// (GDAL_NODATA) still match the stored samples.
pub fn is_nodata(value: f64, nodata: Option<f64>) -> bool {
    if value.is_nan() {
        return true;
    }
    match nodata {
        Some(nd) if nd.is_nan() => false,
        Some(nd) => value == nd || (value - nd).abs() <= NODATA_RELATIVE_TOLERANCE * nd.abs().max(1.0),
        None => false,
    }
}

/// A 2D grid of raw raster values read at a target resolution.
///
/// Values are stored as `f64` regardless of the on-disk sample type; every
/// integer sample type up to 32 bits is represented exactly. The grid keeps
/// the georeferencing of the area it was read from and the source's nodata
/// sentinel, so it can be colorized without going back to the source.
///
/// # Example
///
/// ```ignore
/// use tessera_core::RawGrid;
///
/// let mut grid = RawGrid::new(4, 4);
/// grid.set(1, 2, 7.0)?;
/// assert_eq!(grid.get(1, 2)?, 7.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RawGrid {
    /// Values stored in row-major order (row, col)
    data: Array2<f64>,
    /// Affine transformation of the area this grid covers
    transform: GeoTransform,
    /// Coordinate reference system of `transform`
    crs: Option<CRS>,
    /// No-data sentinel inherited from the source
    nodata: Option<f64>,
}

impl RawGrid {
    /// Create a new grid filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new grid filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a grid from row-major data
    pub fn from_vec(data: Vec<f64>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self::from_array(array))
    }

    /// Create a grid from an ndarray
    pub fn from_array(data: Array2<f64>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Attach georeferencing
    pub fn with_georef(mut self, transform: GeoTransform, crs: Option<CRS>) -> Self {
        self.transform = transform;
        self.crs = crs;
        self
    }

    /// Attach a nodata sentinel
    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the grid is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<f64> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::InvalidParameter {
                name: "index",
                value: format!("({row}, {col})"),
                reason: format!("grid is {}x{}", self.rows(), self.cols()),
            })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: f64) -> Result<()> {
        let (rows, cols) = self.shape();
        match self.data.get_mut((row, col)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(Error::InvalidParameter {
                name: "index",
                value: format!("({row}, {col})"),
                reason: format!("grid is {rows}x{cols}"),
            }),
        }
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// Consume the grid and return the underlying array
    pub fn into_array(self) -> Array2<f64> {
        self.data
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    /// Bounds of the covered area in the grid's CRS
    pub fn bounds(&self) -> BBox {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Check if a value is no-data for this grid
    pub fn is_nodata(&self, value: f64) -> bool {
        is_nodata(value, self.nodata)
    }

    // Statistics

    /// Calculate basic statistics over cells that are not no-data
    pub fn statistics(&self) -> GridStatistics {
        let mut min: Option<f64> = None;
        let mut max: Option<f64> = None;
        let mut sum = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if self.is_nodata(value) || !value.is_finite() {
                continue;
            }
            min = Some(min.map_or(value, |m| m.min(value)));
            max = Some(max.map_or(value, |m| m.max(value)));
            sum += value;
            count += 1;
        }

        GridStatistics {
            min,
            max,
            mean: (count > 0).then(|| sum / count as f64),
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a grid
#[derive(Debug, Clone, PartialEq)]
pub struct GridStatistics {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_creation() {
        let grid = RawGrid::new(100, 200);
        assert_eq!(grid.rows(), 100);
        assert_eq!(grid.cols(), 200);
        assert_eq!(grid.shape(), (100, 200));
    }

    #[test]
    fn test_grid_access() {
        let mut grid = RawGrid::new(10, 10);
        grid.set(5, 5, 42.0).unwrap();
        assert_eq!(grid.get(5, 5).unwrap(), 42.0);
        assert!(grid.get(10, 0).is_err());
        assert!(grid.set(0, 10, 1.0).is_err());
    }

    #[test]
    fn from_vec_checks_length() {
        assert!(RawGrid::from_vec(vec![0.0; 5], 2, 3).is_err());
        let g = RawGrid::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3).unwrap();
        assert_eq!(g.get(1, 0).unwrap(), 4.0);
    }

    #[test]
    fn test_grid_statistics_skip_nodata() {
        let mut grid = RawGrid::new(10, 10).with_nodata(Some(255.0));
        for i in 0..10 {
            for j in 0..10 {
                grid.set(i, j, (i * 10 + j) as f64).unwrap();
            }
        }
        grid.set(9, 9, 255.0).unwrap();

        let stats = grid.statistics();
        assert_eq!(stats.min, Some(0.0));
        assert_eq!(stats.max, Some(98.0));
        assert_eq!(stats.valid_count, 99);
        assert_eq!(stats.nodata_count, 1);
    }

    #[test]
    fn nodata_matching() {
        assert!(is_nodata(f64::NAN, None));
        assert!(is_nodata(255.0, Some(255.0)));
        assert!(!is_nodata(254.0, Some(255.0)));
        assert!(!is_nodata(0.0, None));
        // f32::MIN written as decimal text by GDAL
        assert!(is_nodata(f32::MIN as f64, Some(-3.40282346638529e38)));
        assert!(!is_nodata(1.0, Some(f64::NAN)));
    }
}
