//! Spherical Web Mercator slippy-map tile math.
//!
//! Tiles are addressed by `(zoom, x, y)` with `x` growing east from the
//! antimeridian and `y` growing south from the northern Mercator limit.
//! Bounding boxes crossing the antimeridian and latitudes beyond
//! [`MAX_LATITUDE`] are outside the contract of these functions.

use crate::bbox::BBox;
use std::f64::consts::PI;

/// Edge length of a rendered tile in pixels.
pub const TILE_SIZE: u32 = 256;

/// Northern limit of the Web Mercator square, in degrees.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;

/// Half the side of the Web Mercator square, in metres (EPSG:3857).
pub const MERCATOR_HALF_EXTENT: f64 = 20_037_508.342_789_244;

/// Tile address within one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Geographic bounds of this tile.
    pub fn bounds(&self) -> BBox {
        tile_bounds(self.zoom, self.x, self.y)
    }
}

/// Inclusive rectangle of tiles at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl TileRange {
    /// Number of tiles in the range.
    pub fn count(&self) -> u64 {
        (self.x_max - self.x_min + 1) as u64 * (self.y_max - self.y_min + 1) as u64
    }

    /// Tiles in column-major order (x outer, y inner), matching the
    /// `{z}/{x}/{y}` directory layout.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (self.x_min..=self.x_max)
            .flat_map(move |x| (self.y_min..=self.y_max).map(move |y| TileCoord::new(self.zoom, x, y)))
    }

    pub fn contains(&self, tile: &TileCoord) -> bool {
        tile.zoom == self.zoom
            && (self.x_min..=self.x_max).contains(&tile.x)
            && (self.y_min..=self.y_max).contains(&tile.y)
    }
}

/// Number of tiles along each axis at `zoom`.
#[inline]
pub fn tiles_per_axis(zoom: u8) -> u64 {
    1u64 << zoom
}

/// Fractional tile column of a longitude.
#[inline]
fn tile_x(lon: f64, n: f64) -> f64 {
    (lon + 180.0) / 360.0 * n
}

/// Fractional tile row of a latitude.
#[inline]
fn tile_y(lat: f64, n: f64) -> f64 {
    (1.0 - lat.to_radians().tan().asinh() / PI) / 2.0 * n
}

#[inline]
fn clamp_index(v: f64, n: u64) -> u32 {
    let max = (n - 1) as f64;
    if v.is_nan() {
        return 0;
    }
    v.floor().clamp(0.0, max) as u32
}

/// Tile containing the point `(lon, lat)`.
pub fn tile_containing(zoom: u8, lon: f64, lat: f64) -> TileCoord {
    let n = tiles_per_axis(zoom);
    let nf = n as f64;
    TileCoord::new(zoom, clamp_index(tile_x(lon, nf), n), clamp_index(tile_y(lat, nf), n))
}

/// Inclusive tile range covering a longitude/latitude bbox.
///
/// Each corner is converted with the standard slippy-map formulas and the
/// result is the min/max across corners, clamped to `[0, 2^zoom - 1]`.
pub fn tile_covering(zoom: u8, bbox: &BBox) -> TileRange {
    let corners = bbox.corners().map(|(lon, lat)| tile_containing(zoom, lon, lat));
    let xs = corners.iter().map(|t| t.x);
    let ys = corners.iter().map(|t| t.y);
    TileRange {
        zoom,
        x_min: xs.clone().min().unwrap_or(0),
        x_max: xs.max().unwrap_or(0),
        y_min: ys.clone().min().unwrap_or(0),
        y_max: ys.max().unwrap_or(0),
    }
}

/// Geographic bounds (degrees) of tile `(zoom, x, y)`.
pub fn tile_bounds(zoom: u8, x: u32, y: u32) -> BBox {
    let n = tiles_per_axis(zoom) as f64;
    let lon = |x: f64| x / n * 360.0 - 180.0;
    let lat = |y: f64| (PI * (1.0 - 2.0 * y / n)).sinh().atan().to_degrees();
    BBox::new(lon(x as f64), lat(y as f64 + 1.0), lon(x as f64 + 1.0), lat(y as f64))
}

/// Bounds of tile `(zoom, x, y)` in Web Mercator metres (EPSG:3857).
///
/// Pixel rows of a slippy tile are evenly spaced in this space.
pub fn tile_bounds_mercator(zoom: u8, x: u32, y: u32) -> BBox {
    let size = 2.0 * MERCATOR_HALF_EXTENT / tiles_per_axis(zoom) as f64;
    let min_x = -MERCATOR_HALF_EXTENT + x as f64 * size;
    let max_y = MERCATOR_HALF_EXTENT - y as f64 * size;
    BBox::new(min_x, max_y - size, min_x + size, max_y)
}
