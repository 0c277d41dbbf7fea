//! XYZ tile pyramids for one layer.

use crate::error::{PipelineError, Result};
use crate::layer::{open_layer, RasterLayer};
use crate::output::{TileKey, TileSink};
use std::fmt;
use std::time::Duration;
use tessera_colormap::Colorizer;
use tessera_core::tile::{tile_bounds_mercator, tile_covering, TILE_SIZE};
use tessera_core::{BBox, Deadline, RasterBackend, TileRange, CRS};
use tracing::{debug, info, warn};

/// Settings shared by every pyramid of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidOptions {
    /// Region tiles are clipped to, WGS84 degrees
    pub region: BBox,
    /// Strictly ascending
    pub zoom_levels: Vec<u8>,
    pub tile_count_ceiling: u64,
    pub timeout: Duration,
    pub domain_sample_dimension: u32,
}

/// Why a zoom level produced no complete set of tiles.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    TileCountExceeded { count: u64, ceiling: u64 },
    OutsideRegion,
    Timeout,
    ReadFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TileCountExceeded { count, ceiling } => {
                write!(f, "{count} tiles exceeds the ceiling of {ceiling}")
            }
            Self::OutsideRegion => f.write_str("layer does not overlap the region"),
            Self::Timeout => f.write_str("tile read timed out"),
            Self::ReadFailed(reason) => write!(f, "tile read failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ZoomOutcome {
    Rendered { tiles: u64 },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoomReport {
    pub zoom: u8,
    pub outcome: ZoomOutcome,
}

impl fmt::Display for ZoomReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ZoomOutcome::Rendered { tiles } => write!(f, "zoom {}: {tiles} tiles", self.zoom),
            ZoomOutcome::Skipped(reason) => write!(f, "zoom {}: skipped ({reason})", self.zoom),
        }
    }
}

/// Result of building one layer's pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidReport {
    pub layer_id: String,
    /// Layer footprint in WGS84 degrees
    pub bounds: BBox,
    pub zooms: Vec<ZoomReport>,
}

impl PyramidReport {
    /// Lowest and highest zoom levels that rendered completely.
    pub fn rendered_range(&self) -> Option<(u8, u8)> {
        let mut rendered = self
            .zooms
            .iter()
            .filter(|z| matches!(z.outcome, ZoomOutcome::Rendered { .. }))
            .map(|z| z.zoom);
        let first = rendered.next()?;
        let last = rendered.last().unwrap_or(first);
        Some((first, last))
    }

    pub fn tiles_rendered(&self) -> u64 {
        self.zooms
            .iter()
            .map(|z| match z.outcome {
                ZoomOutcome::Rendered { tiles } => tiles,
                ZoomOutcome::Skipped(_) => 0,
            })
            .sum()
    }
}

/// Check a covering range against the tile-count ceiling.
pub fn check_tile_count(range: &TileRange, ceiling: u64) -> Result<u64> {
    let count = range.count();
    if count > ceiling {
        return Err(PipelineError::TileCountExceeded {
            zoom: range.zoom,
            count,
            ceiling,
        });
    }
    Ok(count)
}

/// Renders tile pyramids through one raster backend.
pub struct PyramidBuilder<'a> {
    backend: &'a dyn RasterBackend,
    options: PyramidOptions,
}

impl<'a> PyramidBuilder<'a> {
    pub fn new(backend: &'a dyn RasterBackend, options: PyramidOptions) -> Self {
        Self { backend, options }
    }

    /// Render every configured zoom level of `layer` into `sink`.
    ///
    /// Fails only if the layer cannot be opened, reprojected or sampled for
    /// its gradient domain. Problems within a zoom level skip that level:
    /// tiles already written for it stay on disk but the level is not
    /// reported as rendered.
    pub fn build(&self, layer: &RasterLayer, sink: &mut dyn TileSink) -> Result<PyramidReport> {
        let mut source = open_layer(
            self.backend,
            layer,
            self.options.timeout,
            self.options.domain_sample_dimension,
        )?;
        let colorizer = Colorizer::new(&layer.scheme, source.handle.info().nodata).with_domain(source.domain);
        let mercator = CRS::web_mercator();
        let area = source.bounds.intersection(&self.options.region);

        let mut zooms = Vec::with_capacity(self.options.zoom_levels.len());
        for &zoom in &self.options.zoom_levels {
            let Some(area) = area else {
                zooms.push(ZoomReport {
                    zoom,
                    outcome: ZoomOutcome::Skipped(SkipReason::OutsideRegion),
                });
                continue;
            };

            let range = tile_covering(zoom, &area);
            if let Err(e) = check_tile_count(&range, self.options.tile_count_ceiling) {
                warn!(layer = %layer.id, zoom, "{e}");
                let reason = SkipReason::TileCountExceeded {
                    count: range.count(),
                    ceiling: self.options.tile_count_ceiling,
                };
                zooms.push(ZoomReport {
                    zoom,
                    outcome: ZoomOutcome::Skipped(reason),
                });
                continue;
            }
            debug!(
                layer = %layer.id,
                zoom,
                x = ?(range.x_min, range.x_max),
                y = ?(range.y_min, range.y_max),
                "Rendering zoom level"
            );

            let mut outcome = ZoomOutcome::Rendered { tiles: 0 };
            for tile in range.iter() {
                let bounds = tile_bounds_mercator(tile.zoom, tile.x, tile.y);
                let size = TILE_SIZE as usize;
                let grid = match source.handle.read_window(
                    &bounds,
                    &mercator,
                    size,
                    size,
                    Deadline::after(self.options.timeout),
                ) {
                    Ok(grid) => grid,
                    Err(e) => {
                        warn!(layer = %layer.id, zoom, x = tile.x, y = tile.y, "Skipping zoom level: {e}");
                        outcome = ZoomOutcome::Skipped(if e.is_timeout() {
                            SkipReason::Timeout
                        } else {
                            SkipReason::ReadFailed(e.to_string())
                        });
                        break;
                    }
                };
                sink.write_tile(&TileKey::new(&layer.id, tile), &colorizer.colorize(&grid))?;
                if let ZoomOutcome::Rendered { tiles } = &mut outcome {
                    *tiles += 1;
                }
            }
            if let ZoomOutcome::Rendered { tiles } = outcome {
                info!(layer = %layer.id, zoom, tiles, "Rendered zoom level");
            }
            zooms.push(ZoomReport { zoom, outcome });
        }

        Ok(PyramidReport {
            layer_id: layer.id.clone(),
            bounds: source.bounds,
            zooms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_check() {
        let region = BBox::new(72.5, 8.0, 78.5, 21.5);
        let z10 = tile_covering(10, &region);
        assert_eq!(check_tile_count(&z10, 1000).unwrap(), 738);
        let z11 = tile_covering(11, &region);
        assert!(matches!(
            check_tile_count(&z11, 1000),
            Err(PipelineError::TileCountExceeded { zoom: 11, count: 2835, ceiling: 1000 })
        ));
    }

    #[test]
    fn rendered_range_skips_gaps() {
        let report = PyramidReport {
            layer_id: "a".into(),
            bounds: BBox::new(0.0, 0.0, 1.0, 1.0),
            zooms: vec![
                ZoomReport { zoom: 7, outcome: ZoomOutcome::Skipped(SkipReason::Timeout) },
                ZoomReport { zoom: 8, outcome: ZoomOutcome::Rendered { tiles: 4 } },
                ZoomReport { zoom: 9, outcome: ZoomOutcome::Rendered { tiles: 9 } },
                ZoomReport {
                    zoom: 10,
                    outcome: ZoomOutcome::Skipped(SkipReason::TileCountExceeded { count: 2000, ceiling: 1000 }),
                },
            ],
        };
        assert_eq!(report.rendered_range(), Some((8, 9)));
        assert_eq!(report.tiles_rendered(), 13);
        assert_eq!(report.zooms[3].to_string(), "zoom 10: skipped (2000 tiles exceeds the ceiling of 1000)");
    }

    #[test]
    fn nothing_rendered() {
        let report = PyramidReport {
            layer_id: "a".into(),
            bounds: BBox::new(0.0, 0.0, 1.0, 1.0),
            zooms: vec![ZoomReport { zoom: 5, outcome: ZoomOutcome::Skipped(SkipReason::OutsideRegion) }],
        };
        assert_eq!(report.rendered_range(), None);
    }
}
