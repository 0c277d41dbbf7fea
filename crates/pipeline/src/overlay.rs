//! Single georeferenced overlay images for layers too large to tile.

use crate::error::Result;
use crate::layer::{fit_dimensions, open_layer, RasterLayer};
use std::time::Duration;
use tessera_colormap::{Colorizer, RgbaGrid};
use tessera_core::{BBox, Deadline, RasterBackend};
use tracing::info;

/// A rendered overlay and the WGS84 extent it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub image: RgbaGrid,
    pub bounds: BBox,
}

/// Renders whole layers into one image whose longer side is
/// `max_dimension`, reading the source decimated so memory stays
/// proportional to the image.
pub struct OverlayRenderer<'a> {
    backend: &'a dyn RasterBackend,
    max_dimension: u32,
    timeout: Duration,
    domain_sample_dimension: u32,
}

impl<'a> OverlayRenderer<'a> {
    pub fn new(backend: &'a dyn RasterBackend, max_dimension: u32, timeout: Duration) -> Self {
        Self {
            backend,
            max_dimension,
            timeout,
            domain_sample_dimension: 1024,
        }
    }

    /// Longest side of the read used to fix gradient domains.
    pub fn with_domain_sample_dimension(mut self, dimension: u32) -> Self {
        self.domain_sample_dimension = dimension;
        self
    }

    pub fn render(&self, layer: &RasterLayer) -> Result<Overlay> {
        let mut source = open_layer(self.backend, layer, self.timeout, self.domain_sample_dimension)?;
        let info = source.handle.info().clone();
        let (width, height) = fit_dimensions(info.width, info.height, self.max_dimension);

        let grid = source
            .handle
            .read_decimated(width, height, Deadline::after(self.timeout))?;
        let image = Colorizer::new(&layer.scheme, info.nodata)
            .with_domain(source.domain)
            .colorize(&grid);
        info!(
            layer = %layer.id,
            width,
            height,
            native_width = info.width,
            native_height = info.height,
            "Rendered overlay"
        );

        Ok(Overlay {
            image,
            bounds: source.bounds,
        })
    }
}
