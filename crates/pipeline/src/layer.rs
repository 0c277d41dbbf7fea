//! Layers and the per-layer preparation shared by tiles and overlays.

use crate::error::Result;
use std::path::PathBuf;
use std::time::Duration;
use tessera_colormap::{resolve_domain, ColorScheme, ValueDomain};
use tessera_core::{BBox, Deadline, RasterBackend, RasterHandle};
use tracing::debug;

/// One raster to publish, with its scheme already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    pub id: String,
    pub title: String,
    pub category: String,
    pub year: Option<i32>,
    pub description: String,
    /// Name the scheme was configured under, written to manifests
    pub scheme_name: String,
    pub scheme: ColorScheme,
    pub source: PathBuf,
}

/// An opened layer source with its WGS84 footprint and gradient domain.
pub(crate) struct OpenLayer {
    pub handle: Box<dyn RasterHandle>,
    /// Native bounds reprojected to longitude/latitude
    pub bounds: BBox,
    pub domain: Option<ValueDomain>,
}

/// Output size with the aspect ratio of `width x height` whose longer side
/// is exactly `max_dimension`.
pub fn fit_dimensions(width: usize, height: usize, max_dimension: u32) -> (usize, usize) {
    let max = max_dimension.max(1) as usize;
    if width == 0 || height == 0 {
        return (max, max);
    }
    let short = |long: usize, short: usize| ((max as f64 * short as f64 / long as f64).round() as usize).max(1);
    if width >= height {
        (max, short(width, height))
    } else {
        (short(height, width), max)
    }
}

/// Open `layer`, reproject its bounds and fix its gradient domain.
///
/// Gradient domains come from one decimated read whose longer side is
/// `sample_dimension`, so every tile and the overlay of a layer share the
/// same stretch.
pub(crate) fn open_layer(
    backend: &dyn RasterBackend,
    layer: &RasterLayer,
    timeout: Duration,
    sample_dimension: u32,
) -> Result<OpenLayer> {
    let mut handle = backend.open(&layer.source, Deadline::after(timeout))?;
    let info = handle.info().clone();
    let crs = info.require_crs()?;
    let bounds = backend.reproject_bounds(crs, &info.bounds(), Deadline::after(timeout))?;

    let domain = match layer.scheme.declared_domain() {
        Some(domain) => Some(domain),
        None if layer.scheme.is_gradient() => {
            let (w, h) = fit_dimensions(info.width, info.height, sample_dimension);
            let sample = handle.read_decimated(w, h, Deadline::after(timeout))?;
            resolve_domain(&sample, info.nodata)
        }
        None => None,
    };
    debug!(
        layer = %layer.id,
        width = info.width,
        height = info.height,
        ?bounds,
        ?domain,
        "Opened layer source"
    );

    Ok(OpenLayer { handle, bounds, domain })
}
