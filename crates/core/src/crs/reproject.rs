//! Pure-Rust coordinate reprojection backed by `proj4rs`.
//!
//! Geographic coordinates are exchanged in degrees; `proj4rs` works in
//! radians for `longlat` projections, so conversion happens at the edges.

use super::CRS;
use crate::bbox::BBox;
use crate::error::{Error, Result};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

/// Points sampled along each bbox edge when transforming bounds.
pub const EDGE_SAMPLES: usize = 21;

/// A reusable transformation between two coordinate reference systems.
pub struct Reprojector {
    source: Option<Proj>,
    target: Option<Proj>,
    source_geographic: bool,
    target_geographic: bool,
}

impl Reprojector {
    /// Build a transformation from `from` to `to`.
    ///
    /// Equivalent CRSs produce an identity transform without touching PROJ.
    pub fn new(from: &CRS, to: &CRS) -> Result<Self> {
        if from.is_equivalent(to) {
            return Ok(Self {
                source: None,
                target: None,
                source_geographic: false,
                target_geographic: false,
            });
        }
        Ok(Self {
            source: Some(build_proj(from)?),
            target: Some(build_proj(to)?),
            source_geographic: from.is_geographic(),
            target_geographic: to.is_geographic(),
        })
    }

    /// Whether this transform leaves coordinates untouched.
    pub fn is_identity(&self) -> bool {
        self.source.is_none()
    }

    /// Transform a single point.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let (Some(source), Some(target)) = (&self.source, &self.target) else {
            return Ok((x, y));
        };

        let mut point = if self.source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(source, target, &mut point)
            .map_err(|e| Error::Reprojection(format!("point ({x}, {y}): {e:?}")))?;

        let (out_x, out_y) = if self.target_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if !out_x.is_finite() || !out_y.is_finite() {
            return Err(Error::Reprojection(format!(
                "point ({x}, {y}) has no finite image in the target CRS"
            )));
        }
        Ok((out_x, out_y))
    }

    /// Transform a bounding box and return the envelope of the result.
    ///
    /// Corners and `per_edge` points along each edge are transformed so that
    /// curved edges in the target CRS are enclosed. Points that fail to
    /// transform are skipped; if none succeed the call fails.
    pub fn transform_bounds(&self, bbox: &BBox, per_edge: usize) -> Result<BBox> {
        if self.is_identity() {
            return Ok(*bbox);
        }
        let transformed: Vec<(f64, f64)> = bbox
            .densify(per_edge)
            .into_iter()
            .filter_map(|(x, y)| self.transform(x, y).ok())
            .collect();

        BBox::envelope(transformed).ok_or_else(|| {
            Error::Reprojection(format!("no point of {bbox:?} could be transformed"))
        })
    }
}

/// Reproject a bounding box in `crs` into WGS84 longitude/latitude degrees.
pub fn reproject_bounds(crs: &CRS, bbox: &BBox) -> Result<BBox> {
    Reprojector::new(crs, &CRS::wgs84())?.transform_bounds(bbox, EDGE_SAMPLES)
}

fn build_proj(crs: &CRS) -> Result<Proj> {
    let def = crs.proj_definition().ok_or_else(|| {
        Error::Reprojection(format!("{} has no PROJ definition", crs.identifier()))
    })?;
    Proj::from_proj_string(def)
        .map_err(|e| Error::Reprojection(format!("invalid projection {}: {e:?}", crs.identifier())))
}
