//! Raster-to-RGBA rendering using color schemes.

use crate::scheme::{ColorScheme, Rgb, Rgba, ValueDomain};
use std::collections::BTreeMap;
use tessera_core::raster::{is_nodata, RawGrid};

/// Row-major RGBA pixel buffer with the dimensions of its source grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaGrid {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl RgbaGrid {
    /// Fully transparent grid.
    pub fn transparent(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height * 4],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixel(&self, row: usize, col: usize) -> Option<Rgba> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let i = (row * self.width + col) * 4;
        Some(Rgba::new(self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]))
    }

    /// Raw bytes, `width * height * 4` long.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Whether every pixel has alpha 0.
    pub fn is_fully_transparent(&self) -> bool {
        self.data.chunks_exact(4).all(|px| px[3] == 0)
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn lerp_color(c1: Rgb, c2: Rgb, t: f64) -> Rgb {
    Rgb::new(
        lerp(c1.r as f64, c2.r as f64, t).round() as u8,
        lerp(c1.g as f64, c2.g as f64, t).round() as u8,
        lerp(c1.b as f64, c2.b as f64, t).round() as u8,
    )
}

/// Whether `v` takes part in a gradient: finite, positive and not nodata.
fn is_gradient_value(v: f64, nodata: Option<f64>) -> bool {
    v.is_finite() && v > 0.0 && !is_nodata(v, nodata)
}

/// Min/max of the values a gradient would color, or `None` if there are none.
pub fn resolve_domain(grid: &RawGrid, nodata: Option<f64>) -> Option<ValueDomain> {
    grid.data()
        .iter()
        .copied()
        .filter(|&v| is_gradient_value(v, nodata))
        .fold(None, |acc, v| match acc {
            None => Some(ValueDomain::new(v, v)),
            Some(d) => Some(ValueDomain::new(d.min.min(v), d.max.max(v))),
        })
}

/// Applies one scheme, nodata sentinel and gradient domain to grids.
///
/// Per-pixel precedence:
/// 1. NaN or the nodata sentinel is transparent
/// 2. categorical/composite value 0 is transparent
/// 3. categorical/composite values map through the class table, absent
///    values are transparent
/// 4. gradient values outside the valid mask are transparent, the rest are
///    interpolated between the anchors with the scheme's alpha
#[derive(Debug, Clone)]
pub struct Colorizer<'a> {
    scheme: &'a ColorScheme,
    nodata: Option<f64>,
    domain: Option<ValueDomain>,
}

impl<'a> Colorizer<'a> {
    pub fn new(scheme: &'a ColorScheme, nodata: Option<f64>) -> Self {
        Self {
            scheme,
            nodata,
            domain: scheme.declared_domain(),
        }
    }

    /// Fix the gradient domain instead of deriving it from each grid.
    pub fn with_domain(mut self, domain: Option<ValueDomain>) -> Self {
        if domain.is_some() {
            self.domain = domain;
        }
        self
    }

    /// Color every pixel of `grid`.
    pub fn colorize(&self, grid: &RawGrid) -> RgbaGrid {
        let domain = match self.scheme {
            ColorScheme::Gradient { .. } => self.domain.or_else(|| resolve_domain(grid, self.nodata)),
            _ => None,
        };
        let mut data = Vec::with_capacity(grid.len() * 4);
        for &v in grid.data().iter() {
            data.extend_from_slice(&self.color(v, domain).to_array());
        }
        RgbaGrid {
            width: grid.cols(),
            height: grid.rows(),
            data,
        }
    }

    fn color(&self, v: f64, domain: Option<ValueDomain>) -> Rgba {
        if is_nodata(v, self.nodata) {
            return Rgba::TRANSPARENT;
        }
        match self.scheme {
            ColorScheme::Categorical { classes } | ColorScheme::Composite { classes } => lookup(classes, v),
            ColorScheme::Gradient { from, to, alpha, .. } => match domain {
                Some(d) if is_gradient_value(v, self.nodata) => {
                    lerp_color(*from, *to, d.normalize(v)).with_alpha(*alpha)
                }
                _ => Rgba::TRANSPARENT,
            },
        }
    }
}

fn lookup(classes: &BTreeMap<i64, Rgba>, v: f64) -> Rgba {
    if v == 0.0 || v.fract() != 0.0 || v.abs() > i64::MAX as f64 {
        return Rgba::TRANSPARENT;
    }
    classes.get(&(v as i64)).copied().unwrap_or(Rgba::TRANSPARENT)
}

/// Colorize `grid` with `scheme`, treating `nodata` as transparent.
///
/// Deterministic: the same inputs always yield byte-identical output.
/// Gradients without a declared domain stretch over this grid's own valid
/// values; use [`Colorizer::with_domain`] to share one domain across grids.
pub fn colorize(grid: &RawGrid, scheme: &ColorScheme, nodata: Option<f64>) -> RgbaGrid {
    Colorizer::new(scheme, nodata).colorize(grid)
}
