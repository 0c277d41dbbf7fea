//! # Tessera Colormap
//!
//! Value-to-color policies and raster-to-RGBA rendering for tessera.
//!
//! A [`ColorScheme`] is one of three forms: a categorical class table, a
//! two-anchor gradient, or a composite set of class codes. [`colorize`] turns
//! a [`RawGrid`](tessera_core::RawGrid) into an [`RgbaGrid`] under a scheme
//! and nodata sentinel.
//!
//! ## Usage
//!
//! ```ignore
//! use tessera_colormap::{colorize, presets};
//!
//! let scheme = presets::require("lulc")?;
//! let rgba = colorize(&grid, &scheme, grid.nodata());
//! ```

pub mod presets;
mod render;
mod scheme;

pub use render::{colorize, resolve_domain, Colorizer, RgbaGrid};
pub use scheme::{ColorError, ColorScheme, Rgb, Rgba, ValueDomain, DEFAULT_ALPHA};
