//! # tessera-pipeline
//!
//! Publishes classified and continuous rasters for web maps: XYZ tile
//! pyramids, single overlay images for layers too large to tile, and the
//! JSON manifests a map client reads to discover them.
//!
//! ```no_run
//! use tessera_core::GeoTiffBackend;
//! use tessera_pipeline::{BatchRunner, OutputLayout, PipelineConfig, RenderMode};
//!
//! # fn main() -> tessera_pipeline::Result<()> {
//! let config = PipelineConfig::load("layers.json")?;
//! let backend = GeoTiffBackend::new().with_chunk_cache(config.chunk_cache_capacity);
//! let summary = BatchRunner::new(&config, &backend, OutputLayout::new("public/data"))
//!     .with_mode(RenderMode::Both)
//!     .run(&config.layers()?)?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod layer;
pub mod manifest;
pub mod output;
pub mod overlay;
pub mod pyramid;

pub use batch::{BatchObserver, BatchRunner, BatchSummary, LayerSummary, NoopObserver, RenderMode, StepOutcome};
pub use config::{LayerConfig, PipelineConfig};
pub use error::{PipelineError, Result};
pub use layer::{fit_dimensions, RasterLayer};
pub use manifest::{GeoBounds, Manifest, ManifestBuilder, ManifestEntry, MANIFEST_VERSION};
pub use output::{OutputLayout, PngTileWriter, TileCollector, TileKey, TileSink};
pub use overlay::{Overlay, OverlayRenderer};
pub use pyramid::{PyramidBuilder, PyramidOptions, PyramidReport, SkipReason, ZoomOutcome, ZoomReport};
