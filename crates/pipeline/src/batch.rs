//! Runs many layers in sequence and merges their manifest entries.

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::layer::RasterLayer;
use crate::manifest::{ManifestBuilder, ManifestEntry};
use crate::output::{overlay_url, tile_path_template, write_png, OutputLayout, PngTileWriter, TileKey, TileSink};
use crate::overlay::OverlayRenderer;
use crate::pyramid::{PyramidBuilder, PyramidOptions, ZoomReport};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tessera_colormap::RgbaGrid;
use tessera_core::RasterBackend;
use tracing::{info, warn};

/// Which outputs to produce for each layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Tiles,
    Overlay,
    Both,
}

impl RenderMode {
    pub fn includes_tiles(self) -> bool {
        matches!(self, Self::Tiles | Self::Both)
    }

    pub fn includes_overlay(self) -> bool {
        matches!(self, Self::Overlay | Self::Both)
    }
}

impl FromStr for RenderMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tiles" => Ok(Self::Tiles),
            "overlay" => Ok(Self::Overlay),
            "both" => Ok(Self::Both),
            other => Err(PipelineError::Config(format!("unknown render mode '{other}'"))),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tiles => "tiles",
            Self::Overlay => "overlay",
            Self::Both => "both",
        })
    }
}

/// Progress callbacks. All methods default to doing nothing.
pub trait BatchObserver {
    fn layer_started(&self, _layer: &RasterLayer, _index: usize, _total: usize) {}
    fn tile_written(&self, _key: &TileKey) {}
    fn layer_finished(&self, _summary: &LayerSummary) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

struct ObservedSink<'s> {
    inner: &'s mut dyn TileSink,
    observer: &'s dyn BatchObserver,
}

impl TileSink for ObservedSink<'_> {
    fn write_tile(&mut self, key: &TileKey, rgba: &RgbaGrid) -> Result<()> {
        self.inner.write_tile(key, rgba)?;
        self.observer.tile_written(key);
        Ok(())
    }
}

/// Outcome of one output kind (tiles or overlay) for a layer.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Rendered(String),
    Skipped(String),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rendered(detail) => f.write_str(detail),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
        }
    }
}

/// What happened to one layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSummary {
    pub id: String,
    pub tiles: Option<StepOutcome>,
    pub overlay: Option<StepOutcome>,
    /// Per-zoom outcomes of the tile pyramid
    pub zooms: Vec<ZoomReport>,
}

impl LayerSummary {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            tiles: None,
            overlay: None,
            zooms: Vec::new(),
        }
    }

    /// No requested output was skipped.
    pub fn succeeded(&self) -> bool {
        [&self.tiles, &self.overlay]
            .into_iter()
            .flatten()
            .all(|o| matches!(o, StepOutcome::Rendered(_)))
    }
}

/// Result of a whole run, printable as the user-facing report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchSummary {
    pub layers: Vec<LayerSummary>,
    /// Manifests saved at the end of the run
    pub manifests: Vec<PathBuf>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.layers.iter().filter(|l| l.succeeded()).count()
    }

    pub fn skipped(&self) -> usize {
        self.layers.len() - self.succeeded()
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Layers: {} succeeded, {} skipped", self.succeeded(), self.skipped())?;
        for layer in &self.layers {
            let status = if layer.succeeded() { "ok" } else { "skipped" };
            writeln!(f, "  {}: {status}", layer.id)?;
            if let Some(tiles) = &layer.tiles {
                writeln!(f, "    tiles: {tiles}")?;
                for zoom in &layer.zooms {
                    writeln!(f, "      {zoom}")?;
                }
            }
            if let Some(overlay) = &layer.overlay {
                writeln!(f, "    overlay: {overlay}")?;
            }
        }
        if !self.manifests.is_empty() {
            writeln!(f, "Manifests:")?;
            for path in &self.manifests {
                writeln!(f, "  {}", path.display())?;
            }
        }
        Ok(())
    }
}

/// Renders layers one after another, isolating each layer's failures, then
/// merges the results into the manifests under the output root.
pub struct BatchRunner<'a> {
    config: &'a PipelineConfig,
    backend: &'a dyn RasterBackend,
    layout: OutputLayout,
    mode: RenderMode,
    observer: &'a dyn BatchObserver,
}

impl<'a> BatchRunner<'a> {
    pub fn new(config: &'a PipelineConfig, backend: &'a dyn RasterBackend, layout: OutputLayout) -> Self {
        Self {
            config,
            backend,
            layout,
            mode: RenderMode::default(),
            observer: &NoopObserver,
        }
    }

    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn BatchObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Render `layers` and save the manifests.
    ///
    /// Layer failures are recorded in the summary. Errors are returned only
    /// for an unreadable existing manifest (before anything renders) and for
    /// a failed manifest save, which is fatal.
    pub fn run(&self, layers: &[RasterLayer]) -> Result<BatchSummary> {
        let config = self.config;
        // Load first so a corrupt manifest stops the run before it renders
        // assets it could not record.
        let mut tile_manifest = match self.mode.includes_tiles() {
            true => Some(ManifestBuilder::load(self.layout.tile_manifest_path())?),
            false => None,
        };
        let mut image_manifest = match self.mode.includes_overlay() {
            true => Some(ManifestBuilder::load(self.layout.image_manifest_path())?),
            false => None,
        };

        let pyramid = PyramidBuilder::new(
            self.backend,
            PyramidOptions {
                region: config.region.to_bbox(),
                zoom_levels: config.zoom_levels.clone(),
                tile_count_ceiling: config.tile_count_ceiling,
                timeout: config.operation_timeout(),
                domain_sample_dimension: config.domain_sample_dimension,
            },
        );
        let overlay = OverlayRenderer::new(self.backend, config.max_overlay_dimension, config.operation_timeout())
            .with_domain_sample_dimension(config.domain_sample_dimension);
        let mut writer = PngTileWriter::new(self.layout.clone());

        let mut summary = BatchSummary::default();
        let mut tile_entries = Vec::new();
        let mut image_entries = Vec::new();

        for (index, layer) in layers.iter().enumerate() {
            self.observer.layer_started(layer, index, layers.len());
            info!(layer = %layer.id, source = %layer.source.display(), mode = %self.mode, "Processing layer");
            let mut result = LayerSummary::new(&layer.id);

            if self.mode.includes_tiles() {
                let mut sink = ObservedSink {
                    inner: &mut writer,
                    observer: self.observer,
                };
                let outcome = match pyramid.build(layer, &mut sink) {
                    Ok(report) => {
                        let outcome = match report.rendered_range() {
                            Some((min_zoom, max_zoom)) => {
                                let template = tile_path_template(&config.url_prefix, &layer.id);
                                tile_entries.push(ManifestEntry::tiles(layer, template, min_zoom, max_zoom));
                                StepOutcome::Rendered(format!(
                                    "zoom {min_zoom}-{max_zoom}, {} tiles",
                                    report.tiles_rendered()
                                ))
                            }
                            None => {
                                warn!(layer = %layer.id, "No zoom level rendered");
                                StepOutcome::Skipped("no zoom level rendered".to_string())
                            }
                        };
                        result.zooms = report.zooms;
                        outcome
                    }
                    Err(e) => {
                        warn!(layer = %layer.id, "Skipping tiles: {e}");
                        StepOutcome::Skipped(e.to_string())
                    }
                };
                result.tiles = Some(outcome);
            }

            if self.mode.includes_overlay() {
                let rendered = overlay.render(layer).and_then(|o| {
                    write_png(&self.layout.overlay_path(&layer.id), &o.image)?;
                    Ok(o)
                });
                let outcome = match rendered {
                    Ok(o) => {
                        let url = overlay_url(&config.url_prefix, &layer.id);
                        image_entries.push(ManifestEntry::image(layer, url, o.bounds.into()));
                        StepOutcome::Rendered(format!("{}x{} px", o.image.width(), o.image.height()))
                    }
                    Err(e) => {
                        warn!(layer = %layer.id, "Skipping overlay: {e}");
                        StepOutcome::Skipped(e.to_string())
                    }
                };
                result.overlay = Some(outcome);
            }

            self.observer.layer_finished(&result);
            summary.layers.push(result);
        }

        if let Some(manifest) = tile_manifest.as_mut() {
            let first = config.zoom_levels.first().copied().unwrap_or_default();
            let last = config.zoom_levels.last().copied().unwrap_or(first);
            manifest.set_region(config.region, [first, last]);
            manifest.upsert(tile_entries);
            manifest.save()?;
            summary.manifests.push(manifest.path().to_path_buf());
        }
        if let Some(manifest) = image_manifest.as_mut() {
            manifest.upsert(image_entries);
            manifest.save()?;
            summary.manifests.push(manifest.path().to_path_buf());
        }

        info!(
            succeeded = summary.succeeded(),
            skipped = summary.skipped(),
            "Batch finished"
        );
        Ok(summary)
    }
}
