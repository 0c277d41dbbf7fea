//! Run configuration loaded from a JSON document.
//!
//! ```json
//! {
//!   "region": {"west": 72.5, "south": 8.0, "east": 78.5, "north": 21.5},
//!   "zoomLevels": [8, 9, 10],
//!   "colorSchemes": {"binary": {"type": "categorical", "classes": {"1": "#9ACD32"}}},
//!   "layers": [
//!     {"id": "lulc_2020", "title": "Land cover 2020", "category": "lulc",
//!      "year": 2020, "colorScheme": "lulc", "source": "rasters/lulc_2020.tif"}
//!   ]
//! }
//! ```

use crate::error::{PipelineError, Result};
use crate::layer::RasterLayer;
use crate::manifest::GeoBounds;
use crate::output::TILE_MANIFEST_FILE;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tessera_colormap::{presets, ColorScheme};
use tessera_core::tile::{MAX_LATITUDE, TILE_SIZE};

/// Highest zoom level accepted in `zoomLevels`.
pub const MAX_ZOOM: u8 = 24;

/// Directory under the output root reserved for overlay images.
pub const IMAGES_DIR: &str = "images";

fn default_tile_size() -> u32 {
    TILE_SIZE
}
fn default_max_overlay_dimension() -> u32 {
    4096
}
fn default_tile_count_ceiling() -> u64 {
    1000
}
fn default_operation_timeout_secs() -> u64 {
    300
}
fn default_domain_sample_dimension() -> u32 {
    1024
}
fn default_url_prefix() -> String {
    "/tiles".to_string()
}
fn default_chunk_cache_capacity() -> usize {
    tessera_core::io::DEFAULT_CHUNK_CACHE_CAPACITY
}

/// One layer as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerConfig {
    pub id: String,
    pub title: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default)]
    pub description: String,
    /// Name of a scheme in `colorSchemes` or a built-in preset
    pub color_scheme: String,
    /// Raster path; relative paths resolve against the config file
    pub source: PathBuf,
}

/// Everything a run needs besides the raster backend and output root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Region tiles are clipped to, in WGS84 degrees
    pub region: GeoBounds,
    /// Zoom levels to render, strictly ascending
    pub zoom_levels: Vec<u8>,
    #[serde(default = "default_tile_size")]
    pub tile_size: u32,
    #[serde(default = "default_max_overlay_dimension")]
    pub max_overlay_dimension: u32,
    /// Zoom levels needing more tiles than this are skipped
    #[serde(default = "default_tile_count_ceiling")]
    pub tile_count_ceiling: u64,
    /// Limit for each raster open/read/reproject operation
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    /// Longest side of the decimated read used to fix gradient domains
    #[serde(default = "default_domain_sample_dimension")]
    pub domain_sample_dimension: u32,
    /// URL prefix written into manifest paths
    #[serde(default = "default_url_prefix")]
    pub url_prefix: String,
    /// Decoded chunks cached per open GeoTIFF
    #[serde(default = "default_chunk_cache_capacity")]
    pub chunk_cache_capacity: usize,
    /// Named schemes; these shadow presets of the same name
    #[serde(default)]
    pub color_schemes: BTreeMap<String, ColorScheme>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
}

impl PipelineConfig {
    /// Configuration with defaults for every optional field.
    pub fn new(region: GeoBounds, zoom_levels: Vec<u8>) -> Self {
        Self {
            region,
            zoom_levels,
            tile_size: default_tile_size(),
            max_overlay_dimension: default_max_overlay_dimension(),
            tile_count_ceiling: default_tile_count_ceiling(),
            operation_timeout_secs: default_operation_timeout_secs(),
            domain_sample_dimension: default_domain_sample_dimension(),
            url_prefix: default_url_prefix(),
            chunk_cache_capacity: default_chunk_cache_capacity(),
            color_schemes: BTreeMap::new(),
            layers: Vec::new(),
        }
    }

    /// Read, parse and validate a configuration file. Relative layer
    /// sources are resolved against the file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))?;
        if let Some(base) = path.parent() {
            for layer in &mut config.layers {
                if layer.source.is_relative() {
                    layer.source = base.join(&layer.source);
                }
            }
        }
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(PipelineError::Config(msg));

        let r = &self.region;
        let lat_ok = |v: f64| v.abs() <= MAX_LATITUDE;
        if !(r.west < r.east && r.south < r.north && r.west >= -180.0 && r.east <= 180.0)
            || !lat_ok(r.south)
            || !lat_ok(r.north)
        {
            return invalid(format!("region {r:?} is empty or outside the Web Mercator world"));
        }
        if self.zoom_levels.is_empty() {
            return invalid("zoomLevels must not be empty".into());
        }
        if !self.zoom_levels.windows(2).all(|w| w[0] < w[1]) {
            return invalid(format!("zoomLevels {:?} must be strictly ascending", self.zoom_levels));
        }
        if let Some(&z) = self.zoom_levels.iter().find(|&&z| z > MAX_ZOOM) {
            return invalid(format!("zoom level {z} exceeds the maximum of {MAX_ZOOM}"));
        }
        if self.tile_size != TILE_SIZE {
            return invalid(format!("tileSize must be {TILE_SIZE}, got {}", self.tile_size));
        }
        if self.max_overlay_dimension == 0 || self.domain_sample_dimension == 0 {
            return invalid("maxOverlayDimension and domainSampleDimension must be positive".into());
        }
        if self.operation_timeout_secs == 0 {
            return invalid("operationTimeoutSecs must be positive".into());
        }

        for (name, scheme) in &self.color_schemes {
            scheme
                .validate()
                .map_err(|e| PipelineError::Config(format!("color scheme '{name}': {e}")))?;
        }

        let mut seen = HashSet::new();
        for layer in &self.layers {
            let id = layer.id.as_str();
            let reserved = id == IMAGES_DIR || id == TILE_MANIFEST_FILE;
            if id.is_empty() || reserved || id.starts_with('.') || id.contains(['/', '\\']) {
                return invalid(format!("layer id '{id}' cannot be used as a directory name"));
            }
            if !seen.insert(id) {
                return invalid(format!("duplicate layer id '{id}'"));
            }
            self.scheme(&layer.color_scheme)
                .map_err(|e| PipelineError::Config(format!("layer '{id}': {e}")))?;
        }
        Ok(())
    }

    /// Scheme by name: configured schemes first, then presets.
    pub fn scheme(&self, name: &str) -> Result<ColorScheme> {
        match self.color_schemes.get(name) {
            Some(scheme) => Ok(scheme.clone()),
            None => Ok(presets::require(name)?),
        }
    }

    /// Resolve every configured layer's scheme.
    pub fn layers(&self) -> Result<Vec<RasterLayer>> {
        self.layers
            .iter()
            .map(|l| {
                Ok(RasterLayer {
                    id: l.id.clone(),
                    title: l.title.clone(),
                    category: l.category.clone(),
                    year: l.year,
                    description: l.description.clone(),
                    scheme_name: l.color_scheme.clone(),
                    scheme: self.scheme(&l.color_scheme)?,
                    source: l.source.clone(),
                })
            })
            .collect()
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}
