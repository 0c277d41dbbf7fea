//! On-disk layout of rendered assets and PNG encoding.
//!
//! ```text
//! {root}/tile-manifest.json
//! {root}/{layer}/{z}/{x}/{y}.png
//! {root}/images/image-manifest.json
//! {root}/images/{layer}.png
//! ```

use crate::config::IMAGES_DIR;
use crate::error::{PipelineError, Result};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tessera_colormap::RgbaGrid;
use tessera_core::TileCoord;

pub const TILE_MANIFEST_FILE: &str = "tile-manifest.json";
pub const IMAGE_MANIFEST_FILE: &str = "image-manifest.json";

/// Identity of one rendered tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub layer_id: String,
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(layer_id: &str, tile: TileCoord) -> Self {
        Self {
            layer_id: layer_id.to_string(),
            zoom: tile.zoom,
            x: tile.x,
            y: tile.y,
        }
    }
}

/// Paths of every output under one root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, key: &TileKey) -> PathBuf {
        self.root
            .join(&key.layer_id)
            .join(key.zoom.to_string())
            .join(key.x.to_string())
            .join(format!("{}.png", key.y))
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn overlay_path(&self, layer_id: &str) -> PathBuf {
        self.images_dir().join(format!("{layer_id}.png"))
    }

    pub fn tile_manifest_path(&self) -> PathBuf {
        self.root.join(TILE_MANIFEST_FILE)
    }

    pub fn image_manifest_path(&self) -> PathBuf {
        self.images_dir().join(IMAGE_MANIFEST_FILE)
    }
}

/// URL of a layer's tiles, e.g. `/tiles/lulc/{z}/{x}/{y}.png`.
pub fn tile_path_template(url_prefix: &str, layer_id: &str) -> String {
    format!("{}/{layer_id}/{{z}}/{{x}}/{{y}}.png", url_prefix.trim_end_matches('/'))
}

/// URL of a layer's overlay image, e.g. `/tiles/images/lulc.png`.
pub fn overlay_url(url_prefix: &str, layer_id: &str) -> String {
    format!("{}/{IMAGES_DIR}/{layer_id}.png", url_prefix.trim_end_matches('/'))
}

/// Encode an RGBA grid as PNG bytes.
pub fn encode_png(rgba: &RgbaGrid) -> Result<Vec<u8>> {
    let (w, h) = (rgba.width() as u32, rgba.height() as u32);
    let image = RgbaImage::from_raw(w, h, rgba.as_bytes().to_vec())
        .ok_or_else(|| PipelineError::Encode(format!("buffer does not hold {w}x{h} RGBA pixels")))?;
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Encode and write a PNG, creating parent directories.
pub fn write_png(path: &Path, rgba: &RgbaGrid) -> Result<()> {
    let bytes = encode_png(rgba)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Receives tiles as they are rendered.
pub trait TileSink {
    fn write_tile(&mut self, key: &TileKey, rgba: &RgbaGrid) -> Result<()>;
}

/// Writes tiles as PNG files under an [`OutputLayout`].
#[derive(Debug, Clone)]
pub struct PngTileWriter {
    layout: OutputLayout,
    written: u64,
}

impl PngTileWriter {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout, written: 0 }
    }

    /// Tiles written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl TileSink for PngTileWriter {
    fn write_tile(&mut self, key: &TileKey, rgba: &RgbaGrid) -> Result<()> {
        write_png(&self.layout.tile_path(key), rgba)?;
        self.written += 1;
        Ok(())
    }
}

/// Keeps rendered tiles in memory.
#[derive(Debug, Clone, Default)]
pub struct TileCollector {
    pub tiles: Vec<(TileKey, RgbaGrid)>,
}

impl TileSink for TileCollector {
    fn write_tile(&mut self, key: &TileKey, rgba: &RgbaGrid) -> Result<()> {
        self.tiles.push((key.clone(), rgba.clone()));
        Ok(())
    }
}
