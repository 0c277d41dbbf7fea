//! Layer manifests read by the web map, merged across runs by layer id.

use crate::error::{PipelineError, Result};
use crate::layer::RasterLayer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tessera_core::BBox;
use tracing::{debug, info};

pub const MANIFEST_VERSION: &str = "1.0";

/// Geographic extent in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl GeoBounds {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self { west, south, east, north }
    }

    pub fn to_bbox(&self) -> BBox {
        BBox::new(self.west, self.south, self.east, self.north)
    }
}

impl From<BBox> for GeoBounds {
    fn from(b: BBox) -> Self {
        Self::new(b.min_x, b.min_y, b.max_x, b.max_y)
    }
}

/// One layer in a manifest.
///
/// Tile layers carry `tilePathTemplate` and the rendered zoom range;
/// overlay layers carry `imagePath` and `bounds`. Fields this version does
/// not know about are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub id: String,
    pub title: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default)]
    pub description: String,
    pub color_scheme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_path_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<GeoBounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<u8>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ManifestEntry {
    fn for_layer(layer: &RasterLayer) -> Self {
        Self {
            id: layer.id.clone(),
            title: layer.title.clone(),
            category: layer.category.clone(),
            year: layer.year,
            description: layer.description.clone(),
            color_scheme: layer.scheme_name.clone(),
            tile_path_template: None,
            image_path: None,
            bounds: None,
            min_zoom: None,
            max_zoom: None,
            extra: Map::new(),
        }
    }

    /// Entry for a rendered tile pyramid.
    pub fn tiles(layer: &RasterLayer, template: String, min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            tile_path_template: Some(template),
            min_zoom: Some(min_zoom),
            max_zoom: Some(max_zoom),
            ..Self::for_layer(layer)
        }
    }

    /// Entry for a rendered overlay image.
    pub fn image(layer: &RasterLayer, image_path: String, bounds: GeoBounds) -> Self {
        Self {
            image_path: Some(image_path),
            bounds: Some(bounds),
            ..Self::for_layer(layer)
        }
    }
}

/// The persisted manifest document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    #[serde(default)]
    pub generated: String,
    /// Regional bounds (tile manifests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<GeoBounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zoom_range: Option<[u8; 2]>,
    #[serde(default)]
    pub layers: Vec<ManifestEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            generated: String::new(),
            bounds: None,
            zoom_range: None,
            layers: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl Manifest {
    pub fn entry(&self, id: &str) -> Option<&ManifestEntry> {
        self.layers.iter().find(|e| e.id == id)
    }

    /// Replace the entry with the same id in place, or append.
    ///
    /// Unknown fields of a replaced entry survive unless the new entry
    /// sets them.
    pub fn upsert(&mut self, mut entry: ManifestEntry) {
        match self.layers.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => {
                for (key, value) in std::mem::take(&mut existing.extra) {
                    entry.extra.entry(key).or_insert(value);
                }
                *existing = entry;
            }
            None => self.layers.push(entry),
        }
    }
}

/// Owns one manifest file for the duration of a run: load, merge, save.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    path: PathBuf,
    manifest: Manifest,
}

impl ManifestBuilder {
    /// Load the manifest at `path`; a missing file starts an empty one.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let manifest = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| PipelineError::ManifestRead {
                path: path.clone(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No existing manifest, starting empty");
                Manifest::default()
            }
            Err(e) => {
                return Err(PipelineError::ManifestRead {
                    path,
                    reason: e.to_string(),
                })
            }
        };
        Ok(Self { path, manifest })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.manifest.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.layers.is_empty()
    }

    /// Merge entries by id, keeping the position of existing ids.
    pub fn upsert<I: IntoIterator<Item = ManifestEntry>>(&mut self, entries: I) {
        for entry in entries {
            self.manifest.upsert(entry);
        }
    }

    /// Record the region and configured zoom range of a tile manifest.
    pub fn set_region(&mut self, bounds: GeoBounds, zoom_range: [u8; 2]) {
        self.manifest.bounds = Some(bounds);
        self.manifest.zoom_range = Some(zoom_range);
    }

    /// Stamp `generated` and write the manifest, replacing the old file
    /// only once the new one is complete.
    pub fn save(&mut self) -> Result<()> {
        self.manifest.generated = chrono::Utc::now().to_rfc3339();
        let write_err = |source| PipelineError::ManifestWrite {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(&self.manifest).map_err(|e| write_err(e.into()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, json).map_err(write_err)?;
        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(write_err(e));
        }

        info!(path = %self.path.display(), layers = self.manifest.layers.len(), "Saved manifest");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_colormap::presets;

    fn layer(id: &str) -> RasterLayer {
        RasterLayer {
            id: id.to_string(),
            title: format!("Layer {id}"),
            category: "forest".to_string(),
            year: Some(2020),
            description: String::new(),
            scheme_name: "plantation".to_string(),
            scheme: presets::require("plantation").unwrap(),
            source: PathBuf::from(format!("{id}.tif")),
        }
    }

    fn tiles(id: &str, max_zoom: u8) -> ManifestEntry {
        ManifestEntry::tiles(&layer(id), format!("/tiles/{id}/{{z}}/{{x}}/{{y}}.png"), 8, max_zoom)
    }

    #[test]
    fn upsert_replaces_in_place() {
        let mut m = Manifest::default();
        m.upsert(tiles("a", 9));
        m.upsert(tiles("b", 9));
        m.upsert(tiles("c", 9));
        assert_eq!(m.layers.len(), 3);

        m.upsert(tiles("b", 10));
        assert_eq!(m.layers.len(), 3);
        assert_eq!(m.layers[1].id, "b");
        assert_eq!(m.layers[1].max_zoom, Some(10));

        m.upsert(tiles("d", 9));
        assert_eq!(m.layers.len(), 4);
        assert_eq!(m.layers[3].id, "d");
    }

    #[test]
    fn upsert_keeps_unknown_fields() {
        let mut m = Manifest::default();
        let mut old = tiles("a", 9);
        old.extra.insert("attribution".into(), Value::from("ESA"));
        m.upsert(old);
        m.upsert(tiles("a", 10));
        assert_eq!(m.layers[0].extra.get("attribution"), Some(&Value::from("ESA")));
    }

    #[test]
    fn json_shape() {
        let mut m = Manifest::default();
        m.bounds = Some(GeoBounds::new(72.5, 8.0, 78.5, 21.5));
        m.zoom_range = Some([8, 10]);
        m.upsert(tiles("a", 10));
        m.upsert(ManifestEntry::image(&layer("b"), "/tiles/images/b.png".into(), GeoBounds::new(1.0, 2.0, 3.0, 4.0)));

        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["version"], "1.0");
        assert_eq!(v["zoomRange"], serde_json::json!([8, 10]));
        assert_eq!(v["layers"][0]["tilePathTemplate"], "/tiles/a/{z}/{x}/{y}.png");
        assert_eq!(v["layers"][0]["minZoom"], 8);
        assert_eq!(v["layers"][0]["colorScheme"], "plantation");
        assert!(v["layers"][0].get("imagePath").is_none());
        assert_eq!(v["layers"][1]["imagePath"], "/tiles/images/b.png");
        assert_eq!(v["layers"][1]["bounds"]["north"], 4.0);
    }

    #[test]
    fn year_omitted_when_unknown() {
        let mut undated = layer("a");
        undated.year = None;
        let entry = ManifestEntry::tiles(&undated, "/tiles/a/{z}/{x}/{y}.png".into(), 8, 9);
        let v = serde_json::to_value(&entry).unwrap();
        assert!(v.get("year").is_none());

        let v = serde_json::to_value(&tiles("b", 9)).unwrap();
        assert_eq!(v["year"], 2020);
        let back: ManifestEntry = serde_json::from_value(serde_json::to_value(&entry).unwrap()).unwrap();
        assert_eq!(back.year, None);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let builder = ManifestBuilder::load(dir.path().join("none.json")).unwrap();
        assert!(builder.is_empty());
        assert_eq!(builder.manifest().version, MANIFEST_VERSION);
    }

    #[test]
    fn corrupt_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(ManifestBuilder::load(&path), Err(PipelineError::ManifestRead { .. })));
    }

    #[test]
    fn save_then_merge_keeps_other_layers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/tile-manifest.json");

        let mut first = ManifestBuilder::load(&path).unwrap();
        first.upsert([tiles("a", 9), tiles("b", 9)]);
        first.save().unwrap();

        let mut second = ManifestBuilder::load(&path).unwrap();
        second.upsert([tiles("b", 10)]);
        second.save().unwrap();

        let reloaded = ManifestBuilder::load(&path).unwrap();
        let ids: Vec<_> = reloaded.manifest().layers.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(reloaded.manifest().entry("b").and_then(|e| e.max_zoom), Some(10));
        assert!(chrono::DateTime::parse_from_rfc3339(&reloaded.manifest().generated).is_ok());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn save_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should go cannot be replaced.
        let path = dir.path().join("occupied");
        std::fs::create_dir_all(path.join("child")).unwrap();
        let mut builder = ManifestBuilder::load(dir.path().join("other.json")).unwrap();
        builder.path = path;
        let err = builder.save().unwrap_err();
        assert!(err.is_fatal());
    }
}
