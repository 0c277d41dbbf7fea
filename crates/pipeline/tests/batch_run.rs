//! End-to-end runs against in-memory and GeoTIFF rasters.

use ndarray::Array2;
use serde_json::Value;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tessera_colormap::{ColorScheme, Rgb, Rgba};
use tessera_core::io::{write_geotiff, GeoTiffOptions};
use tessera_core::tile::tile_covering;
use tessera_core::{
    BBox, Deadline, GeoTiffBackend, GeoTransform, MemoryBackend, MemoryRaster, RasterBackend, RasterHandle,
    RasterInfo, RawGrid, CRS,
};
use tessera_pipeline::{
    BatchObserver, BatchRunner, GeoBounds, LayerConfig, OutputLayout, PipelineConfig, PipelineError, PyramidBuilder,
    PyramidOptions, RenderMode, SkipReason, StepOutcome, TileCollector, TileKey, ZoomOutcome,
};

const GREEN: [u8; 4] = [0x9A, 0xCD, 0x32, 180];

fn footprint() -> BBox {
    BBox::new(72.0, 8.0, 82.0, 14.0)
}

/// Class 1 everywhere except a 10 x 10 block of class 0 in the north-west.
fn memory_raster() -> MemoryRaster {
    let data = Array2::from_shape_fn((60, 100), |(r, c)| if r < 10 && c < 10 { 0.0 } else { 1.0 });
    MemoryRaster::from_bounds(data, &footprint(), CRS::wgs84())
}

fn layer(id: &str, source: &str) -> LayerConfig {
    LayerConfig {
        id: id.to_string(),
        title: format!("{id} title"),
        category: "lulc".to_string(),
        year: Some(2020),
        description: String::new(),
        color_scheme: "binary".to_string(),
        source: source.into(),
    }
}

fn config(layers: Vec<LayerConfig>) -> PipelineConfig {
    let mut config = PipelineConfig::new(GeoBounds::from(footprint()), vec![5, 6]);
    config.max_overlay_dimension = 50;
    config
        .color_schemes
        .insert("binary".to_string(), ColorScheme::categorical([(1, Rgba::from_hex("#9ACD32").unwrap())]));
    config.layers = layers;
    config.validate().unwrap();
    config
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn run(config: &PipelineConfig, backend: &MemoryBackend, out: &TempDir, mode: RenderMode) -> tessera_pipeline::BatchSummary {
    BatchRunner::new(config, backend, OutputLayout::new(out.path()))
        .with_mode(mode)
        .run(&config.layers().unwrap())
        .unwrap()
}

#[test]
fn test_tiles_and_overlay_written() {
    let out = TempDir::new().unwrap();
    let backend = MemoryBackend::new().with_raster("mem/lulc", memory_raster());
    let config = config(vec![layer("lulc", "mem/lulc")]);

    let summary = run(&config, &backend, &out, RenderMode::Both);
    assert_eq!(summary.succeeded(), 1);
    assert_eq!(summary.manifests.len(), 2);

    let mut any_green = false;
    for zoom in [5, 6] {
        for tile in tile_covering(zoom, &footprint()).iter() {
            let path = out.path().join(format!("lulc/{}/{}/{}.png", tile.zoom, tile.x, tile.y));
            let png = image::open(&path).unwrap().to_rgba8();
            assert_eq!(png.dimensions(), (256, 256));
            any_green |= png.pixels().any(|p| p.0 == GREEN);
        }
    }
    assert!(any_green);

    let tiles = read_json(&out.path().join("tile-manifest.json"));
    assert_eq!(tiles["version"], "1.0");
    assert_eq!(tiles["zoomRange"], serde_json::json!([5, 6]));
    assert_eq!(tiles["bounds"]["west"], 72.0);
    let entry = &tiles["layers"][0];
    assert_eq!(entry["id"], "lulc");
    assert_eq!(entry["colorScheme"], "binary");
    assert_eq!(entry["tilePathTemplate"], "/tiles/lulc/{z}/{x}/{y}.png");
    assert_eq!((entry["minZoom"].as_u64(), entry["maxZoom"].as_u64()), (Some(5), Some(6)));
    assert!(chrono::DateTime::parse_from_rfc3339(tiles["generated"].as_str().unwrap()).is_ok());

    let overlay = image::open(out.path().join("images/lulc.png")).unwrap().to_rgba8();
    assert_eq!(overlay.dimensions(), (50, 30));
    assert_eq!(overlay.get_pixel(0, 0).0, [0, 0, 0, 0]);
    assert_eq!(overlay.get_pixel(49, 29).0, GREEN);

    let images = read_json(&out.path().join("images/image-manifest.json"));
    let entry = &images["layers"][0];
    assert_eq!(entry["imagePath"], "/tiles/images/lulc.png");
    let north = entry["bounds"]["north"].as_f64().unwrap();
    assert!((north - 14.0).abs() < 1e-6);
    assert!(entry.get("tilePathTemplate").is_none());
}

#[test]
fn test_pyramid_covers_every_tile() {
    let backend = MemoryBackend::new().with_raster("mem/lulc", memory_raster());
    let config = config(vec![layer("lulc", "mem/lulc")]);
    let layers = config.layers().unwrap();
    let builder = PyramidBuilder::new(
        &backend,
        PyramidOptions {
            region: footprint(),
            zoom_levels: vec![5, 6],
            tile_count_ceiling: 1000,
            timeout: config.operation_timeout(),
            domain_sample_dimension: 64,
        },
    );

    let mut sink = TileCollector::default();
    let report = builder.build(&layers[0], &mut sink).unwrap();

    let expected: Vec<TileKey> = [5, 6]
        .into_iter()
        .flat_map(|z| tile_covering(z, &footprint()).iter().collect::<Vec<_>>())
        .map(|t| TileKey::new("lulc", t))
        .collect();
    let written: Vec<TileKey> = sink.tiles.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(written, expected);
    assert_eq!(report.rendered_range(), Some((5, 6)));
    assert_eq!(report.tiles_rendered(), expected.len() as u64);
}

#[test]
fn test_manifest_merges_across_runs() {
    let out = TempDir::new().unwrap();
    let backend = MemoryBackend::new()
        .with_raster("mem/a", memory_raster())
        .with_raster("mem/b", memory_raster());

    run(&config(vec![layer("a", "mem/a"), layer("b", "mem/b")]), &backend, &out, RenderMode::Tiles);

    // Fields added by other tools survive a re-render.
    let manifest_path = out.path().join("tile-manifest.json");
    let mut doc = read_json(&manifest_path);
    doc["layers"][0]["legendUrl"] = Value::from("/legends/a.svg");
    std::fs::write(&manifest_path, serde_json::to_string(&doc).unwrap()).unwrap();

    let mut renamed = layer("a", "mem/a");
    renamed.title = "Renamed".to_string();
    run(&config(vec![renamed]), &backend, &out, RenderMode::Tiles);

    let doc = read_json(&manifest_path);
    let layers = doc["layers"].as_array().unwrap();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0]["id"], "a");
    assert_eq!(layers[0]["title"], "Renamed");
    assert_eq!(layers[0]["legendUrl"], "/legends/a.svg");
    assert_eq!(layers[1]["id"], "b");
    assert!(!out.path().join("images").exists());
}

#[test]
fn test_missing_source_does_not_stop_batch() {
    let out = TempDir::new().unwrap();
    let backend = MemoryBackend::new().with_raster("mem/lulc", memory_raster());
    let config = config(vec![layer("ghost", "mem/ghost"), layer("lulc", "mem/lulc")]);

    let summary = run(&config, &backend, &out, RenderMode::Both);
    assert_eq!((summary.succeeded(), summary.skipped()), (1, 1));
    assert!(!summary.layers[0].succeeded());
    assert!(summary.to_string().contains("ghost: skipped"));

    for manifest in ["tile-manifest.json", "images/image-manifest.json"] {
        let doc = read_json(&out.path().join(manifest));
        let ids: Vec<&str> = doc["layers"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|l| l["id"].as_str())
            .collect();
        assert_eq!(ids, vec!["lulc"]);
    }
    assert!(!out.path().join("ghost").exists());
}

#[test]
fn test_zoom_over_ceiling_is_skipped() {
    let out = TempDir::new().unwrap();
    let backend = MemoryBackend::new().with_raster("mem/lulc", memory_raster());
    let mut config = config(vec![layer("lulc", "mem/lulc")]);
    config.tile_count_ceiling = tile_covering(5, &footprint()).count();
    assert!(tile_covering(6, &footprint()).count() > config.tile_count_ceiling);

    let summary = run(&config, &backend, &out, RenderMode::Tiles);
    let zooms = &summary.layers[0].zooms;
    assert!(matches!(zooms[0].outcome, ZoomOutcome::Rendered { .. }));
    assert!(matches!(
        zooms[1].outcome,
        ZoomOutcome::Skipped(SkipReason::TileCountExceeded { .. })
    ));
    assert!(!out.path().join("lulc/6").exists());

    let doc = read_json(&out.path().join("tile-manifest.json"));
    assert_eq!(doc["layers"][0]["maxZoom"], 5);
}

#[test]
fn test_layer_outside_region_gets_no_entry() {
    let out = TempDir::new().unwrap();
    let far = MemoryRaster::from_bounds(Array2::from_elem((10, 10), 1.0), &BBox::new(-10.0, 40.0, 0.0, 50.0), CRS::wgs84());
    let backend = MemoryBackend::new().with_raster("mem/far", far);

    let summary = run(&config(vec![layer("far", "mem/far")]), &backend, &out, RenderMode::Tiles);
    assert_eq!(summary.skipped(), 1);
    let doc = read_json(&out.path().join("tile-manifest.json"));
    assert!(doc["layers"].as_array().unwrap().is_empty());
}

#[test]
fn test_corrupt_manifest_stops_before_rendering() {
    let out = TempDir::new().unwrap();
    std::fs::write(out.path().join("tile-manifest.json"), "{ not json").unwrap();
    let backend = MemoryBackend::new().with_raster("mem/lulc", memory_raster());
    let config = config(vec![layer("lulc", "mem/lulc")]);

    let err = BatchRunner::new(&config, &backend, OutputLayout::new(out.path()))
        .run(&config.layers().unwrap())
        .unwrap_err();
    assert!(matches!(err, PipelineError::ManifestRead { .. }));
    assert!(!out.path().join("lulc").exists());
}

#[derive(Default)]
struct Counter {
    started: Cell<usize>,
    tiles: Cell<usize>,
    finished: Cell<usize>,
}

impl BatchObserver for Counter {
    fn layer_started(&self, _layer: &tessera_pipeline::RasterLayer, _index: usize, total: usize) {
        assert_eq!(total, 1);
        self.started.set(self.started.get() + 1);
    }

    fn tile_written(&self, _key: &TileKey) {
        self.tiles.set(self.tiles.get() + 1);
    }

    fn layer_finished(&self, _summary: &tessera_pipeline::LayerSummary) {
        self.finished.set(self.finished.get() + 1);
    }
}

#[test]
fn test_observer_sees_every_tile() {
    let out = TempDir::new().unwrap();
    let backend = MemoryBackend::new().with_raster("mem/lulc", memory_raster());
    let config = config(vec![layer("lulc", "mem/lulc")]);
    let counter = Counter::default();

    BatchRunner::new(&config, &backend, OutputLayout::new(out.path()))
        .with_observer(&counter)
        .run(&config.layers().unwrap())
        .unwrap();

    let expected = tile_covering(5, &footprint()).count() + tile_covering(6, &footprint()).count();
    assert_eq!(counter.tiles.get() as u64, expected);
    assert_eq!((counter.started.get(), counter.finished.get()), (1, 1));
}

#[test]
fn test_geotiff_gradient_overlay() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("height.tif");
    let data = Array2::from_shape_fn((60, 100), |(_, c)| (c + 1) as f64);
    let grid = RawGrid::from_array(data)
        .with_georef(GeoTransform::new(72.0, 14.0, 0.1, -0.1), Some(CRS::wgs84()))
        .with_nodata(Some(-9999.0));
    write_geotiff(&grid, &source, &GeoTiffOptions { rows_per_strip: Some(8) }).unwrap();

    let mut config = config(Vec::new());
    config.color_schemes.insert(
        "height".to_string(),
        ColorScheme::gradient(Rgb::from_hex("#000000").unwrap(), Rgb::from_hex("#FFFFFF").unwrap(), 200),
    );
    let mut height = layer("height", "unused");
    height.color_scheme = "height".to_string();
    height.source = source;
    config.layers = vec![height];

    let out = TempDir::new().unwrap();
    let backend = GeoTiffBackend::new();
    let summary = BatchRunner::new(&config, &backend, OutputLayout::new(out.path().join("public")))
        .with_mode(RenderMode::Overlay)
        .run(&config.layers().unwrap())
        .unwrap();
    assert_eq!(summary.succeeded(), 1);

    let png = image::open(out.path().join("public/images/height.png")).unwrap().to_rgba8();
    assert_eq!(png.dimensions(), (50, 30));
    let west = png.get_pixel(0, 15).0;
    let east = png.get_pixel(49, 15).0;
    assert_eq!(west[3], 200);
    assert!(west[0] < east[0]);
    assert!(!out.path().join("public/tile-manifest.json").exists());
}

/// Backend whose window reads fail for windows wider than `wider_than`
/// metres, so whole zoom levels fail while finer ones still read.
struct FailingWindows {
    inner: MemoryBackend,
    wider_than: f64,
    timeout: bool,
}

struct FailingHandle {
    inner: Box<dyn RasterHandle>,
    wider_than: f64,
    timeout: bool,
}

impl RasterBackend for FailingWindows {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn open(&self, path: &Path, deadline: Deadline) -> tessera_core::Result<Box<dyn RasterHandle>> {
        Ok(Box::new(FailingHandle {
            inner: self.inner.open(path, deadline)?,
            wider_than: self.wider_than,
            timeout: self.timeout,
        }))
    }
}

impl RasterHandle for FailingHandle {
    fn info(&self) -> &RasterInfo {
        self.inner.info()
    }

    fn read_decimated(&mut self, width: usize, height: usize, deadline: Deadline) -> tessera_core::Result<RawGrid> {
        self.inner.read_decimated(width, height, deadline)
    }

    fn read_window(
        &mut self,
        window: &BBox,
        window_crs: &CRS,
        width: usize,
        height: usize,
        deadline: Deadline,
    ) -> tessera_core::Result<RawGrid> {
        if window.width() > self.wider_than {
            return Err(match self.timeout {
                true => tessera_core::Error::Timeout {
                    operation: "read window",
                    limit: Duration::ZERO,
                },
                false => tessera_core::Error::Tiff("corrupt strip".to_string()),
            });
        }
        self.inner.read_window(window, window_crs, width, height, deadline)
    }
}

fn failing_zoom_five(timeout: bool) -> FailingWindows {
    // Zoom 5 tiles are ~1252 km wide in Web Mercator, zoom 6 ~626 km.
    FailingWindows {
        inner: MemoryBackend::new()
            .with_raster("mem/a", memory_raster())
            .with_raster("mem/b", memory_raster()),
        wider_than: 900_000.0,
        timeout,
    }
}

#[test]
fn test_failed_zoom_skips_only_that_level() {
    for timeout in [true, false] {
        let out = TempDir::new().unwrap();
        let backend = failing_zoom_five(timeout);
        let config = config(vec![layer("a", "mem/a"), layer("b", "mem/b")]);

        let summary = BatchRunner::new(&config, &backend, OutputLayout::new(out.path()))
            .run(&config.layers().unwrap())
            .unwrap();

        assert_eq!(summary.succeeded(), 2);
        for result in &summary.layers {
            let expected = match timeout {
                true => SkipReason::Timeout,
                false => SkipReason::ReadFailed("TIFF error: corrupt strip".to_string()),
            };
            assert_eq!(result.zooms[0].outcome, ZoomOutcome::Skipped(expected));
            assert!(matches!(result.zooms[1].outcome, ZoomOutcome::Rendered { tiles } if tiles > 0));
        }
        assert!(!out.path().join("a/5").exists());
        assert!(out.path().join("b/6").is_dir());

        let doc = read_json(&out.path().join("tile-manifest.json"));
        for entry in doc["layers"].as_array().unwrap() {
            assert_eq!((entry["minZoom"].as_u64(), entry["maxZoom"].as_u64()), (Some(6), Some(6)));
        }
    }
}

#[test]
fn test_layer_without_usable_crs_is_skipped() {
    let out = TempDir::new().unwrap();
    let data = Array2::from_elem((60, 100), 1.0);
    let transform = GeoTransform::new(72.0, 14.0, 0.1, -0.1);
    let backend = MemoryBackend::new()
        .with_raster("mem/nocrs", MemoryRaster::new(data.clone(), transform, None))
        .with_raster(
            "mem/wkt",
            MemoryRaster::new(data, transform, Some(CRS::from_wkt("LOCAL_CS[\"engineering\"]"))),
        )
        .with_raster("mem/lulc", memory_raster());
    let config = config(vec![
        layer("nocrs", "mem/nocrs"),
        layer("wkt", "mem/wkt"),
        layer("lulc", "mem/lulc"),
    ]);

    let summary = run(&config, &backend, &out, RenderMode::Both);
    assert_eq!((summary.succeeded(), summary.skipped()), (1, 2));
    for skipped in &summary.layers[..2] {
        for step in [&skipped.tiles, &skipped.overlay] {
            let Some(StepOutcome::Skipped(reason)) = step else {
                panic!("{} should be skipped, got {step:?}", skipped.id);
            };
            assert!(reason.starts_with("reprojection failed"), "{reason}");
        }
    }
    let StepOutcome::Skipped(reason) = summary.layers[0].tiles.as_ref().unwrap() else {
        unreachable!()
    };
    assert!(reason.contains("declares no coordinate reference system"));

    let doc = read_json(&out.path().join("tile-manifest.json"));
    assert_eq!(doc["layers"].as_array().unwrap().len(), 1);
    assert_eq!(doc["layers"][0]["id"], "lulc");
}

#[test]
fn test_projected_source_renders_tiles() {
    // UTM zone 43N, roughly lon 73.2..76.8, lat 8.1..13.6.
    let utm = BBox::new(300_000.0, 900_000.0, 700_000.0, 1_500_000.0);
    let raster = MemoryRaster::from_bounds(Array2::from_elem((60, 40), 1.0), &utm, CRS::from_epsg(32643));
    let backend = MemoryBackend::new().with_raster("mem/utm", raster);
    let config = config(vec![layer("utm", "mem/utm")]);
    let builder = PyramidBuilder::new(
        &backend,
        PyramidOptions {
            region: footprint(),
            zoom_levels: vec![5, 6],
            tile_count_ceiling: 1000,
            timeout: config.operation_timeout(),
            domain_sample_dimension: 64,
        },
    );

    let mut sink = TileCollector::default();
    let report = builder.build(&config.layers().unwrap()[0], &mut sink).unwrap();

    let b = report.bounds;
    assert!(b.min_x > 72.5 && b.max_x < 77.5, "{b:?}");
    assert!(b.min_y > 7.5 && b.max_y < 14.0, "{b:?}");
    assert_eq!(report.rendered_range(), Some((5, 6)));

    let expected: usize = [5, 6].into_iter().map(|z| tile_covering(z, &b).count() as usize).sum();
    assert_eq!(sink.tiles.len(), expected);
    assert!(sink
        .tiles
        .iter()
        .any(|(_, rgba)| rgba.as_bytes().chunks_exact(4).any(|p| p == GREEN)));
}

fn collect_pngs(dir: &Path, found: &mut BTreeMap<PathBuf, Vec<u8>>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_pngs(&path, found);
        } else if path.extension().is_some_and(|e| e == "png") {
            found.insert(path.clone(), std::fs::read(&path).unwrap());
        }
    }
}

#[test]
fn test_rerun_writes_identical_tiles() {
    let out = TempDir::new().unwrap();
    let backend = MemoryBackend::new().with_raster("mem/lulc", memory_raster());
    let config = config(vec![layer("lulc", "mem/lulc")]);

    run(&config, &backend, &out, RenderMode::Both);
    let mut first = BTreeMap::new();
    collect_pngs(out.path(), &mut first);

    run(&config, &backend, &out, RenderMode::Both);
    let mut second = BTreeMap::new();
    collect_pngs(out.path(), &mut second);

    assert!(first.len() > 1);
    assert_eq!(first, second);
}
