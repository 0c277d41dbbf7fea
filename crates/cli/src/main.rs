//! Tessera CLI - render raster layers into web map tiles and overlays

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tessera_colormap::presets;
use tessera_core::{Deadline, GeoTiffBackend, RasterBackend};
use tessera_pipeline::{
    BatchObserver, BatchRunner, LayerSummary, OutputLayout, PipelineConfig, RasterLayer, RenderMode, TileKey,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "tessera")]
#[command(author, version, about = "Render rasters into web map tiles and overlays", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the layers of a configuration file
    Render {
        /// Configuration file (JSON)
        #[arg(short, long)]
        config: PathBuf,
        /// Output root directory
        #[arg(short, long, default_value = "public/data")]
        output: PathBuf,
        /// What to render: tiles, overlay, both
        #[arg(short, long, default_value = "both")]
        mode: String,
        /// Only render these layer ids (repeatable)
        #[arg(short, long = "layer")]
        layers: Vec<String>,
        /// Read sources through GDAL instead of the built-in GeoTIFF reader
        #[arg(long)]
        gdal: bool,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
        /// Longest side of the sample read used for statistics
        #[arg(short, long, default_value = "1024")]
        sample: usize,
        /// Read the file through GDAL instead of the built-in GeoTIFF reader
        #[arg(long)]
        gdal: bool,
    },
    /// List the built-in color scheme presets
    Schemes,
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} ({pos} tiles)")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Reports batch progress on a spinner.
struct ProgressObserver {
    pb: ProgressBar,
}

impl BatchObserver for ProgressObserver {
    fn layer_started(&self, layer: &RasterLayer, index: usize, total: usize) {
        self.pb.set_position(0);
        self.pb.set_message(format!("[{}/{}] {}", index + 1, total, layer.id));
    }

    fn tile_written(&self, _key: &TileKey) {
        self.pb.inc(1);
    }

    fn layer_finished(&self, summary: &LayerSummary) {
        let status = if summary.succeeded() { "done" } else { "skipped" };
        self.pb.println(format!("{}: {status}", summary.id));
    }
}

#[cfg(feature = "gdal")]
fn gdal_backend() -> Result<Box<dyn RasterBackend>> {
    Ok(Box::new(tessera_core::io::GdalBackend::new()))
}

#[cfg(not(feature = "gdal"))]
fn gdal_backend() -> Result<Box<dyn RasterBackend>> {
    anyhow::bail!("This build has no GDAL support; rebuild with --features gdal")
}

fn select_backend(gdal: bool, chunk_cache_capacity: usize) -> Result<Box<dyn RasterBackend>> {
    if gdal {
        return gdal_backend();
    }
    Ok(Box::new(GeoTiffBackend::new().with_chunk_cache(chunk_cache_capacity)))
}

fn select_layers(config: &PipelineConfig, only: &[String]) -> Result<Vec<RasterLayer>> {
    let layers = config.layers()?;
    if only.is_empty() {
        return Ok(layers);
    }
    if let Some(unknown) = only.iter().find(|id| !layers.iter().any(|l| &l.id == *id)) {
        anyhow::bail!("Layer '{}' is not in the configuration", unknown);
    }
    Ok(layers.into_iter().filter(|l| only.contains(&l.id)).collect())
}

fn render(
    config: &PipelineConfig,
    output: PathBuf,
    mode: &str,
    only: &[String],
    backend: &dyn RasterBackend,
) -> Result<()> {
    let mode: RenderMode = mode.parse()?;
    let layers = select_layers(config, only)?;
    info!(
        "Rendering {} layer(s) as {} with {} backend into {}",
        layers.len(),
        mode,
        backend.name(),
        output.display()
    );

    let start = Instant::now();
    let observer = ProgressObserver {
        pb: spinner("Starting..."),
    };
    let result = BatchRunner::new(config, backend, OutputLayout::new(&output))
        .with_mode(mode)
        .with_observer(&observer)
        .run(&layers);
    observer.pb.finish_and_clear();
    let summary = result.context("Batch failed")?;

    print!("{summary}");
    println!("Processing time: {:.2?}", start.elapsed());
    Ok(())
}

fn info_command(input: PathBuf, sample: usize, backend: &dyn RasterBackend) -> Result<()> {
    let mut handle = backend
        .open(&input, Deadline::none())
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let raster = handle.info().clone();
    let bounds = raster.bounds();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", raster.width, raster.height, raster.width * raster.height);
    println!(
        "Cell size: {} x {}",
        raster.transform.pixel_width,
        raster.transform.pixel_height.abs()
    );
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y
    );
    match &raster.crs {
        Some(crs) => {
            println!("CRS: {}", crs.identifier());
            let geo = backend.reproject_bounds(crs, &bounds, Deadline::none())?;
            println!(
                "WGS84 bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                geo.min_x, geo.min_y, geo.max_x, geo.max_y
            );
        }
        None => println!("CRS: none (cannot be published)"),
    }
    if let Some(nodata) = raster.nodata {
        println!("NoData: {}", nodata);
    }

    let (w, h) = tessera_pipeline::fit_dimensions(raster.width, raster.height, sample as u32);
    let stats = handle
        .read_decimated(w, h, Deadline::none())
        .context("Failed to read sample")?
        .statistics();
    println!("\nStatistics ({} x {} sample):", w, h);
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    println!("  Valid cells: {}", stats.valid_count);
    println!("  NoData cells: {}", stats.nodata_count);
    Ok(())
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Render {
            config,
            output,
            mode,
            layers,
            gdal,
        } => {
            let config = PipelineConfig::load(&config)
                .with_context(|| format!("Failed to load configuration {}", config.display()))?;
            let backend = select_backend(gdal, config.chunk_cache_capacity)?;
            render(&config, output, &mode, &layers, backend.as_ref())
        }

        Commands::Info { input, sample, gdal } => {
            let backend = select_backend(gdal, tessera_core::io::DEFAULT_CHUNK_CACHE_CAPACITY)?;
            info_command(input, sample, backend.as_ref())
        }

        Commands::Schemes => {
            for (name, scheme) in presets::all() {
                println!("{:<16} {}", name, scheme.kind());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_accepts_backend_switch() {
        let cli = Cli::try_parse_from(["tessera", "info", "dem.tif", "--gdal"]).unwrap();
        assert!(matches!(cli.command, Commands::Info { gdal: true, sample: 1024, .. }));
        let cli = Cli::try_parse_from(["tessera", "info", "dem.tif"]).unwrap();
        assert!(matches!(cli.command, Commands::Info { gdal: false, .. }));
    }

    #[test]
    fn backend_selection() {
        assert_eq!(select_backend(false, 8).unwrap().name(), "geotiff");
        match select_backend(true, 8) {
            Ok(backend) => assert!(cfg!(feature = "gdal") && backend.name() == "gdal"),
            Err(e) => assert!(!cfg!(feature = "gdal") && e.to_string().contains("GDAL")),
        }
    }
}
