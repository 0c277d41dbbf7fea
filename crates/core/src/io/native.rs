//! Native GeoTIFF access (without GDAL dependency)
//!
//! Uses the `tiff` crate to decode one strip or tile at a time, so reads
//! never hold more than one chunk plus the output grid (decimated reads) or
//! a bounded LRU of chunks (window reads).

use super::cache::{Chunk, ChunkCache};
use super::geokeys::{self, GeoTiffMeta};
use super::{
    check_output_size, chunk_runs, decimated_transform, decimation_indices, window_pixel_map,
    RasterBackend, RasterHandle, RasterInfo,
};
use crate::bbox::BBox;
use crate::crs::CRS;
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RawGrid};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;
use tracing::debug;

/// Chunks kept per handle for window reads unless configured otherwise.
pub const DEFAULT_CHUNK_CACHE_CAPACITY: usize = 64;

/// Opens GeoTIFF files with the pure-Rust `tiff` decoder.
#[derive(Debug, Clone)]
pub struct GeoTiffBackend {
    chunk_cache_capacity: usize,
}

impl GeoTiffBackend {
    pub fn new() -> Self {
        Self {
            chunk_cache_capacity: DEFAULT_CHUNK_CACHE_CAPACITY,
        }
    }

    /// Number of decoded chunks each handle may keep for window reads.
    pub fn with_chunk_cache(mut self, capacity: usize) -> Self {
        self.chunk_cache_capacity = capacity;
        self
    }
}

impl Default for GeoTiffBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterBackend for GeoTiffBackend {
    fn name(&self) -> &'static str {
        "geotiff"
    }

    fn open(&self, path: &Path, deadline: Deadline) -> Result<Box<dyn RasterHandle>> {
        deadline.check("open raster")?;
        let handle = GeoTiffHandle::open(path, self.chunk_cache_capacity)?;
        deadline.check("open raster")?;
        Ok(Box::new(handle))
    }
}

/// Strip or tile geometry of the first image in the file.
#[derive(Debug, Clone, Copy)]
struct ChunkLayout {
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
    /// Interleaved samples per pixel inside one chunk
    samples: usize,
}

impl ChunkLayout {
    fn index(&self, chunk_row: usize, chunk_col: usize) -> u32 {
        (chunk_row * self.chunks_across + chunk_col) as u32
    }
}

/// An open GeoTIFF. Only the first band is read.
pub struct GeoTiffHandle {
    decoder: Decoder<BufReader<File>>,
    info: RasterInfo,
    layout: ChunkLayout,
    cache: ChunkCache,
}

impl GeoTiffHandle {
    fn open(path: &Path, cache_capacity: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound | ErrorKind::PermissionDenied => Error::SourceNotFound {
                path: path.to_path_buf(),
            },
            _ => Error::Io(e),
        })?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .map_err(|e| Error::Tiff(format!("{}: {}", path.display(), e)))?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions()?;
        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        let (width, height) = (width as usize, height as usize);
        check_output_size(width, height)?;

        let planar_separate = decoder
            .get_tag_u32(Tag::PlanarConfiguration)
            .map(|p| p == 2)
            .unwrap_or(false);
        let samples = if planar_separate {
            1
        } else {
            decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1).max(1) as usize
        };

        let layout = ChunkLayout {
            chunk_width: chunk_width.max(1) as usize,
            chunk_height: chunk_height.max(1) as usize,
            chunks_across: width.div_ceil(chunk_width.max(1) as usize),
            samples,
        };

        let GeoTiffMeta { transform, crs, nodata } = geokeys::read_geo_meta(&mut decoder);
        let info = RasterInfo {
            path: path.to_path_buf(),
            crs,
            width,
            height,
            transform: transform.unwrap_or_default(),
            nodata,
        };
        debug!(
            path = %path.display(),
            width,
            height,
            chunk_width = layout.chunk_width,
            chunk_height = layout.chunk_height,
            crs = ?info.crs.as_ref().map(CRS::identifier),
            "Opened GeoTIFF"
        );

        Ok(Self {
            decoder,
            info,
            layout,
            cache: ChunkCache::new(cache_capacity),
        })
    }
}

impl RasterHandle for GeoTiffHandle {
    fn info(&self) -> &RasterInfo {
        &self.info
    }

    fn read_decimated(&mut self, width: usize, height: usize, deadline: Deadline) -> Result<RawGrid> {
        check_output_size(width, height)?;
        let rows = decimation_indices(self.info.height, height);
        let cols = decimation_indices(self.info.width, width);
        let row_runs = chunk_runs(&rows, self.layout.chunk_height);
        let col_runs = chunk_runs(&cols, self.layout.chunk_width);

        let mut out = Array2::from_elem((height, width), self.info.fill_value());
        // Each chunk that contributes is decoded exactly once and dropped
        // before the next one.
        for (chunk_row, out_rows) in &row_runs {
            for (chunk_col, out_cols) in &col_runs {
                deadline.check("read decimated")?;
                let index = self.layout.index(*chunk_row, *chunk_col);
                let chunk = decode_chunk(&mut self.decoder, &self.layout, index)?;
                let row0 = chunk_row * self.layout.chunk_height;
                let col0 = chunk_col * self.layout.chunk_width;
                for i in out_rows.clone() {
                    for j in out_cols.clone() {
                        out[[i, j]] = chunk.value(rows[i] - row0, cols[j] - col0);
                    }
                }
            }
        }

        Ok(RawGrid::from_array(out)
            .with_georef(decimated_transform(&self.info, width, height), self.info.crs.clone())
            .with_nodata(self.info.nodata))
    }

    fn read_window(
        &mut self,
        window: &BBox,
        window_crs: &CRS,
        width: usize,
        height: usize,
        deadline: Deadline,
    ) -> Result<RawGrid> {
        let pixels = window_pixel_map(&self.info, window, window_crs, width, height, deadline)?;
        let fill = self.info.fill_value();
        let mut data = Vec::with_capacity(pixels.len());
        for pixel in pixels {
            let Some((col, row)) = pixel else {
                data.push(fill);
                continue;
            };
            let chunk_row = row / self.layout.chunk_height;
            let chunk_col = col / self.layout.chunk_width;
            let index = self.layout.index(chunk_row, chunk_col);
            if !self.cache.contains(index) {
                deadline.check("read window")?;
                let chunk = decode_chunk(&mut self.decoder, &self.layout, index)?;
                self.cache.insert(index, chunk);
            }
            let value = self
                .cache
                .get(index)
                .map(|c| {
                    c.value(
                        row - chunk_row * self.layout.chunk_height,
                        col - chunk_col * self.layout.chunk_width,
                    )
                })
                .unwrap_or(fill);
            data.push(value);
        }

        Ok(RawGrid::from_vec(data, height, width)?
            .with_georef(GeoTransform::from_bounds(window, width, height), Some(window_crs.clone()))
            .with_nodata(self.info.nodata))
    }
}

/// Decode one strip/tile and keep only the first band as `f64`.
fn decode_chunk<R: Read + Seek>(decoder: &mut Decoder<R>, layout: &ChunkLayout, index: u32) -> Result<Chunk> {
    let (data_width, _) = decoder.chunk_data_dimensions(index);
    let result = decoder.read_chunk(index)?;
    let values = first_band(result, layout.samples)?;

    // Tiles come back padded to the full tile size, strips do not.
    let padded = layout.chunk_width * layout.chunk_height;
    let stride = if values.len() >= padded {
        layout.chunk_width
    } else {
        data_width as usize
    };
    Ok(Chunk::new(values, stride))
}

fn first_band(result: DecodingResult, samples: usize) -> Result<Vec<f64>> {
    macro_rules! take {
        ($buf:expr) => {
            $buf.iter().step_by(samples).map(|&v| v as f64).collect()
        };
    }
    let values: Vec<f64> = match result {
        DecodingResult::U8(buf) => take!(buf),
        DecodingResult::U16(buf) => take!(buf),
        DecodingResult::U32(buf) => take!(buf),
        DecodingResult::U64(buf) => take!(buf),
        DecodingResult::I8(buf) => take!(buf),
        DecodingResult::I16(buf) => take!(buf),
        DecodingResult::I32(buf) => take!(buf),
        DecodingResult::I64(buf) => take!(buf),
        DecodingResult::F32(buf) => take!(buf),
        DecodingResult::F64(buf) => take!(buf),
        #[allow(unreachable_patterns)]
        _ => return Err(Error::UnsupportedDataType("unsupported TIFF sample format".to_string())),
    };
    Ok(values)
}

/// Options for writing GeoTIFF files
#[derive(Debug, Clone, Default)]
pub struct GeoTiffOptions {
    /// Rows per strip; the encoder default when `None`
    pub rows_per_strip: Option<u32>,
}

/// Write a north-up grid as a single-band 32-bit float GeoTIFF.
///
/// Writes pixel scale, tiepoint, an EPSG GeoKeyDirectory when the grid's
/// CRS has a code, and GDAL_NODATA when the grid has a nodata value.
pub fn write_geotiff<P: AsRef<Path>>(grid: &RawGrid, path: P, options: &GeoTiffOptions) -> Result<()> {
    let file = File::create(path.as_ref())?;
    encode_geotiff(grid, file, options)
}

pub(crate) fn encode_geotiff<W: Write + Seek>(grid: &RawGrid, writer: W, options: &GeoTiffOptions) -> Result<()> {
    let mut encoder = TiffEncoder::new(writer)?;
    let (rows, cols) = grid.shape();
    let data: Vec<f32> = grid.data().iter().map(|&v| v as f32).collect();

    let mut image = encoder.new_image::<Gray32Float>(cols as u32, rows as u32)?;
    if let Some(n) = options.rows_per_strip {
        image.rows_per_strip(n)?;
    }

    let gt = grid.transform();
    let scale = [gt.pixel_width, gt.pixel_height.abs(), 0.0];
    image.encoder().write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
    let tiepoint = [0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
    image.encoder().write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;

    let geokeys = geo_key_directory(grid.crs());
    image.encoder().write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])?;

    if let Some(nodata) = grid.nodata() {
        let text = nodata.to_string();
        image.encoder().write_tag(Tag::GdalNodata, text.as_str())?;
    }

    image.write_data(&data)?;
    Ok(())
}

fn geo_key_directory(crs: Option<&CRS>) -> Vec<u16> {
    let code = crs.and_then(CRS::epsg).and_then(|c| u16::try_from(c).ok());
    let geographic = crs.is_some_and(CRS::is_geographic);
    // GTModelTypeGeoKey: 1 projected, 2 geographic
    let model_type = if geographic { 2 } else { 1 };
    let mut keys: Vec<u16> = vec![
        1, 1, 0, 2, //
        1024, 0, 1, model_type, //
        1025, 0, 1, 1, // RasterPixelIsArea
    ];
    if let Some(code) = code {
        let key = if geographic { 2048 } else { 3072 };
        keys.extend_from_slice(&[key, 0, 1, code]);
        keys[3] = 3;
    }
    keys
}
