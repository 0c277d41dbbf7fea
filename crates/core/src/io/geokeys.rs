//! GeoTIFF georeferencing tags.
//!
//! Reads tags 33550 (ModelPixelScale), 33922 (ModelTiepoint),
//! 34264 (ModelTransformation), 34735 (GeoKeyDirectory) and
//! 42113 (GDAL_NODATA) through the `tiff` decoder.

use crate::crs::CRS;
use crate::raster::GeoTransform;
use std::io::{Read, Seek};
use tiff::decoder::Decoder;
use tiff::tags::Tag;

const GT_RASTER_TYPE: u16 = 1025;
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

/// Georeferencing read from a GeoTIFF IFD.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GeoTiffMeta {
    pub transform: Option<GeoTransform>,
    pub crs: Option<CRS>,
    pub nodata: Option<f64>,
}

pub(crate) fn read_geo_meta<R: Read + Seek>(decoder: &mut Decoder<R>) -> GeoTiffMeta {
    let keys = decoder
        .get_tag_u16_vec(Tag::GeoKeyDirectoryTag)
        .map(|raw| parse_key_directory(&raw))
        .unwrap_or_default();

    let mut transform = read_transform(decoder);
    if key_value(&keys, GT_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
        // Tiepoints refer to pixel centres; shift to the corner convention.
        transform = transform.map(|t| {
            let (x, y) = t.apply(-0.5, -0.5);
            GeoTransform { origin_x: x, origin_y: y, ..t }
        });
    }

    let crs = [PROJECTED_CS_TYPE, GEOGRAPHIC_TYPE]
        .iter()
        .filter_map(|&key| key_value(&keys, key))
        .find(|&code| code > 0 && code != USER_DEFINED)
        .map(|code| CRS::from_epsg(u32::from(code)));

    let nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| parse_nodata(&s));

    GeoTiffMeta { transform, crs, nodata }
}

/// ModelPixelScale + ModelTiepoint, falling back to ModelTransformation.
fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok();
    let tiepoint = decoder.get_tag_f64_vec(Tag::ModelTiepointTag).ok();

    if let (Some(scale), Some(tiepoint)) = (&scale, &tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            // tiepoint: [I, J, K, X, Y, Z]
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
        }
    }

    let matrix = decoder.get_tag_f64_vec(Tag::ModelTransformationTag).ok()?;
    if matrix.len() < 16 {
        return None;
    }
    // Row-major 4x4; only the first two rows matter for 2D.
    Some(GeoTransform {
        origin_x: matrix[3],
        origin_y: matrix[7],
        pixel_width: matrix[0],
        pixel_height: matrix[5],
        row_rotation: matrix[1],
        col_rotation: matrix[4],
    })
}

/// `(key id, value)` pairs for keys stored inline in the directory.
fn parse_key_directory(raw: &[u16]) -> Vec<(u16, u16)> {
    if raw.len() < 4 {
        return Vec::new();
    }
    let count = raw[3] as usize;
    raw[4..]
        .chunks_exact(4)
        .take(count)
        // location 0 means the value is stored in the entry itself
        .filter(|entry| entry[1] == 0)
        .map(|entry| (entry[0], entry[3]))
        .collect()
}

fn key_value(keys: &[(u16, u16)], key: u16) -> Option<u16> {
    keys.iter().find(|(id, _)| *id == key).map(|(_, v)| *v)
}

fn parse_nodata(s: &str) -> Option<f64> {
    let s = s.trim_end_matches('\0').trim();
    match s.to_ascii_lowercase().as_str() {
        "nan" => Some(f64::NAN),
        _ => s.parse::<f64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::native::{encode_geotiff, GeoTiffOptions};
    use crate::raster::RawGrid;
    use std::io::Cursor;

    fn decode_meta(grid: &RawGrid) -> GeoTiffMeta {
        let mut buf = Cursor::new(Vec::new());
        encode_geotiff(grid, &mut buf, &GeoTiffOptions::default()).unwrap();
        buf.set_position(0);
        let mut decoder = Decoder::new(buf).unwrap();
        read_geo_meta(&mut decoder)
    }

    #[test]
    fn written_tags_read_back() {
        let grid = RawGrid::filled(4, 6, 1.0)
            .with_georef(GeoTransform::new(72.0, 14.0, 0.5, -0.25), Some(CRS::wgs84()))
            .with_nodata(Some(-9999.0));
        let meta = decode_meta(&grid);

        assert_eq!(meta.crs.as_ref().and_then(CRS::epsg), Some(4326));
        assert_eq!(meta.nodata, Some(-9999.0));
        let t = meta.transform.unwrap();
        assert_eq!((t.origin_x, t.origin_y), (72.0, 14.0));
        assert_eq!((t.pixel_width, t.pixel_height), (0.5, -0.25));
    }

    #[test]
    fn projected_code_read_back() {
        let grid = RawGrid::filled(2, 2, 0.0)
            .with_georef(GeoTransform::new(500_000.0, 1_300_000.0, 30.0, -30.0), Some(CRS::from_epsg(32643)));
        let meta = decode_meta(&grid);
        assert_eq!(meta.crs.as_ref().and_then(CRS::epsg), Some(32643));
        assert_eq!(meta.nodata, None);
    }

    #[test]
    fn key_directory_inline_values() {
        let raw = [
            1, 1, 0, 3, //
            1024, 0, 1, 1, //
            3072, 0, 1, 32643, //
            3073, 34737, 10, 0,
        ];
        let keys = parse_key_directory(&raw);
        assert_eq!(keys, vec![(1024, 1), (3072, 32643)]);
        assert_eq!(key_value(&keys, PROJECTED_CS_TYPE), Some(32643));
        assert_eq!(key_value(&keys, GEOGRAPHIC_TYPE), None);
    }

    #[test]
    fn key_directory_truncated() {
        assert!(parse_key_directory(&[1, 1]).is_empty());
        assert_eq!(parse_key_directory(&[1, 1, 0, 5, 2048, 0, 1, 4326]), vec![(2048, 4326)]);
    }

    #[test]
    fn nodata_strings() {
        assert_eq!(parse_nodata("-9999\0"), Some(-9999.0));
        assert_eq!(parse_nodata(" 0 "), Some(0.0));
        assert!(parse_nodata("nan").is_some_and(f64::is_nan));
        assert_eq!(parse_nodata("none"), None);
    }
}
