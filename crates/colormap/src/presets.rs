//! Built-in schemes for land-cover and forest classification layers.

use crate::scheme::{ColorError, ColorScheme, Rgb, Rgba, DEFAULT_ALPHA};
use std::collections::BTreeMap;

/// Names of all built-in schemes.
pub const NAMES: &[&str] = &[
    "lulc",
    "trees",
    "built",
    "forest_class",
    "plantation",
    "old_growth",
    "forest_typology",
];

const fn hex(rgb: u32) -> Rgba {
    Rgba::new((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8, DEFAULT_ALPHA)
}

/// GLC-FCS30D land-cover classes (simplified).
const LULC: &[(i64, Rgba)] = &[
    (10, hex(0x419BDF)),  // water
    (20, hex(0x397D49)),  // trees (evergreen)
    (30, hex(0x88B053)),  // shrubland
    (40, hex(0x7A87C6)),  // grassland
    (50, hex(0xE49635)),  // cropland
    (60, hex(0xC4281B)),  // built-up
    (70, hex(0xA59B8F)),  // bare/sparse
    (80, hex(0xB39FE1)),  // wetland
    (90, hex(0xFFFFFF)),  // snow/ice
    (100, hex(0x397D49)), // forest
];

const BUILT: &[(i64, Rgba)] = &[
    (1, hex(0xFFD700)), // low density
    (2, hex(0xFF8C00)), // medium density
    (3, hex(0xFF0000)), // high density
];

const FOREST_CLASS: &[(i64, Rgba)] = &[
    (1, hex(0x006400)), // natural forest
    (2, hex(0x9ACD32)), // plantation
    (3, hex(0x228B22)), // mixed/uncertain
];

const PLANTATION: &[(i64, Rgba)] = &[(1, hex(0x9ACD32))];

const OLD_GROWTH: &[(i64, Rgba)] = &[(1, hex(0x004D00))];

/// Forest typology confidence codes.
const FOREST_TYPOLOGY: &[(i64, Rgba)] = &[
    (1, hex(0x006400)), // natural forest, high confidence
    (2, hex(0x228B22)), // natural forest, low confidence
    (3, hex(0x9ACD32)), // plantation
    (4, hex(0x90EE90)), // other forest
];

/// Built-in scheme by name.
pub fn preset(name: &str) -> Option<ColorScheme> {
    let scheme = match name {
        "lulc" => ColorScheme::categorical(LULC.iter().copied()),
        // Continuous tree cover / probability
        "trees" => ColorScheme::gradient(Rgb::new(50, 100, 50), Rgb::new(0, 255, 0), DEFAULT_ALPHA),
        "built" => ColorScheme::categorical(BUILT.iter().copied()),
        "forest_class" => ColorScheme::categorical(FOREST_CLASS.iter().copied()),
        "plantation" => ColorScheme::categorical(PLANTATION.iter().copied()),
        "old_growth" => ColorScheme::categorical(OLD_GROWTH.iter().copied()),
        "forest_typology" => ColorScheme::composite(FOREST_TYPOLOGY.iter().copied()),
        _ => return None,
    };
    Some(scheme)
}

/// Like [`preset`] but with an error naming the missing scheme.
pub fn require(name: &str) -> Result<ColorScheme, ColorError> {
    preset(name).ok_or_else(|| ColorError::UnknownScheme(name.to_string()))
}

/// Every built-in scheme keyed by name.
pub fn all() -> BTreeMap<String, ColorScheme> {
    NAMES
        .iter()
        .filter_map(|&name| preset(name).map(|s| (name.to_string(), s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_presets_valid() {
        let presets = all();
        assert_eq!(presets.len(), NAMES.len());
        for (name, scheme) in &presets {
            assert!(scheme.validate().is_ok(), "{name}");
        }
    }

    #[test]
    fn lulc_water() {
        let Some(ColorScheme::Categorical { classes }) = preset("lulc") else {
            panic!("lulc should be categorical");
        };
        assert_eq!(classes[&10], Rgba::from_hex("#419BDF").unwrap());
        assert_eq!(classes.len(), 10);
    }

    #[test]
    fn typology_is_composite() {
        let scheme = require("forest_typology").unwrap();
        assert_eq!(scheme.kind(), "composite");
        assert!(matches!(require("nope"), Err(ColorError::UnknownScheme(_))));
    }
}
