//! Color schemes: categorical tables, two-anchor gradients and composite
//! class codes.
//!
//! Schemes are plain values deserialized from configuration. Colors are
//! written as hex strings: `#RRGGBB` (overlay alpha 180), `#RRGGBBAA`, or
//! `transparent`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Alpha applied to colors written without an explicit alpha channel.
pub const DEFAULT_ALPHA: u8 = 180;

/// Errors from parsing or validating color schemes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ColorError {
    #[error("invalid color '{0}': expected #RRGGBB, #RRGGBBAA or 'transparent'")]
    InvalidHex(String),

    #[error("invalid gradient domain: min {min} must be finite and not above max {max}")]
    InvalidDomain { min: f64, max: f64 },

    #[error("composite scheme must define at least one class")]
    EmptyComposite,

    #[error("composite class code {0} must be positive")]
    InvalidClassCode(i64),

    #[error("unknown color scheme '{0}'")]
    UnknownScheme(String),
}

/// RGB color as (r, g, b) with values in 0..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB`.
    pub fn from_hex(s: &str) -> Result<Self, ColorError> {
        match *parse_hex(s)?.as_slice() {
            [r, g, b] => Ok(Self::new(r, g, b)),
            _ => Err(ColorError::InvalidHex(s.to_string())),
        }
    }

    pub const fn with_alpha(self, a: u8) -> Rgba {
        Rgba::new(self.r, self.g, self.b, a)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Rgb {
    type Error = ColorError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<Rgb> for String {
    fn from(c: Rgb) -> Self {
        c.to_string()
    }
}

/// RGBA color with straight (non-premultiplied) alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Fully transparent black (used for nodata and unmapped values).
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    /// Parse `#RRGGBB` (alpha [`DEFAULT_ALPHA`]), `#RRGGBBAA` or `transparent`.
    pub fn from_hex(s: &str) -> Result<Self, ColorError> {
        if s.eq_ignore_ascii_case("transparent") {
            return Ok(Self::TRANSPARENT);
        }
        match *parse_hex(s)?.as_slice() {
            [r, g, b] => Ok(Self::new(r, g, b, DEFAULT_ALPHA)),
            [r, g, b, a] => Ok(Self::new(r, g, b, a)),
            _ => Err(ColorError::InvalidHex(s.to_string())),
        }
    }

    pub const fn is_transparent(&self) -> bool {
        self.a == 0
    }

    pub const fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.a {
            0 if *self == Self::TRANSPARENT => f.write_str("transparent"),
            DEFAULT_ALPHA => write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b),
            a => write!(f, "#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, a),
        }
    }
}

impl TryFrom<String> for Rgba {
    type Error = ColorError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<Rgba> for String {
    fn from(c: Rgba) -> Self {
        c.to_string()
    }
}

/// Decode `#` followed by 6 or 8 hex digits into 3 or 4 bytes.
fn parse_hex(s: &str) -> Result<Vec<u8>, ColorError> {
    let invalid = || ColorError::InvalidHex(s.to_string());
    let digits = s.strip_prefix('#').ok_or_else(invalid)?;
    if !matches!(digits.len(), 6 | 8) || !digits.is_ascii() {
        return Err(invalid());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid()))
        .collect()
}

/// Inclusive value range a gradient is stretched over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueDomain {
    pub min: f64,
    pub max: f64,
}

impl ValueDomain {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Position of `v` in the domain, clamped to `[0, 1]`. A degenerate
    /// domain maps everything to 0.
    pub fn normalize(&self, v: f64) -> f64 {
        let range = self.max - self.min;
        if range > 0.0 {
            ((v - self.min) / range).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    fn validate(&self) -> Result<(), ColorError> {
        if self.min.is_finite() && self.max.is_finite() && self.min <= self.max {
            Ok(())
        } else {
            Err(ColorError::InvalidDomain {
                min: self.min,
                max: self.max,
            })
        }
    }
}

fn default_alpha() -> u8 {
    DEFAULT_ALPHA
}

/// How raw values become colors.
///
/// ```ignore
/// {"type": "categorical", "classes": {"1": "#FF0000", "2": "#00FF00"}}
/// {"type": "gradient", "from": "#326432", "to": "#00FF00", "alpha": 180}
/// {"type": "composite", "classes": {"1": "#006400B4", "2": "#228B22B4"}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ColorScheme {
    /// Integer class value to color; absent values are transparent.
    Categorical {
        #[serde(with = "class_table")]
        classes: BTreeMap<i64, Rgba>,
    },
    /// Linear interpolation between two anchors over a value domain.
    Gradient {
        from: Rgb,
        to: Rgb,
        #[serde(default = "default_alpha")]
        alpha: u8,
        /// Fixed domain; computed from the data when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        domain: Option<ValueDomain>,
    },
    /// Small closed set of positive class/confidence codes.
    Composite {
        #[serde(with = "class_table")]
        classes: BTreeMap<i64, Rgba>,
    },
}

impl ColorScheme {
    pub fn categorical<I>(classes: I) -> Self
    where
        I: IntoIterator<Item = (i64, Rgba)>,
    {
        Self::Categorical {
            classes: classes.into_iter().collect(),
        }
    }

    pub fn gradient(from: Rgb, to: Rgb, alpha: u8) -> Self {
        Self::Gradient {
            from,
            to,
            alpha,
            domain: None,
        }
    }

    pub fn composite<I>(classes: I) -> Self
    where
        I: IntoIterator<Item = (i64, Rgba)>,
    {
        Self::Composite {
            classes: classes.into_iter().collect(),
        }
    }

    /// Variant name as written in configuration.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Categorical { .. } => "categorical",
            Self::Gradient { .. } => "gradient",
            Self::Composite { .. } => "composite",
        }
    }

    pub fn is_gradient(&self) -> bool {
        matches!(self, Self::Gradient { .. })
    }

    /// Domain fixed in the scheme itself, if any.
    pub fn declared_domain(&self) -> Option<ValueDomain> {
        match self {
            Self::Gradient { domain, .. } => *domain,
            _ => None,
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), ColorError> {
        match self {
            Self::Categorical { .. } => Ok(()),
            Self::Gradient { domain, .. } => domain.as_ref().map_or(Ok(()), ValueDomain::validate),
            Self::Composite { classes } => {
                if classes.is_empty() {
                    return Err(ColorError::EmptyComposite);
                }
                match classes.keys().find(|&&code| code <= 0) {
                    Some(&code) => Err(ColorError::InvalidClassCode(code)),
                    None => Ok(()),
                }
            }
        }
    }
}

/// Class tables keyed by integer code, written with string keys in JSON.
///
/// Internally tagged enums buffer their content, which loses the ability to
/// read integer map keys from JSON strings, so keys are parsed here.
mod class_table {
    use super::Rgba;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(classes: &BTreeMap<i64, Rgba>, serializer: S) -> Result<S::Ok, S::Error> {
        let table: BTreeMap<String, Rgba> = classes.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        table.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<i64, Rgba>, D::Error> {
        BTreeMap::<String, Rgba>::deserialize(deserializer)?
            .into_iter()
            .map(|(k, v)| {
                k.trim()
                    .parse::<i64>()
                    .map(|code| (code, v))
                    .map_err(|_| D::Error::custom(format!("class code '{k}' is not an integer")))
            })
            .collect()
    }
}
