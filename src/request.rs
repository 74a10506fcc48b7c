//! Generation requests as callers submit them.
//!
//! Nothing here is validated yet; see [`crate::normalize`]. Field names follow the
//! editor's JSON (`errorCorrectionLevel`, `dotsStyle`, `colorStops`, ...) so requests can
//! be deserialized straight from it.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::QrError;
use crate::qrcode::QrCodeEcc;

/// A request for one styled QR image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Text to encode. Must not be empty.
    pub value: String,
    /// Edge length of the square output, in pixels. Signed so that nonsense input can
    /// be rejected by validation instead of by the type system of the caller.
    pub size: i64,
    #[serde(default)]
    pub error_correction_level: ErrorCorrectionLevel,
    #[serde(default)]
    pub style: Option<QrStyle>,
}

impl GenerationRequest {
    pub fn new(value: impl Into<String>, size: i64) -> Self {
        Self {
            value: value.into(),
            size,
            error_correction_level: ErrorCorrectionLevel::default(),
            style: None,
        }
    }

    pub fn with_error_correction(mut self, level: ErrorCorrectionLevel) -> Self {
        self.error_correction_level = level;
        self
    }

    pub fn with_style(mut self, style: QrStyle) -> Self {
        self.style = Some(style);
        self
    }
}

/// Error correction level, trading data capacity for damage tolerance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum ErrorCorrectionLevel {
    /// ~7% recovery
    L,
    /// ~15% recovery
    #[default]
    M,
    /// ~25% recovery
    Q,
    /// ~30% recovery
    H,
}

impl ErrorCorrectionLevel {
    /// Nominal fraction of the symbol that can be damaged and still decode.
    pub fn recovery_fraction(self) -> f32 {
        match self {
            Self::L => 0.07,
            Self::M => 0.15,
            Self::Q => 0.25,
            Self::H => 0.30,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::L => "L",
            Self::M => "M",
            Self::Q => "Q",
            Self::H => "H",
        }
    }
}

impl fmt::Display for ErrorCorrectionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCorrectionLevel {
    type Err = QrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "low" => Ok(Self::L),
            "m" | "medium" => Ok(Self::M),
            "q" | "quartile" => Ok(Self::Q),
            "h" | "high" => Ok(Self::H),
            _ => Err(QrError::InvalidErrorCorrection(s.to_string())),
        }
    }
}

impl TryFrom<String> for ErrorCorrectionLevel {
    type Error = QrError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ErrorCorrectionLevel> for QrCodeEcc {
    fn from(level: ErrorCorrectionLevel) -> Self {
        match level {
            ErrorCorrectionLevel::L => QrCodeEcc::Low,
            ErrorCorrectionLevel::M => QrCodeEcc::Medium,
            ErrorCorrectionLevel::Q => QrCodeEcc::Quartile,
            ErrorCorrectionLevel::H => QrCodeEcc::High,
        }
    }
}

/// Visual styling. Every field has a default, so an empty style and no style at all
/// describe the same image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QrStyle {
    pub dots_style: DotsStyle,
    pub corners_square_style: CornersSquareStyle,
    /// Solid dot color, used when there is no gradient.
    pub dots_color: String,
    pub background_color: String,
    pub dots_gradient: Option<Gradient>,
    pub logo: Option<Logo>,
    /// Quiet zone around the symbol, in modules.
    pub margin: u8,
}

impl Default for QrStyle {
    fn default() -> Self {
        Self {
            dots_style: DotsStyle::default(),
            corners_square_style: CornersSquareStyle::default(),
            dots_color: "#000000".to_string(),
            background_color: "#ffffff".to_string(),
            dots_gradient: None,
            logo: None,
            margin: 4,
        }
    }
}

/// Shape of ordinary data modules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DotsStyle {
    #[default]
    Square,
    Dots,
    Rounded,
    ExtraRounded,
    Classy,
    ClassyRounded,
}

/// Shape of the three finder patterns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CornersSquareStyle {
    #[default]
    Square,
    Dot,
    ExtraRounded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gradient {
    #[serde(rename = "type")]
    pub kind: GradientKind,
    /// Rotation of a linear gradient, in radians. Ignored for radial gradients.
    #[serde(default)]
    pub rotation: f32,
    pub color_stops: Vec<ColorStop>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientKind {
    Linear,
    Radial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    /// Position along the gradient, in [0, 1].
    pub offset: f32,
    pub color: String,
}

impl ColorStop {
    pub fn new(offset: f32, color: impl Into<String>) -> Self {
        Self {
            offset,
            color: color.into(),
        }
    }
}

/// An image composited over the center of the symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Logo {
    /// A `data:` URI or a filesystem path.
    pub source: String,
    /// Width as a fraction of the output size, in (0, 1].
    pub width: f32,
    /// Height as a fraction of the output size, in (0, 1].
    pub height: f32,
    /// Clear the modules underneath the logo before compositing it.
    #[serde(default = "default_hide_background_dots")]
    pub hide_background_dots: bool,
}

impl Logo {
    pub fn new(source: impl Into<String>, width: f32, height: f32) -> Self {
        Self {
            source: source.into(),
            width,
            height,
            hide_background_dots: true,
        }
    }
}

fn default_hide_background_dots() -> bool {
    true
}

/// An RGBA color, written as `#rgb`, `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Lower-case `#rrggbbaa`, the one spelling every equivalent input maps to.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
    }

    /// Channel-wise linear interpolation; `t` is clamped to [0, 1].
    pub fn lerp(self, other: Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * t).round() as u8;
        Color {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
            a: mix(self.a, other.a),
        }
    }
}

impl FromStr for Color {
    type Err = QrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || QrError::InvalidColor(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
        match hex.len() {
            3 => {
                let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).map(|v| v * 17).map_err(|_| invalid());
                Ok(Color::rgb(nibble(0)?, nibble(1)?, nibble(2)?))
            }
            6 => Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?)),
            8 => Ok(Color {
                r: channel(0)?,
                g: channel(2)?,
                b: channel(4)?,
                a: channel(6)?,
            }),
            _ => Err(invalid()),
        }
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl From<Color> for image::Rgba<u8> {
    fn from(c: Color) -> Self {
        image::Rgba([c.r, c.g, c.b, c.a])
    }
}
