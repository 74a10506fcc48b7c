//! The symbol matrix seam between encoding and painting.

use async_trait::async_trait;

use crate::error::Result;
use crate::qrcode::{QrCode, Version};
use crate::request::ErrorCorrectionLevel;

/// Edge length of a finder pattern, in modules.
pub const FINDER_SIZE: i32 = 7;

/// A square grid of dark/light modules, prior to any styling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolMatrix {
    size: i32,
    modules: Vec<bool>,
}

impl SymbolMatrix {
    /// Builds a matrix by asking `dark` for every `(x, y)`.
    pub fn from_fn(size: i32, dark: impl Fn(i32, i32) -> bool) -> Self {
        let mut modules = Vec::with_capacity((size * size).max(0) as usize);
        for y in 0..size {
            for x in 0..size {
                modules.push(dark(x, y));
            }
        }
        Self { size, modules }
    }

    /// Edge length in modules.
    pub fn size(&self) -> i32 {
        self.size
    }

    /// `true` for a dark module; anything outside the grid is light.
    pub fn is_dark(&self, x: i32, y: i32) -> bool {
        let range = 0..self.size;
        range.contains(&x) && range.contains(&y) && self.modules[(y * self.size + x) as usize]
    }

    /// Which finder pattern (if any) covers `(x, y)`, as the finder's top-left module.
    pub fn finder_origin(&self, x: i32, y: i32) -> Option<(i32, i32)> {
        let far = self.size - FINDER_SIZE;
        [(0, 0), (far, 0), (0, far)]
            .into_iter()
            .find(|&(fx, fy)| (fx..fx + FINDER_SIZE).contains(&x) && (fy..fy + FINDER_SIZE).contains(&y))
    }

    pub fn dark_count(&self) -> usize {
        self.modules.iter().filter(|&&m| m).count()
    }

    /// Plain SVG rendering of the bare symbol, with `border` light modules around it.
    ///
    /// Uses Unix newlines regardless of platform. Handy for eyeballing encoder output.
    pub fn to_svg_string(&self, border: i32) -> String {
        let border = border.max(0);
        let dimension = self.size + border * 2;
        let mut result = String::new();
        result += "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
        result += &format!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" viewBox=\"0 0 {0} {0}\" stroke=\"none\">\n",
            dimension
        );
        result += "\t<rect width=\"100%\" height=\"100%\" fill=\"#FFFFFF\"/>\n";
        let path: Vec<String> = (0..self.size)
            .flat_map(|y| (0..self.size).map(move |x| (x, y)))
            .filter(|&(x, y)| self.is_dark(x, y))
            .map(|(x, y)| format!("M{},{}h1v1h-1z", x + border, y + border))
            .collect();
        result += &format!("\t<path d=\"{}\" fill=\"#000000\"/>\n", path.join(" "));
        result += "</svg>\n";
        result
    }
}

impl From<&QrCode> for SymbolMatrix {
    fn from(qr: &QrCode) -> Self {
        Self::from_fn(qr.size(), |x, y| qr.get_module(x, y))
    }
}

/// Turns a value into a symbol matrix.
///
/// This is the outbound encoder capability; the renderer never looks past it.
#[async_trait]
pub trait SymbolEncoder: Send + Sync + 'static {
    /// Fails with [`QrError::EncodingFailure`](crate::error::QrError::EncodingFailure)
    /// when the value does not fit at the requested level.
    async fn encode(&self, value: &str, level: ErrorCorrectionLevel) -> Result<SymbolMatrix>;
}

/// The built-in encoder backed by [`crate::qrcode`].
///
/// The requested level is honored exactly (no boosting) so that the level in the request
/// is the level in the image.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrEncoder;

#[async_trait]
impl SymbolEncoder for QrEncoder {
    async fn encode(&self, value: &str, level: ErrorCorrectionLevel) -> Result<SymbolMatrix> {
        let qr = QrCode::encode_text(value, level.into(), Version::MIN, Version::MAX, None, false)?;
        Ok(SymbolMatrix::from(&qr))
    }
}
