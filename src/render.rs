//! Rasterizing a symbol matrix into a styled PNG data URI.

use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use base64::Engine;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tracing::{debug, warn};

use crate::error::{QrError, Result};
use crate::matrix::{QrEncoder, SymbolEncoder, SymbolMatrix};
use crate::normalize::{ValidatedLogo, ValidatedRequest};
use crate::paint::Neighbors;

/// Prefix of every artifact the built-in renderer produces.
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// A rendered image as a data URI. Cloning is cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    data_uri: Arc<str>,
}

impl Artifact {
    pub fn from_data_uri(data_uri: impl Into<Arc<str>>) -> Self {
        Self {
            data_uri: data_uri.into(),
        }
    }

    fn from_png(png: &[u8]) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png);
        Self::from_data_uri(format!("{}{}", PNG_DATA_URI_PREFIX, encoded))
    }

    pub fn as_str(&self) -> &str {
        &self.data_uri
    }

    /// Memory charged against a byte-bounded cache.
    pub fn byte_len(&self) -> usize {
        self.data_uri.len()
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact").field("bytes", &self.byte_len()).finish()
    }
}

/// Loads logo images referenced by requests.
#[async_trait]
pub trait LogoDecoder: Send + Sync + 'static {
    /// Fails with [`QrError::LogoDecodeFailure`].
    async fn decode(&self, source: &str) -> Result<DynamicImage>;
}

/// Decodes `data:` URIs in place and reads anything else from the filesystem.
///
/// Data URIs work under any executor. File paths are read with `tokio::fs` and need a
/// running Tokio runtime; without one they fail with [`QrError::LogoDecodeFailure`].
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageLogoDecoder;

#[async_trait]
impl LogoDecoder for ImageLogoDecoder {
    async fn decode(&self, source: &str) -> Result<DynamicImage> {
        let failure = |reason: String| QrError::LogoDecodeFailure {
            source_ref: abbreviate(source),
            reason,
        };
        let bytes = match source.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest
                    .split_once(',')
                    .ok_or_else(|| failure("data URI has no payload".into()))?;
                if !header.ends_with(";base64") {
                    return Err(failure("only base64 data URIs are supported".into()));
                }
                base64::engine::general_purpose::STANDARD
                    .decode(payload.trim())
                    .map_err(|e| failure(e.to_string()))?
            }
            None => {
                if tokio::runtime::Handle::try_current().is_err() {
                    return Err(failure("reading logo files requires a Tokio runtime".into()));
                }
                tokio::fs::read(source).await.map_err(|e| failure(e.to_string()))?
            }
        };
        image::load_from_memory(&bytes).map_err(|e| failure(e.to_string()))
    }
}

/// Data URIs can be megabytes long; errors and logs only need the start.
fn abbreviate(source: &str) -> String {
    match source.char_indices().nth(64) {
        Some((idx, _)) => format!("{}...", &source[..idx]),
        None => source.to_string(),
    }
}

/// Encodes, paints and encodes again: value -> symbol -> pixels -> PNG data URI.
pub struct Renderer<E = QrEncoder, D = ImageLogoDecoder> {
    encoder: E,
    decoder: D,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(QrEncoder, ImageLogoDecoder)
    }
}

impl<E: SymbolEncoder, D: LogoDecoder> Renderer<E, D> {
    pub fn new(encoder: E, decoder: D) -> Self {
        Self { encoder, decoder }
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Renders one validated request.
    ///
    /// Suspends while the encoder runs and while a logo is decoded. The drawing surface
    /// lives only for the duration of this call.
    pub async fn render(&self, request: &ValidatedRequest) -> Result<Artifact> {
        let started = Instant::now();
        let matrix = self.encoder.encode(&request.value, request.error_correction_level).await?;
        let logo = match &request.style.logo {
            Some(logo) => Some((logo, self.decoder.decode(&logo.source).await?)),
            None => None,
        };

        let layout = Layout::new(&matrix, request);
        let mut surface = layout.paint(&matrix, request);
        if let Some((placement, image)) = logo {
            layout.warn_if_occlusion_exceeds_recovery(placement, request);
            composite_logo(&mut surface, &layout, &image);
        }

        let mut png = Vec::new();
        surface.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        drop(surface);

        let artifact = Artifact::from_png(&png);
        debug!(
            size = request.size,
            level = %request.error_correction_level,
            modules = matrix.size(),
            bytes = artifact.byte_len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Rendered QR code"
        );
        Ok(artifact)
    }
}

/// Pixel geometry of one render.
struct Layout {
    size: u32,
    /// Pixels per module.
    cell: f32,
    margin: i32,
    /// Logo rectangle in pixels, `(x0, y0, x1, y1)`.
    logo_rect: Option<(f32, f32, f32, f32)>,
}

impl Layout {
    fn new(matrix: &SymbolMatrix, request: &ValidatedRequest) -> Self {
        let margin = i32::from(request.style.margin);
        let span = matrix.size() + 2 * margin;
        let size = request.size;
        let logo_rect = request.style.logo.as_ref().map(|logo| {
            let (w, h) = (logo.width * size as f32, logo.height * size as f32);
            let (x0, y0) = ((size as f32 - w) / 2.0, (size as f32 - h) / 2.0);
            (x0, y0, x0 + w, y0 + h)
        });
        Self {
            size,
            cell: size as f32 / span as f32,
            margin,
            logo_rect,
        }
    }

    /// Whether a module is cleared to make room for the logo.
    fn hidden(&self, x: i32, y: i32, request: &ValidatedRequest) -> bool {
        let hide = request.style.logo.as_ref().map_or(false, |logo| logo.hide_background_dots);
        match self.logo_rect {
            Some((x0, y0, x1, y1)) if hide => {
                let left = (x + self.margin) as f32 * self.cell;
                let top = (y + self.margin) as f32 * self.cell;
                left < x1 && left + self.cell > x0 && top < y1 && top + self.cell > y0
            }
            _ => false,
        }
    }

    fn paint(&self, matrix: &SymbolMatrix, request: &ValidatedRequest) -> RgbaImage {
        let style = &request.style;
        let background: Rgba<u8> = style.background_color.into();
        let size_px = self.size as f32;
        let dark = |x: i32, y: i32| matrix.is_dark(x, y) && matrix.finder_origin(x, y).is_none() && !self.hidden(x, y, request);

        RgbaImage::from_fn(self.size, self.size, |px, py| {
            let (cx, cy) = (px as f32 + 0.5, py as f32 + 0.5);
            // Position in module units relative to the symbol's top-left corner
            let fx = cx / self.cell - self.margin as f32;
            let fy = cy / self.cell - self.margin as f32;
            let (mx, my) = (fx.floor() as i32, fy.floor() as i32);

            let painted = match matrix.finder_origin(mx, my) {
                Some((ox, oy)) => style.corners_square_style.covers(fx - ox as f32, fy - oy as f32),
                None if dark(mx, my) => {
                    let neighbors = Neighbors {
                        top: dark(mx, my - 1),
                        right: dark(mx + 1, my),
                        bottom: dark(mx, my + 1),
                        left: dark(mx - 1, my),
                    };
                    style.dots_style.covers(neighbors, fx - mx as f32, fy - my as f32)
                }
                None => false,
            };
            if painted {
                style.dots_fill.color_at(cx, cy, size_px).into()
            } else {
                background
            }
        })
    }

    /// The logo's share of the symbol area, against what the level can recover.
    ///
    /// Not enforced: an unreadable code is the caller's call to make.
    fn warn_if_occlusion_exceeds_recovery(&self, logo: &ValidatedLogo, request: &ValidatedRequest) {
        let symbol_px = self.size as f32 - 2.0 * self.margin as f32 * self.cell;
        if symbol_px <= 0.0 {
            return;
        }
        let occluded = (logo.width * self.size as f32 * logo.height * self.size as f32) / (symbol_px * symbol_px);
        let recoverable = request.error_correction_level.recovery_fraction();
        if occluded > recoverable {
            warn!(
                occluded = occluded as f64,
                recoverable = recoverable as f64,
                level = %request.error_correction_level,
                "Logo covers more of the symbol than the error correction level can recover"
            );
        }
    }
}

fn composite_logo(surface: &mut RgbaImage, layout: &Layout, logo: &DynamicImage) {
    let Some((x0, y0, x1, y1)) = layout.logo_rect else {
        return;
    };
    let width = ((x1 - x0).round() as u32).max(1);
    let height = ((y1 - y0).round() as u32).max(1);
    let scaled = imageops::resize(&logo.to_rgba8(), width, height, FilterType::Lanczos3);
    imageops::overlay(surface, &scaled, x0.round() as i64, y0.round() as i64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SizeBounds;
    use crate::normalize::normalize;
    use crate::request::{ColorStop, CornersSquareStyle, DotsStyle, GenerationRequest, Gradient, GradientKind, Logo, QrStyle};

    fn validated(request: GenerationRequest) -> ValidatedRequest {
        normalize(&request, &SizeBounds::default()).unwrap().1
    }

    fn decode(artifact: &Artifact) -> RgbaImage {
        let payload = artifact.as_str().strip_prefix(PNG_DATA_URI_PREFIX).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD.decode(payload).unwrap();
        image::load_from_memory(&bytes).unwrap().to_rgba8()
    }

    fn red_png_data_uri() -> String {
        let logo = RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]));
        let mut png = Vec::new();
        logo.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();
        format!("data:image/png;base64,{}", base64::engine::general_purpose::STANDARD.encode(&png))
    }

    #[tokio::test]
    async fn test_render_plain() {
        let request = validated(GenerationRequest::new("https://example.com", 300));
        let artifact = Renderer::default().render(&request).await.unwrap();
        assert!(artifact.as_str().starts_with(PNG_DATA_URI_PREFIX));

        let img = decode(&artifact);
        assert_eq!(img.dimensions(), (300, 300));
        // Quiet zone is background, finder corner is dark
        assert_eq!(*img.get_pixel(1, 1), Rgba([255, 255, 255, 255]));
        let cell = 300.0 / (25.0 + 8.0);
        let inside = (4.5 * cell) as u32;
        assert_eq!(*img.get_pixel(inside, inside), Rgba([0, 0, 0, 255]));
    }

    #[tokio::test]
    async fn test_render_styled() {
        let style = QrStyle {
            dots_style: DotsStyle::Rounded,
            corners_square_style: CornersSquareStyle::Dot,
            background_color: "#00000000".into(),
            dots_gradient: Some(Gradient {
                kind: GradientKind::Linear,
                rotation: 0.0,
                color_stops: vec![ColorStop::new(0.0, "#ff0000"), ColorStop::new(1.0, "#0000ff")],
            }),
            margin: 0,
            ..QrStyle::default()
        };
        let request = validated(GenerationRequest::new("styled", 210).with_style(style));
        let img = decode(&Renderer::default().render(&request).await.unwrap());
        // Transparent background in the corner of the round finder, red-ish near the left edge
        assert_eq!(img.get_pixel(0, 0)[3], 0);
        let left_ring = img.get_pixel(2, 35);
        assert!(left_ring[0] > 200 && left_ring[2] < 50, "{:?}", left_ring);
    }

    #[tokio::test]
    async fn test_render_with_logo() {
        let style = QrStyle {
            logo: Some(Logo::new(red_png_data_uri(), 0.2, 0.2)),
            ..QrStyle::default()
        };
        let request = validated(
            GenerationRequest::new("https://example.com", 300)
                .with_error_correction(crate::request::ErrorCorrectionLevel::H)
                .with_style(style),
        );
        let img = decode(&Renderer::default().render(&request).await.unwrap());
        assert_eq!(*img.get_pixel(150, 150), Rgba([255, 0, 0, 255]));
    }

    #[tokio::test]
    async fn test_every_shape_combination_still_scans() {
        let dots = [
            DotsStyle::Square,
            DotsStyle::Dots,
            DotsStyle::Rounded,
            DotsStyle::ExtraRounded,
            DotsStyle::Classy,
            DotsStyle::ClassyRounded,
        ];
        let corners = [CornersSquareStyle::Square, CornersSquareStyle::Dot, CornersSquareStyle::ExtraRounded];
        let value = "https://example.com/scan";

        for dots_style in dots {
            for corners_square_style in corners {
                let style = QrStyle {
                    dots_style,
                    corners_square_style,
                    ..QrStyle::default()
                };
                let request = validated(GenerationRequest::new(value, 400).with_style(style));
                let img = decode(&Renderer::default().render(&request).await.unwrap());
                let luma = DynamicImage::ImageRgba8(img).to_luma8();
                let (width, height) = luma.dimensions();

                let scanned =
                    rxing::helpers::detect_in_luma(luma.into_raw(), width, height, Some(rxing::BarcodeFormat::QR_CODE));
                match scanned {
                    Ok(result) => assert_eq!(result.getText(), value, "{:?} / {:?}", dots_style, corners_square_style),
                    Err(e) => panic!("{:?} / {:?} did not scan: {:?}", dots_style, corners_square_style, e),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_logo_decode_failure() {
        let style = QrStyle {
            logo: Some(Logo::new("data:image/png;base64,bm90IGFuIGltYWdl", 0.2, 0.2)),
            ..QrStyle::default()
        };
        let request = validated(GenerationRequest::new("x", 300).with_style(style));
        let err = Renderer::default().render(&request).await.unwrap_err();
        assert!(matches!(err, QrError::LogoDecodeFailure { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_missing_logo_file() {
        let err = ImageLogoDecoder.decode("/definitely/not/here.png").await.unwrap_err();
        match err {
            QrError::LogoDecodeFailure { source_ref, .. } => assert_eq!(source_ref, "/definitely/not/here.png"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_encoding_failure_propagates() {
        let request = validated(
            GenerationRequest::new("z".repeat(3000), 300).with_error_correction(crate::request::ErrorCorrectionLevel::H),
        );
        let err = Renderer::default().render(&request).await.unwrap_err();
        assert!(matches!(err, QrError::EncodingFailure(_)));
    }

    #[test]
    fn test_file_logo_without_runtime_is_an_error() {
        let err = futures::executor::block_on(ImageLogoDecoder.decode("logo.png")).unwrap_err();
        match err {
            QrError::LogoDecodeFailure { source_ref, reason } => {
                assert_eq!(source_ref, "logo.png");
                assert!(reason.contains("Tokio runtime"), "{}", reason);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_data_uri_logo_without_runtime() {
        let logo = futures::executor::block_on(ImageLogoDecoder.decode(&red_png_data_uri())).unwrap();
        assert_eq!((logo.width(), logo.height()), (8, 8));
    }

    #[test]
    fn test_abbreviate() {
        assert_eq!(abbreviate("short"), "short");
        let long = "a".repeat(100);
        assert_eq!(abbreviate(&long).len(), 67);
    }

    #[test]
    fn test_hidden_modules_follow_logo_rect() {
        let matrix = SymbolMatrix::from_fn(21, |_, _| true);
        let style = QrStyle {
            logo: Some(Logo::new("logo.png", 0.2, 0.2)),
            margin: 0,
            ..QrStyle::default()
        };
        let request = validated(GenerationRequest::new("x", 210).with_style(style));
        let layout = Layout::new(&matrix, &request);
        assert!(layout.hidden(10, 10, &request));
        assert!(!layout.hidden(2, 10, &request));
    }
}
