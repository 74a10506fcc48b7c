//! # qistyle
//!
//! Styled QR code generation with memoization and request coalescing.
//!
//! `qistyle` turns a [`GenerationRequest`] (text, pixel size, error correction level and
//! an optional visual style) into a PNG data URI. Identical requests are served from a
//! bounded LRU cache, and concurrent identical requests share a single render.
//!
//! ## Features
//!
//! - QR Code Model 2 encoding, versions 1 to 40, four error correction levels.
//! - Dot shapes (square, dots, rounded, extra-rounded, classy, classy-rounded) and
//!   finder pattern shapes (square, dot, extra-rounded).
//! - Solid or linear/radial gradient fills, custom background and quiet zone.
//! - Centered logos from data URIs or files, optionally clearing the modules beneath.
//! - Canonical cache keys: field order and spelled-out defaults do not matter.
//! - Entry- or byte-bounded LRU cache, at most one in-flight render per key.
//! - Safe Rust implementation with no unsafe code.
//!
//! ## Example
//!
//! ```no_run
//! use qistyle::{
//!     DotsStyle, ErrorCorrectionLevel, GenerationRequest, GeneratorConfig, QrGenerator, QrStyle,
//! };
//!
//! # async fn run() -> qistyle::Result<()> {
//! let generator = QrGenerator::new(GeneratorConfig::default());
//! generator.warmup().await?;
//!
//! let request = GenerationRequest::new("https://example.com", 300)
//!     .with_error_correction(ErrorCorrectionLevel::Q)
//!     .with_style(QrStyle {
//!         dots_style: DotsStyle::Rounded,
//!         dots_color: "#1a73e8".into(),
//!         ..QrStyle::default()
//!     });
//!
//! let artifact = generator.generate(&request).await?;
//! println!("<img src=\"{}\">", artifact.as_str());
//! # Ok(())
//! # }
//! ```
//!
//! Requests can also be deserialized from the editor's JSON:
//!
//! ```rust
//! use qistyle::GenerationRequest;
//!
//! let request: GenerationRequest = serde_json::from_str(
//!     r#"{ "value": "hello", "size": 256, "errorCorrectionLevel": "H" }"#,
//! ).unwrap();
//! assert_eq!(request.size, 256);
//! ```
//!
//! ## Modules
//!
//! - [`generator`]: The public facade.
//! - [`normalize`]: Validation and cache keys.
//! - [`render`]: Rasterizing to PNG data URIs.
//! - [`cache`] / [`coalesce`]: Memoization and in-flight deduplication.
//! - [`qrcode`]: Core QR code encoding functionality.
//! - [`shared`]: An optional process-wide instance.

#![forbid(unsafe_code)]

pub mod cache;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod generator;
pub mod matrix;
pub mod normalize;
pub mod paint;
pub mod qrcode;
pub mod render;
pub mod request;
pub mod shared;

pub use cache::{CacheStats, CacheStore};
pub use config::{BatchMode, CacheCapacity, GeneratorConfig, SizeBounds};
pub use error::{QrError, Result};
pub use generator::QrGenerator;
pub use matrix::{QrEncoder, SymbolEncoder, SymbolMatrix};
pub use normalize::{normalize, CacheKey, ValidatedRequest};
pub use render::{Artifact, ImageLogoDecoder, LogoDecoder, Renderer};
pub use request::{
    Color, ColorStop, CornersSquareStyle, DotsStyle, ErrorCorrectionLevel, GenerationRequest, Gradient,
    GradientKind, Logo, QrStyle,
};
