//! Error types for QR generation.

use thiserror::Error;

use crate::qrcode::DataTooLong;

/// Everything that can go wrong between a [`GenerationRequest`] and an [`Artifact`].
///
/// Validation variants are produced synchronously by the normalizer and never reach the
/// renderer. Render variants are shared by every caller coalesced onto the same render,
/// which is why the type is `Clone`.
///
/// [`GenerationRequest`]: crate::request::GenerationRequest
/// [`Artifact`]: crate::render::Artifact
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QrError {
    #[error("QR value must not be empty")]
    InvalidValue,

    #[error("Invalid size {size}: expected an edge length between {min} and {max} pixels")]
    InvalidSize { size: i64, min: u32, max: u32 },

    #[error("Unrecognized error correction level: {0:?}")]
    InvalidErrorCorrection(String),

    #[error("Invalid gradient: {0}")]
    InvalidGradient(String),

    #[error("Invalid color: {0:?}")]
    InvalidColor(String),

    #[error("Logo bounds must be within (0, 1], got {width} x {height}")]
    InvalidLogoBounds { width: f32, height: f32 },

    #[error("Symbol encoding failed: {0}")]
    EncodingFailure(String),

    #[error("Failed to decode logo {source_ref:?}: {reason}")]
    LogoDecodeFailure { source_ref: String, reason: String },

    #[error("Failed to encode image: {0}")]
    ImageEncodeFailure(String),

    #[error("Batch request {index} failed: {source}")]
    BatchFailed {
        index: usize,
        #[source]
        source: Box<QrError>,
    },

    #[error("Generator has been destroyed")]
    GeneratorDestroyed,
}

impl QrError {
    /// Returns `true` for errors raised by request validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidValue
                | Self::InvalidSize { .. }
                | Self::InvalidErrorCorrection(_)
                | Self::InvalidGradient(_)
                | Self::InvalidColor(_)
                | Self::InvalidLogoBounds { .. }
        )
    }
}

impl From<DataTooLong> for QrError {
    fn from(err: DataTooLong) -> Self {
        Self::EncodingFailure(err.to_string())
    }
}

impl From<image::ImageError> for QrError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageEncodeFailure(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = QrError> = std::result::Result<T, E>;
