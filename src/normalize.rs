//! Request validation and cache-key derivation.
//!
//! [`normalize`] is a pure function: it checks a [`GenerationRequest`], fills in every
//! default, and hashes a canonical JSON rendering of the result. Two requests that mean
//! the same image produce byte-identical canonical JSON and therefore the same key.

use core::fmt;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::SizeBounds;
use crate::error::{QrError, Result};
use crate::paint::{Fill, GradientFill, GradientStop};
use crate::request::{Color, CornersSquareStyle, DotsStyle, ErrorCorrectionLevel, GenerationRequest, GradientKind, QrStyle};

/// Identity of a request for caching and coalescing: hex SHA-256 of its canonical form.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    fn digest(canonical: &str) -> Self {
        let hash = Sha256::digest(canonical.as_bytes());
        Self(Arc::from(hex::encode(hash)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full digests make logs unreadable
        write!(f, "CacheKey({})", &self.0[..self.0.len().min(12)])
    }
}

/// A request that passed validation, with every default made explicit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedRequest {
    pub value: String,
    pub size: u32,
    pub error_correction_level: ErrorCorrectionLevel,
    pub style: ValidatedStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedStyle {
    pub dots_style: DotsStyle,
    pub corners_square_style: CornersSquareStyle,
    pub dots_fill: Fill,
    pub background_color: Color,
    pub logo: Option<ValidatedLogo>,
    pub margin: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedLogo {
    pub source: String,
    pub width: f32,
    pub height: f32,
    pub hide_background_dots: bool,
}

impl ValidatedRequest {
    /// Canonical JSON: keys sorted, defaults explicit, colors in one spelling.
    pub fn canonical_json(&self) -> Result<String> {
        // Going through `Value` sorts object keys regardless of field declaration order
        let value = serde_json::to_value(self).map_err(|e| QrError::EncodingFailure(e.to_string()))?;
        Ok(value.to_string())
    }
}

/// Validates `request` and derives its cache key.
///
/// Never suspends and has no side effects. Errors are always validation errors.
pub fn normalize(request: &GenerationRequest, bounds: &SizeBounds) -> Result<(CacheKey, ValidatedRequest)> {
    let validated = validate(request, bounds)?;
    let canonical = validated.canonical_json()?;
    Ok((CacheKey::digest(&canonical), validated))
}

fn validate(request: &GenerationRequest, bounds: &SizeBounds) -> Result<ValidatedRequest> {
    if request.value.is_empty() {
        return Err(QrError::InvalidValue);
    }
    let size = bounds.check(request.size)?;

    let default_style = QrStyle::default();
    let style = request.style.as_ref().unwrap_or(&default_style);

    let dots_fill = match &style.dots_gradient {
        Some(gradient) => {
            if gradient.color_stops.is_empty() {
                return Err(QrError::InvalidGradient("at least one color stop is required".into()));
            }
            let mut stops = Vec::with_capacity(gradient.color_stops.len());
            let mut previous = 0.0f32;
            for stop in &gradient.color_stops {
                if !(0.0..=1.0).contains(&stop.offset) {
                    return Err(QrError::InvalidGradient(format!("offset {} is outside [0, 1]", stop.offset)));
                }
                if stop.offset < previous {
                    return Err(QrError::InvalidGradient(format!(
                        "offset {} follows {}; offsets must be ascending",
                        stop.offset, previous
                    )));
                }
                previous = stop.offset;
                let color = stop
                    .color
                    .parse::<Color>()
                    .map_err(|_| QrError::InvalidGradient(format!("invalid stop color {:?}", stop.color)))?;
                stops.push(GradientStop {
                    offset: positive_zero(stop.offset),
                    color,
                });
            }
            let rotation = match gradient.kind {
                GradientKind::Linear if gradient.rotation.is_finite() => positive_zero(gradient.rotation),
                GradientKind::Linear => {
                    return Err(QrError::InvalidGradient(format!("rotation {} is not finite", gradient.rotation)))
                }
                GradientKind::Radial => 0.0,
            };
            Fill::Gradient(GradientFill {
                gradient_type: gradient.kind,
                rotation,
                stops,
            })
        }
        None => Fill::Solid {
            color: style.dots_color.parse()?,
        },
    };

    let logo = match &style.logo {
        Some(logo) => {
            let in_bounds = |f: f32| f > 0.0 && f <= 1.0;
            if !in_bounds(logo.width) || !in_bounds(logo.height) {
                return Err(QrError::InvalidLogoBounds {
                    width: logo.width,
                    height: logo.height,
                });
            }
            Some(ValidatedLogo {
                source: logo.source.clone(),
                width: logo.width,
                height: logo.height,
                hide_background_dots: logo.hide_background_dots,
            })
        }
        None => None,
    };

    Ok(ValidatedRequest {
        value: request.value.clone(),
        size,
        error_correction_level: request.error_correction_level,
        style: ValidatedStyle {
            dots_style: style.dots_style,
            corners_square_style: style.corners_square_style,
            dots_fill,
            background_color: style.background_color.parse()?,
            logo,
            margin: style.margin,
        },
    })
}

/// Maps `-0.0` to `0.0` so both serialize identically.
fn positive_zero(x: f32) -> f32 {
    x + 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{ColorStop, Gradient, Logo};
    use proptest::prelude::*;

    fn bounds() -> SizeBounds {
        SizeBounds::default()
    }

    fn key_of(request: &GenerationRequest) -> CacheKey {
        normalize(request, &bounds()).unwrap().0
    }

    fn gradient(stops: Vec<ColorStop>) -> QrStyle {
        QrStyle {
            dots_gradient: Some(Gradient {
                kind: GradientKind::Linear,
                rotation: 0.0,
                color_stops: stops,
            }),
            ..QrStyle::default()
        }
    }

    #[test]
    fn test_empty_value() {
        let request = GenerationRequest::new("", 300);
        assert_eq!(normalize(&request, &bounds()).unwrap_err(), QrError::InvalidValue);
    }

    #[test]
    fn test_negative_and_oversized_sizes() {
        for size in [-10, 0, 31, 4097] {
            let err = normalize(&GenerationRequest::new("x", size), &bounds()).unwrap_err();
            assert!(matches!(err, QrError::InvalidSize { .. }), "size {}", size);
        }
        assert!(normalize(&GenerationRequest::new("x", 32), &bounds()).is_ok());
        assert!(normalize(&GenerationRequest::new("x", 4096), &bounds()).is_ok());
    }

    #[test]
    fn test_gradient_validation() {
        let cases = vec![
            vec![],
            vec![ColorStop::new(-0.1, "#000")],
            vec![ColorStop::new(0.5, "#000"), ColorStop::new(1.5, "#fff")],
            vec![ColorStop::new(0.8, "#000"), ColorStop::new(0.2, "#fff")],
            vec![ColorStop::new(0.0, "black")],
            vec![ColorStop::new(f32::NAN, "#000")],
        ];
        for stops in cases {
            let request = GenerationRequest::new("x", 300).with_style(gradient(stops.clone()));
            let err = normalize(&request, &bounds()).unwrap_err();
            assert!(matches!(err, QrError::InvalidGradient(_)), "{:?} -> {:?}", stops, err);
        }
    }

    #[test]
    fn test_logo_bounds() {
        for (w, h) in [(0.0, 0.2), (0.2, 1.01), (-0.5, 0.5), (f32::NAN, 0.5)] {
            let style = QrStyle {
                logo: Some(Logo::new("logo.png", w, h)),
                ..QrStyle::default()
            };
            let err = normalize(&GenerationRequest::new("x", 300).with_style(style), &bounds()).unwrap_err();
            assert!(matches!(err, QrError::InvalidLogoBounds { .. }));
        }
        let style = QrStyle {
            logo: Some(Logo::new("logo.png", 1.0, 0.3)),
            ..QrStyle::default()
        };
        assert!(normalize(&GenerationRequest::new("x", 300).with_style(style), &bounds()).is_ok());
    }

    #[test]
    fn test_invalid_solid_color() {
        let style = QrStyle {
            background_color: "white".into(),
            ..QrStyle::default()
        };
        let err = normalize(&GenerationRequest::new("x", 300).with_style(style), &bounds()).unwrap_err();
        assert_eq!(err, QrError::InvalidColor("white".into()));
    }

    #[test]
    fn test_absent_style_equals_explicit_defaults() {
        let bare = GenerationRequest::new("https://example.com", 300);
        let explicit = bare.clone().with_style(QrStyle {
            dots_color: "#000".into(),
            background_color: "#FFFFFFFF".into(),
            ..QrStyle::default()
        });
        assert_eq!(key_of(&bare), key_of(&explicit));
    }

    #[test]
    fn test_json_field_order_does_not_matter() {
        let a: GenerationRequest = serde_json::from_str(
            r#"{"value":"hi","size":300,"errorCorrectionLevel":"Q","style":{"dotsStyle":"dots","margin":2}}"#,
        )
        .unwrap();
        let b: GenerationRequest = serde_json::from_str(
            r#"{"style":{"margin":2,"dotsStyle":"dots"},"errorCorrectionLevel":"q","size":300,"value":"hi"}"#,
        )
        .unwrap();
        assert_eq!(key_of(&a), key_of(&b));
    }

    #[test]
    fn test_radial_rotation_is_irrelevant() {
        let radial = |rotation| QrStyle {
            dots_gradient: Some(Gradient {
                kind: GradientKind::Radial,
                rotation,
                color_stops: vec![ColorStop::new(0.0, "#000"), ColorStop::new(1.0, "#f00")],
            }),
            ..QrStyle::default()
        };
        let a = GenerationRequest::new("x", 300).with_style(radial(0.0));
        let b = GenerationRequest::new("x", 300).with_style(radial(1.2));
        assert_eq!(key_of(&a), key_of(&b));
    }

    #[test]
    fn test_distinct_requests_have_distinct_keys() {
        let base = GenerationRequest::new("https://example.com", 300);
        let keys = [
            key_of(&base),
            key_of(&GenerationRequest::new("https://example.org", 300)),
            key_of(&GenerationRequest::new("https://example.com", 301)),
            key_of(&base.clone().with_error_correction(ErrorCorrectionLevel::H)),
            key_of(&base.clone().with_style(QrStyle {
                dots_style: DotsStyle::Dots,
                ..QrStyle::default()
            })),
        ];
        for i in 0..keys.len() {
            for j in i + 1..keys.len() {
                assert_ne!(keys[i], keys[j]);
            }
        }
    }

    #[test]
    fn test_canonical_json_is_sorted() {
        let (_, validated) = normalize(&GenerationRequest::new("x", 300), &bounds()).unwrap();
        let json = validated.canonical_json().unwrap();
        let ecl = json.find("\"errorCorrectionLevel\"").unwrap();
        let size = json.find("\"size\"").unwrap();
        let value = json.find("\"value\"").unwrap();
        assert!(ecl < size && size < value);
        assert!(json.contains("\"backgroundColor\":\"#ffffffff\""));
    }

    proptest! {
        #[test]
        fn prop_normalize_is_deterministic(
            value in "[ -~]{1,64}",
            size in 32i64..=4096,
            level in prop::sample::select(vec![
                ErrorCorrectionLevel::L,
                ErrorCorrectionLevel::M,
                ErrorCorrectionLevel::Q,
                ErrorCorrectionLevel::H,
            ]),
            r in any::<u8>(),
            g in any::<u8>(),
            b in any::<u8>(),
        ) {
            let lower = format!("#{:02x}{:02x}{:02x}", r, g, b);
            let upper = format!("#{:02X}{:02X}{:02X}ff", r, g, b);
            let style = |color: String| QrStyle { dots_color: color, ..QrStyle::default() };
            let a = GenerationRequest::new(value.clone(), size)
                .with_error_correction(level)
                .with_style(style(lower));
            let b = GenerationRequest::new(value, size)
                .with_error_correction(level)
                .with_style(style(upper));
            let (key_a, validated_a) = normalize(&a, &bounds()).unwrap();
            let (key_b, validated_b) = normalize(&b, &bounds()).unwrap();
            prop_assert_eq!(&key_a, &key_b);
            prop_assert_eq!(validated_a, validated_b);
            prop_assert_eq!(key_a.as_str().len(), 64);
        }
    }
}
