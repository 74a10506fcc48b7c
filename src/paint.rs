//! Shape and fill evaluation for a single pixel.
//!
//! Every style is a closed enum, and each one resolves to a row in a small table of
//! geometry parameters. Coordinates are in module units: `(0, 0)` is the top-left corner
//! of a module (or of a finder pattern) and `(1, 1)` its bottom-right.

use serde::Serialize;

use crate::request::{Color, CornersSquareStyle, DotsStyle, GradientKind};

/// Which orthogonal neighbors of a dark module are also dark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Neighbors {
    pub top: bool,
    pub right: bool,
    pub bottom: bool,
    pub left: bool,
}

impl DotsStyle {
    /// Corner radii as `[top-left, top-right, bottom-right, bottom-left]`, in module units.
    ///
    /// A corner is only rounded when both modules touching it are light.
    fn corner_radii(self) -> [f32; 4] {
        match self {
            DotsStyle::Square | DotsStyle::Dots => [0.0; 4],
            DotsStyle::Rounded => [0.25; 4],
            DotsStyle::ExtraRounded => [0.5; 4],
            DotsStyle::Classy => [0.5, 0.0, 0.5, 0.0],
            DotsStyle::ClassyRounded => [0.5, 0.25, 0.5, 0.25],
        }
    }

    /// Whether the point `(u, v)` inside a dark module is painted.
    pub fn covers(self, neighbors: Neighbors, u: f32, v: f32) -> bool {
        if self == DotsStyle::Dots {
            return (u - 0.5).powi(2) + (v - 0.5).powi(2) <= 0.25;
        }
        let [tl, tr, br, bl] = self.corner_radii();
        let n = neighbors;
        let exposed = |radius: f32, a: bool, b: bool| if a || b { 0.0 } else { radius };
        let radii = [
            exposed(tl, n.top, n.left),
            exposed(tr, n.top, n.right),
            exposed(br, n.bottom, n.right),
            exposed(bl, n.bottom, n.left),
        ];
        in_rounded_rect(u, v, (0.0, 0.0, 1.0, 1.0), radii)
    }
}

impl CornersSquareStyle {
    /// Radii of the outer ring edge, the ring's inner edge and the center eye.
    fn radii(self) -> (f32, f32, f32) {
        match self {
            CornersSquareStyle::Square => (0.0, 0.0, 0.0),
            CornersSquareStyle::Dot => (3.5, 2.5, 1.5),
            CornersSquareStyle::ExtraRounded => (2.5, 1.5, 1.0),
        }
    }

    /// Whether `(u, v)` inside a 7x7 finder pattern is painted.
    pub fn covers(self, u: f32, v: f32) -> bool {
        let (outer, inner, eye) = self.radii();
        let ring = in_rounded_rect(u, v, (0.0, 0.0, 7.0, 7.0), [outer; 4])
            && !in_rounded_rect(u, v, (1.0, 1.0, 6.0, 6.0), [inner; 4]);
        ring || in_rounded_rect(u, v, (2.0, 2.0, 5.0, 5.0), [eye; 4])
    }
}

/// Point-in-rectangle test with independently rounded corners
/// (`[top-left, top-right, bottom-right, bottom-left]`).
fn in_rounded_rect(x: f32, y: f32, (x0, y0, x1, y1): (f32, f32, f32, f32), radii: [f32; 4]) -> bool {
    if x < x0 || x >= x1 || y < y0 || y >= y1 {
        return false;
    }
    let left = x < (x0 + x1) / 2.0;
    let top = y < (y0 + y1) / 2.0;
    let (r, cx, cy) = match (top, left) {
        (true, true) => (radii[0], x0 + radii[0], y0 + radii[0]),
        (true, false) => (radii[1], x1 - radii[1], y0 + radii[1]),
        (false, false) => (radii[2], x1 - radii[2], y1 - radii[2]),
        (false, true) => (radii[3], x0 + radii[3], y1 - radii[3]),
    };
    let in_corner_box = (if left { x < cx } else { x > cx }) && (if top { y < cy } else { y > cy });
    !in_corner_box || (x - cx).powi(2) + (y - cy).powi(2) <= r * r
}

/// How dark modules are colored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum Fill {
    Solid { color: Color },
    Gradient(GradientFill),
}

impl Fill {
    /// Color at pixel `(x, y)` of a `size`-pixel square surface.
    pub fn color_at(&self, x: f32, y: f32, size: f32) -> Color {
        match self {
            Fill::Solid { color } => *color,
            Fill::Gradient(gradient) => gradient.color_at(x, y, size),
        }
    }
}

/// A validated gradient: non-empty, offsets ascending within [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradientFill {
    pub gradient_type: GradientKind,
    pub rotation: f32,
    pub stops: Vec<GradientStop>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Color,
}

impl GradientFill {
    /// Position along the gradient for a pixel, in [0, 1].
    ///
    /// Linear gradients run left to right through the center, rotated clockwise by
    /// `rotation`. Radial gradients run from the center out to the corners.
    pub fn position(&self, x: f32, y: f32, size: f32) -> f32 {
        let half = size / 2.0;
        let (dx, dy) = (x - half, y - half);
        let t = match self.gradient_type {
            GradientKind::Linear => {
                let (sin, cos) = self.rotation.sin_cos();
                let extent = size * (cos.abs() + sin.abs());
                (dx * cos + dy * sin) / extent + 0.5
            }
            GradientKind::Radial => (dx * dx + dy * dy).sqrt() / (half * core::f32::consts::SQRT_2),
        };
        t.clamp(0.0, 1.0)
    }

    pub fn color_at(&self, x: f32, y: f32, size: f32) -> Color {
        self.sample(self.position(x, y, size))
    }

    /// Color at gradient position `t`, interpolating between the surrounding stops.
    pub fn sample(&self, t: f32) -> Color {
        let (first, last) = match (self.stops.first(), self.stops.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Color::BLACK,
        };
        if t <= first.offset {
            return first.color;
        }
        for pair in self.stops.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.offset {
                let span = b.offset - a.offset;
                if span <= f32::EPSILON {
                    return b.color;
                }
                return a.color.lerp(b.color, (t - a.offset) / span);
            }
        }
        last.color
    }
}
