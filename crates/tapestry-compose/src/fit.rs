//! Cover fit of a source image onto the millimeter canvas.

use serde::{Deserialize, Serialize};
use tapestry_core::{PointMm, RectMm};

/// Region of the source image, in source pixels (continuous coordinates).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Uniform "cover" mapping from canvas millimeters to source pixels.
///
/// The source is scaled so it fully covers the canvas and the excess is
/// cropped symmetrically; the aspect ratio is never changed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoverFit {
    pub canvas: RectMm,
    pub source_width: u32,
    pub source_height: u32,
    /// Source pixels per canvas millimeter.
    pub px_per_mm: f64,
    /// Source pixel where the canvas origin lands.
    pub offset_x: f64,
    pub offset_y: f64,
}

impl CoverFit {
    /// `None` when the canvas or the source is empty.
    pub fn new(canvas: RectMm, source_width: u32, source_height: u32) -> Option<Self> {
        if source_width == 0
            || source_height == 0
            || !(canvas.width > 0.0 && canvas.height > 0.0)
            || !(canvas.width.is_finite() && canvas.height.is_finite())
        {
            return None;
        }

        let sw = source_width as f64;
        let sh = source_height as f64;
        // The smaller ratio makes the canvas fit inside the source, which is
        // the same as the source covering the canvas.
        let px_per_mm = (sw / canvas.width).min(sh / canvas.height);
        let offset_x = 0.5 * (sw - canvas.width * px_per_mm);
        let offset_y = 0.5 * (sh - canvas.height * px_per_mm);

        Some(Self {
            canvas,
            source_width,
            source_height,
            px_per_mm,
            offset_x,
            offset_y,
        })
    }

    /// Canvas point (mm) to continuous source pixel coordinates.
    #[inline]
    pub fn to_source(&self, p: PointMm) -> (f64, f64) {
        (
            self.offset_x + (p.x - self.canvas.x) * self.px_per_mm,
            self.offset_y + (p.y - self.canvas.y) * self.px_per_mm,
        )
    }

    /// Source region covered by a canvas rectangle.
    pub fn source_rect(&self, r: &RectMm) -> SourceRect {
        let (x, y) = self.to_source(r.origin());
        SourceRect {
            x,
            y,
            width: r.width * self.px_per_mm,
            height: r.height * self.px_per_mm,
        }
    }

    /// Part of the source actually used by the canvas.
    pub fn sampled_bounds(&self) -> SourceRect {
        self.source_rect(&self.canvas)
    }

    /// Fraction of the source discarded by the crop, in `[0, 1)`.
    pub fn cropped_fraction(&self) -> f64 {
        let b = self.sampled_bounds();
        let total = self.source_width as f64 * self.source_height as f64;
        1.0 - (b.width * b.height) / total
    }
}
