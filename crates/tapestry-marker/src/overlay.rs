//! Annotated calibration photo for reviewing what the detector saw.

use crate::detect::{Detection, DetectionStatus};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_cross_mut, draw_filled_circle_mut, draw_line_segment_mut};
use serde::{Deserialize, Serialize};

/// Colors and stroke of the detection overlay.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlayStyle {
    pub valid: [u8; 3],
    pub invalid: [u8; 3],
    pub duplicate: [u8; 3],
    /// Outline stroke width in pixels.
    pub line_px: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            valid: [0, 200, 0],
            invalid: [220, 0, 0],
            duplicate: [255, 140, 0],
            line_px: 3,
        }
    }
}

impl OverlayStyle {
    fn color(&self, status: &DetectionStatus) -> Rgb<u8> {
        Rgb(match status {
            DetectionStatus::Valid => self.valid,
            DetectionStatus::Invalid { .. } => self.invalid,
            DetectionStatus::Duplicate => self.duplicate,
        })
    }
}

/// Copy of `photo` with every detection outlined in its status color.
///
/// The first corner (the code's own top-left) gets a filled dot so the
/// marker's orientation can be read off the image; the center gets a cross.
pub fn render_detections(
    photo: &RgbImage,
    detections: &[Detection],
    style: &OverlayStyle,
) -> RgbImage {
    let mut out = photo.clone();
    for d in detections {
        if !d.quad.is_finite() {
            continue;
        }
        let color = style.color(&d.status);
        let corners = d.quad.corners;

        let half = style.line_px.max(1) as f32 / 2.0;
        for i in 0..4 {
            let a = corners[i];
            let b = corners[(i + 1) % 4];
            let dir = b - a;
            let len = dir.norm();
            let (nx, ny) = if len > 0.0 {
                ((-dir.y / len) as f32, (dir.x / len) as f32)
            } else {
                (0.0, 0.0)
            };
            for k in 0..style.line_px.max(1) {
                let off = k as f32 - half + 0.5;
                draw_line_segment_mut(
                    &mut out,
                    (a.x as f32 + nx * off, a.y as f32 + ny * off),
                    (b.x as f32 + nx * off, b.y as f32 + ny * off),
                    color,
                );
            }
        }

        let radius = (d.quad.mean_side() / 20.0).clamp(3.0, 12.0) as i32;
        let first = corners[0];
        draw_filled_circle_mut(
            &mut out,
            (first.x.round() as i32, first.y.round() as i32),
            radius,
            color,
        );
        let c = d.quad.centroid();
        draw_cross_mut(&mut out, color, c.x.round() as i32, c.y.round() as i32);
    }
    out
}
