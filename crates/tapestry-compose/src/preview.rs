//! Whole-wall preview: every panel drawn upright with its bezel.

use crate::compose::{
    fits_render_limit, preview_px_per_mm, ComposeError, ComposeParams, Compositor, RenderMode,
};
use image::{imageops, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tapestry_core::{Layout, RectMm};

/// Preview canvas appearance.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreviewStyle {
    pub max_width: u32,
    pub max_height: u32,
    pub background: [u8; 3],
    pub bezel: [u8; 3],
}

impl Default for PreviewStyle {
    fn default() -> Self {
        Self {
            max_width: 800,
            max_height: 600,
            background: [245, 245, 245],
            bezel: [32, 32, 32],
        }
    }
}

/// Render the wall as a viewer would see it.
///
/// The image covers the union of panel footprints at one global scale;
/// bezels are filled with `style.bezel` and each tile is pasted upright.
pub fn render_preview(
    layout: &Layout,
    source: &RgbImage,
    style: &PreviewStyle,
) -> Result<RgbImage, ComposeError> {
    let bounds = layout.footprint_bounds().ok_or(ComposeError::EmptyLayout)?;
    let scale = preview_px_per_mm(&bounds, style.max_width, style.max_height);
    if !(scale > 0.0 && scale.is_finite()) {
        return Err(ComposeError::DegenerateCanvas);
    }
    if !fits_render_limit(&bounds, scale) {
        return Err(ComposeError::InvalidScale);
    }

    let compositor = Compositor::new(ComposeParams {
        mode: RenderMode::Scale { px_per_mm: scale },
        ..ComposeParams::default()
    });
    let composition = compositor.compose(layout, source)?;

    let width = ((bounds.width * scale).ceil() as u32).max(1);
    let height = ((bounds.height * scale).ceil() as u32).max(1);
    let mut out = RgbImage::from_pixel(width, height, Rgb(style.background));

    let to_px = |r: &RectMm| {
        (
            ((r.x - bounds.x) * scale).round() as i64,
            ((r.y - bounds.y) * scale).round() as i64,
        )
    };

    for panel in layout.panels() {
        let fp = panel.footprint();
        let (x, y) = to_px(&fp);
        let w = (fp.width * scale).round().max(1.0) as u32;
        let h = (fp.height * scale).round().max(1.0) as u32;
        let bezel = RgbImage::from_pixel(w, h, Rgb(style.bezel));
        imageops::replace(&mut out, &bezel, x, y);
    }

    for tile in composition.tiles.values() {
        let (x, y) = to_px(&tile.canvas_rect);
        imageops::replace(&mut out, &tile.upright(), x, y);
    }

    log::debug!(
        "preview {}x{} px at {:.3} px/mm for {} panels",
        width,
        height,
        scale,
        layout.len()
    );
    Ok(out)
}
