use crate::fit::CoverFit;
use crate::sample::resample_region;
use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tapestry_core::{Layout, Panel, PanelAddress, RectMm, Rotation};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Whole-call composition failures.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ComposeError {
    #[error("layout has no panels")]
    EmptyLayout,
    #[error("source image is empty ({width}x{height})")]
    EmptySource { width: u32, height: u32 },
    #[error("canvas has zero area")]
    DegenerateCanvas,
    #[error("render scale must be positive and finite and stay within {} px", MAX_RENDER_PX)]
    InvalidScale,
}

/// Largest edge, in pixels, of any image rendered at a global scale.
pub const MAX_RENDER_PX: u32 = 16_384;

/// Whether `rect` drawn at `px_per_mm` stays within [`MAX_RENDER_PX`].
pub(crate) fn fits_render_limit(rect: &RectMm, px_per_mm: f64) -> bool {
    let limit = f64::from(MAX_RENDER_PX);
    rect.width * px_per_mm <= limit && rect.height * px_per_mm <= limit
}

/// How tile pixel sizes are chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderMode {
    /// Every tile at its panel's native resolution (per-panel pixel density).
    #[default]
    Native,
    /// One global px/mm so the whole canvas fits inside `max_width × max_height`.
    Preview { max_width: u32, max_height: u32 },
    /// One fixed global px/mm.
    Scale { px_per_mm: f64 },
}

impl RenderMode {
    pub const DEFAULT_PREVIEW: RenderMode = RenderMode::Preview {
        max_width: 800,
        max_height: 600,
    };
}

/// Compositor tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComposeParams {
    #[serde(default)]
    pub mode: RenderMode,
    /// Upper bound on taps per axis when one tile pixel covers many source pixels.
    #[serde(default = "default_max_taps")]
    pub max_taps: u32,
}

fn default_max_taps() -> u32 {
    4
}

impl Default for ComposeParams {
    fn default() -> Self {
        Self {
            mode: RenderMode::Native,
            max_taps: default_max_taps(),
        }
    }
}

impl ComposeParams {
    pub fn preview() -> Self {
        Self {
            mode: RenderMode::DEFAULT_PREVIEW,
            ..Self::default()
        }
    }
}

/// Pixels for one panel, in the panel's native orientation.
#[derive(Clone, Debug)]
pub struct Tile {
    pub address: PanelAddress,
    pub image: RgbImage,
    /// Rotation that was undone when producing `image`.
    pub rotation: Rotation,
    /// Panel active area on the canvas the tile was sampled from.
    pub canvas_rect: RectMm,
}

impl Tile {
    /// Tile as a viewer standing at rotation 0 sees it on the wall.
    pub fn upright(&self) -> RgbImage {
        to_canvas_orientation(&self.image, self.rotation)
    }
}

/// Output of one composition run.
#[derive(Clone, Debug)]
pub struct Composition {
    pub canvas: RectMm,
    pub fit: CoverFit,
    pub tiles: BTreeMap<PanelAddress, Tile>,
}

/// Maps a source image across every panel of a layout.
#[derive(Clone, Debug, Default)]
pub struct Compositor {
    params: ComposeParams,
}

impl Compositor {
    pub fn new(params: ComposeParams) -> Self {
        Self { params }
    }

    #[inline]
    pub fn params(&self) -> &ComposeParams {
        &self.params
    }

    /// Compose one tile per panel.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, layout, source),
            fields(panels = layout.len(), width = source.width(), height = source.height())
        )
    )]
    pub fn compose(&self, layout: &Layout, source: &RgbImage) -> Result<Composition, ComposeError> {
        if source.width() == 0 || source.height() == 0 {
            return Err(ComposeError::EmptySource {
                width: source.width(),
                height: source.height(),
            });
        }
        let canvas = layout.canvas_bounds().ok_or(ComposeError::EmptyLayout)?;
        let fit = CoverFit::new(canvas, source.width(), source.height())
            .ok_or(ComposeError::DegenerateCanvas)?;

        log::debug!(
            "canvas {:.1}x{:.1} mm, {:.3} source px/mm, crop {:.1}%",
            canvas.width,
            canvas.height,
            fit.px_per_mm,
            100.0 * fit.cropped_fraction()
        );

        let preview_scale = match self.params.mode {
            RenderMode::Native => None,
            RenderMode::Preview {
                max_width,
                max_height,
            } => Some(preview_px_per_mm(&canvas, max_width, max_height)),
            RenderMode::Scale { px_per_mm } if px_per_mm > 0.0 && px_per_mm.is_finite() => {
                Some(px_per_mm)
            }
            RenderMode::Scale { .. } => return Err(ComposeError::InvalidScale),
        };
        if preview_scale.is_some_and(|s| !fits_render_limit(&canvas, s)) {
            return Err(ComposeError::InvalidScale);
        }

        let mut tiles = BTreeMap::new();
        for panel in layout.panels() {
            let tile = self.compose_panel(panel, source, &fit, preview_scale);
            tiles.insert(panel.address.clone(), tile);
        }

        Ok(Composition { canvas, fit, tiles })
    }

    fn compose_panel(
        &self,
        panel: &Panel,
        source: &RgbImage,
        fit: &CoverFit,
        preview_scale: Option<f64>,
    ) -> Tile {
        let rect = panel.canvas_rect();
        let (w, h) = match preview_scale {
            None => {
                let r = panel.canvas_resolution();
                (r.width, r.height)
            }
            Some(s) => (
                ((rect.width * s).round() as u32).max(1),
                ((rect.height * s).round() as u32).max(1),
            ),
        };

        let region = fit.source_rect(&rect);
        let sample = resample_region(source, &region, w, h, self.params.max_taps);
        let image = to_native_orientation(&sample, panel.rotation);

        log::debug!(
            "{}: {}x{} px from source ({:.0},{:.0}) {:.0}x{:.0}, rotation {}",
            panel.address,
            image.width(),
            image.height(),
            region.x,
            region.y,
            region.width,
            region.height,
            panel.rotation.degrees()
        );

        Tile {
            address: panel.address.clone(),
            image,
            rotation: panel.rotation,
            canvas_rect: rect,
        }
    }
}

/// Compose with default parameters (native resolution).
pub fn compose(layout: &Layout, source: &RgbImage) -> Result<Composition, ComposeError> {
    Compositor::default().compose(layout, source)
}

/// Global preview scale (px per mm) fitting the canvas inside the box.
pub fn preview_px_per_mm(canvas: &RectMm, max_width: u32, max_height: u32) -> f64 {
    (max_width.max(1) as f64 / canvas.width).min(max_height.max(1) as f64 / canvas.height)
}

/// Canvas-oriented pixels to the buffer a panel turned clockwise by
/// `rotation` must display: rotate counter-clockwise by the same amount.
pub fn to_native_orientation(img: &RgbImage, rotation: Rotation) -> RgbImage {
    match rotation {
        Rotation::R0 => img.clone(),
        Rotation::R90 => imageops::rotate270(img),
        Rotation::R180 => imageops::rotate180(img),
        Rotation::R270 => imageops::rotate90(img),
    }
}

/// Inverse of [`to_native_orientation`].
pub fn to_canvas_orientation(img: &RgbImage, rotation: Rotation) -> RgbImage {
    to_native_orientation(img, rotation.inverse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::sync::Arc;
    use tapestry_core::{Bezel, PanelType, PayloadEncoding, PointMm, Resolution, SizeMm};

    fn square_type() -> Arc<PanelType> {
        Arc::new(PanelType {
            name: "SQ".into(),
            description: None,
            active_area: SizeMm::new(100.0, 100.0),
            bezel: Bezel::default(),
            resolution: Resolution::new(40, 40),
            encoding: PayloadEncoding::Gray4,
        })
    }

    fn wide_type() -> Arc<PanelType> {
        Arc::new(PanelType {
            name: "WIDE".into(),
            description: None,
            active_area: SizeMm::new(120.0, 60.0),
            bezel: Bezel::default(),
            resolution: Resolution::new(60, 30),
            encoding: PayloadEncoding::Png,
        })
    }

    fn layout_of(panels: &[(&str, Arc<PanelType>, f64, f64, Rotation)]) -> Layout {
        let mut layout = Layout::new();
        for (addr, ty, x, y, rot) in panels {
            let panel = Panel::new(
                addr.parse().unwrap(),
                Arc::clone(ty),
                PointMm::new(*x, *y),
                *rot,
            );
            layout.insert(panel).unwrap();
        }
        layout
    }

    fn noise(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let v = (x.wrapping_mul(73) ^ y.wrapping_mul(151)) as u8;
            Rgb([v, v.wrapping_add(40), 255 - v])
        })
    }

    #[test]
    fn one_native_tile_per_panel() {
        let layout = layout_of(&[
            ("a", square_type(), 0.0, 0.0, Rotation::R0),
            ("b", wide_type(), 100.0, 0.0, Rotation::R90),
            ("c", wide_type(), 0.0, 130.0, Rotation::R180),
        ]);
        let out = compose(&layout, &noise(317, 211)).unwrap();
        assert_eq!(out.tiles.len(), layout.len());
        for panel in layout.panels() {
            let tile = &out.tiles[&panel.address];
            let res = panel.native_resolution();
            assert_eq!(
                (tile.image.width(), tile.image.height()),
                (res.width, res.height),
                "{}",
                panel.address
            );
        }
    }

    #[test]
    fn rotation_round_trips_to_unrotated_sample() {
        let src = noise(200, 200);
        let base = layout_of(&[("a", square_type(), 0.0, 0.0, Rotation::R0)]);
        let reference = compose(&base, &src).unwrap().tiles.into_values().next().unwrap();

        for rot in Rotation::ALL {
            let layout = layout_of(&[("a", square_type(), 0.0, 0.0, rot)]);
            let tile = compose(&layout, &src).unwrap().tiles.into_values().next().unwrap();
            assert_eq!(
                to_canvas_orientation(&tile.image, rot),
                reference.image,
                "rotation {}",
                rot.degrees()
            );
            assert_eq!(tile.upright(), reference.image);
        }
    }

    #[test]
    fn preview_mode_uses_one_scale_for_all_panels() {
        let layout = layout_of(&[
            ("a", square_type(), 0.0, 0.0, Rotation::R0),
            ("b", square_type(), 100.0, 0.0, Rotation::R0),
        ]);
        let compositor = Compositor::new(ComposeParams::preview());
        let out = compositor.compose(&layout, &noise(64, 64)).unwrap();
        // 200x100 mm canvas into 800x600 -> 4 px/mm -> 400x400 per panel.
        for tile in out.tiles.values() {
            assert_eq!((tile.image.width(), tile.image.height()), (400, 400));
        }
    }

    #[test]
    fn rejects_empty_inputs() {
        let empty = Layout::new();
        assert_eq!(
            compose(&empty, &noise(4, 4)).unwrap_err(),
            ComposeError::EmptyLayout
        );
        let layout = layout_of(&[("a", square_type(), 0.0, 0.0, Rotation::R0)]);
        assert!(matches!(
            compose(&layout, &RgbImage::new(0, 5)),
            Err(ComposeError::EmptySource { .. })
        ));
    }

    #[test]
    fn oversized_output_is_rejected() {
        let layout = layout_of(&[("a", square_type(), 0.0, 0.0, Rotation::R0)]);
        let src = noise(8, 8);
        for mode in [
            RenderMode::Scale { px_per_mm: 1.0e6 },
            RenderMode::Scale { px_per_mm: 0.0 },
            RenderMode::Preview {
                max_width: u32::MAX,
                max_height: u32::MAX,
            },
        ] {
            let compositor = Compositor::new(ComposeParams {
                mode,
                ..ComposeParams::default()
            });
            assert_eq!(
                compositor.compose(&layout, &src).unwrap_err(),
                ComposeError::InvalidScale,
                "{mode:?}"
            );
        }

        let side = RectMm::new(0.0, 0.0, 100.0, 100.0);
        assert!(fits_render_limit(&side, f64::from(MAX_RENDER_PX) / 100.0));
        assert!(!fits_render_limit(&side, f64::from(MAX_RENDER_PX) / 99.0));
    }

    #[test]
    fn panels_outside_the_crop_are_still_filled() {
        // Source aspect 1:1, canvas 2:1 -> vertical crop only; every tile pixel
        // must come from inside the source.
        let layout = layout_of(&[
            ("a", square_type(), 0.0, 0.0, Rotation::R0),
            ("b", square_type(), 100.0, 0.0, Rotation::R0),
        ]);
        let src = RgbImage::from_pixel(50, 50, Rgb([9, 99, 199]));
        let out = compose(&layout, &src).unwrap();
        for tile in out.tiles.values() {
            assert!(tile.image.pixels().all(|p| p.0 == [9, 99, 199]));
        }
    }
}
