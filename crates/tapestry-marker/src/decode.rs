//! Marker decoding backends.

use crate::quad::Quad;
use image::GrayImage;
use nalgebra::Point2;
use rqrr::BitGrid;

/// One code located in a photo, before identity and geometry checks.
#[derive(Clone, Debug, PartialEq)]
pub struct RawMarker {
    /// Decoded text, or the decoder's reason for failing to read it.
    pub text: Result<String, String>,
    /// Outer corners of the code's module grid, quiet zone excluded.
    pub quad: Quad,
}

/// Finds and reads machine-readable markers in a grayscale photo.
pub trait MarkerDecoder {
    fn decode(&self, photo: &GrayImage) -> Vec<RawMarker>;
}

/// QR code decoder backed by `rqrr`.
#[derive(Clone, Copy, Debug, Default)]
pub struct QrDecoder;

impl MarkerDecoder for QrDecoder {
    fn decode(&self, photo: &GrayImage) -> Vec<RawMarker> {
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            photo.width() as usize,
            photo.height() as usize,
            |x, y| photo.get_pixel(x as u32, y as u32).0[0],
        );

        prepared
            .detect_grids()
            .into_iter()
            .map(|grid| {
                let modules = grid.grid.size() as f64;
                let quad = code_outline(
                    Quad::new(grid.bounds.map(|p| Point2::new(p.x as f64, p.y as f64))),
                    modules,
                );
                let text = grid
                    .decode()
                    .map(|(_, content)| content)
                    .map_err(|e| format!("{e:?}"));
                RawMarker { text, quad }
            })
            .collect()
    }
}

/// rqrr reports bounds spanning `modules + 1` modules from the top-left
/// corner; cut them back to the code's own edge.
fn code_outline(bounds: Quad, modules: f64) -> Quad {
    if modules < 1.0 {
        return bounds;
    }
    bounds
        .sub_square(modules / (modules + 1.0))
        .unwrap_or(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::render_marker;
    use approx::assert_abs_diff_eq;

    #[test]
    fn outline_matches_the_rendered_code() {
        let (img, geom) = render_marker("panel-1.local", 400, 300).unwrap();
        let found = QrDecoder.decode(&img);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].text.as_deref(), Ok("panel-1.local"));

        let quad = found[0].quad;
        let side = geom.code_px as f64;
        assert_abs_diff_eq!(quad.mean_side(), side, epsilon = 2.0);
        let expect = Quad::square(geom.x as f64, geom.y as f64, side);
        for (got, want) in quad.corners.iter().zip(&expect.corners) {
            assert_abs_diff_eq!(got.x, want.x, epsilon = 3.0);
            assert_abs_diff_eq!(got.y, want.y, epsilon = 3.0);
        }
    }

    #[test]
    fn outline_drops_the_extra_module() {
        let bounds = Quad::square(10.0, 10.0, 220.0);
        let q = code_outline(bounds, 21.0);
        assert_abs_diff_eq!(q.mean_side(), 210.0, epsilon = 1e-9);
        assert_eq!(q.corners[0], bounds.corners[0]);
    }
}
