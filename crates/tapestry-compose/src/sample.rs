//! Resampling of a source region into a fixed-size pixel grid.

use crate::fit::SourceRect;
use image::{Rgb, RgbImage};

/// Bilinear sample at continuous pixel coordinates (pixel centers at `i + 0.5`).
///
/// Coordinates outside the image are clamped to the border, so a region that
/// pokes out of the source repeats its edge instead of leaving a gap.
#[inline]
pub(crate) fn sample_bilinear_rgb(src: &RgbImage, x: f64, y: f64) -> [f64; 3] {
    let max_x = (src.width() - 1) as f64;
    let max_y = (src.height() - 1) as f64;
    let x = (x - 0.5).clamp(0.0, max_x);
    let y = (y - 0.5).clamp(0.0, max_y);

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(src.width() - 1);
    let y1 = (y0 + 1).min(src.height() - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let p00 = src.get_pixel(x0, y0).0;
    let p10 = src.get_pixel(x1, y0).0;
    let p01 = src.get_pixel(x0, y1).0;
    let p11 = src.get_pixel(x1, y1).0;

    let mut out = [0.0; 3];
    for c in 0..3 {
        let a = p00[c] as f64 + fx * (p10[c] as f64 - p00[c] as f64);
        let b = p01[c] as f64 + fx * (p11[c] as f64 - p01[c] as f64);
        out[c] = a + fy * (b - a);
    }
    out
}

/// Resample `region` of `src` into an `out_w × out_h` image.
///
/// When one output pixel spans several source pixels, a `k × k` grid of
/// bilinear taps is averaged (`k` capped by `max_taps`) so that heavy
/// downscaling does not alias.
pub(crate) fn resample_region(
    src: &RgbImage,
    region: &SourceRect,
    out_w: u32,
    out_h: u32,
    max_taps: u32,
) -> RgbImage {
    let mut out = RgbImage::new(out_w, out_h);
    if src.width() == 0 || src.height() == 0 || out_w == 0 || out_h == 0 {
        return out;
    }

    let step_x = region.width / out_w as f64;
    let step_y = region.height / out_h as f64;
    // Steps a hair above 1.0 come from float noise, not real downscaling.
    let taps = ((step_x.max(step_y) - 1e-9).ceil() as u32).clamp(1, max_taps.max(1));
    let inv = 1.0 / (taps * taps) as f64;

    for oy in 0..out_h {
        for ox in 0..out_w {
            let mut acc = [0.0; 3];
            for ty in 0..taps {
                let fy = (oy as f64 + (ty as f64 + 0.5) / taps as f64) * step_y;
                for tx in 0..taps {
                    let fx = (ox as f64 + (tx as f64 + 0.5) / taps as f64) * step_x;
                    let v = sample_bilinear_rgb(src, region.x + fx, region.y + fy);
                    acc[0] += v[0];
                    acc[1] += v[1];
                    acc[2] += v[2];
                }
            }
            out.put_pixel(
                ox,
                oy,
                Rgb([to_u8(acc[0] * inv), to_u8(acc[1] * inv), to_u8(acc[2] * inv)]),
            );
        }
    }
    out
}

#[inline]
fn to_u8(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 7]))
    }

    #[test]
    fn identity_region_reproduces_source() {
        let src = gradient(12, 9);
        let region = SourceRect {
            x: 0.0,
            y: 0.0,
            width: 12.0,
            height: 9.0,
        };
        let out = resample_region(&src, &region, 12, 9, 4);
        assert_eq!(out, src);
    }

    #[test]
    fn out_of_bounds_region_clamps_to_edges() {
        let src = gradient(4, 4);
        let region = SourceRect {
            x: -4.0,
            y: -4.0,
            width: 2.0,
            height: 2.0,
        };
        let out = resample_region(&src, &region, 2, 2, 4);
        for p in out.pixels() {
            assert_eq!(p.0, src.get_pixel(0, 0).0);
        }
    }

    #[test]
    fn downscale_averages_blocks() {
        // 2x2 checker of 0/255 averages to mid gray when squeezed into 1 px.
        let src = RgbImage::from_fn(2, 2, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let region = SourceRect {
            x: 0.0,
            y: 0.0,
            width: 2.0,
            height: 2.0,
        };
        let out = resample_region(&src, &region, 1, 1, 4);
        let v = out.get_pixel(0, 0).0[0];
        assert!((126..=129).contains(&v), "got {v}");
    }
}
