//! Tile payload encodings, one per panel firmware family.

use image::{imageops, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tapestry_core::PayloadEncoding;

#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    #[error("tile is empty")]
    EmptyTile,
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Bytes ready for a panel's draw endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub width: u32,
    pub height: u32,
    pub encoding: PayloadEncoding,
    pub body: Vec<u8>,
}

impl Payload {
    pub fn content_type(&self) -> &'static str {
        match self.encoding {
            PayloadEncoding::Gray4 => "application/octet-stream",
            PayloadEncoding::Png => "image/png",
        }
    }
}

/// Turns a native-orientation tile into the bytes a firmware expects.
pub trait TileEncoder: Send + Sync {
    fn encoding(&self) -> PayloadEncoding;
    fn encode(&self, tile: &RgbImage) -> Result<Payload, EncodeError>;
}

/// 16-level grayscale, two pixels per byte, first pixel in the high nibble.
///
/// Pixels are packed row-major over the whole frame; an odd pixel count is
/// padded with a white nibble.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gray4Encoder;

impl TileEncoder for Gray4Encoder {
    fn encoding(&self) -> PayloadEncoding {
        PayloadEncoding::Gray4
    }

    fn encode(&self, tile: &RgbImage) -> Result<Payload, EncodeError> {
        if tile.width() == 0 || tile.height() == 0 {
            return Err(EncodeError::EmptyTile);
        }
        let luma = imageops::grayscale(tile);
        let body = pack_gray4(luma.as_raw());
        Ok(Payload {
            width: tile.width(),
            height: tile.height(),
            encoding: PayloadEncoding::Gray4,
            body,
        })
    }
}

pub(crate) fn pack_gray4(luma: &[u8]) -> Vec<u8> {
    luma.chunks(2)
        .map(|pair| {
            let hi = pair[0] / 17;
            let lo = pair.get(1).map_or(0x0f, |v| v / 17);
            (hi << 4) | lo
        })
        .collect()
}

/// 8-bit grayscale PNG for firmwares that decode images themselves.
#[derive(Clone, Copy, Debug, Default)]
pub struct PngEncoder;

impl TileEncoder for PngEncoder {
    fn encoding(&self) -> PayloadEncoding {
        PayloadEncoding::Png
    }

    fn encode(&self, tile: &RgbImage) -> Result<Payload, EncodeError> {
        if tile.width() == 0 || tile.height() == 0 {
            return Err(EncodeError::EmptyTile);
        }
        let luma = imageops::grayscale(tile);
        let mut body = Vec::new();
        luma.write_to(&mut Cursor::new(&mut body), ImageFormat::Png)?;
        Ok(Payload {
            width: tile.width(),
            height: tile.height(),
            encoding: PayloadEncoding::Png,
            body,
        })
    }
}

/// Encoder for a panel type's declared payload format.
pub fn encoder_for(encoding: PayloadEncoding) -> &'static dyn TileEncoder {
    match encoding {
        PayloadEncoding::Gray4 => &Gray4Encoder,
        PayloadEncoding::Png => &PngEncoder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn gray4_packs_high_nibble_first() {
        assert_eq!(pack_gray4(&[255, 0, 17, 34]), vec![0xf0, 0x12]);
        assert_eq!(pack_gray4(&[136]), vec![0x8f]);
    }

    #[test]
    fn gray4_payload_is_half_the_pixels() {
        let tile = RgbImage::from_pixel(4, 3, Rgb([255, 255, 255]));
        let p = Gray4Encoder.encode(&tile).unwrap();
        assert_eq!((p.width, p.height), (4, 3));
        assert_eq!(p.body, vec![0xff; 6]);
        assert_eq!(p.content_type(), "application/octet-stream");
    }

    #[test]
    fn png_payload_decodes_back() {
        let tile = RgbImage::from_fn(5, 2, |x, y| Rgb([x as u8 * 40, y as u8 * 90, 7]));
        let p = encoder_for(PayloadEncoding::Png).encode(&tile).unwrap();
        let back = image::load_from_memory(&p.body).unwrap().to_luma8();
        assert_eq!(back, imageops::grayscale(&tile));
        assert_eq!(p.content_type(), "image/png");
    }

    #[test]
    fn empty_tile_is_rejected() {
        assert!(matches!(
            Gray4Encoder.encode(&RgbImage::new(0, 0)),
            Err(EncodeError::EmptyTile)
        ));
    }
}
