//! Panel hardware description and placed panels.

use crate::{Bezel, PanelAddress, PointMm, RectMm, Resolution, SizeMm};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Wire format a panel's firmware accepts for a full-screen image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    /// 8-bit luma quantized to 16 levels, two pixels per byte, high nibble first.
    #[default]
    Gray4,
    /// PNG-encoded 8-bit luma.
    Png,
}

/// Panel type validation errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PanelTypeError {
    #[error("panel type name is empty")]
    EmptyName,
    #[error("panel type {0}: active area must be finite and > 0")]
    InvalidActiveArea(String),
    #[error("panel type {0}: bezel offsets must be finite and >= 0")]
    InvalidBezel(String),
    #[error("panel type {0}: native resolution must be non-zero")]
    InvalidResolution(String),
}

/// A hardware model: physical active area, bezel and native resolution.
///
/// Loaded once per layout and shared by every panel of that model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PanelType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Pixel-addressable area in the panel's native orientation.
    pub active_area: SizeMm,
    #[serde(default)]
    pub bezel: Bezel,
    pub resolution: Resolution,
    #[serde(default)]
    pub encoding: PayloadEncoding,
}

impl PanelType {
    pub fn validate(&self) -> Result<(), PanelTypeError> {
        if self.name.trim().is_empty() {
            return Err(PanelTypeError::EmptyName);
        }
        let a = self.active_area;
        if !(a.width.is_finite() && a.height.is_finite() && a.width > 0.0 && a.height > 0.0) {
            return Err(PanelTypeError::InvalidActiveArea(self.name.clone()));
        }
        let b = self.bezel;
        if [b.top, b.bottom, b.left, b.right]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return Err(PanelTypeError::InvalidBezel(self.name.clone()));
        }
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(PanelTypeError::InvalidResolution(self.name.clone()));
        }
        Ok(())
    }

    /// Physical outline including bezel, native orientation.
    pub fn total_size(&self) -> SizeMm {
        SizeMm::new(
            self.bezel.left + self.active_area.width + self.bezel.right,
            self.bezel.top + self.active_area.height + self.bezel.bottom,
        )
    }

    /// Native pixel density along each axis (px per mm).
    pub fn px_per_mm(&self) -> (f64, f64) {
        (
            self.resolution.width as f64 / self.active_area.width,
            self.resolution.height as f64 / self.active_area.height,
        )
    }
}

/// Active area `(width, height)` in mm. The bezel is excluded.
pub fn active_area_size(panel_type: &PanelType) -> (f64, f64) {
    (panel_type.active_area.width, panel_type.active_area.height)
}

/// Physical footprint of a placed panel: active area plus bezel, canvas mm.
pub fn footprint(panel: &Panel) -> RectMm {
    panel.footprint()
}

/// Clockwise rotation of a panel's native "up" relative to the canvas "up".
///
/// Only quarter turns exist; arbitrary angles go through [`Rotation::quantize`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270];

    #[inline]
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    pub fn from_degrees(deg: u16) -> Option<Self> {
        match deg {
            0 => Some(Rotation::R0),
            90 => Some(Rotation::R90),
            180 => Some(Rotation::R180),
            270 => Some(Rotation::R270),
            _ => None,
        }
    }

    /// Snap an arbitrary clockwise angle (degrees) to the nearest quarter turn.
    ///
    /// Exact half-way angles (45°, 135°, ...) round up to the next step.
    pub fn quantize(deg: f64) -> Self {
        if !deg.is_finite() {
            return Rotation::R0;
        }
        let steps = (deg.rem_euclid(360.0) / 90.0).round() as i64;
        match steps.rem_euclid(4) {
            0 => Rotation::R0,
            1 => Rotation::R90,
            2 => Rotation::R180,
            _ => Rotation::R270,
        }
    }

    /// Rotation that undoes this one.
    #[inline]
    pub fn inverse(self) -> Self {
        match self {
            Rotation::R0 => Rotation::R0,
            Rotation::R90 => Rotation::R270,
            Rotation::R180 => Rotation::R180,
            Rotation::R270 => Rotation::R90,
        }
    }

    /// True for 90° and 270°, where width and height trade places.
    #[inline]
    pub fn is_quarter_turn(self) -> bool {
        matches!(self, Rotation::R90 | Rotation::R270)
    }

    /// Size of a native-orientation extent as seen on the canvas.
    #[inline]
    pub fn apply_to_size(self, size: SizeMm) -> SizeMm {
        if self.is_quarter_turn() {
            size.transposed()
        } else {
            size
        }
    }

    /// Bezel sides as seen on the canvas after rotating the panel clockwise.
    pub fn apply_to_bezel(self, b: Bezel) -> Bezel {
        match self {
            Rotation::R0 => b,
            Rotation::R90 => Bezel {
                top: b.left,
                right: b.top,
                bottom: b.right,
                left: b.bottom,
            },
            Rotation::R180 => Bezel {
                top: b.bottom,
                right: b.left,
                bottom: b.top,
                left: b.right,
            },
            Rotation::R270 => Bezel {
                top: b.right,
                right: b.bottom,
                bottom: b.left,
                left: b.top,
            },
        }
    }
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Rotation::from_degrees(value)
            .ok_or_else(|| format!("rotation must be 0, 90, 180 or 270 (got {value})"))
    }
}

impl From<Rotation> for u16 {
    fn from(value: Rotation) -> Self {
        value.degrees()
    }
}

/// One physical panel placed on the canvas.
#[derive(Clone, Debug, PartialEq)]
pub struct Panel {
    pub address: PanelAddress,
    pub panel_type: Arc<PanelType>,
    /// Top-left of the (rotated) active area on the canvas.
    pub position: PointMm,
    pub rotation: Rotation,
    /// Optional mm-per-photo-pixel correction recorded by calibration.
    pub scale_correction: Option<f64>,
}

impl Panel {
    pub fn new(
        address: PanelAddress,
        panel_type: Arc<PanelType>,
        position: PointMm,
        rotation: Rotation,
    ) -> Self {
        Self {
            address,
            panel_type,
            position,
            rotation,
            scale_correction: None,
        }
    }

    /// Active area on the canvas, width/height swapped at 90°/270°.
    pub fn canvas_rect(&self) -> RectMm {
        let size = self.rotation.apply_to_size(self.panel_type.active_area);
        RectMm::from_origin_size(self.position, size)
    }

    /// Active area grown by the (rotated) bezel.
    pub fn footprint(&self) -> RectMm {
        let bezel = self.rotation.apply_to_bezel(self.panel_type.bezel);
        self.canvas_rect().outset(&bezel)
    }

    /// Native resolution in the panel's own orientation.
    #[inline]
    pub fn native_resolution(&self) -> Resolution {
        self.panel_type.resolution
    }

    /// Pixel extent of the panel as seen on the canvas.
    #[inline]
    pub fn canvas_resolution(&self) -> Resolution {
        if self.rotation.is_quarter_turn() {
            self.panel_type.resolution.transposed()
        } else {
            self.panel_type.resolution
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ed097() -> PanelType {
        PanelType {
            name: "ED097TC2".into(),
            description: Some("9.7\" E-Paper Display".into()),
            active_area: SizeMm::new(139.425, 185.9),
            bezel: Bezel {
                top: 5.0,
                bottom: 12.0,
                left: 4.0,
                right: 4.0,
            },
            resolution: Resolution::new(1200, 1600),
            encoding: PayloadEncoding::Gray4,
        }
    }

    #[test]
    fn quantize_snaps_to_nearest_quarter_turn() {
        assert_eq!(Rotation::quantize(5.0), Rotation::R0);
        assert_eq!(Rotation::quantize(85.0), Rotation::R90);
        assert_eq!(Rotation::quantize(95.0), Rotation::R90);
        assert_eq!(Rotation::quantize(185.0), Rotation::R180);
        assert_eq!(Rotation::quantize(-10.0), Rotation::R0);
        assert_eq!(Rotation::quantize(-80.0), Rotation::R270);
        assert_eq!(Rotation::quantize(359.0), Rotation::R0);
        assert_eq!(Rotation::quantize(f64::NAN), Rotation::R0);
    }

    #[test]
    fn rotation_serializes_as_degrees() {
        assert_eq!(serde_json::to_string(&Rotation::R270).unwrap(), "270");
        let r: Rotation = serde_json::from_str("90").unwrap();
        assert_eq!(r, Rotation::R90);
        assert!(serde_json::from_str::<Rotation>("45").is_err());
    }

    #[test]
    fn inverse_composes_to_identity() {
        for r in Rotation::ALL {
            let total = (r.degrees() + r.inverse().degrees()) % 360;
            assert_eq!(total, 0);
        }
    }

    #[test]
    fn canvas_rect_swaps_axes_on_quarter_turns() {
        let ty = Arc::new(ed097());
        let addr = PanelAddress::parse("epd-1").unwrap();
        let mut p = Panel::new(addr, ty, PointMm::new(10.0, 20.0), Rotation::R0);
        assert_eq!(p.canvas_rect(), RectMm::new(10.0, 20.0, 139.425, 185.9));

        p.rotation = Rotation::R90;
        assert_eq!(p.canvas_rect(), RectMm::new(10.0, 20.0, 185.9, 139.425));
        assert_eq!(p.canvas_resolution(), Resolution::new(1600, 1200));
        assert_eq!(p.native_resolution(), Resolution::new(1200, 1600));
    }

    #[test]
    fn footprint_rotates_bezel_with_panel() {
        let ty = Arc::new(ed097());
        let addr = PanelAddress::parse("epd-1").unwrap();
        let p = Panel::new(addr, ty, PointMm::new(100.0, 100.0), Rotation::R90);
        let f = footprint(&p);
        // Native bottom bezel (12 mm) ends up on the canvas left.
        assert_eq!(f.x, 100.0 - 12.0);
        // Native left bezel (4 mm) ends up on the canvas top.
        assert_eq!(f.y, 100.0 - 4.0);
        assert_eq!(f.width, 185.9 + 12.0 + 5.0);
        assert_eq!(f.height, 139.425 + 4.0 + 4.0);
    }

    #[test]
    fn active_area_excludes_bezel() {
        let ty = ed097();
        assert_eq!(active_area_size(&ty), (139.425, 185.9));
        let total = ty.total_size();
        assert_eq!(total.width, 139.425 + 8.0);
        assert_eq!(total.height, 185.9 + 17.0);
    }

    #[test]
    fn validation_rejects_bad_types() {
        let mut ty = ed097();
        assert!(ty.validate().is_ok());
        ty.resolution.width = 0;
        assert!(matches!(
            ty.validate(),
            Err(PanelTypeError::InvalidResolution(_))
        ));
        let mut ty = ed097();
        ty.bezel.left = -1.0;
        assert!(matches!(ty.validate(), Err(PanelTypeError::InvalidBezel(_))));
        let mut ty = ed097();
        ty.active_area.width = f64::NAN;
        assert!(matches!(
            ty.validate(),
            Err(PanelTypeError::InvalidActiveArea(_))
        ));
    }
}
