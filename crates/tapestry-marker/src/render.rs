//! Marker images shown on panels during calibration.

use crate::payload::MarkerPayload;
use image::{GrayImage, Luma};
use qrcode::{Color, QrCode};
use serde::{Deserialize, Serialize};
use tapestry_core::PanelType;

/// Share of the panel's shorter side used by the marker (quiet zone included).
pub const MARKER_FILL: f64 = 0.75;
/// Smallest module edge that still survives a phone photo of the wall.
pub const MIN_MODULE_PX: u32 = 3;
/// Light modules around the code, per the QR standard.
pub const QUIET_ZONE_MODULES: u32 = 4;

#[derive(thiserror::Error, Debug)]
pub enum MarkerError {
    #[error("cannot encode marker text: {0}")]
    Encode(#[from] qrcode::types::QrError),
    #[error("screen {width}x{height} px is too small: modules would be {module_px} px (min {min_px})")]
    ModulesTooSmall {
        width: u32,
        height: u32,
        module_px: u32,
        min_px: u32,
    },
    #[error("panel type {0:?} has no usable pixel density")]
    InvalidPanelType(String),
}

/// Geometry of a marker drawn on a panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerGeometry {
    /// Modules per side, quiet zone excluded.
    pub modules: u32,
    pub module_px: u32,
    /// Edge of the code in screen pixels, quiet zone excluded.
    pub code_px: u32,
    /// Top-left of the code on the screen.
    pub x: u32,
    pub y: u32,
}

/// Where a code with `modules` per side lands on a `width × height` screen.
pub fn marker_geometry(
    modules: u32,
    width: u32,
    height: u32,
) -> Result<MarkerGeometry, MarkerError> {
    let target = (width.min(height) as f64 * MARKER_FILL).floor() as u32;
    let module_px = target / (modules + 2 * QUIET_ZONE_MODULES).max(1);
    if module_px < MIN_MODULE_PX {
        return Err(MarkerError::ModulesTooSmall {
            width,
            height,
            module_px,
            min_px: MIN_MODULE_PX,
        });
    }
    let code_px = modules * module_px;
    Ok(MarkerGeometry {
        modules,
        module_px,
        code_px,
        x: (width - code_px) / 2,
        y: (height - code_px) / 2,
    })
}

/// White `width × height` image with `text` as a centered QR code.
pub fn render_marker(
    text: &str,
    width: u32,
    height: u32,
) -> Result<(GrayImage, MarkerGeometry), MarkerError> {
    let code = QrCode::new(text.as_bytes())?;
    let modules = code.width() as u32;
    let geom = marker_geometry(modules, width, height)?;
    let colors = code.to_colors();

    let mut img = GrayImage::from_pixel(width, height, Luma([255]));
    for my in 0..modules {
        for mx in 0..modules {
            if colors[(my * modules + mx) as usize] != Color::Dark {
                continue;
            }
            let x0 = geom.x + mx * geom.module_px;
            let y0 = geom.y + my * geom.module_px;
            for y in y0..y0 + geom.module_px {
                for x in x0..x0 + geom.module_px {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
    }

    log::debug!(
        "marker {}x{} modules at {} px/module on {}x{}",
        modules,
        modules,
        geom.module_px,
        width,
        height
    );
    Ok((img, geom))
}

/// Marker for a panel type at its native resolution.
pub fn render_marker_for(
    text: &str,
    panel_type: &PanelType,
) -> Result<(GrayImage, MarkerGeometry), MarkerError> {
    render_marker(
        text,
        panel_type.resolution.width,
        panel_type.resolution.height,
    )
}

/// Physical edge (mm) of the code `text` renders to on `panel_type`.
///
/// This is the size the solver needs: decoders report the code's outer
/// corners without the quiet zone.
pub fn marker_physical_size_mm(text: &str, panel_type: &PanelType) -> Result<f64, MarkerError> {
    let code = QrCode::new(text.as_bytes())?;
    let geom = marker_geometry(
        code.width() as u32,
        panel_type.resolution.width,
        panel_type.resolution.height,
    )?;
    code_px_to_mm(geom.code_px, panel_type)
}

/// Screen pixels to millimeters at the panel's mean pixel density.
pub fn code_px_to_mm(code_px: u32, panel_type: &PanelType) -> Result<f64, MarkerError> {
    let (px_per_mm_x, px_per_mm_y) = panel_type.px_per_mm();
    let px_per_mm = 0.5 * (px_per_mm_x + px_per_mm_y);
    if !(px_per_mm > 0.0 && px_per_mm.is_finite()) {
        return Err(MarkerError::InvalidPanelType(panel_type.name.clone()));
    }
    Ok(code_px as f64 / px_per_mm)
}

/// Encode `payload` with `marker_px` set to the edge of the code that very
/// text renders to on a `width × height` screen.
///
/// The size field changes the text length and so possibly the QR version;
/// when no stable value is found within a few rounds the field is left out.
pub fn stamp_marker_size(
    payload: &MarkerPayload,
    width: u32,
    height: u32,
) -> Result<String, MarkerError> {
    let mut stamped = payload.clone();
    for _ in 0..4 {
        let text = stamped.encode();
        let modules = QrCode::new(text.as_bytes())?.width() as u32;
        let code_px = marker_geometry(modules, width, height)?.code_px;
        if stamped.marker_px == Some(code_px) {
            return Ok(text);
        }
        stamped.marker_px = Some(code_px);
    }
    log::warn!("{}: marker size does not settle, leaving it out", payload.host);
    stamped.marker_px = None;
    Ok(stamped.encode())
}
