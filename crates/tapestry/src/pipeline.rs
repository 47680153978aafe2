//! End-to-end helpers over decoded images.

use crate::io::CalibrationReport;
use crate::TapestryError;
use image::{DynamicImage, GrayImage, ImageReader};
use std::collections::BTreeMap;
use std::path::Path;
use tapestry_calib::{Solver, SolverParams};
use tapestry_compose::{ComposeParams, Composition, Compositor};
use tapestry_core::{Layout, PanelAddress, PanelType};
use tapestry_dispatch::DispatchJob;
use tapestry_marker::{
    code_px_to_mm, marker_physical_size_mm, render_marker_for, stamp_marker_size, DetectParams,
    Detection, Detector, MarkerPayload, QrDecoder,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Decode an image file, guessing the format from its content.
pub fn open_image(path: impl AsRef<Path>) -> Result<DynamicImage, TapestryError> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(img)
}

/// Decode an in-memory image (an upload, for instance).
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, TapestryError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Compose any decoded image across the layout.
pub fn compose_image(
    layout: &Layout,
    source: &DynamicImage,
    params: ComposeParams,
) -> Result<Composition, TapestryError> {
    let rgb = source.to_rgb8();
    Ok(Compositor::new(params).compose(layout, &rgb)?)
}

/// One dispatch job per panel, encoded the way its panel type expects.
pub fn dispatch_jobs(
    layout: &Layout,
    composition: &Composition,
) -> Result<Vec<DispatchJob>, TapestryError> {
    layout
        .panels()
        .iter()
        .map(|panel| {
            let tile = composition
                .tiles
                .get(&panel.address)
                .ok_or_else(|| TapestryError::MissingTile(panel.address.clone()))?;
            Ok(DispatchJob::new(
                panel.address.clone(),
                tile.image.clone(),
                panel.panel_type.encoding,
            ))
        })
        .collect()
}

/// Text shown in a panel's calibration marker, carrying the size the code
/// is drawn at.
pub fn marker_text(
    address: &PanelAddress,
    panel_type: &PanelType,
) -> Result<String, TapestryError> {
    let payload = MarkerPayload {
        host: address.to_string(),
        panel_type: Some(panel_type.name.clone()),
        screen_width_px: Some(panel_type.resolution.width),
        screen_height_px: Some(panel_type.resolution.height),
        marker_px: None,
    };
    Ok(stamp_marker_size(
        &payload,
        panel_type.resolution.width,
        panel_type.resolution.height,
    )?)
}

/// Calibration marker for every panel, at native resolution and orientation.
pub fn marker_images(layout: &Layout) -> Result<BTreeMap<PanelAddress, GrayImage>, TapestryError> {
    layout
        .panels()
        .iter()
        .map(|panel| {
            let text = marker_text(&panel.address, &panel.panel_type)?;
            let (img, _) = render_marker_for(&text, &panel.panel_type)?;
            Ok((panel.address.clone(), img))
        })
        .collect()
}

/// Marker images wrapped as dispatch jobs.
pub fn marker_jobs(layout: &Layout) -> Result<Vec<DispatchJob>, TapestryError> {
    let images = marker_images(layout)?;
    Ok(layout
        .panels()
        .iter()
        .filter_map(|panel| {
            let img = images.get(&panel.address)?;
            Some(DispatchJob::new(
                panel.address.clone(),
                DynamicImage::ImageLuma8(img.clone()).to_rgb8(),
                panel.panel_type.encoding,
            ))
        })
        .collect())
}

/// Physical marker size per detected address, from marker payloads whose
/// panel type is known.
///
/// The code edge stamped into the payload is used when present; older
/// payloads without it fall back to re-deriving the layout of the code.
pub fn marker_sizes_from_payloads(
    detections: &[Detection],
    panel_types: &[PanelType],
) -> BTreeMap<PanelAddress, f64> {
    let mut sizes = BTreeMap::new();
    for d in detections.iter().filter(|d| d.is_valid()) {
        let (Some(address), Some(payload)) = (&d.address, &d.payload) else {
            continue;
        };
        let Some(name) = payload.panel_type.as_deref() else {
            continue;
        };
        let Some(ty) = panel_types.iter().find(|t| t.name == name) else {
            log::warn!("{address}: marker names unknown panel type {name:?}");
            continue;
        };
        let size = match payload.marker_px {
            Some(px) => code_px_to_mm(px, ty),
            None => marker_physical_size_mm(&d.identity, ty),
        };
        match size {
            Ok(mm) => {
                sizes.insert(address.clone(), mm);
            }
            Err(e) => log::warn!("{address}: {e}"),
        }
    }
    sizes
}

/// Detect markers in a photo and solve panel placements.
///
/// `marker_size_mm` applies to markers whose size cannot be derived from
/// their payload; without it such markers are reported, not solved.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(w = photo.width(), h = photo.height()))
)]
pub fn calibrate_photo(
    photo: &DynamicImage,
    panel_types: &[PanelType],
    marker_size_mm: Option<f64>,
    default_panel_type: Option<&str>,
    detect: &DetectParams,
) -> Result<CalibrationReport, TapestryError> {
    let gray = photo.to_luma8();
    let detections = Detector::new(QrDecoder, detect.clone()).detect(&gray);

    let mut params = SolverParams::new(marker_size_mm.unwrap_or(f64::NAN));
    params.marker_size_overrides = marker_sizes_from_payloads(&detections, panel_types);
    if let Some(mm) = marker_size_mm {
        // An explicit size wins over payload-derived ones.
        params.marker_size_overrides.clear();
        params.marker_size_mm = mm;
    }
    let mut calibration = Solver::new(params).solve(&detections);

    let layout = if calibration.is_empty() || panel_types.is_empty() {
        None
    } else {
        let (layout, skipped) = calibration.to_layout_config(panel_types, default_panel_type);
        calibration.diagnostics.extend(skipped);
        layout
    };

    Ok(CalibrationReport {
        photo_width: gray.width(),
        photo_height: gray.height(),
        detections,
        calibration,
        layout,
    })
}
