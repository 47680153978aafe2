//! Calibration markers.
//!
//! Each panel shows a QR code carrying its address (bare, or as a
//! `TAPESTRY:{json}` payload). A photo of the wall is then scanned with a
//! [`MarkerDecoder`]; every code found becomes a [`Detection`] with its photo
//! outline and a status:
//! - valid: readable, a panel address, convex outline above the minimum area,
//! - invalid: kept with a [`DetectionIssue`] so callers can warn the user,
//! - duplicate: the same address seen again with a smaller outline.
//!
//! [`render_detections`] draws those statuses over the photo for review.

mod decode;
mod detect;
mod overlay;
mod payload;
mod quad;
mod render;

pub use decode::{MarkerDecoder, QrDecoder, RawMarker};
pub use detect::{
    classify, detect, mark_duplicates, DetectParams, Detection, DetectionIssue, DetectionStatus,
    Detector,
};
pub use overlay::{render_detections, OverlayStyle};
pub use payload::{parse_identity, MarkerIdentity, MarkerPayload, PayloadError, PAYLOAD_PREFIX};
pub use quad::Quad;
pub use render::{
    code_px_to_mm, marker_geometry, marker_physical_size_mm, render_marker, render_marker_for,
    stamp_marker_size, MarkerError, MarkerGeometry, MARKER_FILL, MIN_MODULE_PX,
    QUIET_ZONE_MODULES,
};
