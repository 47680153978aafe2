//! Detection pass: decode, validate and de-duplicate markers.

use crate::decode::{MarkerDecoder, QrDecoder, RawMarker};
use crate::payload::{parse_identity, MarkerPayload, PayloadError};
use crate::quad::Quad;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tapestry_core::PanelAddress;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Per-marker problem. Reported with the detection, never raised.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DetectionIssue {
    #[error("marker could not be read: {0}")]
    Unreadable(String),
    #[error(transparent)]
    InvalidIdentity(#[from] PayloadError),
    #[error("marker outline is not a convex quadrilateral")]
    DegenerateQuad,
    #[error("marker outline covers {area_px:.1} px², below the {min_area_px:.1} px² minimum")]
    TooSmall { area_px: f64, min_area_px: f64 },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectionStatus {
    Valid,
    Invalid { issue: DetectionIssue },
    /// Same identity as a larger detection in the same photo.
    Duplicate,
}

/// One marker found in a calibration photo.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Decoded text; empty when the marker was unreadable.
    pub identity: String,
    /// Parsed address; `None` when the identity is unusable.
    pub address: Option<PanelAddress>,
    pub quad: Quad,
    pub area_px: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<MarkerPayload>,
    pub status: DetectionStatus,
}

impl Detection {
    /// Valid detection with a bare-address identity.
    pub fn valid(address: PanelAddress, quad: Quad) -> Self {
        Self {
            identity: address.to_string(),
            address: Some(address),
            area_px: quad.area(),
            quad,
            payload: None,
            status: DetectionStatus::Valid,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.status == DetectionStatus::Valid
    }

    #[inline]
    pub fn is_duplicate(&self) -> bool {
        self.status == DetectionStatus::Duplicate
    }
}

/// Detector tunables.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectParams {
    /// Quads smaller than this are treated as noise.
    pub min_area_px: f64,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self { min_area_px: 64.0 }
    }
}

/// Runs a [`MarkerDecoder`] and turns its output into [`Detection`]s.
#[derive(Clone, Debug, Default)]
pub struct Detector<D = QrDecoder> {
    decoder: D,
    params: DetectParams,
}

impl<D: MarkerDecoder> Detector<D> {
    pub fn new(decoder: D, params: DetectParams) -> Self {
        Self { decoder, params }
    }

    pub fn params(&self) -> &DetectParams {
        &self.params
    }

    /// Decode every marker in `photo`. No markers is an empty result.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, photo), fields(w = photo.width(), h = photo.height()))
    )]
    pub fn detect(&self, photo: &GrayImage) -> Vec<Detection> {
        let raw = self.decoder.decode(photo);
        log::debug!("decoder found {} candidate markers", raw.len());
        classify(raw, &self.params)
    }
}

/// Detect QR markers with default parameters.
pub fn detect(photo: &GrayImage) -> Vec<Detection> {
    Detector::new(QrDecoder, DetectParams::default()).detect(photo)
}

/// Validate raw markers and flag duplicates. Input order is preserved.
pub fn classify(raw: Vec<RawMarker>, params: &DetectParams) -> Vec<Detection> {
    let mut out: Vec<Detection> = raw.into_iter().map(|m| check(m, params)).collect();
    mark_duplicates(&mut out);

    for d in &out {
        match &d.status {
            DetectionStatus::Valid => {}
            DetectionStatus::Invalid { issue } => {
                log::warn!("marker {:?} rejected: {issue}", d.identity)
            }
            DetectionStatus::Duplicate => {
                log::warn!("marker {:?} seen more than once", d.identity)
            }
        }
    }
    out
}

fn check(raw: RawMarker, params: &DetectParams) -> Detection {
    let quad = raw.quad;
    let area_px = if quad.is_finite() { quad.area() } else { 0.0 };
    let mut det = Detection {
        identity: String::new(),
        address: None,
        quad,
        area_px,
        payload: None,
        status: DetectionStatus::Valid,
    };

    let text = match raw.text {
        Ok(text) => text,
        Err(reason) => {
            det.status = invalid(DetectionIssue::Unreadable(reason));
            return det;
        }
    };
    det.identity = text.trim().to_owned();

    match parse_identity(&text) {
        Ok(id) => {
            det.address = Some(id.address);
            det.payload = id.payload;
        }
        Err(e) => {
            det.status = invalid(e.into());
            return det;
        }
    }

    if !quad.is_finite() || !quad.is_convex() {
        det.status = invalid(DetectionIssue::DegenerateQuad);
    } else if area_px < params.min_area_px {
        det.status = invalid(DetectionIssue::TooSmall {
            area_px,
            min_area_px: params.min_area_px,
        });
    }
    det
}

fn invalid(issue: DetectionIssue) -> DetectionStatus {
    DetectionStatus::Invalid { issue }
}

/// Among valid detections sharing an address keep the largest and flag the
/// rest as [`DetectionStatus::Duplicate`]. Ties go to the earlier detection.
pub fn mark_duplicates(detections: &mut [Detection]) {
    let mut best: HashMap<PanelAddress, usize> = HashMap::new();
    for (i, d) in detections.iter().enumerate() {
        if !d.is_valid() {
            continue;
        }
        let Some(addr) = &d.address else { continue };
        match best.get(addr) {
            Some(&j) if detections[j].area_px >= d.area_px => {}
            _ => {
                best.insert(addr.clone(), i);
            }
        }
    }

    for (i, d) in detections.iter_mut().enumerate() {
        if !d.is_valid() {
            continue;
        }
        if let Some(addr) = &d.address {
            if best.get(addr) != Some(&i) {
                d.status = DetectionStatus::Duplicate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    struct Canned(Vec<RawMarker>);

    impl MarkerDecoder for Canned {
        fn decode(&self, _photo: &GrayImage) -> Vec<RawMarker> {
            self.0.clone()
        }
    }

    fn raw(text: &str, quad: Quad) -> RawMarker {
        RawMarker {
            text: Ok(text.to_owned()),
            quad,
        }
    }

    fn run(markers: Vec<RawMarker>) -> Vec<Detection> {
        Detector::new(Canned(markers), DetectParams::default()).detect(&GrayImage::new(1, 1))
    }

    #[test]
    fn no_markers_is_empty_not_error() {
        assert!(run(Vec::new()).is_empty());
    }

    #[test]
    fn valid_marker_carries_address_and_area() {
        let dets = run(vec![raw("panel-1.local", Quad::square(0.0, 0.0, 20.0))]);
        assert_eq!(dets.len(), 1);
        assert!(dets[0].is_valid());
        assert_eq!(dets[0].address.as_ref().unwrap().as_str(), "panel-1.local");
        assert_eq!(dets[0].area_px, 400.0);
    }

    #[test]
    fn bad_markers_are_reported_not_dropped() {
        let bow = Quad::new([
            Point2::new(0.0, 0.0),
            Point2::new(30.0, 30.0),
            Point2::new(30.0, 0.0),
            Point2::new(0.0, 30.0),
        ]);
        let dets = run(vec![
            RawMarker {
                text: Err("ecc failure".into()),
                quad: Quad::square(0.0, 0.0, 20.0),
            },
            raw("", Quad::square(0.0, 0.0, 20.0)),
            raw("not an address!", Quad::square(0.0, 0.0, 20.0)),
            raw("a.local", bow),
            raw("b.local", Quad::square(0.0, 0.0, 4.0)),
        ]);
        assert_eq!(dets.len(), 5);
        assert!(dets.iter().all(|d| !d.is_valid()));
        let issues: Vec<_> = dets
            .iter()
            .map(|d| match &d.status {
                DetectionStatus::Invalid { issue } => issue.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert!(matches!(issues[0], DetectionIssue::Unreadable(_)));
        assert_eq!(
            issues[1],
            DetectionIssue::InvalidIdentity(PayloadError::Empty)
        );
        assert!(matches!(
            issues[2],
            DetectionIssue::InvalidIdentity(PayloadError::InvalidAddress(_))
        ));
        assert_eq!(issues[3], DetectionIssue::DegenerateQuad);
        assert!(matches!(issues[4], DetectionIssue::TooSmall { .. }));
    }

    #[test]
    fn duplicate_keeps_larger_area() {
        let dets = run(vec![
            raw("dup.local", Quad::square(0.0, 0.0, 10.0)),
            raw("dup.local", Quad::square(50.0, 0.0, 12.0)),
            raw("other.local", Quad::square(100.0, 0.0, 10.0)),
        ]);
        assert!(dets[0].is_duplicate());
        assert!(dets[1].is_valid());
        assert!(dets[2].is_valid());
    }

    #[test]
    fn structured_payload_is_parsed() {
        let text = r#"TAPESTRY:{"host":"wall-2","panel_type":"A5"}"#;
        let dets = run(vec![raw(text, Quad::square(0.0, 0.0, 30.0))]);
        assert!(dets[0].is_valid());
        assert_eq!(dets[0].address.as_ref().unwrap().as_str(), "wall-2");
        assert_eq!(
            dets[0].payload.as_ref().and_then(|p| p.panel_type.as_deref()),
            Some("A5")
        );
    }
}
