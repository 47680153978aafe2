use crate::result::{Calibration, CalibrationDiagnostic, CalibrationResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tapestry_core::{PanelAddress, PointMm, Rotation};
use tapestry_marker::{mark_duplicates, Detection, DetectionIssue, DetectionStatus, Quad};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Solver configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverParams {
    /// Physical edge of every marker (mm), quiet zone excluded.
    pub marker_size_mm: f64,
    /// Per-address marker size when panels of different types are mixed.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub marker_size_overrides: BTreeMap<PanelAddress, f64>,
}

impl SolverParams {
    pub fn new(marker_size_mm: f64) -> Self {
        Self {
            marker_size_mm,
            marker_size_overrides: BTreeMap::new(),
        }
    }

    pub fn marker_size_for(&self, address: &PanelAddress) -> f64 {
        self.marker_size_overrides
            .get(address)
            .copied()
            .unwrap_or(self.marker_size_mm)
    }
}

#[derive(Clone, Debug)]
pub struct Solver {
    params: SolverParams,
}

impl Solver {
    pub fn new(params: SolverParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Solve one photo's detections.
    ///
    /// Never fails: unusable input produces empty results and diagnostics.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, detections), fields(n = detections.len()))
    )]
    pub fn solve(&self, detections: &[Detection]) -> Calibration {
        let mut out = Calibration::default();
        if detections.is_empty() {
            out.diagnostics.push(CalibrationDiagnostic::NoMarkersFound);
            out.diagnostics
                .push(CalibrationDiagnostic::InsufficientCalibrationData { detections: 0 });
            return out;
        }

        // A `Valid` status does not guarantee a solvable outline.
        let mut dets = detections.to_vec();
        for d in dets.iter_mut().filter(|d| d.is_valid()) {
            if !usable_outline(&d.quad) {
                d.status = DetectionStatus::Invalid {
                    issue: DetectionIssue::DegenerateQuad,
                };
            }
        }
        mark_duplicates(&mut dets);

        let mut solved: Vec<CalibrationResult> = Vec::with_capacity(dets.len());
        for d in &dets {
            match &d.status {
                DetectionStatus::Invalid { issue } => {
                    out.diagnostics.push(CalibrationDiagnostic::Rejected {
                        identity: d.identity.clone(),
                        issue: issue.clone(),
                    });
                }
                DetectionStatus::Duplicate => {
                    if let Some(address) = &d.address {
                        out.diagnostics.push(CalibrationDiagnostic::Duplicate {
                            address: address.clone(),
                            area_px: d.area_px,
                        });
                    }
                }
                DetectionStatus::Valid => {
                    let Some(address) = &d.address else { continue };
                    let size_mm = self.params.marker_size_for(address);
                    if !(size_mm > 0.0 && size_mm.is_finite()) {
                        out.diagnostics
                            .push(CalibrationDiagnostic::InvalidMarkerSize {
                                address: address.clone(),
                                size_mm,
                            });
                        continue;
                    }
                    solved.push(solve_one(d, address, size_mm));
                }
            }
        }

        if solved.is_empty() {
            out.diagnostics
                .push(CalibrationDiagnostic::InsufficientCalibrationData {
                    detections: detections.len(),
                });
            return out;
        }

        let min_x = solved
            .iter()
            .map(|r| r.position.x)
            .fold(f64::INFINITY, f64::min);
        let min_y = solved
            .iter()
            .map(|r| r.position.y)
            .fold(f64::INFINITY, f64::min);

        out.results = solved
            .into_iter()
            .map(|mut r| {
                r.position = PointMm::new(r.position.x - min_x, r.position.y - min_y);
                r
            })
            .collect();

        for r in &out.results {
            log::debug!(
                "{}: ({:.1}, {:.1}) mm, {:.1}° -> {}°, {:.4} mm/px, confidence {:.2}",
                r.address,
                r.position.x,
                r.position.y,
                r.angle_deg,
                r.rotation.degrees(),
                r.scale_mm_per_px,
                r.confidence
            );
        }
        log::info!(
            "calibrated {} panels from {} detections ({} diagnostics)",
            out.results.len(),
            detections.len(),
            out.diagnostics.len()
        );
        out
    }
}

fn usable_outline(quad: &Quad) -> bool {
    quad.is_finite() && quad.is_convex() && quad.mean_side() > 0.0
}

fn solve_one(d: &Detection, address: &PanelAddress, marker_size_mm: f64) -> CalibrationResult {
    let scale = marker_size_mm / d.quad.mean_side();
    let angle_deg = d.quad.orientation_deg();
    let c = d.quad.centroid();

    CalibrationResult {
        address: address.clone(),
        position: PointMm::new(c.x * scale, c.y * scale),
        rotation: Rotation::quantize(angle_deg),
        angle_deg,
        scale_mm_per_px: scale,
        confidence: d.quad.rectangularity().clamp(0.0, 1.0),
        panel_type: d.payload.as_ref().and_then(|p| p.panel_type.clone()),
    }
}

/// Solve with one marker size for every panel.
pub fn solve(detections: &[Detection], marker_size_mm: f64) -> Calibration {
    Solver::new(SolverParams::new(marker_size_mm)).solve(detections)
}
