use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tapestry_core::{LayoutConfig, PanelAddress, PanelEntry, PanelType, PointMm, Rotation};
use tapestry_marker::DetectionIssue;

/// Solved placement for one marker identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub address: PanelAddress,
    /// Marker center in the normalized calibration frame (mm).
    pub position: PointMm,
    pub rotation: Rotation,
    /// Measured marker axis angle before quantization, degrees clockwise.
    pub angle_deg: f64,
    /// Millimeters per photo pixel at this marker.
    pub scale_mm_per_px: f64,
    /// Rectangularity of the marker outline in `[0, 1]`.
    pub confidence: f64,
    /// Panel type announced by the marker, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panel_type: Option<String>,
}

impl CalibrationResult {
    /// Top-left of the panel's active area, assuming the marker is centered
    /// on the screen.
    pub fn placement(&self, panel_type: &PanelType) -> PointMm {
        let size = self.rotation.apply_to_size(panel_type.active_area);
        PointMm::new(
            self.position.x - 0.5 * size.width,
            self.position.y - 0.5 * size.height,
        )
    }
}

/// Non-fatal observation about a calibration run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationDiagnostic {
    /// The photo contained no markers at all.
    NoMarkersFound,
    /// No usable detection; results are empty. `detections` counts what
    /// the photo did contain.
    InsufficientCalibrationData { detections: usize },
    /// Marker found but unusable.
    Rejected {
        identity: String,
        issue: DetectionIssue,
    },
    /// Smaller second sighting of an address.
    Duplicate { address: PanelAddress, area_px: f64 },
    /// Configured marker size for this address is not a positive number.
    InvalidMarkerSize { address: PanelAddress, size_mm: f64 },
    /// Solved, but left out of the layout proposal: no panel type named.
    MissingPanelType { address: PanelAddress },
    /// Solved, but left out of the layout proposal: type not in the table.
    UnknownPanelType {
        address: PanelAddress,
        panel_type: String,
    },
}

/// Output of one solver run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub results: Vec<CalibrationResult>,
    pub diagnostics: Vec<CalibrationDiagnostic>,
}

impl Calibration {
    pub fn get(&self, address: &PanelAddress) -> Option<&CalibrationResult> {
        self.results.iter().find(|r| &r.address == address)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Fresh layout document built from the results alone.
    ///
    /// Each panel's type comes from its marker payload, else from
    /// `default_type`. Results whose type cannot be resolved are left out
    /// and explained by the returned diagnostics. Placements are shifted so
    /// the canvas starts at (0, 0). `None` when nothing could be placed.
    pub fn to_layout_config(
        &self,
        panel_types: &[PanelType],
        default_type: Option<&str>,
    ) -> (Option<LayoutConfig>, Vec<CalibrationDiagnostic>) {
        let by_name: HashMap<&str, Arc<PanelType>> = panel_types
            .iter()
            .map(|t| (t.name.as_str(), Arc::new(t.clone())))
            .collect();

        let mut skipped = Vec::new();
        let mut placed = Vec::with_capacity(self.results.len());
        for r in &self.results {
            let Some(name) = r.panel_type.as_deref().or(default_type) else {
                log::warn!("{}: no panel type, left out of the layout", r.address);
                skipped.push(CalibrationDiagnostic::MissingPanelType {
                    address: r.address.clone(),
                });
                continue;
            };
            let Some(ty) = by_name.get(name) else {
                log::warn!("{}: unknown panel type {name:?}, left out of the layout", r.address);
                skipped.push(CalibrationDiagnostic::UnknownPanelType {
                    address: r.address.clone(),
                    panel_type: name.to_owned(),
                });
                continue;
            };
            placed.push((r, ty, r.placement(ty)));
        }

        if placed.is_empty() {
            return (None, skipped);
        }

        let min_x = placed.iter().map(|(_, _, p)| p.x).fold(f64::INFINITY, f64::min);
        let min_y = placed.iter().map(|(_, _, p)| p.y).fold(f64::INFINITY, f64::min);

        let panels = placed
            .into_iter()
            .map(|(r, ty, p)| PanelEntry {
                address: r.address.to_string(),
                panel_type: ty.name.clone(),
                x_mm: p.x - min_x,
                y_mm: p.y - min_y,
                rotation: r.rotation,
                scale_correction: Some(r.scale_mm_per_px),
            })
            .collect();

        let config = LayoutConfig {
            panel_types: panel_types.to_vec(),
            panels,
        };
        (Some(config), skipped)
    }
}
