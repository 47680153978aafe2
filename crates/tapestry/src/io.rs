//! JSON documents read and written by the facade.

use crate::TapestryError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tapestry_calib::Calibration;
use tapestry_core::{Layout, LayoutConfig};
use tapestry_marker::{DetectParams, Detection};

/// Read a JSON document.
pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, TapestryError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Write `value` as pretty JSON.
pub fn write_json<T: Serialize + ?Sized>(
    value: &T,
    path: impl AsRef<Path>,
) -> Result<(), TapestryError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// Load and validate a layout document.
pub fn load_layout(path: impl AsRef<Path>) -> Result<Layout, TapestryError> {
    let config: LayoutConfig = load_json(path)?;
    Ok(Layout::from_config(&config)?)
}

pub fn save_layout(layout: &Layout, path: impl AsRef<Path>) -> Result<(), TapestryError> {
    write_json(&layout.to_config(), path)
}

/// Inputs of one calibration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrateConfig {
    pub photo_path: String,
    /// Layout whose panel-type table resolves marker payloads.
    #[serde(default)]
    pub layout_path: Option<String>,
    /// Panel type for markers that do not name one.
    #[serde(default)]
    pub default_panel_type: Option<String>,
    /// Fixed marker edge (mm). When absent, sizes come from marker payloads.
    #[serde(default)]
    pub marker_size_mm: Option<f64>,
    #[serde(default)]
    pub detect: DetectParams,
    #[serde(default)]
    pub output_path: Option<String>,
    /// Where to write the proposed layout, if anywhere.
    #[serde(default)]
    pub layout_output_path: Option<String>,
    /// Where to write the photo annotated with detections, if anywhere.
    #[serde(default)]
    pub debug_image_path: Option<String>,
}

impl CalibrateConfig {
    pub fn new(photo_path: impl Into<String>) -> Self {
        Self {
            photo_path: photo_path.into(),
            layout_path: None,
            default_panel_type: None,
            marker_size_mm: None,
            detect: DetectParams::default(),
            output_path: None,
            layout_output_path: None,
            debug_image_path: None,
        }
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TapestryError> {
        load_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TapestryError> {
        write_json(self, path)
    }

    /// Resolve the output report path.
    pub fn output_path(&self) -> PathBuf {
        self.output_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("calibration_report.json"))
    }
}

/// Everything one calibration run found, for review before applying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub photo_width: u32,
    pub photo_height: u32,
    pub detections: Vec<Detection>,
    pub calibration: Calibration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutConfig>,
}

impl CalibrationReport {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TapestryError> {
        load_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TapestryError> {
        write_json(self, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calibrate_config_defaults() {
        let cfg: CalibrateConfig = serde_json::from_str(r#"{"photo_path":"wall.jpg"}"#).unwrap();
        assert_eq!(cfg.detect, DetectParams::default());
        assert_eq!(cfg.output_path(), PathBuf::from("calibration_report.json"));
        assert!(cfg.marker_size_mm.is_none());
    }
}
