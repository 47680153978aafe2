//! Keyed set of placed panels sharing one canvas frame.

use crate::{
    AddressError, Panel, PanelAddress, PanelType, PanelTypeError, PointMm, RectMm, Rotation,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Errors that make a layout unusable as a whole.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("panel {address}: unknown panel type {panel_type:?}")]
    UnknownPanelType {
        address: String,
        panel_type: String,
    },
    #[error("duplicate panel address {0}")]
    DuplicateAddress(PanelAddress),
    #[error("duplicate panel type {0:?}")]
    DuplicatePanelType(String),
    #[error("invalid panel address: {0}")]
    InvalidAddress(#[from] AddressError),
    #[error(transparent)]
    InvalidPanelType(#[from] PanelTypeError),
    #[error("panel {0}: position must be finite")]
    InvalidPosition(PanelAddress),
    #[error("panel {0} is not part of the layout")]
    UnknownPanel(PanelAddress),
}

/// One panel as stored in a layout document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PanelEntry {
    pub address: String,
    pub panel_type: String,
    pub x_mm: f64,
    pub y_mm: f64,
    #[serde(default)]
    pub rotation: Rotation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_correction: Option<f64>,
}

/// Serializable layout document: panel-type table plus ordered panels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub panel_types: Vec<PanelType>,
    #[serde(default)]
    pub panels: Vec<PanelEntry>,
}

/// Two panels whose physical footprints overlap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PanelOverlap {
    pub a: PanelAddress,
    pub b: PanelAddress,
    pub area_mm2: f64,
}

/// Ordered panels keyed by address.
///
/// Insertion order is preserved for iteration; lookups go through the
/// address index. The canvas bounding box is always derived, never stored.
#[derive(Clone, Debug, Default)]
pub struct Layout {
    panel_types: BTreeMap<String, Arc<PanelType>>,
    panels: Vec<Panel>,
    index: HashMap<PanelAddress, usize>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a layout document and build the keyed layout.
    pub fn from_config(config: &LayoutConfig) -> Result<Self, LayoutError> {
        let mut layout = Layout::new();
        for ty in &config.panel_types {
            layout.add_panel_type(ty.clone())?;
        }

        for entry in &config.panels {
            let address = PanelAddress::parse(&entry.address)?;
            let panel_type = layout.panel_type(&entry.panel_type).ok_or_else(|| {
                LayoutError::UnknownPanelType {
                    address: entry.address.clone(),
                    panel_type: entry.panel_type.clone(),
                }
            })?;
            let mut panel = Panel::new(
                address,
                panel_type,
                PointMm::new(entry.x_mm, entry.y_mm),
                entry.rotation,
            );
            panel.scale_correction = entry.scale_correction;
            layout.insert(panel)?;
        }

        log::debug!(
            "layout: {} panel types, {} panels",
            layout.panel_types.len(),
            layout.panels.len()
        );
        Ok(layout)
    }

    /// Serialize back into a layout document (panel order preserved).
    pub fn to_config(&self) -> LayoutConfig {
        LayoutConfig {
            panel_types: self
                .panel_types
                .values()
                .map(|t| t.as_ref().clone())
                .collect(),
            panels: self
                .panels
                .iter()
                .map(|p| PanelEntry {
                    address: p.address.to_string(),
                    panel_type: p.panel_type.name.clone(),
                    x_mm: p.position.x,
                    y_mm: p.position.y,
                    rotation: p.rotation,
                    scale_correction: p.scale_correction,
                })
                .collect(),
        }
    }

    /// Register a panel type; returns the shared handle.
    pub fn add_panel_type(&mut self, ty: PanelType) -> Result<Arc<PanelType>, LayoutError> {
        ty.validate()?;
        if self.panel_types.contains_key(&ty.name) {
            return Err(LayoutError::DuplicatePanelType(ty.name));
        }
        let ty = Arc::new(ty);
        self.panel_types.insert(ty.name.clone(), Arc::clone(&ty));
        Ok(ty)
    }

    pub fn panel_type(&self, name: &str) -> Option<Arc<PanelType>> {
        self.panel_types.get(name).cloned()
    }

    pub fn panel_types(&self) -> impl Iterator<Item = &Arc<PanelType>> {
        self.panel_types.values()
    }

    /// Append a panel. Its type does not need to be registered beforehand.
    pub fn insert(&mut self, panel: Panel) -> Result<(), LayoutError> {
        panel.panel_type.validate()?;
        if self.index.contains_key(&panel.address) {
            return Err(LayoutError::DuplicateAddress(panel.address));
        }
        if !(panel.position.x.is_finite() && panel.position.y.is_finite()) {
            return Err(LayoutError::InvalidPosition(panel.address));
        }
        self.panel_types
            .entry(panel.panel_type.name.clone())
            .or_insert_with(|| Arc::clone(&panel.panel_type));
        self.index.insert(panel.address.clone(), self.panels.len());
        self.panels.push(panel);
        Ok(())
    }

    /// Move or turn an existing panel (calibration apply or manual edit).
    pub fn set_placement(
        &mut self,
        address: &PanelAddress,
        position: PointMm,
        rotation: Rotation,
    ) -> Result<(), LayoutError> {
        if !(position.x.is_finite() && position.y.is_finite()) {
            return Err(LayoutError::InvalidPosition(address.clone()));
        }
        let idx = *self
            .index
            .get(address)
            .ok_or_else(|| LayoutError::UnknownPanel(address.clone()))?;
        let panel = &mut self.panels[idx];
        panel.position = position;
        panel.rotation = rotation;
        Ok(())
    }

    pub fn get(&self, address: &PanelAddress) -> Option<&Panel> {
        self.index.get(address).map(|&i| &self.panels[i])
    }

    pub fn contains(&self, address: &PanelAddress) -> bool {
        self.index.contains_key(address)
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.panels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.panels.is_empty()
    }

    /// Union of all rotated active areas; `None` for an empty layout.
    pub fn canvas_bounds(&self) -> Option<RectMm> {
        let rects: Vec<RectMm> = self.panels.iter().map(Panel::canvas_rect).collect();
        RectMm::bounding(&rects)
    }

    /// Union of all physical footprints (active area + bezel).
    pub fn footprint_bounds(&self) -> Option<RectMm> {
        let rects: Vec<RectMm> = self.panels.iter().map(Panel::footprint).collect();
        RectMm::bounding(&rects)
    }

    /// Pairs of panels whose footprints overlap. Informational only.
    pub fn overlaps(&self) -> Vec<PanelOverlap> {
        let mut out = Vec::new();
        for (i, a) in self.panels.iter().enumerate() {
            let fa = a.footprint();
            for b in &self.panels[i + 1..] {
                if let Some(region) = fa.intersection(&b.footprint()) {
                    out.push(PanelOverlap {
                        a: a.address.clone(),
                        b: b.address.clone(),
                        area_mm2: region.area(),
                    });
                }
            }
        }
        out
    }
}
