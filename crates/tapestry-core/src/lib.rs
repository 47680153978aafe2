//! Core types for multi-panel e-paper mosaics.
//!
//! This crate is intentionally small and purely geometric. It describes panel
//! hardware ([`PanelType`]), where each panel sits on the shared millimeter
//! canvas ([`Panel`], [`Layout`]) and how panels are addressed on the network
//! ([`PanelAddress`]). It does *not* depend on any image type or transport.

mod address;
mod geometry;
mod layout;
mod logger;
mod panel;

pub use address::{AddressError, PanelAddress};
pub use geometry::{Bezel, PointMm, RectMm, Resolution, SizeMm};
pub use layout::{Layout, LayoutConfig, LayoutError, PanelEntry, PanelOverlap};
pub use panel::{
    active_area_size, footprint, Panel, PanelType, PanelTypeError, PayloadEncoding, Rotation,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, parse_level, LoggerError};
