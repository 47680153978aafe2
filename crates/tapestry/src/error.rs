use tapestry_compose::ComposeError;
use tapestry_core::{LayoutError, PanelAddress};
use tapestry_dispatch::TransportError;
use tapestry_marker::MarkerError;

/// Errors that abort a whole facade call.
///
/// Per-panel and per-marker problems are never reported here; they travel
/// as values inside reports.
#[derive(thiserror::Error, Debug)]
pub enum TapestryError {
    #[error("cannot decode image: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Marker(#[from] MarkerError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("panel {0} has no composed tile")]
    MissingTile(PanelAddress),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
