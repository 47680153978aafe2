//! Canvas compositor.
//!
//! Maps one source image across every panel of a [`tapestry_core::Layout`]:
//! the image is cover-fitted onto the millimeter canvas, each panel's active
//! area is resampled to the panel's pixel grid and the result is rotated into
//! the panel's native orientation.
//!
//! ```no_run
//! use tapestry_compose::{compose, ComposeParams, Compositor};
//! # fn run(layout: &tapestry_core::Layout, img: &image::RgbImage) -> Result<(), tapestry_compose::ComposeError> {
//! let tiles = compose(layout, img)?.tiles;
//! let preview = Compositor::new(ComposeParams::preview()).compose(layout, img)?;
//! # let _ = (tiles, preview);
//! # Ok(())
//! # }
//! ```

mod compose;
mod fit;
mod preview;
mod sample;

pub use compose::{
    compose, preview_px_per_mm, to_canvas_orientation, to_native_orientation, ComposeError,
    ComposeParams, Composition, Compositor, RenderMode, Tile, MAX_RENDER_PX,
};
pub use fit::{CoverFit, SourceRect};
pub use preview::{render_preview, PreviewStyle};
