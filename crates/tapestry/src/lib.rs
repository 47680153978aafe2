//! High-level facade for the `tapestry-*` workspace.
//!
//! Tapestry shows one image across a wall of independently addressed
//! e-paper panels, and can measure the wall from a single photo of the
//! panels displaying QR markers.
//!
//! ## Quickstart
//!
//! ```no_run
//! use tapestry::{compose_image, dispatch_jobs, load_layout, open_image, ComposeParams};
//!
//! # fn main() -> Result<(), tapestry::TapestryError> {
//! let layout = load_layout("wall.json")?;
//! let img = open_image("sunset.jpg")?;
//! let composition = compose_image(&layout, &img, ComposeParams::default())?;
//! let jobs = dispatch_jobs(&layout, &composition)?;
//! println!("{} tiles ready", jobs.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `tapestry::core`: panel types, panels, layouts, addresses, logging.
//! - `tapestry::compose`: cover-fit compositing and previews.
//! - `tapestry::marker`: marker payloads, rendering and photo detection.
//! - `tapestry::calib`: the calibration solver.
//! - `tapestry::dispatch`: concurrent delivery to panels.

pub use tapestry_calib as calib;
pub use tapestry_compose as compose;
pub use tapestry_core as core;
pub use tapestry_dispatch as dispatch;
pub use tapestry_marker as marker;

pub use tapestry_calib::{Calibration, CalibrationResult, SolverParams};
pub use tapestry_compose::{ComposeParams, Composition, RenderMode, Tile};
pub use tapestry_core::{Layout, LayoutConfig, Panel, PanelAddress, PanelType, Rotation};
pub use tapestry_dispatch::{DispatchReport, Dispatcher, HttpTransport, Outcome};
pub use tapestry_marker::{DetectParams, Detection};

mod error;
pub mod io;
mod pipeline;

pub use error::TapestryError;
pub use io::{load_json, load_layout, save_layout, write_json, CalibrateConfig, CalibrationReport};
pub use pipeline::{
    calibrate_photo, compose_image, decode_image, dispatch_jobs, marker_images, marker_jobs,
    marker_sizes_from_payloads, marker_text, open_image,
};
