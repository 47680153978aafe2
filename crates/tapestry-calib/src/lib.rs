//! Calibration solver.
//!
//! Turns marker [`Detection`](tapestry_marker::Detection)s from one photo
//! into per-panel millimeter positions, quarter-turn rotations and
//! mm-per-pixel scales. Every marker yields its own scale, so panels at
//! different distances from the camera are handled independently. Results
//! share a frame whose origin is the smallest x and y seen in the photo;
//! they are meant for review and are never merged into an existing layout
//! automatically.

mod result;
mod solve;

pub use result::{Calibration, CalibrationDiagnostic, CalibrationResult};
pub use solve::{solve, Solver, SolverParams};
