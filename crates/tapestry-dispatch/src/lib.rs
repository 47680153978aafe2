//! Fleet dispatcher.
//!
//! Delivers one tile per panel concurrently. Each request has its own
//! deadline and its own [`Outcome`]; a slow, failing or unreachable panel
//! never delays or aborts the others. Nothing is retried: the
//! [`DispatchReport`] tells the caller which panels to try again.
//!
//! ```no_run
//! # async fn run(jobs: Vec<tapestry_dispatch::DispatchJob>) -> Result<(), tapestry_dispatch::TransportError> {
//! use std::time::Duration;
//! use tapestry_dispatch::{DispatchParams, Dispatcher, HttpTransport};
//!
//! let transport = HttpTransport::new(Duration::from_secs(3))?;
//! let report = Dispatcher::new(transport, DispatchParams::default())
//!     .dispatch(jobs)
//!     .await;
//! println!("{} of {} panels updated", report.delivered(), report.outcomes.len());
//! # Ok(())
//! # }
//! ```

mod dispatch;
mod encode;
mod transport;

pub use dispatch::{
    DispatchJob, DispatchParams, DispatchReport, Dispatcher, Failure, FailureKind, Outcome,
};
pub use encode::{encoder_for, EncodeError, Gray4Encoder, Payload, PngEncoder, TileEncoder};
pub use transport::{HttpTransport, PanelInfo, PanelTransport, TransportError};
