//! Swept IQ capture
//!
//! A capture run turns a [`CaptureRequest`] into a [`FrequencyPlan`], then
//! performs one pass per band: open the board, tune it, stream into a
//! [`TransferSink`] until the byte quota is met or the acquisition interval
//! elapses, then drain and close. Each pass lands in `Samples/<index>`.

pub mod cancel;
pub mod engine;
pub mod planner;
pub mod report;
pub mod request;
pub mod ring;
pub mod session;
pub mod sink;
pub mod state;

pub use cancel::{CancelToken, Wake};
pub use engine::{CaptureEngine, CaptureError, EngineConfig, PassSettings};
pub use planner::{FrequencyBand, FrequencyPlan, PlanError};
pub use report::{CaptureSummary, PassOutcome, PassReport};
pub use request::{CaptureMode, CaptureRequest};
pub use sink::{ByteQuota, Flow, Output, TransferSink, BYTES_PER_SAMPLE};
