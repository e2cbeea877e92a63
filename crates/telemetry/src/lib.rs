//! Turn tracing for Tandem.
//!
//! [`TraceRecorder`] is a [`tandem_core::TurnHook`]: handed to the
//! iteration controller, it records one span per turn and one per operator
//! decision, grouped into a trace per conversation.

pub mod engine;
pub mod model;

pub use engine::TraceRecorder;
pub use model::{Span, SpanKind, Trace, TraceSummary};

/// Errors from the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}
