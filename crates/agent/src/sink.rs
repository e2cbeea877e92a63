//! Presentation boundary.
//!
//! The loop never prints. Everything the operator should see is reported
//! to a [`TurnSink`]; the CLI renders it to the terminal, tests record it.

use tandem_core::stream::ChunkRole;

use crate::aggregator::AggregatedToolCall;
use crate::controller::LoopReport;
use crate::interrupt::InterruptReport;

/// Receives everything the operator should see while the loop runs.
///
/// Every method defaults to doing nothing.
pub trait TurnSink: Send {
    /// A new agent event is being presented.
    fn event_started(&mut self, _agent: &str, _run_path: &[String]) {}

    /// The first non-empty text of an event arrived with this role.
    /// Returns the column the renderer's prefix left the line at.
    fn text_started(&mut self, _role: ChunkRole) -> usize {
        0
    }

    /// A text delta; `wrap_before` asks for a line break before it.
    fn text(&mut self, _delta: &str, _wrap_before: bool) {}

    fn tool_calls(&mut self, _calls: &[AggregatedToolCall]) {}

    fn transfer(&mut self, _dest: &str) {}

    fn interrupted(&mut self, _report: &InterruptReport) {}

    fn exit(&mut self) {}

    fn error(&mut self, _message: &str) {}

    fn event_finished(&mut self) {}

    /// The operator asked for the full current answer.
    fn details(&mut self, _answer: &str) {}

    /// A status line about the loop itself.
    fn notice(&mut self, _message: &str) {}

    fn finished(&mut self, _report: &LoopReport) {}
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TurnSink for NoopSink {}
