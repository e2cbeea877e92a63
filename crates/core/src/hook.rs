//! Turn-boundary hooks.
//!
//! Tracing exporters observe the loop through a [`TurnHook`] handed to the
//! controller, never through process-wide registration.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// What a hook learns about a finished turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnSummary {
    /// Per-question iteration number, starting at 1
    pub iteration: u32,

    /// Most recent non-empty text produced during the turn
    pub answer: Option<String>,

    pub tool_calls: usize,

    pub exit: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_to: Option<String>,

    /// Number of interrupt points reported
    pub interrupts: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TurnSummary {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Invoked by the controller at the start and end of every turn.
pub trait TurnHook: Send + Sync {
    fn turn_started(&self, iteration: u32, messages: &[Message]);

    fn turn_finished(&self, summary: &TurnSummary);

    /// The controller is about to ask the operator for a decision.
    fn decision_started(&self, _iteration: u32) {}
}
