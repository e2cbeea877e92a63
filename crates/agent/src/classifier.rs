//! Event classification.
//!
//! Turns what the buffer accumulated for one event, plus the event's
//! terminal action, into a [`TurnOutcome`]. An outcome can carry several
//! facets at once (an answer *and* an exit, say). Missing fields just mean
//! fewer facets; classification itself never fails.

use serde::Serialize;
use tandem_core::error::TurnError;
use tandem_core::event::AgentAction;
use tandem_core::stream::ChunkRole;

use crate::aggregator::AggregatedToolCall;
use crate::buffer::BufferedTurn;
use crate::interrupt::{self, InterruptReport};

/// Classified result of one agent event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TurnOutcome {
    /// Agent that produced the event
    pub agent: String,

    pub answer: Option<String>,

    pub tool_response: Option<String>,

    pub tool_calls: Vec<AggregatedToolCall>,

    pub transfer_to: Option<String>,

    pub interrupted: Option<InterruptReport>,

    pub exit: bool,

    #[serde(skip)]
    pub error: Option<TurnError>,
}

/// One facet of an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal<'a> {
    Answer(&'a str),
    ToolResponse(&'a str),
    ToolCalls(&'a [AggregatedToolCall]),
    Transfer(&'a str),
    Interrupted(&'a InterruptReport),
    Exit,
    Error(&'a TurnError),
}

impl TurnOutcome {
    /// An outcome for an event that failed before it could be classified.
    pub fn failed(agent: impl Into<String>, error: TurnError) -> Self {
        Self {
            agent: agent.into(),
            error: Some(error),
            ..Default::default()
        }
    }

    /// Answer or tool-response text, whichever is present.
    pub fn text(&self) -> Option<&str> {
        self.answer.as_deref().or(self.tool_response.as_deref())
    }

    /// Every facet present, in a stable order.
    pub fn signals(&self) -> Vec<Signal<'_>> {
        let mut signals = Vec::new();
        if let Some(err) = &self.error {
            signals.push(Signal::Error(err));
        }
        if let Some(dest) = &self.transfer_to {
            signals.push(Signal::Transfer(dest));
        }
        if let Some(report) = &self.interrupted {
            signals.push(Signal::Interrupted(report));
        }
        if let Some(text) = &self.answer {
            signals.push(Signal::Answer(text));
        }
        if let Some(text) = &self.tool_response {
            signals.push(Signal::ToolResponse(text));
        }
        if !self.tool_calls.is_empty() {
            signals.push(Signal::ToolCalls(&self.tool_calls));
        }
        if self.exit {
            signals.push(Signal::Exit);
        }
        signals
    }
}

/// Classify one event's buffered output and action.
pub fn classify(
    agent: &str,
    buffered: Option<BufferedTurn>,
    action: Option<&AgentAction>,
) -> TurnOutcome {
    let mut outcome = TurnOutcome {
        agent: agent.to_string(),
        ..Default::default()
    };

    if let Some(action) = action {
        outcome.transfer_to = action.transfer_to.clone().filter(|d| !d.is_empty());
        outcome.interrupted = action.interrupted.as_ref().map(interrupt::collect);
        outcome.exit = action.exit;
    }

    if let Some(turn) = buffered {
        if !turn.text.is_empty() {
            match turn.role.unwrap_or_default() {
                ChunkRole::Tool => outcome.tool_response = Some(turn.text),
                ChunkRole::Normal => outcome.answer = Some(turn.text),
            }
        }
        outcome.tool_calls = turn.tool_calls;
    }

    outcome
}
