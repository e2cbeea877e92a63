//! Agent events: what the agent system hands back for each step of a turn.
//!
//! One turn produces an ordered sequence of [`AgentEvent`]s (e.g. the
//! executor's answer, then the critic's review). Each event may carry a
//! message output (complete or streamed), a control action, or an error.

use std::fmt::Debug;
use std::sync::Arc;

use crate::message::Message;
use crate::stream::ChunkStream;

/// A renderable piece of interruption info.
///
/// The default rendering is the `Debug` form, so every payload can be shown
/// even when it offers nothing better.
pub trait Describe: Debug + Send + Sync {
    fn describe(&self) -> String {
        format!("{self:?}")
    }
}

impl Describe for String {
    fn describe(&self) -> String {
        self.clone()
    }
}

impl Describe for &'static str {
    fn describe(&self) -> String {
        (*self).to_string()
    }
}

/// One execution locus affected by an interruption.
#[derive(Debug, Clone)]
pub struct InterruptContext {
    pub info: Arc<dyn Describe>,
}

impl InterruptContext {
    pub fn new(info: impl Describe + 'static) -> Self {
        Self {
            info: Arc::new(info),
        }
    }
}

/// Every interruption context attached to an event, root cause first.
#[derive(Debug, Clone, Default)]
pub struct InterruptPayload {
    pub contexts: Vec<InterruptContext>,
}

/// Control signals attached to an event.
#[derive(Debug, Clone, Default)]
pub struct AgentAction {
    /// The agent asked to leave the loop.
    pub exit: bool,

    /// Delegation to another agent, by name.
    pub transfer_to: Option<String>,

    pub interrupted: Option<InterruptPayload>,
}

impl AgentAction {
    pub fn exit() -> Self {
        Self {
            exit: true,
            ..Default::default()
        }
    }

    pub fn transfer(dest: impl Into<String>) -> Self {
        Self {
            transfer_to: Some(dest.into()),
            ..Default::default()
        }
    }

    pub fn interrupted(contexts: Vec<InterruptContext>) -> Self {
        Self {
            interrupted: Some(InterruptPayload { contexts }),
            ..Default::default()
        }
    }
}

/// The message an event carries: complete, or still streaming.
#[derive(Debug)]
pub enum EventOutput {
    Message(Message),
    Stream(ChunkStream),
}

/// One step of a turn as reported by the agent system.
#[derive(Debug, Default)]
pub struct AgentEvent {
    /// Which agent produced this event
    pub agent_name: String,

    /// Agent path from the root of the agent tree
    pub run_path: Vec<String>,

    pub output: Option<EventOutput>,

    pub action: Option<AgentAction>,

    /// A failure reported by the agent system for this step
    pub error: Option<String>,
}

impl AgentEvent {
    pub fn new(agent_name: impl Into<String>) -> Self {
        let agent_name = agent_name.into();
        Self {
            run_path: vec![agent_name.clone()],
            agent_name,
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.output = Some(EventOutput::Message(message));
        self
    }

    pub fn with_stream(mut self, stream: ChunkStream) -> Self {
        self.output = Some(EventOutput::Stream(stream));
        self
    }

    pub fn with_action(mut self, action: AgentAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
