//! Shared test helpers: scripted stand-ins for the agent system, the model
//! provider, the operator, and the presentation sink.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tandem_core::error::{GateError, ProviderError};
use tandem_core::event::{AgentAction, AgentEvent};
use tandem_core::hook::{TurnHook, TurnSummary};
use tandem_core::message::Message;
use tandem_core::provider::{Provider, ProviderRequest};
use tandem_core::runner::AgentRunner;
use tandem_core::stream::{Chunk, ChunkRole, ChunkStream};
use tokio::sync::mpsc;

use crate::aggregator::AggregatedToolCall;
use crate::controller::LoopReport;
use crate::gate::Operator;
use crate::interrupt::InterruptReport;
use crate::sink::TurnSink;

/// A stream that yields `items` and then closes.
pub fn stream_of(items: Vec<Result<Chunk, ProviderError>>) -> ChunkStream {
    let (tx, rx) = mpsc::channel(items.len().max(1));
    for item in items {
        tx.try_send(item).unwrap();
    }
    rx
}

/// Records everything reported to it.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<String>,
    pub started: Vec<ChunkRole>,
    pub deltas: Vec<(String, bool)>,
    pub tool_calls: Vec<AggregatedToolCall>,
    pub transfers: Vec<String>,
    pub interrupts: Vec<InterruptReport>,
    pub exits: usize,
    pub errors: Vec<String>,
    pub details: Vec<String>,
    pub notices: Vec<String>,
    /// Column reported back from `text_started`
    pub prefix: usize,
}

impl TurnSink for RecordingSink {
    fn event_started(&mut self, agent: &str, _run_path: &[String]) {
        self.events.push(agent.to_string());
    }

    fn text_started(&mut self, role: ChunkRole) -> usize {
        self.started.push(role);
        self.prefix
    }

    fn text(&mut self, delta: &str, wrap_before: bool) {
        self.deltas.push((delta.to_string(), wrap_before));
    }

    fn tool_calls(&mut self, calls: &[AggregatedToolCall]) {
        self.tool_calls.extend_from_slice(calls);
    }

    fn transfer(&mut self, dest: &str) {
        self.transfers.push(dest.to_string());
    }

    fn interrupted(&mut self, report: &InterruptReport) {
        self.interrupts.push(report.clone());
    }

    fn exit(&mut self) {
        self.exits += 1;
    }

    fn error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    fn details(&mut self, answer: &str) {
        self.details.push(answer.to_string());
    }

    fn notice(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }

    fn finished(&mut self, _report: &LoopReport) {}
}

/// An operator that answers from a fixed script. Running out of lines
/// behaves like closed input.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    lines: VecDeque<String>,
    pub shown: Vec<String>,
}

impl ScriptedOperator {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            shown: Vec::new(),
        }
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    async fn show(&mut self, text: &str) -> Result<(), GateError> {
        self.shown.push(text.to_string());
        Ok(())
    }

    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>, GateError> {
        self.shown.push(prompt.to_string());
        Ok(self.lines.pop_front())
    }
}

/// One event a [`ScriptedRunner`] emits.
#[derive(Debug, Clone)]
pub enum ScriptedEvent {
    Message(Message, Option<AgentAction>),
    Chunks(Vec<Result<Chunk, ProviderError>>),
    Action(AgentAction),
    Error(String),
    /// A stream that never ends on its own
    Hanging,
}

/// Every event of one scripted turn.
#[derive(Debug, Clone, Default)]
pub struct ScriptedTurn {
    pub events: Vec<ScriptedEvent>,
}

impl ScriptedTurn {
    pub fn answer(text: &str) -> Self {
        Self::chunks(vec![Ok(Chunk::text(text))])
    }

    pub fn chunks(chunks: Vec<Result<Chunk, ProviderError>>) -> Self {
        Self {
            events: vec![ScriptedEvent::Chunks(chunks)],
        }
    }

    pub fn exit_with(summary: &str) -> Self {
        Self {
            events: vec![ScriptedEvent::Message(
                Message::tool_result("call_exit", summary),
                Some(AgentAction::exit()),
            )],
        }
    }

    pub fn exit_silently() -> Self {
        Self::action(AgentAction::exit())
    }

    pub fn action(action: AgentAction) -> Self {
        Self {
            events: vec![ScriptedEvent::Action(action)],
        }
    }

    pub fn error(cause: &str) -> Self {
        Self {
            events: vec![ScriptedEvent::Error(cause.to_string())],
        }
    }

    pub fn hanging() -> Self {
        Self {
            events: vec![ScriptedEvent::Hanging],
        }
    }
}

/// An agent system that plays back one scripted turn per call.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    turns: Vec<ScriptedTurn>,
    repeat: bool,
    inputs: Mutex<Vec<Vec<Message>>>,
    held: Mutex<Vec<mpsc::Sender<Result<Chunk, ProviderError>>>>,
}

impl ScriptedRunner {
    /// Play `turns` in order. Calls past the end produce empty turns.
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns,
            ..Default::default()
        }
    }

    /// Play the same turn on every call.
    pub fn repeating(turn: ScriptedTurn) -> Self {
        Self {
            turns: vec![turn],
            repeat: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    /// The message history received by each call.
    pub fn inputs(&self) -> Vec<Vec<Message>> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentRunner for ScriptedRunner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(&self, messages: Vec<Message>) -> Result<mpsc::Receiver<AgentEvent>, ProviderError> {
        let call = {
            let mut inputs = self.inputs.lock().unwrap();
            inputs.push(messages);
            inputs.len() - 1
        };
        let turn = if self.repeat {
            self.turns.first().cloned().unwrap_or_default()
        } else {
            self.turns.get(call).cloned().unwrap_or_default()
        };

        let (tx, rx) = mpsc::channel(turn.events.len().max(1));
        for scripted in turn.events {
            let event = AgentEvent::new("main_agent");
            let event = match scripted {
                ScriptedEvent::Message(message, action) => {
                    let event = event.with_message(message);
                    match action {
                        Some(action) => event.with_action(action),
                        None => event,
                    }
                }
                ScriptedEvent::Chunks(chunks) => event.with_stream(stream_of(chunks)),
                ScriptedEvent::Action(action) => event.with_action(action),
                ScriptedEvent::Error(cause) => event.with_error(cause),
                ScriptedEvent::Hanging => {
                    let (chunk_tx, chunk_rx) = mpsc::channel(1);
                    self.held.lock().unwrap().push(chunk_tx);
                    event.with_stream(chunk_rx)
                }
            };
            tx.try_send(event).unwrap();
        }
        Ok(rx)
    }
}

/// Records every turn boundary.
#[derive(Debug, Default)]
pub struct RecordingHook {
    started: Mutex<Vec<u32>>,
    finished: Mutex<Vec<TurnSummary>>,
    decisions: Mutex<Vec<u32>>,
}

impl RecordingHook {
    pub fn started(&self) -> Vec<u32> {
        self.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<TurnSummary> {
        self.finished.lock().unwrap().clone()
    }

    /// Iterations after which the operator was asked for a decision.
    pub fn decisions(&self) -> Vec<u32> {
        self.decisions.lock().unwrap().clone()
    }
}

impl TurnHook for RecordingHook {
    fn turn_started(&self, iteration: u32, _messages: &[Message]) {
        self.started.lock().unwrap().push(iteration);
    }

    fn turn_finished(&self, summary: &TurnSummary) {
        self.finished.lock().unwrap().push(summary.clone());
    }

    fn decision_started(&self, iteration: u32) {
        self.decisions.lock().unwrap().push(iteration);
    }
}

/// A provider that streams one scripted response per call.
///
/// Panics if more calls are made than responses provided.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<Vec<Result<Chunk, ProviderError>>, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<Vec<Result<Chunk, ProviderError>>, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(Ok(chunks)) => Ok(stream_of(chunks)),
            Some(Err(e)) => Err(e),
            None => panic!("ScriptedProvider: no more responses (call #{call})"),
        }
    }
}
