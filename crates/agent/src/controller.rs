//! Iteration controller: the human-in-the-loop state machine.
//!
//! ```text
//!            ┌──────────────────────── Iterating ◄──────────────┐
//!            ▼                                                  │ continue / feedback
//!  ──► Running ──► Classifying ──► AwaitingHumanDecision ───────┤
//!            ▲          │   │                │                  │ modify question
//!            │          │   │                └──────────────────┘ (history replaced,
//!            │          │   └──► Exiting ──► Terminated           counter reset)
//!            │          └──────────────────► Terminated (budget, error)
//!            └──────────────────────────────────────────────────
//! ```
//!
//! Each pass through `Running` runs one turn of the agent system and drains
//! every event it produces. `Classifying` decides whether the agents asked
//! to stop, the budget ran out, or the turn failed. Otherwise the operator
//! decides via the [`HumanFeedbackGate`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tandem_config::LoopConfig;
use tandem_core::error::TurnError;
use tandem_core::event::{AgentEvent, EventOutput};
use tandem_core::hook::{TurnHook, TurnSummary};
use tandem_core::message::Message;
use tandem_core::runner::AgentRunner;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::buffer::{BufferedTurn, ChunkBuffer};
use crate::classifier::{TurnOutcome, classify};
use crate::gate::{Decision, HumanFeedbackGate};
use crate::sink::{NoopSink, TurnSink};

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TerminationReason {
    /// An agent signalled that the task is done.
    AgentExit,
    /// Control was handed to another agent and transfers end this loop.
    Transferred(String),
    /// The iteration budget ran out.
    BudgetExhausted,
    /// The operator chose to exit and accept the current answer.
    OperatorExit,
    /// The operator viewed the full answer and viewing details ends this loop.
    DetailsViewed,
    /// The operator typed something that is not on the menu.
    InvalidSelection(String),
    /// A turn or the operator input failed.
    Error(String),
}

impl TerminationReason {
    /// Human-readable reason line.
    pub fn describe(&self) -> String {
        match self {
            Self::AgentExit => "the agents considered the task complete".into(),
            Self::Transferred(dest) => format!("control was transferred to {dest}"),
            Self::BudgetExhausted => "iteration budget exhausted".into(),
            Self::OperatorExit => "the operator accepted the current result".into(),
            Self::DetailsViewed => "the operator viewed the full output".into(),
            Self::InvalidSelection(choice) => format!("invalid menu selection '{choice}'"),
            Self::Error(cause) => format!("error: {cause}"),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::InvalidSelection(_) | Self::Error(_))
    }

    /// Budget exhaustion is neither success nor failure.
    pub fn is_success(&self) -> bool {
        !self.is_failure() && *self != Self::BudgetExhausted
    }
}

/// What the caller gets back when the loop ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopReport {
    /// Most recent non-empty answer of the whole loop, possibly empty
    pub answer: String,

    pub reason: TerminationReason,

    /// Final message history
    pub history: Vec<Message>,

    /// Iteration counter of the current question
    pub iterations: u32,

    /// Turns run across every question
    pub turns: u32,
}

/// Mutable state of one loop invocation.
#[derive(Debug, Clone)]
pub struct IterationState {
    pub messages: Vec<Message>,
    pub iteration: u32,
    pub max_iterations: u32,
    pub last_answer: String,
    pub turns: u32,
}

impl IterationState {
    pub fn new(question: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            messages: vec![Message::user(question)],
            iteration: 0,
            max_iterations,
            last_answer: String::new(),
            turns: 0,
        }
    }

    fn into_report(self, reason: TerminationReason) -> LoopReport {
        LoopReport {
            answer: self.last_answer,
            reason,
            history: self.messages,
            iterations: self.iteration,
            turns: self.turns,
        }
    }
}

/// Every classified event of one turn.
#[derive(Debug, Clone, Default)]
pub struct TurnRecord {
    pub outcomes: Vec<TurnOutcome>,
}

impl TurnRecord {
    /// Most recent non-empty text in the turn.
    pub fn last_text(&self) -> Option<&str> {
        self.outcomes
            .iter()
            .rev()
            .find_map(|o| o.text().filter(|t| !t.is_empty()))
    }

    pub fn error(&self) -> Option<&TurnError> {
        self.outcomes.iter().find_map(|o| o.error.as_ref())
    }

    pub fn exit(&self) -> bool {
        self.outcomes.iter().any(|o| o.exit)
    }

    pub fn transfer(&self) -> Option<&str> {
        self.outcomes
            .iter()
            .rev()
            .find_map(|o| o.transfer_to.as_deref())
    }

    pub fn summary(&self, iteration: u32) -> TurnSummary {
        TurnSummary {
            iteration,
            answer: self.last_text().map(str::to_string),
            tool_calls: self.outcomes.iter().map(|o| o.tool_calls.len()).sum(),
            exit: self.exit(),
            transfer_to: self.transfer().map(str::to_string),
            interrupts: self
                .outcomes
                .iter()
                .filter_map(|o| o.interrupted.as_ref())
                .map(|r| r.len())
                .sum(),
            error: self.error().map(|e| e.to_string()),
        }
    }
}

/// States of the loop.
#[derive(Debug)]
pub enum LoopState {
    Running,
    Classifying(TurnRecord),
    AwaitingHumanDecision,
    Iterating,
    Exiting(TerminationReason),
    Terminated(TerminationReason),
}

/// Drives turns of an [`AgentRunner`] under operator supervision.
pub struct IterationController {
    runner: Arc<dyn AgentRunner>,
    gate: HumanFeedbackGate,
    config: LoopConfig,
    hook: Option<Arc<dyn TurnHook>>,
    sink: Box<dyn TurnSink>,
    cancel: CancellationToken,
}

impl IterationController {
    pub fn new(runner: Arc<dyn AgentRunner>, gate: HumanFeedbackGate, config: LoopConfig) -> Self {
        Self {
            runner,
            gate,
            config,
            hook: None,
            sink: Box::new(NoopSink),
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a hook invoked at every turn boundary.
    pub fn with_hook(mut self, hook: Arc<dyn TurnHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Attach a presentation sink.
    pub fn with_sink(mut self, sink: Box<dyn TurnSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the loop for `question` until it terminates.
    pub async fn run(&mut self, question: impl Into<String>) -> LoopReport {
        let mut state = IterationState::new(question, self.config.max_iterations);
        let mut phase = LoopState::Running;

        info!(
            runner = self.runner.name(),
            max_iterations = state.max_iterations,
            "Starting iteration loop"
        );

        loop {
            phase = match phase {
                LoopState::Running => {
                    state.iteration += 1;
                    state.turns += 1;
                    LoopState::Classifying(self.run_turn(&state).await)
                }
                LoopState::Classifying(record) => self.classify_turn(&mut state, record),
                LoopState::AwaitingHumanDecision => self.await_decision(&mut state).await,
                LoopState::Iterating => LoopState::Running,
                LoopState::Exiting(reason) => LoopState::Terminated(reason),
                LoopState::Terminated(reason) => {
                    info!(
                        reason = %reason.describe(),
                        iterations = state.iteration,
                        turns = state.turns,
                        "Iteration loop terminated"
                    );
                    let report = state.into_report(reason);
                    self.sink.finished(&report);
                    return report;
                }
            };
        }
    }

    /// Run one turn and classify every event it produces.
    async fn run_turn(&mut self, state: &IterationState) -> TurnRecord {
        debug!(iteration = state.iteration, messages = state.messages.len(), "Running turn");
        if let Some(hook) = &self.hook {
            hook.turn_started(state.iteration, &state.messages);
        }

        let mut record = TurnRecord::default();
        match self.runner.run(state.messages.clone()).await {
            Ok(mut events) => loop {
                let next = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        record.outcomes.push(TurnOutcome::failed(self.runner.name(), TurnError::Cancelled));
                        break;
                    }
                    next = events.recv() => next,
                };
                let Some(event) = next else { break };

                let outcome = self.consume_event(event).await;
                let failed = outcome.error.is_some();
                record.outcomes.push(outcome);
                if failed {
                    break;
                }
            },
            Err(e) => {
                warn!(error = %e, "Runner failed to start turn");
                self.sink.error(&e.to_string());
                record.outcomes.push(TurnOutcome::failed(
                    self.runner.name(),
                    TurnError::StreamFailure(e.to_string()),
                ));
            }
        }

        if let Some(hook) = &self.hook {
            hook.turn_finished(&record.summary(state.iteration));
        }
        record
    }

    /// Drain and classify a single event.
    async fn consume_event(&mut self, event: AgentEvent) -> TurnOutcome {
        let AgentEvent {
            agent_name,
            run_path,
            output,
            action,
            error,
        } = event;
        self.sink.event_started(&agent_name, &run_path);

        if let Some(cause) = error {
            warn!(agent = %agent_name, error = %cause, "Agent reported an error");
            self.sink.error(&cause);
            self.sink.event_finished();
            return TurnOutcome::failed(agent_name, TurnError::StreamFailure(cause));
        }

        let buffered = match output {
            Some(EventOutput::Stream(mut stream)) => {
                let buffer = ChunkBuffer::new(self.config.wrap_column);
                match buffer.consume(&mut stream, &self.cancel, self.sink.as_mut()).await {
                    Ok(turn) => Some(turn),
                    Err(e) => {
                        self.sink.error(&e.to_string());
                        self.sink.event_finished();
                        return TurnOutcome::failed(agent_name, e);
                    }
                }
            }
            Some(EventOutput::Message(message)) => {
                let turn = BufferedTurn::from_message(&message);
                if let Some(role) = turn.role {
                    self.sink.text_started(role);
                    self.sink.text(&turn.text, false);
                }
                Some(turn)
            }
            None => None,
        };

        let outcome = classify(&agent_name, buffered, action.as_ref());
        self.present(&outcome);
        outcome
    }

    fn present(&mut self, outcome: &TurnOutcome) {
        if !outcome.tool_calls.is_empty() {
            self.sink.tool_calls(&outcome.tool_calls);
        }
        if let Some(dest) = &outcome.transfer_to {
            self.sink.transfer(dest);
        }
        if let Some(report) = &outcome.interrupted {
            self.sink.interrupted(report);
        }
        if outcome.exit {
            self.sink.exit();
        }
        self.sink.event_finished();
    }

    fn classify_turn(&mut self, state: &mut IterationState, record: TurnRecord) -> LoopState {
        if let Some(text) = record.last_text() {
            state.last_answer = text.to_string();
        }

        if let Some(err) = record.error() {
            warn!(iteration = state.iteration, error = %err, "Turn failed");
            return LoopState::Terminated(TerminationReason::Error(err.to_string()));
        }

        if record.exit() {
            info!(iteration = state.iteration, "Agents signalled completion");
            return LoopState::Exiting(TerminationReason::AgentExit);
        }

        if let Some(dest) = record.transfer() {
            if self.config.transfer_ends_loop {
                return LoopState::Exiting(TerminationReason::Transferred(dest.to_string()));
            }
            debug!(dest, "Transfer does not end this loop");
        }

        if state.iteration >= state.max_iterations {
            warn!(
                iteration = state.iteration,
                max_iterations = state.max_iterations,
                "Iteration budget exhausted"
            );
            return LoopState::Terminated(TerminationReason::BudgetExhausted);
        }

        if self.config.carry_answers {
            if let Some(text) = record.last_text() {
                state.messages.push(Message::assistant(text));
            }
        }

        LoopState::AwaitingHumanDecision
    }

    async fn await_decision(&mut self, state: &mut IterationState) -> LoopState {
        if let Some(hook) = &self.hook {
            hook.decision_started(state.iteration);
        }
        let prompted = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return LoopState::Terminated(TerminationReason::Error(TurnError::Cancelled.to_string()));
            }
            prompted = self.gate.prompt() => prompted,
        };
        let decision = match prompted {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "Operator input failed");
                return LoopState::Terminated(TerminationReason::Error(e.to_string()));
            }
        };
        debug!(?decision, iteration = state.iteration, "Operator decision");

        match decision {
            Decision::Continue => {
                self.sink.notice("Continuing with the next iteration");
                LoopState::Iterating
            }
            Decision::Feedback(feedback) => {
                state
                    .messages
                    .push(Message::feedback(&self.config.feedback_marker, &feedback));
                self.sink.notice("Feedback added, continuing with the next iteration");
                LoopState::Iterating
            }
            Decision::ModifyQuestion(question) => {
                state.messages = vec![Message::user(question)];
                state.iteration = 0;
                self.sink.notice("Question updated, starting over");
                LoopState::Running
            }
            Decision::ViewDetails => {
                if state.last_answer.is_empty() {
                    self.sink.notice("No output yet");
                } else {
                    self.sink.details(&state.last_answer);
                }
                if self.config.details_ends_loop {
                    LoopState::Terminated(TerminationReason::DetailsViewed)
                } else {
                    LoopState::AwaitingHumanDecision
                }
            }
            Decision::Exit => LoopState::Terminated(TerminationReason::OperatorExit),
            Decision::Invalid(choice) => {
                warn!(%choice, "Invalid menu selection");
                LoopState::Terminated(TerminationReason::InvalidSelection(choice))
            }
        }
    }
}
