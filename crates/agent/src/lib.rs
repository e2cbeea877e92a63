//! The executor/critic loop: the heart of Tandem.
//!
//! One iteration of the loop is one **turn** of the agent system:
//!
//! 1. **Drain** every event of the turn, buffering streamed text and
//!    reassembling fragmented tool calls ([`buffer`], [`aggregator`])
//! 2. **Classify** what each event amounted to ([`classifier`], [`interrupt`])
//! 3. **Decide**: stop when the agents exit, the budget runs out, or the
//!    turn fails; otherwise ask the operator ([`gate`])
//! 4. **Iterate** with the operator's feedback or a new question
//!
//! [`controller::IterationController`] drives the cycle; [`reflection`]
//! provides the executor/critic agent system it is normally run against.

pub mod aggregator;
pub mod buffer;
pub mod classifier;
pub mod controller;
pub mod gate;
pub mod interrupt;
pub mod reflection;
pub mod sink;

#[cfg(test)]
mod test_helpers;

pub use aggregator::{AggregatedToolCall, ToolCallAggregator};
pub use buffer::{BufferedTurn, ChunkBuffer, ColumnTracker, DEFAULT_WRAP_COLUMN};
pub use classifier::{Signal, TurnOutcome, classify};
pub use controller::{IterationController, IterationState, LoopReport, LoopState, TerminationReason, TurnRecord};
pub use gate::{Decision, HumanFeedbackGate, MENU, Operator};
pub use interrupt::{InterruptPoint, InterruptReport};
pub use reflection::{AgentProfile, CRITIC, EXECUTOR, EXIT_TOOL, ReflectionRunner};
pub use sink::{NoopSink, TurnSink};
