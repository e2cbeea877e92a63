//! # Tandem Core
//!
//! Domain types, traits, and error definitions for the Tandem
//! executor/critic loop. This crate has **no framework dependencies**: it
//! defines the vocabulary every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (the model provider, the agent system, the
//! tracing exporter, the checkpoint store) is a trait here. Implementations
//! live in their own crates, so the loop can be tested against scripted
//! stand-ins without any network or terminal.

pub mod error;
pub mod message;
pub mod stream;
pub mod event;
pub mod provider;
pub mod runner;
pub mod hook;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, Role, ConversationId};
pub use stream::{Chunk, ChunkRole, ChunkStream, ToolCallFragment};
pub use event::{AgentAction, AgentEvent, Describe, EventOutput, InterruptContext, InterruptPayload};
pub use provider::{Provider, ProviderRequest, ToolDefinition};
pub use runner::AgentRunner;
pub use hook::{TurnHook, TurnSummary};
pub use store::CheckpointStore;
