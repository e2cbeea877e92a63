//! AgentRunner trait: the agent system driven by the loop.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::event::AgentEvent;
use crate::message::Message;

/// Runs one turn of the agent system for a given message history.
///
/// Events arrive in the order the agents produced them. Closing the
/// channel ends the turn.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, messages: Vec<Message>) -> Result<mpsc::Receiver<AgentEvent>, ProviderError>;
}
