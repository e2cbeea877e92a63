//! Executor/critic agent system.
//!
//! One turn streams the executor over the history, then streams the critic
//! over the history plus the executor's answer. The critic either writes
//! feedback or calls [`EXIT_TOOL`], which ends the loop with its summary.
//!
//! The runner never executes tools. It only watches the critic's tool
//! calls for the exit request; every chunk is forwarded to the consumer
//! untouched, fragment indices included.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tandem_config::AppConfig;
use tandem_core::error::ProviderError;
use tandem_core::event::{AgentAction, AgentEvent};
use tandem_core::message::Message;
use tandem_core::provider::{Provider, ProviderRequest, ToolDefinition};
use tandem_core::runner::AgentRunner;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::aggregator::{AggregatedToolCall, ToolCallAggregator};

pub const EXECUTOR: &str = "main_agent";
pub const CRITIC: &str = "critique_agent";

/// Control tool the critic calls when the answer is good enough.
pub const EXIT_TOOL: &str = "exit_and_summarize";

const CHUNK_CHANNEL_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 8;

const EXECUTOR_INSTRUCTION: &str = "You are the main agent responsible for solving the user's task.

Your job:
1. Understand the user's original question carefully.
2. Work out a complete, accurate solution.
3. Improve your solution based on the reviewer's suggestions.

If you receive improvement suggestions, take them seriously and address them in this round.";

const CRITIC_INSTRUCTION: &str = "You are the reviewer of the main agent's work.

Your job:
1. Review the main agent's solution and results.
2. If you find problems or room for improvement, give specific, actionable feedback.
3. If the answer is satisfactory, call the 'exit_and_summarize' tool with a summary of the final result.

Your feedback is passed directly to the main agent for the next round. Do not just repeat the question.";

/// Name, instruction and tools of one agent.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub name: String,
    pub instruction: String,
    pub tools: Vec<ToolDefinition>,
}

impl AgentProfile {
    pub fn executor(instruction: Option<&str>) -> Self {
        Self {
            name: EXECUTOR.into(),
            instruction: instruction.unwrap_or(EXECUTOR_INSTRUCTION).into(),
            tools: Vec::new(),
        }
    }

    pub fn critic(instruction: Option<&str>) -> Self {
        Self {
            name: CRITIC.into(),
            instruction: instruction.unwrap_or(CRITIC_INSTRUCTION).into(),
            tools: vec![exit_tool()],
        }
    }
}

/// Definition of [`EXIT_TOOL`] as offered to the critic.
pub fn exit_tool() -> ToolDefinition {
    ToolDefinition {
        name: EXIT_TOOL.into(),
        description: "Leave the loop and provide a final summary of the solution".into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {
                    "type": "string",
                    "description": "Final summary of the solution"
                }
            },
            "required": ["summary"]
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ExitArguments {
    summary: String,
}

/// Summary from the exit call's arguments, if they parse and are non-empty.
fn exit_summary(call: &AggregatedToolCall) -> Option<String> {
    match serde_json::from_str::<ExitArguments>(&call.arguments) {
        Ok(args) if !args.summary.trim().is_empty() => Some(args.summary),
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Malformed exit arguments, using critic text as summary");
            None
        }
    }
}

/// What one agent streamed, as seen by the runner itself.
#[derive(Debug, Default)]
struct AgentReply {
    text: String,
    calls: Vec<AggregatedToolCall>,
}

/// Runs the executor and the critic back to back for every turn.
#[derive(Clone)]
pub struct ReflectionRunner {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    executor: AgentProfile,
    critic: AgentProfile,
}

impl ReflectionRunner {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            executor: AgentProfile::executor(None),
            critic: AgentProfile::critic(None),
        }
    }

    /// Build from the application config, honouring instruction overrides.
    pub fn from_config(provider: Arc<dyn Provider>, config: &AppConfig) -> Self {
        Self::new(provider, config.model.clone())
            .with_sampling(config.temperature, Some(config.max_tokens))
            .with_profiles(
                AgentProfile::executor(config.agents.executor_instruction.as_deref()),
                AgentProfile::critic(config.agents.critic_instruction.as_deref()),
            )
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_profiles(mut self, executor: AgentProfile, critic: AgentProfile) -> Self {
        self.executor = executor;
        self.critic = critic;
        self
    }

    async fn drive(self, history: Vec<Message>, events: mpsc::Sender<AgentEvent>) {
        let Some(answer) = self.stream_agent(&self.executor, history.clone(), &events).await else {
            return;
        };

        let mut review_input = history;
        if !answer.text.is_empty() {
            review_input.push(Message::assistant(answer.text));
        }
        let Some(review) = self.stream_agent(&self.critic, review_input, &events).await else {
            return;
        };

        let Some(call) = review.calls.iter().find(|c| c.name == EXIT_TOOL) else {
            debug!(calls = review.calls.len(), "Critic requested another round");
            return;
        };

        let summary = exit_summary(call).unwrap_or(review.text);
        info!(agent = CRITIC, "Critic requested exit");
        let event = AgentEvent::new(CRITIC)
            .with_message(Message::tool_result(call.id.clone(), summary))
            .with_action(AgentAction::exit());
        if events.send(event).await.is_err() {
            debug!("Turn consumer went away before exit was delivered");
        }
    }

    /// Stream one agent, forwarding its chunks as an event.
    ///
    /// Returns `None` when the turn cannot go on: the provider failed, or
    /// the consumer stopped listening.
    async fn stream_agent(
        &self,
        profile: &AgentProfile,
        history: Vec<Message>,
        events: &mpsc::Sender<AgentEvent>,
    ) -> Option<AgentReply> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(&profile.instruction));
        messages.extend(history);

        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: profile.tools.clone(),
        };

        debug!(agent = %profile.name, provider = self.provider.name(), "Streaming agent");
        let mut upstream = match self.provider.stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(agent = %profile.name, error = %e, "Provider failed to start stream");
                let _ = events
                    .send(AgentEvent::new(&profile.name).with_error(e.to_string()))
                    .await;
                return None;
            }
        };

        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        if events
            .send(AgentEvent::new(&profile.name).with_stream(chunk_rx))
            .await
            .is_err()
        {
            return None;
        }

        let mut reply = AgentReply::default();
        let mut aggregator = ToolCallAggregator::new();
        while let Some(item) = upstream.recv().await {
            match item {
                Ok(chunk) => {
                    reply.text.push_str(&chunk.content);
                    for fragment in &chunk.tool_calls {
                        // Fragments without an index are the consumer's to reject.
                        if let Some(index) = fragment.index {
                            aggregator.add_fragment(index, fragment.clone());
                        }
                    }
                    if chunk_tx.send(Ok(chunk)).await.is_err() {
                        debug!(agent = %profile.name, "Consumer dropped the stream");
                        return None;
                    }
                }
                Err(e) => {
                    let _ = chunk_tx.send(Err(e)).await;
                    return None;
                }
            }
        }

        reply.calls = aggregator.into_calls();
        Some(reply)
    }
}

#[async_trait]
impl AgentRunner for ReflectionRunner {
    fn name(&self) -> &str {
        "reflection_agent"
    }

    async fn run(&self, messages: Vec<Message>) -> Result<mpsc::Receiver<AgentEvent>, ProviderError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(self.clone().drive(messages, tx));
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ChunkBuffer;
    use crate::sink::NoopSink;
    use crate::test_helpers::ScriptedProvider;
    use tandem_core::event::EventOutput;
    use tandem_core::message::Role;
    use tandem_core::stream::{Chunk, ToolCallFragment};
    use tokio_util::sync::CancellationToken;

    fn exit_call(arguments: &str) -> Vec<Result<Chunk, ProviderError>> {
        vec![
            Ok(Chunk::fragments(vec![
                ToolCallFragment::name(0, EXIT_TOOL).with_id("call_9"),
            ])),
            Ok(Chunk::fragments(vec![ToolCallFragment::arguments(0, arguments)])),
        ]
    }

    /// Drain every event of one turn into (agent, text, exit) triples.
    async fn drain(mut rx: mpsc::Receiver<AgentEvent>) -> Vec<(String, String, bool)> {
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            assert!(event.error.is_none(), "unexpected error: {:?}", event.error);
            let text = match event.output {
                Some(EventOutput::Stream(mut stream)) => {
                    ChunkBuffer::default()
                        .consume(&mut stream, &CancellationToken::new(), &mut NoopSink)
                        .await
                        .unwrap()
                        .text
                }
                Some(EventOutput::Message(m)) => m.content,
                None => String::new(),
            };
            let exit = event.action.map(|a| a.exit).unwrap_or(false);
            seen.push((event.agent_name, text, exit));
        }
        seen
    }

    #[tokio::test]
    async fn critic_feedback_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(vec![Ok(Chunk::text("ls -la"))]),
            Ok(vec![Ok(Chunk::text("Also show hidden files"))]),
        ]));
        let runner = ReflectionRunner::new(provider.clone(), "test-model");

        let rx = runner.run(vec![Message::user("list files")]).await.unwrap();
        let seen = drain(rx).await;

        assert_eq!(
            seen,
            vec![
                (EXECUTOR.to_string(), "ls -la".to_string(), false),
                (CRITIC.to_string(), "Also show hidden files".to_string(), false),
            ]
        );

        let requests = provider.requests();
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert!(requests[0].tools.is_empty());
        // Critic sees the executor's answer
        let critic_input = &requests[1].messages;
        assert_eq!(critic_input.last().unwrap().content, "ls -la");
        assert_eq!(requests[1].tools[0].name, EXIT_TOOL);
    }

    #[tokio::test]
    async fn exit_tool_ends_with_summary() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(vec![Ok(Chunk::text("done"))]),
            Ok(exit_call(r#"{"summary":"All files listed"}"#)),
        ]));
        let runner = ReflectionRunner::new(provider, "test-model");

        let seen = drain(runner.run(vec![Message::user("q")]).await.unwrap()).await;
        assert_eq!(seen.len(), 3);
        assert_eq!(
            seen[2],
            (CRITIC.to_string(), "All files listed".to_string(), true)
        );
    }

    #[tokio::test]
    async fn malformed_exit_arguments_fall_back_to_critic_text() {
        let mut critic = vec![Ok(Chunk::text("Looks good."))];
        critic.extend(exit_call(r#"{"summ"#));
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(vec![Ok(Chunk::text("answer"))]),
            Ok(critic),
        ]));
        let runner = ReflectionRunner::new(provider, "test-model");

        let seen = drain(runner.run(vec![Message::user("q")]).await.unwrap()).await;
        assert_eq!(seen[2], (CRITIC.to_string(), "Looks good.".to_string(), true));
    }

    #[tokio::test]
    async fn provider_failure_becomes_error_event() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let runner = ReflectionRunner::new(provider, "test-model");

        let mut rx = runner.run(vec![Message::user("q")]).await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.agent_name, EXECUTOR);
        assert!(event.error.unwrap().contains("bad key"));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn profiles_accept_instruction_overrides() {
        let critic = AgentProfile::critic(Some("Be strict."));
        assert_eq!(critic.instruction, "Be strict.");
        assert_eq!(critic.tools.len(), 1);
        assert!(AgentProfile::executor(None).instruction.contains("main agent"));
    }
}
