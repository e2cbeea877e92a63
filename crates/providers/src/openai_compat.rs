//! OpenAI-compatible streaming provider.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any other endpoint that
//! speaks `/chat/completions` with `stream: true`.
//!
//! Every SSE delta is forwarded as one [`Chunk`]. Tool-call deltas are
//! passed through as [`ToolCallFragment`]s exactly as they arrived, index
//! included or not; reassembling them is the consumer's job.

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tandem_config::AppConfig;
use tandem_core::error::ProviderError;
use tandem_core::message::{Message, Role};
use tandem_core::provider::{Provider, ProviderRequest, ToolDefinition};
use tandem_core::stream::{Chunk, ChunkRole, ChunkStream, ToolCallFragment};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

const STREAM_CHANNEL_CAPACITY: usize = 64;

/// An OpenAI-compatible streaming provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
        )
    }

    /// Build from the application config. Fails without an API key.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Err(ProviderError::NotConfigured(
                "no API key; set TANDEM_API_KEY or api_key in config.toml".into(),
            ));
        };
        Self::new("openai-compat", &config.api_url, api_key)
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                    Role::Tool => "tool".into(),
                },
                content: Some(m.content.clone()),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: m.tool_call_id.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }
}

/// Splits an SSE byte stream into `data:` payloads.
///
/// Bytes are buffered until a full line arrives, so a character split
/// across two network reads is decoded whole.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

/// One decoded SSE payload.
#[derive(Debug, PartialEq)]
enum SseItem {
    Data(String),
    Done,
    /// A complete line that is not valid UTF-8
    Malformed(String),
}

impl SseDecoder {
    /// Feed raw bytes; returns every payload completed by them.
    fn feed(&mut self, bytes: &[u8]) -> Vec<SseItem> {
        self.buffer.extend_from_slice(bytes);

        let mut items = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = match std::str::from_utf8(&raw) {
                Ok(line) => line.trim_end_matches(['\n', '\r']),
                Err(e) => {
                    items.push(SseItem::Malformed(format!("invalid UTF-8 in SSE line: {e}")));
                    continue;
                }
            };

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if data == "[DONE]" {
                    items.push(SseItem::Done);
                } else if !data.is_empty() {
                    items.push(SseItem::Data(data.to_string()));
                }
            }
        }
        items
    }
}

/// Decode an SSE byte stream and forward every delta to `tx`.
///
/// Ends on `[DONE]`, on byte-stream end, or when the receiver goes away.
/// A transport error or a payload that cannot be decoded is sent as an
/// error item and ends the stream; nothing is skipped.
async fn forward_sse<S, B, E>(
    byte_stream: S,
    tx: mpsc::Sender<Result<Chunk, ProviderError>>,
    provider_name: String,
) where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut byte_stream = std::pin::pin!(byte_stream);
    let mut decoder = SseDecoder::default();

    while let Some(next) = byte_stream.next().await {
        let bytes = match next {
            Ok(b) => b,
            Err(e) => {
                let _ = tx
                    .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                    .await;
                return;
            }
        };

        for item in decoder.feed(bytes.as_ref()) {
            let data = match item {
                SseItem::Done => return,
                SseItem::Data(data) => data,
                SseItem::Malformed(reason) => {
                    warn!(provider = %provider_name, %reason, "Malformed SSE line");
                    let _ = tx.send(Err(ProviderError::StreamInterrupted(reason))).await;
                    return;
                }
            };

            let parsed = match serde_json::from_str::<StreamResponse>(&data) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(provider = %provider_name, data = %data, error = %e, "Unparseable SSE payload");
                    let _ = tx
                        .send(Err(ProviderError::StreamInterrupted(format!(
                            "malformed SSE payload: {e}"
                        ))))
                        .await;
                    return;
                }
            };

            if let Some(chunk) = delta_to_chunk(parsed) {
                if tx.send(Ok(chunk)).await.is_err() {
                    trace!(provider = %provider_name, "Receiver dropped");
                    return;
                }
            }
        }
    }

    debug!(provider = %provider_name, "Byte stream ended without [DONE]");
}

/// Turn one parsed SSE payload into a chunk, if it carries anything.
fn delta_to_chunk(response: StreamResponse) -> Option<Chunk> {
    let choice = response.choices.into_iter().next()?;
    let delta = choice.delta;

    let role = match delta.role.as_deref() {
        Some("tool") => ChunkRole::Tool,
        _ => ChunkRole::Normal,
    };
    let tool_calls: Vec<ToolCallFragment> = delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            ToolCallFragment {
                index: tc.index,
                id: tc.id,
                name,
                arguments,
            }
        })
        .collect();
    let content = delta.content.unwrap_or_default();

    if content.is_empty() && tool_calls.is_empty() {
        return None;
    }
    Some(Chunk {
        role,
        content,
        tool_calls,
    })
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(provider = %self.name, model = %request.model, "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider streaming error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let provider_name = self.name.clone();

        tokio::spawn(forward_sse(response.bytes_stream(), tx, provider_name));

        Ok(rx)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta: arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::message::MessageToolCall;

    fn parse(data: &str) -> Option<Chunk> {
        delta_to_chunk(serde_json::from_str(data).unwrap())
    }

    #[test]
    fn ollama_constructor() {
        let provider = OpenAiCompatProvider::ollama(None).unwrap();
        assert_eq!(provider.name(), "ollama");
        assert!(provider.base_url.contains("localhost:11434"));
    }

    #[test]
    fn from_config_requires_api_key() {
        let config = AppConfig::default();
        assert!(matches!(
            OpenAiCompatProvider::from_config(&config),
            Err(ProviderError::NotConfigured(_))
        ));

        let config = AppConfig {
            api_key: Some("sk-test".into()),
            api_url: "https://example.test/v1/".into(),
            ..AppConfig::default()
        };
        let provider = OpenAiCompatProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "https://example.test/v1");
    }

    #[test]
    fn message_conversion() {
        let messages = vec![Message::system("You are helpful"), Message::user("Hello")];
        let api_messages = OpenAiCompatProvider::to_api_messages(&messages);
        assert_eq!(api_messages.len(), 2);
        assert_eq!(api_messages[0].role, "system");
        assert_eq!(api_messages[1].role, "user");
    }

    #[test]
    fn message_conversion_with_tool_calls() {
        let mut msg = Message::assistant("thinking...");
        msg.tool_calls = vec![MessageToolCall {
            id: "call_1".into(),
            name: "exit_and_summarize".into(),
            arguments: r#"{"summary":"done"}"#.into(),
        }];
        let api_msgs = OpenAiCompatProvider::to_api_messages(&[msg]);
        let tc = api_msgs[0].tool_calls.as_ref().unwrap();
        assert_eq!(tc[0].function.name, "exit_and_summarize");

        let api_msgs = OpenAiCompatProvider::to_api_messages(&[Message::tool_result("call_1", "ok")]);
        assert_eq!(api_msgs[0].role, "tool");
        assert_eq!(api_msgs[0].tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn request_body_is_streaming_with_tools() {
        let request = ProviderRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.2,
            max_tokens: Some(256),
            tools: vec![ToolDefinition {
                name: "exit_and_summarize".into(),
                description: "Leave the loop".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "exit_and_summarize");
    }

    // --- SSE parsing ---

    #[test]
    fn decoder_handles_split_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(b"data: {\"a\"").is_empty());
        assert_eq!(
            decoder.feed(b":1}\r\n\r\n: keep-alive\ndata: [DONE]\n"),
            vec![SseItem::Data("{\"a\":1}".into()), SseItem::Done]
        );
    }

    #[test]
    fn decoder_keeps_characters_split_across_reads() {
        let line = "data: {\"x\":\"é\"}\n".as_bytes();
        let split = line.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::default();
        assert!(decoder.feed(&line[..split]).is_empty());
        assert_eq!(
            decoder.feed(&line[split..]),
            vec![SseItem::Data("{\"x\":\"é\"}".into())]
        );
    }

    #[test]
    fn decoder_reports_invalid_utf8_lines() {
        let mut decoder = SseDecoder::default();
        let items = decoder.feed(b"data: \xff\xfe\n");
        assert!(matches!(items.as_slice(), [SseItem::Malformed(_)]));
    }

    async fn forward(reads: Vec<&'static [u8]>) -> Vec<Result<Chunk, ProviderError>> {
        let (tx, mut rx) = mpsc::channel(16);
        let reads = futures::stream::iter(
            reads.into_iter().map(Ok::<_, std::io::Error>).collect::<Vec<_>>(),
        );
        forward_sse(reads, tx, "test".into()).await;

        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn forwarded_text_survives_split_reads() {
        let items = forward(vec![
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"\xe4\xbd"[..],
            &b"\xa0\xe5\xa5\xbd\"}}]}\n\ndata: [DONE]\n"[..],
        ])
        .await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), &Chunk::text("你好"));
    }

    #[tokio::test]
    async fn unparseable_payload_ends_stream_with_error() {
        let items = forward(vec![
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n"[..],
            &b"data: {not json\n"[..],
            &b"data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n"[..],
        ])
        .await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), &Chunk::text("a"));
        match &items[1] {
            Err(ProviderError::StreamInterrupted(reason)) => {
                assert!(reason.contains("malformed SSE payload"))
            }
            other => panic!("expected a stream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_error_is_forwarded() {
        let (tx, mut rx) = mpsc::channel(4);
        let reads = futures::stream::iter(vec![Err::<&[u8], _>(std::io::Error::other("reset"))]);
        forward_sse(reads, tx, "test".into()).await;

        match rx.recv().await {
            Some(Err(ProviderError::StreamInterrupted(reason))) => assert!(reason.contains("reset")),
            other => panic!("expected a stream error, got {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn content_delta_becomes_text_chunk() {
        let chunk = parse(r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#).unwrap();
        assert_eq!(chunk, Chunk::text("Hello"));
    }

    #[test]
    fn finish_and_empty_deltas_are_dropped() {
        assert!(parse(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#).is_none());
        assert!(parse(r#"{"choices":[],"usage":{"prompt_tokens":1}}"#).is_none());
    }

    #[test]
    fn tool_call_deltas_pass_through_unmerged() {
        let chunk = parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"search","arguments":""}},{"index":1,"function":{"arguments":"{\"q\""}}]}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.content, "");
        assert_eq!(chunk.tool_calls.len(), 2);
        assert_eq!(chunk.tool_calls[0].index, Some(0));
        assert_eq!(chunk.tool_calls[0].id.as_deref(), Some("call_a"));
        assert_eq!(chunk.tool_calls[1].index, Some(1));
        assert_eq!(chunk.tool_calls[1].arguments.as_deref(), Some("{\"q\""));
    }

    #[test]
    fn missing_index_is_forwarded_not_guessed() {
        let chunk = parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"function":{"name":"search"}}]}}]}"#,
        )
        .unwrap();
        assert_eq!(chunk.tool_calls[0].index, None);
    }
}
