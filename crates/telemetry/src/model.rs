//! Data model for loop traces and turn spans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Span ──────────────────────────────────────────────────────────────────

/// The kind of work a span represents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// One turn of the agent system (executor plus critic).
    Turn,
    /// Waiting for the operator's decision.
    HumanDecision,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Turn => write!(f, "turn"),
            Self::HumanDecision => write!(f, "human_decision"),
        }
    }
}

/// A single traced execution unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Unique identifier.
    pub id: String,
    /// Parent span id (None for root spans).
    pub parent_id: Option<String>,
    /// What kind of work this represents.
    pub kind: SpanKind,
    /// Human-readable label (e.g. `turn 3`).
    pub label: String,
    /// When the span started.
    pub started_at: DateTime<Utc>,
    /// When the span ended (None if still running).
    pub ended_at: Option<DateTime<Utc>>,
    /// Duration in milliseconds (computed on end).
    pub duration_ms: Option<u64>,
    /// Whether the operation succeeded.
    pub success: Option<bool>,
    /// Arbitrary metadata.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Span {
    /// Create a new span with the given kind and label.
    pub fn new(kind: SpanKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            kind,
            label: label.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            success: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Set the parent span.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Attach one metadata entry.
    pub fn set(&mut self, key: &str, value: impl Into<serde_json::Value>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    /// Mark the span as ended with the given success status.
    pub fn end(&mut self, success: bool) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(
            now.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.success = Some(success);
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

// ── Trace ─────────────────────────────────────────────────────────────────

/// All spans recorded for one loop run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    /// Unique trace id.
    pub id: String,
    /// Service that produced the trace.
    pub service: String,
    /// Conversation id this trace belongs to.
    pub conversation_id: String,
    /// All spans in this trace.
    pub spans: Vec<Span>,
    /// When the trace started.
    pub started_at: DateTime<Utc>,
    /// When the trace ended.
    pub ended_at: Option<DateTime<Utc>>,
}

impl Trace {
    /// Create a new trace for a conversation.
    pub fn new(service: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            service: service.into(),
            conversation_id: conversation_id.into(),
            spans: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Add a span to this trace.
    pub fn add_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    /// Mark the trace as complete.
    pub fn end(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// Total duration of all spans in milliseconds.
    pub fn total_duration_ms(&self) -> u64 {
        self.spans.iter().filter_map(|s| s.duration_ms).sum()
    }

    /// Number of turn spans in this trace.
    pub fn turn_count(&self) -> usize {
        self.spans
            .iter()
            .filter(|s| s.kind == SpanKind::Turn)
            .count()
    }

    /// Number of turn spans that ended unsuccessfully.
    pub fn failed_turns(&self) -> usize {
        self.spans
            .iter()
            .filter(|s| s.kind == SpanKind::Turn && s.success == Some(false))
            .count()
    }
}

// ── Summary ───────────────────────────────────────────────────────────────

/// Aggregate counts across every recorded trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub traces: usize,
    pub turns: usize,
    pub failed_turns: usize,
    pub tool_calls: u64,
    pub exits: usize,
    pub total_duration_ms: u64,
}
