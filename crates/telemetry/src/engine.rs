//! Thread-safe trace recorder: one span per turn, plus the operator's
//! decision time between turns.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tandem_core::hook::{TurnHook, TurnSummary};
use tandem_core::message::Message;
use tracing::debug;

use crate::TelemetryError;
use crate::model::*;

/// Longest answer preview attached to a turn span, in characters.
const ANSWER_PREVIEW_CHARS: usize = 120;

/// Records loop activity as traces of spans.
///
/// Thread-safe via `RwLock`. Turn spans land in the most recent trace;
/// one is started on demand if none is open.
pub struct TraceRecorder {
    service: String,
    /// All recorded traces (most recent last).
    traces: RwLock<Vec<Trace>>,
    /// Spans started but not yet recorded.
    open: RwLock<OpenSpans>,
}

#[derive(Debug, Default)]
struct OpenSpans {
    turn: Option<Span>,
    decision: Option<Span>,
    /// Most recently recorded turn, parent of the next decision
    last_turn: Option<String>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(ANSWER_PREVIEW_CHARS).collect();
    if text.chars().count() > ANSWER_PREVIEW_CHARS {
        out.push('…');
    }
    out
}

impl TraceRecorder {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            traces: RwLock::new(Vec::new()),
            open: RwLock::new(OpenSpans::default()),
        }
    }

    // ── Trace management ──────────────────────────────────────────────

    /// Start a new trace for a conversation. Returns the trace id.
    pub fn start_trace(&self, conversation_id: impl Into<String>) -> String {
        let trace = Trace::new(&self.service, conversation_id);
        let id = trace.id.clone();
        debug!(trace_id = %id, "Trace started");
        write(&self.traces).push(trace);
        id
    }

    /// End the current trace, closing any span still open.
    pub fn finish(&self) {
        let pending = {
            let mut open = write(&self.open);
            [open.turn.take(), open.decision.take()]
        };
        for mut span in pending.into_iter().flatten() {
            span.end(true);
            self.record_span(span);
        }

        if let Some(trace) = write(&self.traces).last_mut() {
            trace.end();
        }
    }

    /// Append a completed span to the current trace.
    fn record_span(&self, span: Span) {
        let mut traces = write(&self.traces);
        if traces.is_empty() {
            traces.push(Trace::new(&self.service, "default"));
        }
        if let Some(trace) = traces.last_mut() {
            trace.add_span(span);
        }
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Snapshot of every recorded trace.
    pub fn traces(&self) -> Vec<Trace> {
        read(&self.traces).clone()
    }

    /// Total number of traces recorded.
    pub fn trace_count(&self) -> usize {
        read(&self.traces).len()
    }

    /// Aggregate counts across all traces.
    pub fn summary(&self) -> TraceSummary {
        let traces = read(&self.traces);
        let mut summary = TraceSummary {
            traces: traces.len(),
            ..Default::default()
        };

        for trace in traces.iter() {
            summary.turns += trace.turn_count();
            summary.failed_turns += trace.failed_turns();
            summary.total_duration_ms += trace.total_duration_ms();
            for span in trace.spans.iter().filter(|s| s.kind == SpanKind::Turn) {
                summary.tool_calls += span
                    .metadata
                    .get("tool_calls")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0);
                if span.metadata.get("exit").and_then(|v| v.as_bool()) == Some(true) {
                    summary.exits += 1;
                }
            }
        }
        summary
    }

    /// Every trace as pretty JSON.
    pub fn export_json(&self) -> Result<String, TelemetryError> {
        Ok(serde_json::to_string_pretty(&*read(&self.traces))?)
    }
}

impl TurnHook for TraceRecorder {
    fn turn_started(&self, iteration: u32, messages: &[Message]) {
        let decision = write(&self.open).decision.take();
        if let Some(mut span) = decision {
            span.end(true);
            self.record_span(span);
        }

        let mut span = Span::new(SpanKind::Turn, format!("turn {iteration}"));
        span.set("iteration", iteration);
        span.set("messages", messages.len());
        write(&self.open).turn = Some(span);
    }

    fn turn_finished(&self, summary: &TurnSummary) {
        let started = write(&self.open).turn.take();
        let mut span = started
            .unwrap_or_else(|| Span::new(SpanKind::Turn, format!("turn {}", summary.iteration)));

        if let Some(answer) = &summary.answer {
            span.set("answer_preview", preview(answer));
        }
        span.set("tool_calls", summary.tool_calls);
        span.set("exit", summary.exit);
        span.set("interrupts", summary.interrupts);
        if let Some(dest) = &summary.transfer_to {
            span.set("transfer_to", dest.as_str());
        }
        if let Some(error) = &summary.error {
            span.set("error", error.as_str());
        }
        span.end(summary.succeeded());

        write(&self.open).last_turn = Some(span.id.clone());
        self.record_span(span);
    }

    fn decision_started(&self, iteration: u32) {
        let mut open = write(&self.open);
        let mut span = Span::new(SpanKind::HumanDecision, "operator decision");
        span.set("iteration", iteration);
        if let Some(turn_id) = open.last_turn.clone() {
            span = span.with_parent(turn_id);
        }
        open.decision = Some(span);
    }
}
