//! Chunk buffer: drains one streamed agent turn.
//!
//! Chunks are consumed strictly one at a time, in arrival order:
//!
//! 1. Non-empty text deltas are appended to the turn's text. The role of the
//!    first non-empty delta (normal or tool) becomes the turn's role.
//! 2. Tool-call fragments are handed to the [`ToolCallAggregator`] under
//!    their index. A fragment without an index aborts the turn.
//! 3. A stream error aborts the turn; channel closure finalizes it.
//!
//! The buffer also tracks the display column of the running text so a
//! renderer can wrap long unbroken output. The stored text is never altered.

use tandem_core::error::TurnError;
use tandem_core::message::{Message, Role};
use tandem_core::stream::{Chunk, ChunkRole, ChunkStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::aggregator::{AggregatedToolCall, ToolCallAggregator};
use crate::sink::TurnSink;

/// Default column after which unbroken text is wrapped for display.
pub const DEFAULT_WRAP_COLUMN: usize = 120;

/// Tracks the display column of streamed text.
#[derive(Debug, Clone)]
pub struct ColumnTracker {
    column: usize,
    threshold: usize,
}

impl ColumnTracker {
    pub fn new(threshold: usize) -> Self {
        Self {
            column: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// Continue a line that already holds `column` characters.
    pub fn start_at(&mut self, column: usize) {
        self.column = column;
    }

    /// Advance past `delta`. Returns `true` when the renderer should break
    /// the line before printing it.
    pub fn advance(&mut self, delta: &str) -> bool {
        if let Some(pos) = delta.rfind('\n') {
            self.column = delta[pos + 1..].chars().count();
            return false;
        }

        let width = delta.chars().count();
        if self.column > 0 && self.column + width > self.threshold {
            self.column = width;
            true
        } else {
            self.column += width;
            false
        }
    }
}

/// What the buffer accumulated over one completed stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferedTurn {
    /// Role of the first non-empty text delta, `None` if there was no text
    pub role: Option<ChunkRole>,

    pub text: String,

    pub tool_calls: Vec<AggregatedToolCall>,

    pub chunks: usize,
}

impl BufferedTurn {
    /// Build the same shape from a message that arrived in one piece.
    pub fn from_message(message: &Message) -> Self {
        let role = (!message.content.is_empty()).then(|| match message.role {
            Role::Tool => ChunkRole::Tool,
            _ => ChunkRole::Normal,
        });
        let tool_calls = message
            .tool_calls
            .iter()
            .enumerate()
            .map(|(i, tc)| AggregatedToolCall {
                index: i as u32,
                id: tc.id.clone(),
                name: tc.name.clone(),
                arguments: tc.arguments.clone(),
            })
            .collect();

        Self {
            role,
            text: message.content.clone(),
            tool_calls,
            chunks: 1,
        }
    }
}

/// Accumulates one turn's chunks.
#[derive(Debug)]
pub struct ChunkBuffer {
    role: Option<ChunkRole>,
    text: String,
    aggregator: ToolCallAggregator,
    columns: ColumnTracker,
    chunks: usize,
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_WRAP_COLUMN)
    }
}

impl ChunkBuffer {
    pub fn new(wrap_column: usize) -> Self {
        Self {
            role: None,
            text: String::new(),
            aggregator: ToolCallAggregator::new(),
            columns: ColumnTracker::new(wrap_column),
            chunks: 0,
        }
    }

    /// The turn's role, once the first non-empty delta has been seen.
    pub fn role(&self) -> Option<ChunkRole> {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn column(&self) -> usize {
        self.columns.column()
    }

    /// Consume one chunk, reporting text to `sink`.
    pub fn push(&mut self, chunk: Chunk, sink: &mut dyn TurnSink) -> Result<(), TurnError> {
        self.chunks += 1;

        if !chunk.content.is_empty() {
            if self.role.is_none() {
                self.role = Some(chunk.role);
                let prefix = sink.text_started(chunk.role);
                self.columns.start_at(prefix);
            }
            let wrap_before = self.columns.advance(&chunk.content);
            sink.text(&chunk.content, wrap_before);
            self.text.push_str(&chunk.content);
        }

        for fragment in chunk.tool_calls {
            let Some(index) = fragment.index else {
                warn!(chunk = self.chunks, "Tool-call fragment without index");
                return Err(TurnError::ProtocolViolation(format!(
                    "tool-call fragment without index in chunk {}",
                    self.chunks
                )));
            };
            self.aggregator.add_fragment(index, fragment);
        }

        Ok(())
    }

    /// Finalize after the stream is exhausted.
    pub fn finish(self) -> BufferedTurn {
        BufferedTurn {
            role: self.role,
            text: self.text,
            tool_calls: self.aggregator.into_calls(),
            chunks: self.chunks,
        }
    }

    /// Drain `stream` until it is exhausted, fails, or `cancel` fires.
    ///
    /// On any error the buffer is dropped along with every partially
    /// aggregated tool call.
    pub async fn consume(
        mut self,
        stream: &mut ChunkStream,
        cancel: &CancellationToken,
        sink: &mut dyn TurnSink,
    ) -> Result<BufferedTurn, TurnError> {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(chunks = self.chunks, "Stream drain cancelled");
                    return Err(TurnError::Cancelled);
                }
                next = stream.recv() => next,
            };

            match next {
                Some(Ok(chunk)) => self.push(chunk, sink)?,
                Some(Err(e)) => {
                    warn!(chunks = self.chunks, error = %e, "Stream failed mid-turn");
                    return Err(TurnError::StreamFailure(e.to_string()));
                }
                None => break,
            }
        }

        debug!(
            chunks = self.chunks,
            text_len = self.text.len(),
            tool_calls = self.aggregator.len(),
            "Stream exhausted"
        );
        Ok(self.finish())
    }
}
