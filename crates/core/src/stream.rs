//! Incremental output of an agent turn.
//!
//! A streamed turn arrives as a sequence of [`Chunk`]s over a bounded
//! channel. Closing the channel means the producer is exhausted; an `Err`
//! item means the production failed. The two are never confused.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;

/// A streamed turn: ordered chunks, `Err` on production failure,
/// channel closure on normal exhaustion.
pub type ChunkStream = mpsc::Receiver<Result<Chunk, ProviderError>>;

/// Whether a chunk carries normal agent text or tool output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkRole {
    #[default]
    Normal,
    Tool,
}

/// One incremental unit produced while a turn is in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub role: ChunkRole,

    /// Text delta, possibly empty
    #[serde(default)]
    pub content: String,

    /// Partial tool invocations carried by this chunk
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallFragment>,
}

impl Chunk {
    /// A normal text delta.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// A tool-output text delta.
    pub fn tool_text(content: impl Into<String>) -> Self {
        Self {
            role: ChunkRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// A chunk carrying only tool-call fragments.
    pub fn fragments(tool_calls: Vec<ToolCallFragment>) -> Self {
        Self {
            tool_calls,
            ..Default::default()
        }
    }
}

/// A partial tool invocation.
///
/// `arguments` shards of one index concatenate, in arrival order, into a
/// single JSON document. `index` is mandatory on the wire; it is optional
/// here only so that its absence can be reported rather than guessed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    #[serde(default)]
    pub index: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

impl ToolCallFragment {
    /// A fragment that only names the tool.
    pub fn name(index: u32, name: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// A fragment that only carries an argument shard.
    pub fn arguments(index: u32, shard: impl Into<String>) -> Self {
        Self {
            index: Some(index),
            arguments: Some(shard.into()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}
