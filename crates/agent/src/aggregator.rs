//! Tool-call aggregation.
//!
//! A streamed turn delivers tool invocations in pieces: the name in one
//! chunk, the arguments spread over several more, and pieces of different
//! calls interleaved. [`ToolCallAggregator`] groups the pieces by their
//! index and merges each group into one [`AggregatedToolCall`].
//!
//! The aggregator lives for exactly one turn. It is owned by the chunk
//! buffer and consumed when the turn finishes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tandem_core::stream::ToolCallFragment;
use tracing::trace;

/// A complete tool invocation assembled from every fragment of one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedToolCall {
    pub index: u32,

    /// First non-empty call id seen, or empty
    pub id: String,

    /// First non-empty name seen, or empty
    pub name: String,

    /// Concatenation of every argument shard, in arrival order
    pub arguments: String,
}

/// Fragments received for one index.
#[derive(Debug)]
struct Slot {
    index: u32,
    fragments: Vec<ToolCallFragment>,
}

impl Slot {
    fn merge(&self) -> AggregatedToolCall {
        let mut call = AggregatedToolCall {
            index: self.index,
            id: String::new(),
            name: String::new(),
            arguments: String::new(),
        };

        for fragment in &self.fragments {
            if let Some(id) = fragment.id.as_deref().filter(|s| !s.is_empty()) {
                if call.id.is_empty() {
                    call.id = id.to_string();
                }
            }
            if let Some(name) = fragment.name.as_deref().filter(|s| !s.is_empty()) {
                if call.name.is_empty() {
                    call.name = name.to_string();
                } else if call.name != name {
                    // Tolerated: first name wins.
                    trace!(index = self.index, kept = %call.name, ignored = %name, "Conflicting tool name fragment");
                }
            }
            if let Some(shard) = fragment.arguments.as_deref() {
                call.arguments.push_str(shard);
            }
        }

        call
    }
}

/// Groups tool-call fragments by index for the lifetime of one turn.
///
/// Slots are kept in first-seen order, which is also the order of the
/// finalized result.
#[derive(Debug, Default)]
pub struct ToolCallAggregator {
    slots: Vec<Slot>,
    by_index: HashMap<u32, usize>,
    finalized: Option<Vec<AggregatedToolCall>>,
}

impl ToolCallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fragment under `index`.
    ///
    /// The fragment's own `index` field is not consulted; the caller has
    /// already validated and extracted it.
    pub fn add_fragment(&mut self, index: u32, fragment: ToolCallFragment) {
        self.finalized = None;
        let slot = *self.by_index.entry(index).or_insert_with(|| {
            self.slots.push(Slot {
                index,
                fragments: Vec::new(),
            });
            self.slots.len() - 1
        });
        self.slots[slot].fragments.push(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of distinct tool calls seen so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Merge every index's fragments.
    ///
    /// Repeated calls with no new fragments in between return the same
    /// cached result.
    pub fn finalize(&mut self) -> &[AggregatedToolCall] {
        let slots = &self.slots;
        self.finalized
            .get_or_insert_with(|| slots.iter().map(Slot::merge).collect())
    }

    /// Finalize and drop the fragment arena.
    pub fn into_calls(mut self) -> Vec<AggregatedToolCall> {
        self.finalize();
        self.finalized.take().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_name_and_argument_shards() {
        let mut agg = ToolCallAggregator::new();
        agg.add_fragment(0, ToolCallFragment::name(0, "search").with_id("call_1"));
        agg.add_fragment(0, ToolCallFragment::arguments(0, r#"{"q":"#));
        agg.add_fragment(0, ToolCallFragment::arguments(0, r#""x"}"#));

        let calls = agg.finalize();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].arguments, r#"{"q":"x"}"#);
    }

    #[test]
    fn interleaved_indices_stay_separate() {
        let mut agg = ToolCallAggregator::new();
        agg.add_fragment(1, ToolCallFragment::name(1, "read_file"));
        agg.add_fragment(0, ToolCallFragment::name(0, "list_dir"));
        agg.add_fragment(1, ToolCallFragment::arguments(1, r#"{"path":"#));
        agg.add_fragment(0, ToolCallFragment::arguments(0, r#"{"dir":"."}"#));
        agg.add_fragment(1, ToolCallFragment::arguments(1, r#""main.rs"}"#));

        let calls = agg.into_calls();
        // First-seen order, not numeric order
        assert_eq!(calls[0].index, 1);
        assert_eq!(calls[0].arguments, r#"{"path":"main.rs"}"#);
        assert_eq!(calls[1].index, 0);
        assert_eq!(calls[1].arguments, r#"{"dir":"."}"#);
    }

    #[test]
    fn first_non_empty_name_wins() {
        let mut agg = ToolCallAggregator::new();
        agg.add_fragment(0, ToolCallFragment::name(0, ""));
        agg.add_fragment(0, ToolCallFragment::name(0, "shell"));
        agg.add_fragment(0, ToolCallFragment::name(0, "other"));

        assert_eq!(agg.finalize()[0].name, "shell");
    }

    #[test]
    fn arguments_are_not_validated() {
        let mut agg = ToolCallAggregator::new();
        agg.add_fragment(3, ToolCallFragment::arguments(3, "{not json"));
        assert_eq!(agg.finalize()[0].arguments, "{not json");
        assert_eq!(agg.finalize()[0].name, "");
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut agg = ToolCallAggregator::new();
        agg.add_fragment(0, ToolCallFragment::name(0, "search"));
        agg.add_fragment(0, ToolCallFragment::arguments(0, "{}"));

        let first = agg.finalize().to_vec();
        let second = agg.finalize().to_vec();
        assert_eq!(first, second);
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn new_fragments_after_finalize_are_included() {
        let mut agg = ToolCallAggregator::new();
        agg.add_fragment(0, ToolCallFragment::arguments(0, "{"));
        assert_eq!(agg.finalize()[0].arguments, "{");

        agg.add_fragment(0, ToolCallFragment::arguments(0, "}"));
        assert_eq!(agg.finalize()[0].arguments, "{}");
    }

    #[test]
    fn empty_aggregator_finalizes_to_nothing() {
        let mut agg = ToolCallAggregator::new();
        assert!(agg.is_empty());
        assert!(agg.finalize().is_empty());
    }
}
