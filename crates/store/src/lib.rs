//! Checkpoint stores for Tandem.
//!
//! Both stores implement `tandem_core::CheckpointStore`. The helpers below
//! save and restore a conversation's message history under its id.

pub mod file_store;
pub mod in_memory;

pub use file_store::FileStore;
pub use in_memory::InMemoryStore;

use tandem_core::CheckpointStore;
use tandem_core::error::StoreError;
use tandem_core::message::{ConversationId, Message};
use tracing::debug;

/// Key under which a conversation's history is stored.
pub fn history_key(id: &ConversationId) -> String {
    format!("history/{}", id.0)
}

/// Serialise `messages` as JSON and store them under the conversation id.
/// Returns the key used.
pub async fn save_history(
    store: &dyn CheckpointStore,
    id: &ConversationId,
    messages: &[Message],
) -> Result<String, StoreError> {
    let key = history_key(id);
    let bytes = serde_json::to_vec(messages)
        .map_err(|e| StoreError::Storage(format!("Failed to serialize history: {e}")))?;
    debug!(store = store.name(), key = %key, messages = messages.len(), "Saving history");
    store.set(&key, bytes).await?;
    Ok(key)
}

/// Load a conversation's history, if one was saved.
pub async fn load_history(
    store: &dyn CheckpointStore,
    id: &ConversationId,
) -> Result<Option<Vec<Message>>, StoreError> {
    let Some(bytes) = store.get(&history_key(id)).await? else {
        return Ok(None);
    };
    let messages = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Storage(format!("Corrupted history: {e}")))?;
    Ok(Some(messages))
}
