//! Checkpoint store trait: where a finished loop's history can be kept.

use async_trait::async_trait;
use crate::error::StoreError;

/// A key/value store for serialized checkpoints.
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// A human-readable name for this store.
    fn name(&self) -> &str;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
}
