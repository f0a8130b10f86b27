pub mod keys;
pub mod memory;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

pub use keys::Keys;
pub use memory::MemoryBackend;

/// Primitives the stores need from the shared key-value/pubsub service.
///
/// Every method is atomic for the key it addresses; nothing spanning several
/// keys is. Values are opaque strings (JSON in practice).
#[async_trait]
pub trait Backend: Send + Sync {
    // --- keyed map ---
    async fn map_get(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn map_put(&self, key: &str, field: &str, value: String) -> Result<()>;
    /// Like `map_put`, but the entry expires after `ttl`.
    async fn map_put_with_ttl(
        &self,
        key: &str,
        field: &str,
        value: String,
        ttl: Duration,
    ) -> Result<()>;
    async fn map_remove(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn map_size(&self, key: &str) -> Result<usize>;
    async fn map_values(&self, key: &str) -> Result<Vec<String>>;

    // --- ordered list ---
    async fn list_push(&self, key: &str, value: String) -> Result<()>;
    /// Removes the first occurrence of `value`.
    async fn list_remove(&self, key: &str, value: &str) -> Result<bool>;
    async fn list_len(&self, key: &str) -> Result<usize>;
    /// Elements in `[from, min(to, len))`; empty when `from >= len`.
    async fn list_range(&self, key: &str, from: usize, to: usize) -> Result<Vec<String>>;

    // --- multimap (field -> ordered values) ---
    async fn multimap_put(&self, key: &str, field: &str, value: String) -> Result<()>;
    /// Appends unless the bucket already holds `value`. Returns whether it was added.
    async fn multimap_put_unique(&self, key: &str, field: &str, value: String) -> Result<bool>;
    async fn multimap_get_all(&self, key: &str, field: &str) -> Result<Vec<String>>;
    async fn multimap_range(
        &self,
        key: &str,
        field: &str,
        from: usize,
        to: usize,
    ) -> Result<Vec<String>>;
    async fn multimap_len(&self, key: &str, field: &str) -> Result<usize>;
    async fn multimap_remove_all(&self, key: &str, field: &str) -> Result<Vec<String>>;
    async fn multimap_remove_value(&self, key: &str, field: &str, value: &str) -> Result<bool>;
    /// Pops the oldest value of the bucket.
    async fn multimap_remove_first(&self, key: &str, field: &str) -> Result<Option<String>>;

    // --- counting semaphore ---
    /// Waits up to `timeout` for `permits` permits. `Ok(false)` on timeout.
    async fn semaphore_try_acquire(
        &self,
        key: &str,
        permits: usize,
        timeout: Duration,
    ) -> Result<bool>;
    async fn semaphore_release(&self, key: &str, permits: usize) -> Result<()>;

    // --- keys ---
    async fn exists(&self, key: &str) -> Result<bool>;
    /// Deletes whatever primitive lives at `key`.
    async fn delete(&self, key: &str) -> Result<bool>;

    // --- pub/sub ---
    /// Returns the number of subscribers that received the message.
    async fn publish(&self, topic: &str, message: String) -> Result<usize>;
}
