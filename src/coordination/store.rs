use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;

/// The six primitives C3/C4/C6 need from the coordination store.
///
/// Modeled directly on §9's list: "atomic increment/decrement with TTL,
/// key delete, publish, subscribe, a durable FIFO with bulk push, and a
/// set/get flag." A durable FIFO needs more than raw push/pop to support
/// §4.4's `stats`/`jobsByState`/`drain` contract, so those live one layer
/// up in `queue::DetectionQueue`, built on top of `list_push_bulk`/
/// `list_pop_blocking` here — mirroring how a BullMQ-style queue layers
/// job bookkeeping on top of plain Redis list/hash primitives.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Atomically increment `key` by 1, set its TTL, and return the new value.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// Atomically decrement `key` by 1 and return the new value.
    async fn decr(&self, key: &str) -> Result<i64>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn set_flag(&self, key: &str) -> Result<()>;
    async fn clear_flag(&self, key: &str) -> Result<()>;
    async fn get_flag(&self, key: &str) -> Result<bool>;

    async fn publish(&self, topic: &str, message: String) -> Result<()>;
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<String>;

    /// Append `payloads` to the end of a durable list atomically, returning
    /// one generated id per payload in order (§4.4 "Bulk enqueue").
    async fn list_push_bulk(&self, list: &str, payloads: Vec<String>) -> Result<Vec<String>>;

    /// Pop one `(id, payload)` off the front of the list, if any.
    async fn list_pop(&self, list: &str) -> Result<Option<(String, String)>>;

    /// Current length of the list (used for `waiting` stats).
    async fn list_len(&self, list: &str) -> Result<u64>;

    /// Remove every entry from the list (§4.4 `drain`'s "remove waiting").
    async fn list_clear(&self, list: &str) -> Result<()>;
}
