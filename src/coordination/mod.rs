//! The coordination store abstraction (§9 "Coordination store abstraction",
//! §5 "Shared resources"). Encapsulates the six primitives the core needs
//! from Redis — atomic incr/decr with TTL, key delete, publish, subscribe,
//! a durable list with bulk push, and a set/get flag — behind a trait so
//! tests can substitute an in-memory implementation, the same way the
//! teacher repo substitutes `MemoryStore` implementations.

pub mod memory_store;
pub mod redis_store;
pub mod store;

pub use memory_store::InMemoryCoordinationStore;
pub use redis_store::RedisCoordinationStore;
pub use store::CoordinationStore;

pub const KEY_SEMAPHORE_GLOBAL: &str = "detection:semaphore:global";
pub const KEY_STOPPED_FLAG: &str = "detection:stopped";
pub const TOPIC_PROGRESS: &str = "detection:progress";
pub const QUEUE_DETECTION: &str = "detection-queue";

pub fn channel_semaphore_key(channel_id: &str) -> String {
    format!("detection:semaphore:channel:{channel_id}")
}
