//! Concurrency Gate (C3, §4.3). A two-level counting semaphore backed by
//! the coordination store: one global counter, one per channel.

use crate::coordination::{channel_semaphore_key, CoordinationStore, KEY_SEMAPHORE_GLOBAL};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

const SLOT_TTL: Duration = Duration::from_secs(120);
const BACKOFF: Duration = Duration::from_millis(500);

pub struct GateConfig {
    pub max_global_concurrency: u32,
    pub channel_concurrency: u32,
}

pub struct ConcurrencyGate {
    store: Arc<dyn CoordinationStore>,
}

/// A held pair of slots, released by dropping or calling `release` explicitly.
/// Callers must call `release` themselves on every exit path (§9 "guaranteed
/// release of gate slots") — Rust has no async `Drop`, so this is not
/// enforced structurally, only by discipline at the call site.
pub struct GateHandle {
    channel_id: String,
}

impl ConcurrencyGate {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// §4.3 Acquire: loops incrementing global then channel counters,
    /// backing off 500ms on either ceiling, until both fit under the cap.
    pub async fn acquire(&self, channel_id: &str, cfg: &GateConfig) -> Result<GateHandle> {
        let channel_key = channel_semaphore_key(channel_id);
        loop {
            let global = self.store.incr_with_ttl(KEY_SEMAPHORE_GLOBAL, SLOT_TTL).await?;
            if global > cfg.max_global_concurrency as i64 {
                self.store.decr(KEY_SEMAPHORE_GLOBAL).await?;
                sleep(BACKOFF).await;
                continue;
            }

            let per_channel = self.store.incr_with_ttl(&channel_key, SLOT_TTL).await?;
            if per_channel > cfg.channel_concurrency as i64 {
                self.store.decr(&channel_key).await?;
                self.store.decr(KEY_SEMAPHORE_GLOBAL).await?;
                sleep(BACKOFF).await;
                continue;
            }

            return Ok(GateHandle {
                channel_id: channel_id.to_string(),
            });
        }
    }

    /// §4.3 Release: decrement both counters, deleting either key that goes ≤ 0.
    pub async fn release(&self, handle: GateHandle) -> Result<()> {
        let channel_key = channel_semaphore_key(&handle.channel_id);

        let global = self.store.decr(KEY_SEMAPHORE_GLOBAL).await?;
        if global <= 0 {
            self.store.delete(KEY_SEMAPHORE_GLOBAL).await?;
        }

        let per_channel = self.store.decr(&channel_key).await?;
        if per_channel <= 0 {
            self.store.delete(&channel_key).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryCoordinationStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn acquire_then_release_frees_the_slot() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let gate = ConcurrencyGate::new(store);
        let cfg = GateConfig {
            max_global_concurrency: 1,
            channel_concurrency: 1,
        };

        let handle = gate.acquire("chan-a", &cfg).await.unwrap();
        gate.release(handle).await.unwrap();

        let handle = gate.acquire("chan-a", &cfg).await.unwrap();
        gate.release(handle).await.unwrap();
    }

    #[tokio::test]
    async fn respects_per_channel_ceiling_under_concurrent_acquires() {
        let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
        let gate = Arc::new(ConcurrencyGate::new(store));
        let cfg = Arc::new(GateConfig {
            max_global_concurrency: 10,
            channel_concurrency: 2,
        });
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..6 {
            let gate = gate.clone();
            let cfg = cfg.clone();
            let concurrent = concurrent.clone();
            let max_seen = max_seen.clone();
            tasks.push(tokio::spawn(async move {
                let handle = gate.acquire("chan-a", &cfg).await.unwrap();
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
                gate.release(handle).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }
}
