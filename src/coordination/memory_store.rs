//! In-memory `CoordinationStore`, used by tests and by standalone single
//! process deployments that have no Redis to reach for.

use super::store::CoordinationStore;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use std::sync::Mutex as StdMutex;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

struct Counter {
    value: i64,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryCoordinationStore {
    counters: RwLock<HashMap<String, Counter>>,
    flags: RwLock<HashMap<String, ()>>,
    lists: RwLock<HashMap<String, VecDeque<(String, String)>>>,
    topics: StdMutex<HashMap<String, broadcast::Sender<String>>>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(counter: Option<&Counter>) -> i64 {
        match counter {
            Some(c) if c.expires_at > Instant::now() => c.value,
            _ => 0,
        }
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut counters = self.counters.write().await;
        let current = Self::live_value(counters.get(key));
        let value = current + 1;
        counters.insert(
            key.to_string(),
            Counter {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(value)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        let mut counters = self.counters.write().await;
        let current = Self::live_value(counters.get(key));
        let value = current - 1;
        if value <= 0 {
            counters.remove(key);
        } else if let Some(c) = counters.get_mut(key) {
            c.value = value;
        }
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.counters.write().await.remove(key);
        Ok(())
    }

    async fn set_flag(&self, key: &str) -> Result<()> {
        self.flags.write().await.insert(key.to_string(), ());
        Ok(())
    }

    async fn clear_flag(&self, key: &str) -> Result<()> {
        self.flags.write().await.remove(key);
        Ok(())
    }

    async fn get_flag(&self, key: &str) -> Result<bool> {
        Ok(self.flags.read().await.contains_key(key))
    }

    async fn publish(&self, topic: &str, message: String) -> Result<()> {
        let topics = self.topics.lock().expect("coordination store mutex poisoned");
        if let Some(tx) = topics.get(topic) {
            // No subscribers is not an error; the message is simply unheard.
            let _ = tx.send(message);
        }
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        let mut topics = self.topics.lock().expect("coordination store mutex poisoned");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .subscribe()
    }

    async fn list_push_bulk(&self, list: &str, payloads: Vec<String>) -> Result<Vec<String>> {
        let mut lists = self.lists.write().await;
        let queue = lists.entry(list.to_string()).or_default();
        let mut ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let id = Uuid::new_v4().to_string();
            queue.push_back((id.clone(), payload));
            ids.push(id);
        }
        Ok(ids)
    }

    async fn list_pop(&self, list: &str) -> Result<Option<(String, String)>> {
        Ok(self.lists.write().await.get_mut(list).and_then(VecDeque::pop_front))
    }

    async fn list_len(&self, list: &str) -> Result<u64> {
        Ok(self.lists.read().await.get(list).map(|q| q.len() as u64).unwrap_or(0))
    }

    async fn list_clear(&self, list: &str) -> Result<()> {
        if let Some(queue) = self.lists.write().await.get_mut(list) {
            queue.clear();
        }
        Ok(())
    }
}
