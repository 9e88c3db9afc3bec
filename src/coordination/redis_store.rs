//! Redis-backed `CoordinationStore`, the production implementation.
//!
//! Uses a cloned `redis::aio::ConnectionManager` per call the way
//! `CacheService` does in the pack's Dragonfly cache layer — the manager
//! itself handles reconnection, so callers never hold a connection across
//! an await point longer than one command.

use super::store::CoordinationStore;
use crate::error::{DetectError, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct RedisCoordinationStore {
    conn: ConnectionManager,
    pubsub_client: redis::Client,
}

impl RedisCoordinationStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| DetectError::CoordinationStoreError(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| DetectError::CoordinationStoreError(e.to_string()))?;
        Ok(Self {
            conn,
            pubsub_client: client,
        })
    }

    fn map_err(e: redis::RedisError) -> DetectError {
        DetectError::CoordinationStoreError(e.to_string())
    }
}

#[async_trait]
impl CoordinationStore for RedisCoordinationStore {
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut con = self.conn.clone();
        let (value,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, ttl.as_secs() as i64)
            .ignore()
            .query_async(&mut con)
            .await
            .map_err(Self::map_err)?;
        Ok(value)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        let mut con = self.conn.clone();
        let value: i64 = con.decr(key, 1).await.map_err(Self::map_err)?;
        if value <= 0 {
            let _: () = con.del(key).await.map_err(Self::map_err)?;
        }
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut con = self.conn.clone();
        let _: () = con.del(key).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn set_flag(&self, key: &str) -> Result<()> {
        let mut con = self.conn.clone();
        let _: () = con.set(key, "1").await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn clear_flag(&self, key: &str) -> Result<()> {
        self.delete(key).await
    }

    async fn get_flag(&self, key: &str) -> Result<bool> {
        let mut con = self.conn.clone();
        let exists: bool = con.exists(key).await.map_err(Self::map_err)?;
        Ok(exists)
    }

    async fn publish(&self, topic: &str, message: String) -> Result<()> {
        let mut con = self.conn.clone();
        let _: i64 = con.publish(topic, message).await.map_err(Self::map_err)?;
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        let (tx, rx) = broadcast::channel(256);
        let client = self.pubsub_client.clone();
        let topic = topic.to_string();
        tokio::spawn(async move {
            let mut pubsub = match client.get_async_pubsub().await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(error = %e, topic, "failed to open redis pubsub connection");
                    return;
                }
            };
            if let Err(e) = pubsub.subscribe(&topic).await {
                tracing::warn!(error = %e, topic, "failed to subscribe to redis topic");
                return;
            }
            let mut stream = pubsub.on_message();
            use futures_util::StreamExt;
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(error = %e, "malformed redis pubsub payload");
                        continue;
                    }
                };
                if tx.send(payload).is_err() {
                    break;
                }
            }
        });
        rx
    }

    async fn list_push_bulk(&self, list: &str, payloads: Vec<String>) -> Result<Vec<String>> {
        let mut con = self.conn.clone();
        let mut ids = Vec::with_capacity(payloads.len());
        let mut pipe = redis::pipe();
        pipe.atomic();
        for payload in &payloads {
            let id = Uuid::new_v4().to_string();
            let entry = format!("{id}\u{1}{payload}");
            pipe.rpush(list, entry).ignore();
            ids.push(id);
        }
        let _: () = pipe.query_async(&mut con).await.map_err(Self::map_err)?;
        Ok(ids)
    }

    async fn list_pop(&self, list: &str) -> Result<Option<(String, String)>> {
        let mut con = self.conn.clone();
        let entry: Option<String> = con.lpop(list, None).await.map_err(Self::map_err)?;
        Ok(entry.and_then(|raw| {
            raw.split_once('\u{1}')
                .map(|(id, payload)| (id.to_string(), payload.to_string()))
        }))
    }

    async fn list_len(&self, list: &str) -> Result<u64> {
        let mut con = self.conn.clone();
        let len: u64 = con.llen(list).await.map_err(Self::map_err)?;
        Ok(len)
    }

    async fn list_clear(&self, list: &str) -> Result<()> {
        let mut con = self.conn.clone();
        let _: () = con.del(list).await.map_err(Self::map_err)?;
        Ok(())
    }
}
