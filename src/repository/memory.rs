//! In-memory reference implementation of the repository traits, used by
//! tests and by any deployment small enough not to need a real database.
//! Mirrors the `RwLock<HashMap<..>>` shape the teacher repo uses for its
//! own in-process stores (`core/bus.rs::DirectiveBus`).

use super::{
    ChannelRepository, CheckLogRepository, ModelKeywordRepository, ModelRepository, Repositories,
    SchedulerConfigRepository,
};
use crate::domain::{
    Channel, ChannelId, ChannelKey, ChannelKeyId, CheckLog, EndpointType, KeyValidation, Model,
    ModelId, ModelKeyword, SchedulerConfig,
};
use crate::error::{DetectError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryRepository {
    channels: RwLock<HashMap<ChannelId, Channel>>,
    channel_keys: RwLock<HashMap<ChannelKeyId, ChannelKey>>,
    models: RwLock<HashMap<ModelId, Model>>,
    check_logs: RwLock<Vec<CheckLog>>,
    scheduler_config: RwLock<Option<SchedulerConfig>>,
    keywords: RwLock<Vec<ModelKeyword>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_channel(&self, channel: Channel) {
        self.channels.write().await.insert(channel.id.clone(), channel);
    }

    pub async fn seed_channel_key(&self, key: ChannelKey) {
        self.channel_keys.write().await.insert(key.id.clone(), key);
    }

    pub async fn seed_model(&self, model: Model) {
        self.models.write().await.insert(model.id.clone(), model);
    }

    pub async fn seed_keyword(&self, keyword: ModelKeyword) {
        self.keywords.write().await.push(keyword);
    }

    pub async fn check_log_count(&self) -> usize {
        self.check_logs.read().await.len()
    }
}

#[async_trait]
impl ChannelRepository for InMemoryRepository {
    async fn get(&self, id: &ChannelId) -> Result<Option<Channel>> {
        Ok(self.channels.read().await.get(id).cloned())
    }

    async fn list_enabled(&self) -> Result<Vec<Channel>> {
        Ok(self
            .channels
            .read()
            .await
            .values()
            .filter(|c| c.enabled)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Channel>> {
        Ok(self.channels.read().await.values().cloned().collect())
    }

    async fn keys_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<ChannelKey>> {
        Ok(self
            .channel_keys
            .read()
            .await
            .values()
            .filter(|k| &k.channel_id == channel_id)
            .cloned()
            .collect())
    }

    async fn get_key(&self, key_id: &ChannelKeyId) -> Result<Option<ChannelKey>> {
        Ok(self.channel_keys.read().await.get(key_id).cloned())
    }

    async fn mark_key_validated(&self, key_id: &ChannelKeyId, status: KeyValidation) -> Result<()> {
        if let Some(key) = self.channel_keys.write().await.get_mut(key_id) {
            key.last_validated = status;
        }
        Ok(())
    }
}

#[async_trait]
impl ModelRepository for InMemoryRepository {
    async fn get(&self, id: &ModelId) -> Result<Option<Model>> {
        Ok(self.models.read().await.get(id).cloned())
    }

    async fn list_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<Model>> {
        Ok(self
            .models
            .read()
            .await
            .values()
            .filter(|m| &m.channel_id == channel_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Model>> {
        Ok(self.models.read().await.values().cloned().collect())
    }

    async fn insert(&self, model: Model) -> Result<()> {
        self.models.write().await.insert(model.id.clone(), model);
        Ok(())
    }

    async fn delete(&self, id: &ModelId) -> Result<()> {
        self.models.write().await.remove(id);
        Ok(())
    }

    async fn apply_probe_outcome(
        &self,
        model_id: &ModelId,
        endpoint: EndpointType,
        success: bool,
        latency_ms: u64,
    ) -> Result<Model> {
        // The write-lock on the whole map is this implementation's row lock
        // (§9 option b) — good enough for an in-memory test double; a real
        // backend would scope the lock to the one row or use an atomic
        // array operation (§9 option a/c) instead of locking everything.
        let mut models = self.models.write().await;
        let model = models
            .get_mut(model_id)
            .ok_or_else(|| DetectError::Other(format!("model {model_id} not found")))?;
        model.apply_outcome(endpoint, success, latency_ms);
        Ok(model.clone())
    }

    async fn reset_to_unknown(&self, model_id: &ModelId) -> Result<()> {
        if let Some(model) = self.models.write().await.get_mut(model_id) {
            model.reset_to_unknown();
        }
        Ok(())
    }
}

#[async_trait]
impl CheckLogRepository for InMemoryRepository {
    async fn append(&self, log: CheckLog) -> Result<()> {
        self.check_logs.write().await.push(log);
        Ok(())
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut logs = self.check_logs.write().await;
        let before = logs.len();
        logs.retain(|l| l.created_at >= cutoff);
        Ok((before - logs.len()) as u64)
    }

    async fn latest_for(&self, model_id: &ModelId, endpoint: EndpointType) -> Result<Option<CheckLog>> {
        Ok(self
            .check_logs
            .read()
            .await
            .iter()
            .filter(|l| &l.model_id == model_id && l.endpoint_type == endpoint)
            .max_by_key(|l| l.created_at)
            .cloned())
    }
}

#[async_trait]
impl SchedulerConfigRepository for InMemoryRepository {
    async fn load(&self) -> Result<Option<SchedulerConfig>> {
        Ok(self.scheduler_config.read().await.clone())
    }

    async fn save(&self, config: SchedulerConfig) -> Result<()> {
        *self.scheduler_config.write().await = Some(config);
        Ok(())
    }
}

#[async_trait]
impl ModelKeywordRepository for InMemoryRepository {
    async fn list_enabled(&self) -> Result<Vec<ModelKeyword>> {
        Ok(self
            .keywords
            .read()
            .await
            .iter()
            .filter(|k| k.enabled)
            .cloned()
            .collect())
    }
}

impl Repositories for InMemoryRepository {
    fn channels(&self) -> &(dyn ChannelRepository + Send + Sync) {
        self
    }

    fn models(&self) -> &(dyn ModelRepository + Send + Sync) {
        self
    }

    fn check_logs(&self) -> &(dyn CheckLogRepository + Send + Sync) {
        self
    }

    fn scheduler_config(&self) -> &(dyn SchedulerConfigRepository + Send + Sync) {
        self
    }

    fn keywords(&self) -> &(dyn ModelKeywordRepository + Send + Sync) {
        self
    }
}
