//! Detection Service (C8, §4.8). Public facade composing C7 → C4.

use crate::domain::{classify_model, ChannelId, Model, ModelId};
use crate::error::{DetectError, Result};
use crate::queue::{DetectionJobPayload, DetectionQueue};
use crate::repository::Repositories;
use crate::sync::ModelSyncPipeline;
use std::collections::HashMap;
use std::sync::Arc;

pub struct DetectionService {
    repos: Arc<dyn Repositories>,
    queue: Arc<DetectionQueue>,
    sync: Arc<ModelSyncPipeline>,
    default_proxy: Option<String>,
}

impl DetectionService {
    pub fn new(repos: Arc<dyn Repositories>, queue: Arc<DetectionQueue>, sync: Arc<ModelSyncPipeline>, default_proxy: Option<String>) -> Self {
        Self { repos, queue, sync, default_proxy }
    }

    /// `triggerFullDetection(syncFirst)` — all enabled channels, all models.
    pub async fn trigger_full_detection(&self, sync_first: bool) -> Result<Vec<String>> {
        self.queue.clear_stopped().await?;
        let channels = self.repos.channels().list_enabled().await?;

        if sync_first {
            for channel in &channels {
                self.sync.sync_channel_models(&channel.id, None, None).await?;
            }
        }

        let mut all_ids = Vec::new();
        for channel in &channels {
            let models = self.repos.models().list_for_channel(&channel.id).await?;
            let ids = self.enqueue_for_models(&channel.id, models).await?;
            all_ids.extend(ids);
        }
        Ok(all_ids)
    }

    /// `triggerChannelDetection(channelId, modelIds?)`.
    pub async fn trigger_channel_detection(&self, channel_id: &ChannelId, model_ids: Option<&[ModelId]>) -> Result<Vec<String>> {
        self.queue.clear_stopped().await?;
        let mut models = self.repos.models().list_for_channel(channel_id).await?;
        if let Some(ids) = model_ids {
            let wanted: std::collections::HashSet<&ModelId> = ids.iter().collect();
            models.retain(|m| wanted.contains(&m.id));
        }
        self.enqueue_for_models(channel_id, models).await
    }

    /// `triggerModelDetection(modelId)` — one model, all its endpoints.
    pub async fn trigger_model_detection(&self, model_id: &ModelId) -> Result<Vec<String>> {
        self.queue.clear_stopped().await?;
        let model = self
            .repos
            .models()
            .get(model_id)
            .await?
            .ok_or_else(|| DetectError::Validation(format!("model {model_id} not found")))?;
        let channel_id = model.channel_id.clone();
        self.enqueue_for_models(&channel_id, vec![model]).await
    }

    /// `triggerSelectiveDetection(channelIds?, modelIdsByChannel?)` —
    /// scheduler-driven; `channelIds==None` delegates to full detection.
    pub async fn trigger_selective_detection(
        &self,
        channel_ids: Option<&[ChannelId]>,
        model_ids_by_channel: Option<&HashMap<ChannelId, Vec<ModelId>>>,
    ) -> Result<Vec<String>> {
        let Some(channel_ids) = channel_ids else {
            return self.trigger_full_detection(true).await;
        };

        self.queue.clear_stopped().await?;
        for channel_id in channel_ids {
            self.sync.sync_channel_models(channel_id, None, None).await?;
        }

        let mut all_ids = Vec::new();
        for channel_id in channel_ids {
            let mut models = self.repos.models().list_for_channel(channel_id).await?;
            if let Some(by_channel) = model_ids_by_channel {
                if let Some(wanted_ids) = by_channel.get(channel_id) {
                    let wanted: std::collections::HashSet<&ModelId> = wanted_ids.iter().collect();
                    models.retain(|m| wanted.contains(&m.id));
                }
            }
            let ids = self.enqueue_for_models(channel_id, models).await?;
            all_ids.extend(ids);
        }
        Ok(all_ids)
    }

    async fn enqueue_for_models(&self, channel_id: &ChannelId, models: Vec<Model>) -> Result<Vec<String>> {
        let channel = self
            .repos
            .channels()
            .get(channel_id)
            .await?
            .ok_or_else(|| DetectError::Validation(format!("channel {channel_id} not found")))?;

        // Resolve the effective API key per model, batched per channel (§4.8).
        let mut key_cache: HashMap<String, String> = HashMap::new();
        let mut payloads = Vec::new();

        for model in models {
            self.repos.models().reset_to_unknown(&model.id).await?;

            let api_key = if let Some(key_id) = &model.channel_key_id {
                if let Some(cached) = key_cache.get(key_id) {
                    cached.clone()
                } else {
                    let key = self
                        .repos
                        .channels()
                        .get_key(key_id)
                        .await?
                        .ok_or_else(|| DetectError::Validation(format!("channel key {key_id} not found")))?;
                    key_cache.insert(key_id.clone(), key.api_key.clone());
                    key.api_key
                }
            } else {
                channel.api_key.clone()
            };

            let base_url = channel.normalized_base_url();
            for endpoint_type in classify_model(&model.model_name) {
                payloads.push(DetectionJobPayload {
                    channel_id: channel_id.clone(),
                    model_id: model.id.clone(),
                    model_name: model.model_name.clone(),
                    base_url: base_url.clone(),
                    api_key: api_key.clone(),
                    proxy: channel.proxy_url.clone().or_else(|| self.default_proxy.clone()),
                    endpoint_type,
                });
            }
        }

        self.queue.enqueue_bulk(payloads).await
    }
}
