//! Repository interfaces (§1 "treated only as external collaborators",
//! §9 "Coordination store abstraction" applied to the relational side too).
//!
//! The persistence layer itself is out of scope; these traits are the only
//! contract the core needs from it, so tests can substitute an in-memory
//! implementation (`memory::InMemoryRepository`) the way `MemoryStore` in
//! the teacher repo is substituted by `LegacyMemoryAdapter`.

pub mod memory;

use crate::domain::{
    Channel, ChannelId, ChannelKey, ChannelKeyId, CheckLog, KeyValidation, Model, ModelId,
    ModelKeyword, SchedulerConfig,
};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get(&self, id: &ChannelId) -> Result<Option<Channel>>;
    async fn list_enabled(&self) -> Result<Vec<Channel>>;
    async fn list_all(&self) -> Result<Vec<Channel>>;
    async fn keys_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<ChannelKey>>;
    async fn get_key(&self, key_id: &ChannelKeyId) -> Result<Option<ChannelKey>>;
    async fn mark_key_validated(&self, key_id: &ChannelKeyId, status: KeyValidation) -> Result<()>;
}

#[async_trait]
pub trait ModelRepository: Send + Sync {
    async fn get(&self, id: &ModelId) -> Result<Option<Model>>;
    async fn list_for_channel(&self, channel_id: &ChannelId) -> Result<Vec<Model>>;
    async fn list_all(&self) -> Result<Vec<Model>>;
    async fn insert(&self, model: Model) -> Result<()>;
    async fn delete(&self, id: &ModelId) -> Result<()>;

    /// Atomic merge of a probe outcome into `model.detectedEndpoints` plus
    /// the scalar fields (§4.5). Must be safe under concurrent callers for
    /// different endpoints of the *same* model — see §4.5 and §9's
    /// "Set-valued column under concurrent writers" design note. The
    /// recommended shape (§9 option a) is a side table keyed by
    /// `(modelId, endpointType)`; whichever shape the implementation picks,
    /// it must not be a bare read-modify-write without a lock.
    async fn apply_probe_outcome(
        &self,
        model_id: &ModelId,
        endpoint: crate::domain::EndpointType,
        success: bool,
        latency_ms: u64,
    ) -> Result<Model>;

    async fn reset_to_unknown(&self, model_id: &ModelId) -> Result<()>;
}

#[async_trait]
pub trait CheckLogRepository: Send + Sync {
    async fn append(&self, log: CheckLog) -> Result<()>;
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
    async fn latest_for(
        &self,
        model_id: &ModelId,
        endpoint: crate::domain::EndpointType,
    ) -> Result<Option<CheckLog>>;
}

#[async_trait]
pub trait SchedulerConfigRepository: Send + Sync {
    async fn load(&self) -> Result<Option<SchedulerConfig>>;
    async fn save(&self, config: SchedulerConfig) -> Result<()>;
}

#[async_trait]
pub trait ModelKeywordRepository: Send + Sync {
    async fn list_enabled(&self) -> Result<Vec<ModelKeyword>>;
}

/// Bundle of every repository the core needs, so components can take a
/// single `Arc<dyn Repositories>` rather than five separate parameters.
pub trait Repositories: Send + Sync {
    fn channels(&self) -> &(dyn ChannelRepository + Send + Sync);
    fn models(&self) -> &(dyn ModelRepository + Send + Sync);
    fn check_logs(&self) -> &(dyn CheckLogRepository + Send + Sync);
    fn scheduler_config(&self) -> &(dyn SchedulerConfigRepository + Send + Sync);
    fn keywords(&self) -> &(dyn ModelKeywordRepository + Send + Sync);
}
