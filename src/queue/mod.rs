//! Detection Queue + Worker Pool (C4, §4.4).

pub mod config_cache;
pub mod job;
pub mod worker;

pub use config_cache::{ConfigCache, WorkerConfig};
pub use job::{DetectionJobPayload, JobRecord, JobState};
pub use worker::WorkerPool;

use crate::coordination::{CoordinationStore, KEY_STOPPED_FLAG, QUEUE_DETECTION};
use crate::domain::ModelId;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub total: u64,
}

/// Durable FIFO (§4.4 "Queue contract") layered on the coordination store's
/// list primitives, plus in-process bookkeeping for `stats`/`jobsByState`/
/// the testing-model-IDs view — a plain Redis list has no notion of job
/// state, so that view has to live somewhere, and in-process is cheapest
/// for a single-process deployment (§1 Non-goals: "does not run distributed
/// across multiple process instances").
pub struct DetectionQueue {
    store: Arc<dyn CoordinationStore>,
    records: RwLock<HashMap<String, JobRecord>>,
}

impl DetectionQueue {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            store,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// §4.4 "Bulk enqueue": atomic from the caller's view, returns job ids
    /// in order.
    pub async fn enqueue_bulk(&self, jobs: Vec<DetectionJobPayload>) -> Result<Vec<String>> {
        let payloads: Vec<String> = jobs
            .iter()
            .map(|j| serde_json::to_string(j).expect("DetectionJobPayload always serializes"))
            .collect();
        let ids = self.store.list_push_bulk(QUEUE_DETECTION, payloads).await?;

        let mut records = self.records.write().await;
        for (id, payload) in ids.iter().zip(jobs.into_iter()) {
            records.insert(
                id.clone(),
                JobRecord {
                    id: id.clone(),
                    payload,
                    state: JobState::Waiting,
                },
            );
        }
        Ok(ids)
    }

    /// Block-pop is realized as a poll from the worker loop (§4.4 step 1);
    /// this call itself is non-blocking and returns `None` if empty.
    pub async fn pop(&self) -> Result<Option<JobRecord>> {
        let Some((id, _payload)) = self.store.list_pop(QUEUE_DETECTION).await? else {
            return Ok(None);
        };
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&id) {
            record.state = JobState::Active;
            Ok(Some(record.clone()))
        } else {
            Ok(None)
        }
    }

    pub async fn mark_completed(&self, id: &str) {
        if let Some(record) = self.records.write().await.get_mut(id) {
            record.state = JobState::Completed;
        }
    }

    pub async fn mark_failed(&self, id: &str) {
        if let Some(record) = self.records.write().await.get_mut(id) {
            record.state = JobState::Failed;
        }
    }

    pub async fn stats(&self) -> QueueStats {
        let records = self.records.read().await;
        let mut stats = QueueStats::default();
        for record in records.values() {
            match record.state {
                JobState::Waiting => stats.waiting += 1,
                JobState::Active => stats.active += 1,
                JobState::Delayed => {}
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        stats.total = stats.waiting + stats.active + stats.completed + stats.failed;
        stats
    }

    pub async fn jobs_by_state(&self, state: JobState, offset: usize, limit: usize) -> Vec<JobRecord> {
        let records = self.records.read().await;
        let mut matching: Vec<JobRecord> = records.values().filter(|r| r.state == state).cloned().collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        matching.into_iter().skip(offset).take(limit).collect()
    }

    /// §4.4 "drain(): remove waiting, cancel active". In-flight HTTP
    /// requests are not aborted (§5 "Cancellation") — active records are
    /// left alone and will finalize normally.
    pub async fn drain(&self) -> Result<()> {
        self.store.list_clear(QUEUE_DETECTION).await?;
        let mut records = self.records.write().await;
        for record in records.values_mut() {
            if record.state == JobState::Waiting {
                record.state = JobState::Failed;
            }
        }
        Ok(())
    }

    /// Union of `modelId`s across waiting/active/delayed jobs (§4.4
    /// "Testing-model-IDs set").
    pub async fn testing_model_ids(&self) -> Vec<ModelId> {
        let records = self.records.read().await;
        let mut ids: Vec<ModelId> = records
            .values()
            .filter(|r| matches!(r.state, JobState::Waiting | JobState::Active | JobState::Delayed))
            .map(|r| r.payload.model_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// §4.6 "isModelComplete": true iff no remaining waiting/active/delayed
    /// job for this model, excluding `excluding_job_id` (the job currently
    /// being completed — its record transitions out of Active just before
    /// this check, but the caller passes its id defensively).
    pub async fn is_model_complete(&self, model_id: &ModelId, excluding_job_id: &str) -> bool {
        let records = self.records.read().await;
        !records.values().any(|r| {
            r.id != excluding_job_id
                && r.payload.model_id == *model_id
                && matches!(r.state, JobState::Waiting | JobState::Active | JobState::Delayed)
        })
    }

    pub async fn is_stopped(&self) -> Result<bool> {
        self.store.get_flag(KEY_STOPPED_FLAG).await
    }

    pub async fn set_stopped(&self) -> Result<()> {
        self.store.set_flag(KEY_STOPPED_FLAG).await
    }

    pub async fn clear_stopped(&self) -> Result<()> {
        self.store.clear_flag(KEY_STOPPED_FLAG).await
    }
}
