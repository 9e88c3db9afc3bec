//! Progress Bus (C6, §4.6). Publishes per-job completion events and
//! answers the polling-fallback snapshot.

use crate::coordination::{CoordinationStore, TOPIC_PROGRESS};
use crate::domain::{ChannelId, EndpointType, ModelId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub channel_id: ChannelId,
    pub model_id: ModelId,
    pub model_name: String,
    pub endpoint_type: EndpointType,
    pub status: &'static str,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub is_model_complete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DetectionSnapshot {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub is_running: bool,
    pub progress_percent: u32,
    pub testing_model_ids: Vec<ModelId>,
}

pub struct ProgressBus {
    store: Arc<dyn CoordinationStore>,
}

impl ProgressBus {
    pub fn new(store: Arc<dyn CoordinationStore>) -> Self {
        Self { store }
    }

    /// Publish one event. A publish failure is logged but must never fail
    /// the job that triggered it (§4.6, §7 CoordinationStoreError).
    pub async fn publish(&self, event: &ProgressEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize progress event");
                return;
            }
        };
        if let Err(e) = self.store.publish(TOPIC_PROGRESS, payload).await {
            tracing::warn!(error = %e, "failed to publish progress event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.store.subscribe(TOPIC_PROGRESS)
    }
}

/// `progress% = round(100 · (completed+failed) / (total+completed+failed))`
/// (§4.6 "Snapshot endpoint"). `total` here is the still-pending count
/// (waiting + active + delayed); see `queue::DetectionQueue::stats`.
pub fn progress_percent(pending_total: u64, completed: u64, failed: u64) -> u32 {
    let denom = pending_total + completed + failed;
    if denom == 0 {
        return 0;
    }
    (((completed + failed) as f64 / denom as f64) * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percent_rounds() {
        assert_eq!(progress_percent(1, 2, 1), 75);
        assert_eq!(progress_percent(0, 0, 0), 0);
        assert_eq!(progress_percent(0, 5, 5), 100);
    }
}
