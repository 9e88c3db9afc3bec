//! Job payload and state tracking for the Detection Queue (C4, §4.4).

use crate::domain::{ChannelId, EndpointType, ModelId};
use crate::probe::ProbeJob;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Delayed,
    Completed,
    Failed,
}

/// What's actually pushed through the coordination store's durable list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionJobPayload {
    pub channel_id: ChannelId,
    pub model_id: ModelId,
    pub model_name: String,
    pub base_url: String,
    pub api_key: String,
    pub proxy: Option<String>,
    pub endpoint_type: EndpointType,
}

impl From<&DetectionJobPayload> for ProbeJob {
    fn from(p: &DetectionJobPayload) -> Self {
        ProbeJob {
            channel_id: p.channel_id.clone(),
            model_id: p.model_id.clone(),
            model_name: p.model_name.clone(),
            base_url: p.base_url.clone(),
            api_key: p.api_key.clone(),
            proxy: p.proxy.clone(),
            endpoint_type: p.endpoint_type,
        }
    }
}

/// In-process bookkeeping record for a job, used by `stats`/`jobsByState`/
/// the testing-model-IDs view (§4.4). Not the durable payload itself.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: String,
    pub payload: DetectionJobPayload,
    pub state: JobState,
}
