//! Probe Executor (C1) and Endpoint Strategy (C2), §4.1-4.2.

pub mod executor;
pub mod parse;
pub mod template;

pub use executor::ProbeExecutor;

use crate::domain::{ChannelId, EndpointType, ModelId};
use serde::{Deserialize, Serialize};

/// Everything the executor needs to run one probe (§4.2 `job`).
#[derive(Debug, Clone)]
pub struct ProbeJob {
    pub channel_id: ChannelId,
    pub model_id: ModelId,
    pub model_name: String,
    /// Already-normalized base URL (`domain::normalize_base_url`).
    pub base_url: String,
    pub api_key: String,
    pub proxy: Option<String>,
    pub endpoint_type: EndpointType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeStatus {
    Success,
    Fail,
}

/// Outcome of a probe (§4.2 `result`). Never an `Err` — the probe boundary
/// always produces a value (§7 "Propagation policy").
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub status: ProbeStatus,
    pub latency_ms: u64,
    pub status_code: Option<u16>,
    pub endpoint_type: EndpointType,
    pub error_msg: Option<String>,
    pub response_content: Option<String>,
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ProbeStatus::Success
    }
}
