//! Entities persisted in the external store (§3). Semantic types only —
//! the actual persistence is someone else's problem (`repository`).

mod endpoint;

pub use endpoint::{classify_model, EndpointType};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type ChannelId = String;
pub type ChannelKeyId = String;
pub type ModelId = String;
pub type CheckLogId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    Single,
    Multi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStrategy {
    RoundRobin,
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    /// Trailing slash always stripped on construction (§3).
    pub base_url: String,
    pub api_key: String,
    pub proxy_url: Option<String>,
    pub enabled: bool,
    pub sort_order: i32,
    pub key_mode: KeyMode,
    pub route_strategy: RouteStrategy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    /// Normalizes a raw base URL the way §4.1 requires for probe targets:
    /// strip a trailing `/`, then strip a trailing `/v1`.
    pub fn normalized_base_url(&self) -> String {
        normalize_base_url(&self.base_url)
    }
}

pub fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim_end_matches('/');
    trimmed.strip_suffix("/v1").unwrap_or(trimmed).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyValidation {
    Unknown,
    Valid,
    Invalid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelKey {
    pub id: ChannelKeyId,
    pub channel_id: ChannelId,
    pub api_key: String,
    pub display_name: Option<String>,
    pub last_validated: KeyValidation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: ModelId,
    pub channel_id: ChannelId,
    pub model_name: String,
    pub channel_key_id: Option<ChannelKeyId>,
    pub detected_endpoints: BTreeSet<EndpointType>,
    pub last_status: bool,
    pub last_latency_ms: Option<u64>,
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl Model {
    /// The identity used for reconciliation under `multi` key mode (§4.7 "Signature").
    pub fn signature(model_name: &str, channel_key_id: Option<&str>) -> String {
        format!("{model_name}\0{}", channel_key_id.unwrap_or("__main__"))
    }

    pub fn reset_to_unknown(&mut self) {
        self.detected_endpoints.clear();
        self.last_status = false;
        self.last_latency_ms = None;
        self.last_checked_at = None;
    }

    /// Apply a probe outcome to this model's derived fields (§4.5 steps 1-2).
    /// Returns true if `detected_endpoints` actually changed.
    pub fn apply_outcome(&mut self, endpoint: EndpointType, success: bool, latency_ms: u64) -> bool {
        let changed = if success {
            self.detected_endpoints.insert(endpoint)
        } else {
            self.detected_endpoints.remove(&endpoint)
        };
        self.last_status = !self.detected_endpoints.is_empty();
        self.last_latency_ms = Some(latency_ms);
        self.last_checked_at = Some(Utc::now());
        changed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Success,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckLog {
    pub id: CheckLogId,
    pub model_id: ModelId,
    pub endpoint_type: EndpointType,
    pub status: CheckStatus,
    pub latency_ms: u64,
    pub status_code: Option<u16>,
    pub response_content: Option<String>,
    pub error_msg: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Truncate to at most `n` chars (not bytes — inputs are already-decoded text).
pub fn truncate_chars(s: &str, n: usize) -> String {
    if s.chars().count() <= n {
        s.to_string()
    } else {
        s.chars().take(n).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub cron_schedule: String,
    pub timezone: String,
    pub channel_concurrency: u32,
    pub max_global_concurrency: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub detect_all_channels: bool,
    pub selected_channel_ids: Option<Vec<ChannelId>>,
    pub selected_model_ids: Option<std::collections::HashMap<ChannelId, Vec<ModelId>>>,
}

impl SchedulerConfig {
    /// Clamp to the invariants in §3: `maxDelayMs ≥ minDelayMs ≥ 0`; concurrency ≥ 1.
    pub fn normalized(mut self) -> Self {
        self.channel_concurrency = self.channel_concurrency.max(1);
        self.max_global_concurrency = self.max_global_concurrency.max(1);
        self.max_delay_ms = self.max_delay_ms.max(self.min_delay_ms);
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron_schedule: "0 */6 * * *".to_string(),
            timezone: "UTC".to_string(),
            channel_concurrency: 2,
            max_global_concurrency: 10,
            min_delay_ms: 3_000,
            max_delay_ms: 5_000,
            detect_all_channels: true,
            selected_channel_ids: None,
            selected_model_ids: None,
        }
        .normalized()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelKeyword {
    pub id: String,
    pub keyword: String,
    pub enabled: bool,
}
