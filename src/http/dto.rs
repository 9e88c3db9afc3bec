//! Request/response DTOs and the `{error, code}` envelope (§6).

use crate::domain::{ChannelId, ModelId, SchedulerConfig};
use crate::error::DetectError;
use axum::response::{IntoResponse, Response};
use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub code: String,
}

impl IntoResponse for DetectError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorEnvelope {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDetectionRequest {
    pub scope: DetectionScope,
    #[serde(default)]
    pub channel_id: Option<ChannelId>,
    #[serde(default)]
    pub model_id: Option<ModelId>,
    #[serde(default)]
    pub model_ids: Option<Vec<ModelId>>,
    #[serde(default)]
    pub sync_first: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionScope {
    Full,
    Channel,
    Model,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDetectionResponse {
    pub job_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncChannelRequest {
    #[serde(default)]
    pub selected_models: Option<Vec<String>>,
    #[serde(default)]
    pub selected_model_pairs: Option<Vec<(String, Option<String>)>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncChannelResponse {
    pub added: u64,
    pub removed: u64,
    pub total: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectSnapshotResponse {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub is_running: bool,
    pub progress_percent: u32,
    pub testing_model_ids: Vec<ModelId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatusResponse {
    pub detection: DetectionScheduleInfo,
    pub config: SchedulerConfig,
    pub cleanup: CleanupInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionScheduleInfo {
    pub enabled: bool,
    pub running: bool,
    pub schedule: String,
    pub next_run: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupInfo {
    pub schedule: String,
    pub retention_days: i64,
}
