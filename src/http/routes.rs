//! The HTTP surface (§6): detection control, live progress, model sync,
//! and scheduler configuration.

use super::dto::{
    CleanupInfo, DetectSnapshotResponse, DetectionScheduleInfo, DetectionScope, SchedulerStatusResponse, SyncChannelRequest, SyncChannelResponse,
    TriggerDetectionRequest, TriggerDetectionResponse,
};
use crate::domain::SchedulerConfig;
use crate::error::{DetectError, Result};
use crate::progress::{progress_percent, ProgressBus};
use crate::queue::DetectionQueue;
use crate::repository::Repositories;
use crate::scheduler::{detect_legacy_interval, parse_schedule, Scheduler};
use crate::sync::ModelSyncPipeline;
use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post, put};
use axum::{middleware, Json, Router};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repos: Arc<dyn Repositories>,
    pub queue: Arc<DetectionQueue>,
    pub sync: Arc<ModelSyncPipeline>,
    pub service: Arc<crate::service::DetectionService>,
    pub progress: Arc<ProgressBus>,
    pub scheduler: Arc<Scheduler>,
    pub cleanup_schedule: String,
    pub log_retention_days: i64,
    pub auth_token: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/detect", post(trigger_detection).delete(stop_detection).get(detect_snapshot))
        .route("/channel/{id}/sync", post(sync_channel))
        .route("/scheduler/config", get(get_scheduler_config).put(put_scheduler_config))
        .route_layer(middleware::from_fn_with_state(state.clone(), super::auth::require_bearer_token));

    Router::new()
        .merge(protected)
        .route("/sse/progress", get(sse_progress))
        .route("/scheduler", get(scheduler_status))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

async fn trigger_detection(State(state): State<AppState>, Json(req): Json<TriggerDetectionRequest>) -> Result<Json<TriggerDetectionResponse>> {
    let job_ids = match req.scope {
        DetectionScope::Full => state.service.trigger_full_detection(req.sync_first).await?,
        DetectionScope::Channel => {
            let channel_id = req.channel_id.ok_or_else(|| DetectError::Validation("channelId is required for scope=channel".to_string()))?;
            state
                .service
                .trigger_channel_detection(&channel_id, req.model_ids.as_deref())
                .await?
        }
        DetectionScope::Model => {
            let model_id = req.model_id.ok_or_else(|| DetectError::Validation("modelId is required for scope=model".to_string()))?;
            state.service.trigger_model_detection(&model_id).await?
        }
    };
    Ok(Json(TriggerDetectionResponse { job_ids }))
}

/// §5 "Cancellation": sets the stopped flag and drains waiting jobs;
/// active jobs finalize normally and observe the flag at their own
/// checkpoints.
async fn stop_detection(State(state): State<AppState>) -> Result<impl IntoResponse> {
    state.queue.set_stopped().await?;
    state.queue.drain().await?;
    Ok(Json(serde_json::json!({"stopped": true})))
}

async fn detect_snapshot(State(state): State<AppState>) -> Result<Json<DetectSnapshotResponse>> {
    let stats = state.queue.stats().await;
    let pending_total = stats.waiting + stats.active;
    let percent = progress_percent(pending_total, stats.completed, stats.failed);
    let is_stopped = state.queue.is_stopped().await?;
    Ok(Json(DetectSnapshotResponse {
        waiting: stats.waiting,
        active: stats.active,
        completed: stats.completed,
        failed: stats.failed,
        is_running: pending_total > 0 && !is_stopped,
        progress_percent: percent,
        testing_model_ids: state.queue.testing_model_ids().await,
    }))
}

async fn sync_channel(State(state): State<AppState>, Path(channel_id): Path<String>, Json(req): Json<SyncChannelRequest>) -> Result<Json<SyncChannelResponse>> {
    let pairs = req.selected_model_pairs.map(|pairs| pairs.into_iter().collect::<Vec<_>>());
    let result = state.sync.sync_channel_models(&channel_id, req.selected_models, pairs).await?;
    Ok(Json(SyncChannelResponse {
        added: result.added,
        removed: result.removed,
        total: result.total,
    }))
}

async fn get_scheduler_config(State(state): State<AppState>) -> Result<Json<SchedulerConfig>> {
    let cfg = state.repos.scheduler_config().load().await?.unwrap_or_default();
    Ok(Json(cfg))
}

async fn put_scheduler_config(State(state): State<AppState>, Json(cfg): Json<SchedulerConfig>) -> Result<Json<SchedulerConfig>> {
    let normalized = cfg.normalized();
    parse_schedule(&normalized.cron_schedule).map_err(DetectError::InvalidSchedule)?;
    state.repos.scheduler_config().save(normalized.clone()).await?;
    Ok(Json(normalized))
}

/// `GET /scheduler` (§11 supplemented): read-only status including the
/// co-hosted cleanup sweeper, whose schedule/retention live outside
/// `SchedulerConfig` since they are process-wide env settings, not a
/// per-deployment tunable stored alongside the detection schedule.
async fn scheduler_status(State(state): State<AppState>) -> Result<Json<SchedulerStatusResponse>> {
    let cfg = state.repos.scheduler_config().load().await?.unwrap_or_default();
    let next_run = parse_schedule(&cfg.cron_schedule)
        .ok()
        .and_then(|s| s.next_fire_after(chrono::Utc::now()));

    let display = detect_legacy_interval(&cfg.cron_schedule);
    let schedule_display = display
        .map(|d| format!("every {} {}(s) [{}]", d.every, d.unit, cfg.cron_schedule))
        .unwrap_or_else(|| cfg.cron_schedule.clone());

    Ok(Json(SchedulerStatusResponse {
        detection: DetectionScheduleInfo {
            enabled: state.scheduler.is_enabled().await,
            running: cfg.enabled,
            schedule: schedule_display,
            next_run,
        },
        config: cfg,
        cleanup: CleanupInfo {
            schedule: state.cleanup_schedule.clone(),
            retention_days: state.log_retention_days,
        },
    }))
}

/// §4.6 "Live push": SSE fallback for clients that cannot poll, backed by
/// the same coordination-store pub/sub topic the worker pool publishes to.
async fn sse_progress(State(state): State<AppState>) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.progress.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok(Event::default().data(payload))),
        Err(_lagged) => None,
    });
    Sse::new(stream).keep_alive(axum::response::sse::KeepAlive::new().interval(Duration::from_secs(15)))
}
