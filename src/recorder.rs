//! State Recorder (C5, §4.5). One atomic unit-of-work per probe outcome.

use crate::domain::{CheckLog, CheckStatus, EndpointType, Model, ModelId};
use crate::error::Result;
use crate::probe::{ProbeOutcome, ProbeStatus};
use crate::repository::Repositories;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

pub struct StateRecorder {
    repos: Arc<dyn Repositories>,
}

impl StateRecorder {
    pub fn new(repos: Arc<dyn Repositories>) -> Self {
        Self { repos }
    }

    /// Merge `outcome` into the model row and append a `CheckLog` (§4.5
    /// steps 1-3). The set update is delegated to `ModelRepository::
    /// apply_probe_outcome`, whose contract requires it to be atomic under
    /// concurrent callers for different endpoints of the same model.
    pub async fn record(&self, model_id: &ModelId, outcome: &ProbeOutcome) -> Result<Model> {
        let success = outcome.is_success();
        let model = self
            .repos
            .models()
            .apply_probe_outcome(model_id, outcome.endpoint_type, success, outcome.latency_ms)
            .await?;

        let log = CheckLog {
            id: Uuid::new_v4().to_string(),
            model_id: model_id.clone(),
            endpoint_type: outcome.endpoint_type,
            status: if success { CheckStatus::Success } else { CheckStatus::Fail },
            latency_ms: outcome.latency_ms,
            status_code: outcome.status_code,
            response_content: outcome.response_content.clone(),
            error_msg: outcome.error_msg.clone(),
            created_at: Utc::now(),
        };
        self.repos.check_logs().append(log).await?;

        Ok(model)
    }

    /// The §4.4 step-2/4 synthetic-fail path: record without ever touching
    /// `detectedEndpoints`'s membership for the attempted endpoint beyond
    /// what a genuine `FAIL` would do.
    pub async fn record_stopped(&self, model_id: &ModelId, endpoint: EndpointType) -> Result<Model> {
        self.record(
            model_id,
            &ProbeOutcome {
                status: ProbeStatus::Fail,
                latency_ms: 0,
                status_code: None,
                endpoint_type: endpoint,
                error_msg: Some("Detection stopped by user".to_string()),
                response_content: None,
            },
        )
        .await
    }
}
