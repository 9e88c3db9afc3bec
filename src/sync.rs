//! Model Sync Pipeline (C7, §4.7).

use crate::domain::{Channel, ChannelId, ChannelKeyId, KeyMode, KeyValidation, Model};
use crate::error::{DetectError, Result};
use crate::repository::Repositories;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const DISCOVER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub added: u64,
    pub removed: u64,
    pub total: u64,
}

/// One row of the reconciliation target set: a model name plus, under
/// `multi` key mode, the key it was discovered/selected against.
#[derive(Debug, Clone)]
struct TargetModel {
    model_name: String,
    channel_key_id: Option<ChannelKeyId>,
}

impl TargetModel {
    fn signature(&self) -> String {
        Model::signature(&self.model_name, self.channel_key_id.as_deref())
    }
}

#[derive(Deserialize)]
struct ModelsListResponse {
    data: Vec<ModelsListEntry>,
}

#[derive(Deserialize)]
struct ModelsListEntry {
    id: String,
}

pub struct ModelSyncPipeline {
    repos: Arc<dyn Repositories>,
    http: Client,
}

impl ModelSyncPipeline {
    pub fn new(repos: Arc<dyn Repositories>) -> Self {
        Self {
            repos,
            http: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("reqwest client configuration is valid"),
        }
    }

    /// §4.7 `syncChannelModels`.
    pub async fn sync_channel_models(
        &self,
        channel_id: &ChannelId,
        selected_models: Option<Vec<String>>,
        selected_model_pairs: Option<Vec<(String, Option<ChannelKeyId>)>>,
    ) -> Result<SyncResult> {
        let channel = self
            .repos
            .channels()
            .get(channel_id)
            .await?
            .ok_or_else(|| DetectError::Validation(format!("channel {channel_id} not found")))?;

        let targets = if selected_models.is_some() || selected_model_pairs.is_some() {
            self.user_selected_targets(&channel, selected_models, selected_model_pairs)
        } else {
            self.discover_targets(&channel).await?
        };

        let filtered = self.apply_keyword_filters(targets).await?;
        self.reconcile(channel_id, filtered).await
    }

    /// (a) User-selected mode (§4.7): reconcile directly, no upstream fetch.
    fn user_selected_targets(
        &self,
        channel: &Channel,
        selected_models: Option<Vec<String>>,
        selected_model_pairs: Option<Vec<(String, Option<ChannelKeyId>)>>,
    ) -> Vec<TargetModel> {
        if channel.key_mode == KeyMode::Multi {
            if let Some(pairs) = selected_model_pairs {
                return pairs
                    .into_iter()
                    .map(|(model_name, channel_key_id)| TargetModel { model_name, channel_key_id })
                    .collect();
            }
        }
        selected_models
            .unwrap_or_default()
            .into_iter()
            .map(|model_name| TargetModel { model_name, channel_key_id: None })
            .collect()
    }

    /// (b) Discover mode (§4.7 steps 1-5).
    async fn discover_targets(&self, channel: &Channel) -> Result<Vec<TargetModel>> {
        let keys = self.distinct_keys(channel).await?;
        let base_url = channel.normalized_base_url();

        let fetches = keys.iter().map(|(key_id, api_key)| {
            let base_url = base_url.clone();
            let api_key = api_key.clone();
            async move { fetch_models(&self.http, &base_url, &api_key).await }
        });
        let results = join_all(fetches).await;

        let mut per_key_models: Vec<(Option<ChannelKeyId>, Vec<String>)> = Vec::new();
        let mut first_error: Option<String> = None;
        let mut any_success = false;

        for ((key_id, _api_key), result) in keys.iter().zip(results.into_iter()) {
            match result {
                Ok(models) => {
                    any_success = true;
                    if let Some(key_id) = key_id {
                        self.repos
                            .channels()
                            .mark_key_validated(key_id, KeyValidation::Valid)
                            .await?;
                    }
                    per_key_models.push((key_id.clone(), models));
                }
                Err(e) => {
                    if let Some(key_id) = key_id {
                        self.repos
                            .channels()
                            .mark_key_validated(key_id, KeyValidation::Invalid)
                            .await?;
                    }
                    first_error.get_or_insert(e);
                }
            }
        }

        if !any_success {
            return Err(DetectError::SyncUpstreamError(
                first_error.unwrap_or_else(|| "no keys configured".to_string()),
            ));
        }

        Ok(merge_discovered(channel.key_mode, per_key_models))
    }

    async fn distinct_keys(&self, channel: &Channel) -> Result<Vec<(Option<ChannelKeyId>, String)>> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        if seen.insert(channel.api_key.clone()) {
            keys.push((None, channel.api_key.clone()));
        }
        for extra in self.repos.channels().keys_for_channel(&channel.id).await? {
            if seen.insert(extra.api_key.clone()) {
                keys.push((Some(extra.id), extra.api_key));
            }
        }
        Ok(keys)
    }

    /// §4.7 step 6: case-insensitive substring OR over enabled keywords.
    /// No enabled keywords means no filtering.
    async fn apply_keyword_filters(&self, targets: Vec<TargetModel>) -> Result<Vec<TargetModel>> {
        let keywords = self.repos.keywords().list_enabled().await?;
        if keywords.is_empty() {
            return Ok(targets);
        }
        let lowered: Vec<String> = keywords.iter().map(|k| k.keyword.to_lowercase()).collect();
        Ok(targets
            .into_iter()
            .filter(|t| {
                let name = t.model_name.to_lowercase();
                lowered.iter().any(|kw| name.contains(kw.as_str()))
            })
            .collect())
    }

    /// §4.7 step 7: delete rows whose signature left the target set, insert
    /// rows whose signature is new, never touch untouched rows.
    async fn reconcile(&self, channel_id: &ChannelId, targets: Vec<TargetModel>) -> Result<SyncResult> {
        let existing = self.repos.models().list_for_channel(channel_id).await?;
        let target_signatures: HashSet<String> = targets.iter().map(TargetModel::signature).collect();
        let existing_signatures: HashSet<String> = existing
            .iter()
            .map(|m| Model::signature(&m.model_name, m.channel_key_id.as_deref()))
            .collect();

        let mut removed = 0u64;
        for model in &existing {
            let sig = Model::signature(&model.model_name, model.channel_key_id.as_deref());
            if !target_signatures.contains(&sig) {
                self.repos.models().delete(&model.id).await?;
                removed += 1;
            }
        }

        let mut added = 0u64;
        for target in &targets {
            if !existing_signatures.contains(&target.signature()) {
                self.repos
                    .models()
                    .insert(Model {
                        id: Uuid::new_v4().to_string(),
                        channel_id: channel_id.clone(),
                        model_name: target.model_name.clone(),
                        channel_key_id: target.channel_key_id.clone(),
                        detected_endpoints: Default::default(),
                        last_status: false,
                        last_latency_ms: None,
                        last_checked_at: None,
                    })
                    .await?;
                added += 1;
            }
        }

        Ok(SyncResult {
            added,
            removed,
            total: target_signatures.len() as u64,
        })
    }

    /// §4.7 "Guest-upload validation": run discover mode against a single
    /// ad-hoc (name, baseUrl, key) triple with no channel row at all.
    pub async fn validate_guest_upload(&self, base_url: &str, api_key: &str) -> Result<Vec<String>> {
        let normalized = crate::domain::normalize_base_url(base_url);
        let models = fetch_models(&self.http, &normalized, api_key)
            .await
            .map_err(DetectError::SyncUpstreamError)?;
        if models.is_empty() {
            return Err(DetectError::ModelFetchFailed);
        }
        Ok(models)
    }
}

/// §4.7 step 4 merge rule.
fn merge_discovered(key_mode: KeyMode, per_key_models: Vec<(Option<ChannelKeyId>, Vec<String>)>) -> Vec<TargetModel> {
    match key_mode {
        KeyMode::Single => {
            let mut seen = HashSet::new();
            let mut out = Vec::new();
            for (_key_id, models) in per_key_models {
                for model_name in models {
                    if seen.insert(model_name.clone()) {
                        out.push(TargetModel { model_name, channel_key_id: None });
                    }
                }
            }
            out
        }
        KeyMode::Multi => per_key_models
            .into_iter()
            .flat_map(|(key_id, models)| {
                models
                    .into_iter()
                    .map(move |model_name| TargetModel { model_name, channel_key_id: key_id.clone() })
            })
            .collect(),
    }
}

async fn fetch_models(client: &Client, base_url: &str, api_key: &str) -> std::result::Result<Vec<String>, String> {
    let url = format!("{base_url}/v1/models");
    let response = tokio::time::timeout(
        DISCOVER_TIMEOUT,
        client.get(&url).header("Authorization", format!("Bearer {api_key}")).send(),
    )
    .await
    .map_err(|_| "timeout fetching /v1/models".to_string())?
    .map_err(|e| describe_transport_error(&e))?;

    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status().as_u16()));
    }

    let parsed: ModelsListResponse = response.json().await.map_err(|e| format!("unparseable response: {e}"))?;
    Ok(parsed.data.into_iter().map(|e| e.id).collect())
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timeout".to_string()
    } else if e.is_connect() {
        format!("connection refused or DNS failure: {e}")
    } else {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_mode_first_key_wins() {
        let merged = merge_discovered(
            KeyMode::Single,
            vec![
                (Some("k1".to_string()), vec!["gpt-4o".to_string()]),
                (Some("k2".to_string()), vec!["gpt-4o".to_string(), "gpt-4o-mini".to_string()]),
            ],
        );
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|t| t.channel_key_id.is_none()));
    }

    #[test]
    fn multi_mode_one_row_per_key_model_pair() {
        let merged = merge_discovered(
            KeyMode::Multi,
            vec![
                (Some("k1".to_string()), vec!["gpt-4o".to_string()]),
                (Some("k2".to_string()), vec!["gpt-4o".to_string()]),
            ],
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].model_name, "gpt-4o");
        assert_eq!(merged[1].model_name, "gpt-4o");
        assert_ne!(merged[0].channel_key_id, merged[1].channel_key_id);
    }
}
