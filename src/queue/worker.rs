//! Worker pool (§4.4 "Worker pool", §9 "Worker runtime"). A fixed number
//! of concurrent workers, each running the exact 9-step loop.

use super::{DetectionQueue, WorkerConfig};
use crate::gate::{ConcurrencyGate, GateConfig};
use crate::probe::ProbeExecutor;
use crate::progress::{ProgressBus, ProgressEvent};
use crate::queue::ConfigCache;
use crate::recorder::StateRecorder;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct WorkerPool {
    queue: Arc<DetectionQueue>,
    gate: Arc<ConcurrencyGate>,
    config_cache: Arc<ConfigCache>,
    executor: Arc<ProbeExecutor>,
    recorder: Arc<StateRecorder>,
    progress: Arc<ProgressBus>,
    concurrency: usize,
    shutdown: CancellationToken,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<DetectionQueue>,
        gate: Arc<ConcurrencyGate>,
        config_cache: Arc<ConfigCache>,
        executor: Arc<ProbeExecutor>,
        recorder: Arc<StateRecorder>,
        progress: Arc<ProgressBus>,
        concurrency: usize,
    ) -> Self {
        Self {
            queue,
            gate,
            config_cache,
            executor,
            recorder,
            progress,
            concurrency,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn `concurrency` worker loops, each polling the queue independently.
    pub fn spawn(self: Arc<Self>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.concurrency)
            .map(|worker_id| {
                let pool = self.clone();
                tokio::spawn(async move { pool.run_loop(worker_id).await })
            })
            .collect()
    }

    #[tracing::instrument(name = "worker_loop", skip(self), fields(worker_id))]
    async fn run_loop(&self, worker_id: usize) {
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }

            // Step 1: block-pop one job (realized as a poll; empty queue backs off).
            let record = match self.queue.pop().await {
                Ok(Some(r)) => r,
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_millis(250)) => continue,
                        _ = self.shutdown.cancelled() => return,
                    }
                }
                Err(e) => {
                    tracing::warn!(worker_id, error = %e, "queue pop failed");
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    continue;
                }
            };

            self.process_one(record).await;
        }
    }

    async fn process_one(&self, record: crate::queue::JobRecord) {
        let job_id = record.id.clone();
        let payload = record.payload;
        let model_id = payload.model_id.clone();
        let endpoint_type = payload.endpoint_type;

        // Step 2: stopped-flag check before acquiring slots — no probe, no semaphores.
        match self.queue.is_stopped().await {
            Ok(true) => {
                self.finalize_stopped(&job_id, &model_id, endpoint_type).await;
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "stopped-flag read failed, proceeding as not-stopped");
            }
            _ => {}
        }

        // Step 3: acquire slots via C3 with the current (≤5s-stale) config.
        let worker_config = self.config_cache.get().await;
        let gate_cfg = GateConfig {
            max_global_concurrency: worker_config.max_global_concurrency,
            channel_concurrency: worker_config.channel_concurrency,
        };
        let handle = match self.gate.acquire(&payload.channel_id, &gate_cfg).await {
            Ok(h) => h,
            Err(e) => {
                tracing::warn!(error = %e, "concurrency gate acquire failed, dropping job");
                self.queue.mark_failed(&job_id).await;
                return;
            }
        };

        // Step 4: re-check the stopped-flag after acquisition.
        if matches!(self.queue.is_stopped().await, Ok(true)) {
            if let Err(e) = self.gate.release(handle).await {
                tracing::warn!(error = %e, "gate release failed after stop re-check");
            }
            self.finalize_stopped(&job_id, &model_id, endpoint_type).await;
            return;
        }

        // Step 5: politeness jitter.
        let delay_ms = jittered_delay(worker_config.min_delay_ms, worker_config.max_delay_ms);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        // Step 6: execute the probe.
        let probe_job: crate::probe::ProbeJob = (&payload).into();
        let outcome = self.executor.probe(&probe_job).await;

        // Step 7: record and publish.
        let record_result = self.recorder.record(&model_id, &outcome).await;
        if let Err(e) = &record_result {
            tracing::warn!(error = %e, "failed to record probe outcome");
        }

        let is_model_complete = self.queue.is_model_complete(&model_id, &job_id).await;
        self.progress
            .publish(&ProgressEvent {
                channel_id: payload.channel_id.clone(),
                model_id: model_id.clone(),
                model_name: payload.model_name.clone(),
                endpoint_type,
                status: if outcome.is_success() { "SUCCESS" } else { "FAIL" },
                latency_ms: outcome.latency_ms,
                timestamp: Utc::now(),
                is_model_complete,
            })
            .await;

        // Step 8: release slots in a guaranteed-run epilogue — every
        // exit path above this point already released or never acquired;
        // from here on release always runs regardless of record/publish outcome.
        if let Err(e) = self.gate.release(handle).await {
            tracing::warn!(error = %e, "gate release failed");
        }

        // Step 9: ack.
        if outcome.is_success() && record_result.is_ok() {
            self.queue.mark_completed(&job_id).await;
        } else {
            self.queue.mark_failed(&job_id).await;
        }
    }

    async fn finalize_stopped(&self, job_id: &str, model_id: &str, endpoint_type: crate::domain::EndpointType) {
        if let Err(e) = self.recorder.record_stopped(&model_id.to_string(), endpoint_type).await {
            tracing::warn!(error = %e, "failed to record stopped-job outcome");
        }
        let is_model_complete = self.queue.is_model_complete(&model_id.to_string(), job_id).await;
        self.progress
            .publish(&ProgressEvent {
                channel_id: String::new(),
                model_id: model_id.to_string(),
                model_name: String::new(),
                endpoint_type,
                status: "FAIL",
                latency_ms: 0,
                timestamp: Utc::now(),
                is_model_complete,
            })
            .await;
        self.queue.mark_failed(job_id).await;
    }
}

/// Uniform random delay in `[min, max]` (§4.4 step 5 "politeness jitter").
fn jittered_delay(min_ms: u64, max_ms: u64) -> u64 {
    if max_ms <= min_ms {
        return min_ms;
    }
    rand::thread_rng().gen_range(min_ms..=max_ms)
}
