//! Hot-reloaded worker configuration cache (§4.4 "Configuration hot-reload").
//!
//! Caches `{channelConcurrency, maxGlobalConcurrency, minDelayMs, maxDelayMs}`
//! with a 5s TTL; a singleflight mutex coalesces concurrent reloads into one
//! repository read (§5 "Worker config cache: in-process; guarded by a
//! singleflight loader").

use crate::domain::SchedulerConfig;
use crate::repository::SchedulerConfigRepository;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

const TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub channel_concurrency: u32,
    pub max_global_concurrency: u32,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl From<&SchedulerConfig> for WorkerConfig {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            channel_concurrency: cfg.channel_concurrency,
            max_global_concurrency: cfg.max_global_concurrency,
            min_delay_ms: cfg.min_delay_ms,
            max_delay_ms: cfg.max_delay_ms,
        }
    }
}

impl WorkerConfig {
    /// §4.4 "Values are normalized": concurrencies clamped ≥ 1, delays ≥ 0,
    /// `maxDelay = max(maxDelay, minDelay)`.
    pub fn normalized(mut self) -> Self {
        self.channel_concurrency = self.channel_concurrency.max(1);
        self.max_global_concurrency = self.max_global_concurrency.max(1);
        self.max_delay_ms = self.max_delay_ms.max(self.min_delay_ms);
        self
    }
}

pub struct ConfigCache {
    repo: Arc<dyn SchedulerConfigRepository>,
    env_fallback: WorkerConfig,
    cached: RwLock<Option<(Instant, WorkerConfig)>>,
    load_lock: Mutex<()>,
}

impl ConfigCache {
    pub fn new(repo: Arc<dyn SchedulerConfigRepository>, env_fallback: WorkerConfig) -> Self {
        Self {
            repo,
            env_fallback: env_fallback.normalized(),
            cached: RwLock::new(None),
            load_lock: Mutex::new(()),
        }
    }

    pub async fn get(&self) -> WorkerConfig {
        if let Some((fetched_at, cfg)) = *self.cached.read().await {
            if fetched_at.elapsed() < TTL {
                return cfg;
            }
        }

        let _guard = self.load_lock.lock().await;
        // Re-check: another task may have refreshed while we waited for the lock.
        if let Some((fetched_at, cfg)) = *self.cached.read().await {
            if fetched_at.elapsed() < TTL {
                return cfg;
            }
        }

        let fresh = match self.repo.load().await {
            Ok(Some(cfg)) => WorkerConfig::from(&cfg.normalized()),
            Ok(None) => self.env_fallback,
            Err(e) => {
                tracing::warn!(error = %e, "scheduler config unavailable, using cached/env defaults");
                self.env_fallback
            }
        };

        *self.cached.write().await = Some((Instant::now(), fresh));
        fresh
    }
}
