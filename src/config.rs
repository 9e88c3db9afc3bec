//! Process-wide configuration loaded from the environment (§6 "Environment
//! variables", §10.3). Mirrors `Config::from_env()`'s read-with-default-and-
//! warn style.

use crate::domain::SchedulerConfig;
use crate::queue::WorkerConfig;
use std::env;

pub struct EngineConfig {
    pub worker_concurrency: usize,
    pub worker: WorkerConfig,
    pub auto_detect_enabled: bool,
    pub auto_detect_all_channels: bool,
    pub cron_schedule: String,
    pub cleanup_schedule: String,
    /// Carried through to `SchedulerConfig.timezone` for display/API purposes;
    /// cron next-fire computation itself is UTC-only (`scheduler::grammar`).
    pub cron_timezone: String,
    pub log_retention_days: i64,
    pub global_proxy: Option<String>,
    pub detect_prompt: String,
    pub bind_addr: String,
    pub redis_url: Option<String>,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let worker_concurrency = env_parse_or("WORKER_CONCURRENCY", 50usize);
        let channel_concurrency = env_parse_or("CHANNEL_CONCURRENCY", 2u32);
        let max_global_concurrency = env_parse_or("MAX_GLOBAL_CONCURRENCY", 10u32);
        let min_delay_ms = env_parse_or("DETECTION_MIN_DELAY_MS", 3_000u64);
        let max_delay_ms = env_parse_or("DETECTION_MAX_DELAY_MS", 5_000u64);

        if worker_concurrency < max_global_concurrency as usize {
            tracing::warn!(
                worker_concurrency,
                max_global_concurrency,
                "WORKER_CONCURRENCY is below MAX_GLOBAL_CONCURRENCY; workers will starve the configured ceiling"
            );
        }

        Self {
            worker_concurrency,
            worker: WorkerConfig {
                channel_concurrency,
                max_global_concurrency,
                min_delay_ms,
                max_delay_ms,
            }
            .normalized(),
            auto_detect_enabled: env_parse_or("AUTO_DETECT_ENABLED", false),
            auto_detect_all_channels: env_parse_or("AUTO_DETECT_ALL_CHANNELS", true),
            cron_schedule: env::var("CRON_SCHEDULE").unwrap_or_else(|_| "0 */6 * * *".to_string()),
            cleanup_schedule: env::var("CLEANUP_SCHEDULE").unwrap_or_else(|_| "0 2 * * *".to_string()),
            cron_timezone: env::var("CRON_TIMEZONE").unwrap_or_else(|_| "UTC".to_string()),
            log_retention_days: env_parse_or("LOG_RETENTION_DAYS", 7i64),
            global_proxy: env::var("GLOBAL_PROXY").ok().filter(|s| !s.is_empty()),
            detect_prompt: env::var("DETECT_PROMPT").unwrap_or_else(|_| "1+1=2? yes or no".to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            redis_url: env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
        }
    }

    pub fn scheduler_defaults(&self) -> SchedulerConfig {
        SchedulerConfig {
            enabled: self.auto_detect_enabled,
            cron_schedule: self.cron_schedule.clone(),
            timezone: self.cron_timezone.clone(),
            channel_concurrency: self.worker.channel_concurrency,
            max_global_concurrency: self.worker.max_global_concurrency,
            min_delay_ms: self.worker.min_delay_ms,
            max_delay_ms: self.worker.max_delay_ms,
            detect_all_channels: self.auto_detect_all_channels,
            selected_channel_ids: None,
            selected_model_ids: None,
        }
        .normalized()
    }
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, raw, "failed to parse environment variable, using default");
            default
        }),
        Err(_) => default,
    }
}
