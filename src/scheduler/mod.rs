//! Scheduler (C9, §4.9). Parses both schedule grammars, computes next
//! fire time, triggers C8 jobs, and co-hosts the log-retention sweeper.

pub mod grammar;
pub mod sweeper;

use crate::domain::SchedulerConfig;
use crate::repository::Repositories;
use crate::service::DetectionService;
use chrono::Utc;
use grammar::{parse_interval, CronList, IntervalSchedule};
use regex::Regex;
use std::sync::Arc;
use tokio::sync::RwLock;

pub enum ParsedSchedule {
    CronList(CronList),
    Interval(IntervalSchedule),
}

impl ParsedSchedule {
    pub fn next_fire_after(&self, now: chrono::DateTime<Utc>) -> Option<chrono::DateTime<Utc>> {
        match self {
            ParsedSchedule::CronList(c) => c.next_fire_after(now),
            ParsedSchedule::Interval(i) => Some(i.next_fire_after(now)),
        }
    }
}

pub fn parse_schedule(expr: &str) -> Result<ParsedSchedule, String> {
    if expr.trim_start().starts_with("interval:") {
        Ok(ParsedSchedule::Interval(parse_interval(expr)?))
    } else {
        Ok(ParsedSchedule::CronList(CronList::parse(expr)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySchedule {
    pub unit: &'static str,
    pub every: u32,
}

/// §4.9 "Legacy migration": recognize `*/N * * * *`, `0 */N * * *`,
/// `0 0 */N * * *` and present them as interval schedules for display —
/// the raw cron string still fires unless explicitly rewritten.
pub fn detect_legacy_interval(cron_str: &str) -> Option<DisplaySchedule> {
    let minute_pattern = Regex::new(r"^\*/(\d+) \* \* \* \*$").expect("static regex is valid");
    let hour_pattern = Regex::new(r"^0 \*/(\d+) \* \* \*$").expect("static regex is valid");
    let day_pattern = Regex::new(r"^0 0 \*/(\d+) \* \*$").expect("static regex is valid");

    let trimmed = cron_str.trim();
    if let Some(caps) = minute_pattern.captures(trimmed) {
        return Some(DisplaySchedule { unit: "minute", every: caps[1].parse().ok()? });
    }
    if let Some(caps) = hour_pattern.captures(trimmed) {
        return Some(DisplaySchedule { unit: "hour", every: caps[1].parse().ok()? });
    }
    if let Some(caps) = day_pattern.captures(trimmed) {
        return Some(DisplaySchedule { unit: "day", every: caps[1].parse().ok()? });
    }
    None
}

pub struct Scheduler {
    repos: Arc<dyn Repositories>,
    service: Arc<DetectionService>,
    enabled: RwLock<bool>,
}

impl Scheduler {
    /// §4.9 "Bootstrap": load the singleton; if absent, create it from
    /// environment defaults; disable if the store is unreachable.
    pub async fn bootstrap(repos: Arc<dyn Repositories>, service: Arc<DetectionService>, env_defaults: SchedulerConfig) -> Self {
        let enabled = match repos.scheduler_config().load().await {
            Ok(Some(cfg)) => cfg.enabled,
            Ok(None) => {
                let enabled = env_defaults.enabled;
                if let Err(e) = repos.scheduler_config().save(env_defaults).await {
                    tracing::warn!(error = %e, "failed to persist default scheduler config, disabling scheduler");
                    false
                } else {
                    enabled
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "scheduler config store unreachable at bootstrap, disabling scheduler");
                false
            }
        };

        Self {
            repos,
            service,
            enabled: RwLock::new(enabled),
        }
    }

    pub async fn is_enabled(&self) -> bool {
        *self.enabled.read().await
    }

    /// §4.9 "Firing": runs until cancelled; config is reloaded on every
    /// cycle so a `PUT /scheduler/config` takes effect on the next fire.
    pub async fn run_forever(&self) {
        loop {
            let Some(cfg) = self.current_config().await else {
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                continue;
            };

            if !cfg.enabled {
                *self.enabled.write().await = false;
                tokio::time::sleep(std::time::Duration::from_secs(30)).await;
                continue;
            }
            *self.enabled.write().await = true;

            let schedule = match parse_schedule(&cfg.cron_schedule) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, schedule = %cfg.cron_schedule, "invalid schedule, retrying in 60s");
                    tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                    continue;
                }
            };

            let now = Utc::now();
            let Some(next_fire) = schedule.next_fire_after(now) else {
                tracing::warn!("schedule has no future fire time, retrying in 60s");
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                continue;
            };
            let wait = (next_fire - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            self.fire(&cfg).await;
        }
    }

    async fn current_config(&self) -> Option<SchedulerConfig> {
        match self.repos.scheduler_config().load().await {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "failed to reload scheduler config");
                None
            }
        }
    }

    async fn fire(&self, cfg: &SchedulerConfig) {
        let result = if cfg.detect_all_channels {
            self.service.trigger_full_detection(true).await
        } else {
            self.service
                .trigger_selective_detection(cfg.selected_channel_ids.as_deref(), cfg.selected_model_ids.as_ref())
                .await
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "scheduled detection trigger failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_minute_pattern() {
        assert_eq!(detect_legacy_interval("*/15 * * * *"), Some(DisplaySchedule { unit: "minute", every: 15 }));
    }

    #[test]
    fn legacy_hour_pattern() {
        assert_eq!(detect_legacy_interval("0 */6 * * *"), Some(DisplaySchedule { unit: "hour", every: 6 }));
    }

    #[test]
    fn legacy_day_pattern() {
        assert_eq!(detect_legacy_interval("0 0 */2 * *"), Some(DisplaySchedule { unit: "day", every: 2 }));
    }

    #[test]
    fn non_legacy_pattern_returns_none() {
        assert_eq!(detect_legacy_interval("30 9 * * 1-5"), None);
    }
}
