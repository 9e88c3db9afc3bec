//! Log-retention sweeper (§4.9 "Log retention sweeper"): a separate cron,
//! default `0 2 * * *`, deleting `CheckLog` rows older than
//! `LOG_RETENTION_DAYS` (default 7).

use super::grammar::CronList;
use crate::repository::Repositories;
use chrono::{Duration, Utc};
use std::sync::Arc;

pub struct LogRetentionSweeper {
    repos: Arc<dyn Repositories>,
    schedule: CronList,
    retention_days: i64,
}

impl LogRetentionSweeper {
    pub fn new(repos: Arc<dyn Repositories>, cron_schedule: &str, retention_days: i64) -> Result<Self, String> {
        Ok(Self {
            repos,
            schedule: CronList::parse(cron_schedule)?,
            retention_days,
        })
    }

    pub async fn run_forever(self) {
        loop {
            let now = Utc::now();
            let Some(next_fire) = self.schedule.next_fire_after(now) else {
                tracing::warn!("log retention schedule has no future fire time, sweeper stopping");
                return;
            };
            let wait = (next_fire - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            if let Err(e) = self.sweep_once().await {
                tracing::warn!(error = %e, "log retention sweep failed");
            }
        }
    }

    async fn sweep_once(&self) -> crate::error::Result<u64> {
        let cutoff = Utc::now() - Duration::days(self.retention_days);
        let deleted = self.repos.check_logs().delete_older_than(cutoff).await?;
        tracing::info!(deleted, cutoff = %cutoff, "swept old check logs");
        Ok(deleted)
    }
}
