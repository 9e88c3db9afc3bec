//! Daemon entrypoint: wires the coordination store, repositories, worker
//! pool, scheduler, and HTTP surface together and runs them concurrently.

use modelcheck::coordination::{CoordinationStore, InMemoryCoordinationStore, RedisCoordinationStore};
use modelcheck::gate::ConcurrencyGate;
use modelcheck::http::{build_router, AppState};
use modelcheck::probe::ProbeExecutor;
use modelcheck::progress::ProgressBus;
use modelcheck::queue::{ConfigCache, DetectionQueue, WorkerPool};
use modelcheck::recorder::StateRecorder;
use modelcheck::repository::memory::InMemoryRepository;
use modelcheck::repository::Repositories;
use modelcheck::scheduler::sweeper::LogRetentionSweeper;
use modelcheck::scheduler::Scheduler;
use modelcheck::service::DetectionService;
use modelcheck::sync::ModelSyncPipeline;
use modelcheck::{telemetry, EngineConfig};
use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let config = EngineConfig::from_env();
    tracing::info!(bind_addr = %config.bind_addr, worker_concurrency = config.worker_concurrency, "starting model detection engine");

    // §1 "persistence layer itself is out of scope": the in-memory
    // repository stands in for whatever relational store a real deployment
    // points this at.
    let repos: Arc<InMemoryRepository> = Arc::new(InMemoryRepository::new());
    let repos_dyn: Arc<dyn Repositories> = repos.clone();

    let store: Arc<dyn CoordinationStore> = match &config.redis_url {
        Some(url) => {
            tracing::info!("connecting to redis coordination store");
            Arc::new(RedisCoordinationStore::connect(url).await?)
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-process coordination store (single-instance only)");
            Arc::new(InMemoryCoordinationStore::new())
        }
    };

    let queue = Arc::new(DetectionQueue::new(store.clone()));
    let gate = Arc::new(ConcurrencyGate::new(store.clone()));
    let config_cache = Arc::new(ConfigCache::new(repos.clone(), config.worker.clone()));
    let executor = Arc::new(ProbeExecutor::new(config.global_proxy.clone(), config.detect_prompt.clone()));
    let recorder = Arc::new(StateRecorder::new(repos_dyn.clone()));
    let progress = Arc::new(ProgressBus::new(store.clone()));

    let sync = Arc::new(ModelSyncPipeline::new(repos_dyn.clone()));
    let service = Arc::new(DetectionService::new(repos_dyn.clone(), queue.clone(), sync.clone(), config.global_proxy.clone()));

    if repos.scheduler_config().load().await?.is_none() {
        repos.scheduler_config().save(config.scheduler_defaults()).await?;
    }
    let scheduler = Arc::new(Scheduler::bootstrap(repos_dyn.clone(), service.clone(), config.scheduler_defaults()).await);

    let worker_pool = Arc::new(WorkerPool::new(
        queue.clone(),
        gate.clone(),
        config_cache.clone(),
        executor.clone(),
        recorder.clone(),
        progress.clone(),
        config.worker_concurrency,
    ));
    worker_pool.spawn();

    {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run_forever().await });
    }

    match LogRetentionSweeper::new(repos_dyn.clone(), &config.cleanup_schedule, config.log_retention_days) {
        Ok(sweeper) => {
            tokio::spawn(sweeper.run_forever());
        }
        Err(e) => tracing::warn!(error = %e, "invalid cleanup schedule, log retention sweeper disabled"),
    }

    let state = AppState {
        repos: repos_dyn.clone(),
        queue: queue.clone(),
        sync: sync.clone(),
        service: service.clone(),
        progress: progress.clone(),
        scheduler: scheduler.clone(),
        cleanup_schedule: config.cleanup_schedule.clone(),
        log_retention_days: config.log_retention_days,
        auth_token: env::var("API_AUTH_TOKEN").ok().filter(|s| !s.is_empty()),
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}
