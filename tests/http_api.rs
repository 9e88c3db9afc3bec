//! HTTP surface smoke test (§6): binds the real router on loopback and
//! drives it with a plain `reqwest` client, the same way the probe stack
//! itself is exercised against stub upstreams.

mod support;

use modelcheck::coordination::{CoordinationStore, InMemoryCoordinationStore};
use modelcheck::domain::{Channel, KeyMode, Model, RouteStrategy};
use modelcheck::gate::ConcurrencyGate;
use modelcheck::http::{build_router, AppState};
use modelcheck::probe::ProbeExecutor;
use modelcheck::progress::ProgressBus;
use modelcheck::queue::{ConfigCache, DetectionQueue, WorkerConfig, WorkerPool};
use modelcheck::recorder::StateRecorder;
use modelcheck::repository::memory::InMemoryRepository;
use modelcheck::repository::Repositories;
use modelcheck::scheduler::Scheduler;
use modelcheck::service::DetectionService;
use modelcheck::sync::ModelSyncPipeline;
use std::sync::Arc;
use std::time::Duration;
use support::stub_upstream;

async fn spawn_app(base_url: &str) -> String {
    let repos = Arc::new(InMemoryRepository::new());
    let repos_dyn: Arc<dyn Repositories> = repos.clone();

    repos
        .seed_channel(Channel {
            id: "chan-1".to_string(),
            name: "test channel".to_string(),
            base_url: base_url.to_string(),
            api_key: "sk-test".to_string(),
            proxy_url: None,
            enabled: true,
            sort_order: 0,
            key_mode: KeyMode::Single,
            route_strategy: RouteStrategy::RoundRobin,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        })
        .await;
    repos
        .seed_model(Model {
            id: "model-1".to_string(),
            channel_id: "chan-1".to_string(),
            model_name: "gpt-4o".to_string(),
            channel_key_id: None,
            detected_endpoints: Default::default(),
            last_status: false,
            last_latency_ms: None,
            last_checked_at: None,
        })
        .await;

    let store: Arc<dyn CoordinationStore> = Arc::new(InMemoryCoordinationStore::new());
    let queue = Arc::new(DetectionQueue::new(store.clone()));
    let gate = Arc::new(ConcurrencyGate::new(store.clone()));
    let worker_config = WorkerConfig {
        channel_concurrency: 4,
        max_global_concurrency: 4,
        min_delay_ms: 0,
        max_delay_ms: 0,
    };
    let config_cache = Arc::new(ConfigCache::new(repos.clone(), worker_config));
    let executor = Arc::new(ProbeExecutor::new(None, "1+1=2? yes or no".to_string()));
    let recorder = Arc::new(StateRecorder::new(repos_dyn.clone()));
    let progress = Arc::new(ProgressBus::new(store.clone()));
    let sync = Arc::new(ModelSyncPipeline::new(repos_dyn.clone()));
    let service = Arc::new(DetectionService::new(repos_dyn.clone(), queue.clone(), sync.clone(), None));
    let scheduler = Arc::new(Scheduler::bootstrap(repos_dyn.clone(), service.clone(), Default::default()).await);

    let pool = Arc::new(WorkerPool::new(queue.clone(), gate, config_cache, executor, recorder, progress.clone(), 2));
    pool.spawn();

    let state = AppState {
        repos: repos_dyn,
        queue,
        sync,
        service,
        progress,
        scheduler,
        cleanup_schedule: "0 2 * * *".to_string(),
        log_retention_days: 7,
        auth_token: None,
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn trigger_then_poll_snapshot_reaches_completion() {
    let stub = stub_upstream::spawn_chat_success().await;
    let app_url = spawn_app(&stub.base_url).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{app_url}/detect"))
        .json(&serde_json::json!({"scope": "model", "modelId": "model-1"}))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["jobIds"].as_array().unwrap().len(), 1);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot: serde_json::Value = client.get(format!("{app_url}/detect")).send().await.unwrap().json().await.unwrap();
        if snapshot["completed"].as_u64().unwrap_or(0) + snapshot["failed"].as_u64().unwrap_or(0) >= 1 {
            assert_eq!(snapshot["progressPercent"], 100);
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("detection never completed: {snapshot:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn scheduler_status_reports_cleanup_info() {
    let stub = stub_upstream::spawn_chat_success().await;
    let app_url = spawn_app(&stub.base_url).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{app_url}/scheduler")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["cleanup"]["retentionDays"], 7);
    assert_eq!(body["cleanup"]["schedule"], "0 2 * * *");
}
