use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use bearmemori_core::BearMemoriConfig;
use bearmemori_dispatcher::Dispatcher;
use bearmemori_scheduler::{HousekeepingConfig, HousekeepingEngine};
use bearmemori_store::Store;
use bearmemori_streams::StreamBus;
use bearmemori_worker::{LlmClient, Worker, WorkerConfig};

mod app;
mod error;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bearmemori_http=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > BEARMEMORI_CONFIG env > ~/.bearmemori/bearmemori.toml
    let config_path = std::env::var("BEARMEMORI_CONFIG").ok();
    let config = BearMemoriConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        BearMemoriConfig::default()
    });

    let store = Arc::new(Store::open(&config.database.path)?);

    let mut startup_bus = StreamBus::connect(&config.redis.url).await?;
    startup_bus.ensure_all_groups().await?;

    let dispatcher_bus = StreamBus::connect(&config.redis.url).await?;
    let dispatcher = Dispatcher::new(store.clone(), dispatcher_bus);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let llm = LlmClient::new(config.llm.base_url.clone(), config.llm.api_key.clone());
    let worker = Arc::new(Worker::new(store.clone(), llm));
    let worker_config = WorkerConfig {
        redis_url: config.redis.url.clone(),
        llm_base_url: config.llm.base_url.clone(),
        llm_api_key: config.llm.api_key.clone(),
        consumer_name: format!("worker-{}", uuid::Uuid::new_v4()),
        block_ms: 5_000,
    };
    let worker_shutdown = shutdown_rx.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_config, worker_shutdown).await });

    let scheduler_bus = StreamBus::connect(&config.redis.url).await?;
    let scheduler = Arc::new(HousekeepingEngine::new(
        store.clone(),
        scheduler_bus,
        HousekeepingConfig {
            interval_seconds: config.scheduler.interval_seconds,
            suggested_tag_ttl_days: config.retention.suggested_tag_ttl_days,
            event_requeue_hours: config.retention.event_requeue_hours,
        },
    ));
    let scheduler_shutdown = shutdown_rx.clone();
    let scheduler_handle = tokio::spawn(async move { scheduler.run(scheduler_shutdown).await });

    let bind = config.http.bind.clone();
    let port = config.http.port;
    let state = Arc::new(app::AppState::new(store, dispatcher, config));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("bearmemori http listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await?;

    let _ = worker_handle.await;
    let _ = scheduler_handle.await;

    Ok(())
}

/// Wait for SIGTERM/SIGINT, then flip the shared shutdown watch so the
/// worker and scheduler loops drain in place.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining subsystems");
    let _ = shutdown_tx.send(true);
}
