//! Plangate Gateway

use anyhow::Context;
use plangate_adapter_redis::{
    RedisRateWindowStore, RedisResourceCounter, RedisSubscriptionStore, create_connection_manager,
};
use plangate_bootstrap::{ShutdownController, init_runtime, shutdown_signal};
use plangate_common::{ResourceKind, SystemClock};
use plangate_config::{AppConfig, RedisConfig};
use plangate_gateway::admission::spawn_window_sweeper;
use plangate_gateway::{AdmissionService, AppState, Collaborators, build_router};
use plangate_ports::ResourceCountProvider;
use plangate_telemetry::init_metrics;
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // 加载配置
    let config = AppConfig::load("config").context("Failed to load configuration")?;
    init_runtime(&config)?;
    let metrics = init_metrics()?;

    let collaborators = match &config.redis {
        Some(redis) => redis_collaborators(&config, redis).await?,
        None => {
            warn!("No Redis configured, using in-process stores (single instance only)");
            Collaborators::in_memory(&config)
        }
    };

    let admission = AdmissionService::build(&config, collaborators)?;

    let shutdown = ShutdownController::new();
    let sweeper = spawn_window_sweeper(
        admission.limiter.clone(),
        config.admission.sweep_interval(),
        config.admission.idle_eviction(),
        shutdown.clone(),
    );

    let app = build_router(AppState::new(admission).with_metrics(metrics))
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    info!(%addr, "Starting plangate gateway");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.shutdown();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Rate window sweeper task failed");
    }

    info!("Gateway stopped");
    Ok(())
}

/// 多实例部署：窗口、等级、计数均存放在 Redis
async fn redis_collaborators(
    config: &AppConfig,
    redis: &RedisConfig,
) -> anyhow::Result<Collaborators> {
    let conn = create_connection_manager(redis.url.expose_secret()).await?;
    info!(key_prefix = %redis.key_prefix, "Connected to Redis");

    let counters = ResourceKind::ALL
        .into_iter()
        .filter(|kind| !config.admission.external_count_kinds.contains(kind))
        .map(|kind| {
            let counter: Arc<dyn ResourceCountProvider> = Arc::new(
                RedisResourceCounter::new(conn.clone(), kind)
                    .with_key_prefix(redis.key_prefix.as_str()),
            );
            (kind, counter)
        })
        .collect();

    Ok(Collaborators {
        subscriptions: Arc::new(
            RedisSubscriptionStore::new(conn.clone()).with_key_prefix(redis.key_prefix.as_str()),
        ),
        window_store: Arc::new(
            RedisRateWindowStore::new(conn).with_key_prefix(redis.key_prefix.as_str()),
        ),
        counters,
        clock: Arc::new(SystemClock),
    })
}
