use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use werewolf_server::app;
use werewolf_server::models::config::EngineConfig;
use werewolf_server::services::session_store::SessionStore;
use werewolf_server::services::snapshot::FileSnapshotStore;
use werewolf_server::state::AppState;
use werewolf_server::utils::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenv() {
        eprintln!("Warning: failed to load .env file: {}", e);
    }
    init_tracing();

    let config = EngineConfig::from_env();
    let snapshots = FileSnapshotStore::open(&config.snapshot_dir)
        .await
        .with_context(|| format!("opening snapshot dir {}", config.snapshot_dir.display()))?;
    let store = Arc::new(SessionStore::from_config(&config, Arc::new(snapshots)));
    store.restore().await.context("restoring sessions")?;
    let sweeper = store.clone().spawn_sweeper(config.sweep_interval);

    let addr = config.bind_addr;
    let app = app::create_app(AppState::new(store, config)).layer(
        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
            tracing::info_span!(
                "HTTP request",
                method = %request.method(),
                uri = %request.uri(),
            )
        }),
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
