//! Server initialization and routing.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use axum::Router;
use index::SearchProvider;
use tower_http::compression::CompressionLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Settings;
use crate::middleware::{log_requests, trace_context};
use crate::routes::{admin, api_info, entities, matching, not_found, search};
use crate::state::AppState;

/// Build the router with all endpoints and the middleware stack.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(api_info))
        .route("/healthz", get(admin::healthz))
        .route("/readyz", get(admin::readyz))
        .route("/updatez", post(admin::updatez))
        .route("/catalog", get(admin::catalog))
        .route("/algorithms", get(admin::algorithms))
        .route("/search/{dataset}", get(search::search))
        .route("/search/{dataset}/suggest", get(search::suggest))
        .route("/match/{dataset}", post(matching::match_batch))
        .route("/entities/{entity_id}", get(entities::fetch))
        .route("/entities/{entity_id}/adjacent", get(entities::adjacent))
        .route("/entities/{entity_id}/adjacent/{prop}", get(entities::adjacent_prop))
        .fallback(not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(CompressionLayer::new())
        .layer(from_fn(log_requests))
        .layer(from_fn(trace_context))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Initialize logging, connect, and serve until shutdown.
///
/// When auto-reindex is enabled this also kicks one immediate update run
/// and schedules periodic ones on the configured crontab.
pub async fn start_server(settings: Settings) -> anyhow::Result<()> {
    init_tracing(&settings);

    let state = AppState::init(settings.clone()).await?;
    spawn_updates(state.clone());

    let app = build_router(state.clone());
    let addr = settings.socket_addr()?;
    tracing::info!(
        %addr,
        index = settings.index_name.as_str(),
        manifest = settings.manifest.as_str(),
        "starting sanscreen"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.provider.close().await.ok();
    tracing::info!("server shutdown complete");
    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(settings.log_level.clone()));
    if settings.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

/// Start the background reindex machinery.
fn spawn_updates(state: Arc<AppState>) {
    if !state.settings.auto_reindex {
        tracing::info!("auto reindex is disabled");
        return;
    }
    let startup = state.clone();
    tokio::spawn(async move {
        if let Err(err) = startup.run_update(false).await {
            tracing::error!(error = %err, "startup update failed");
        }
    });

    let crontab = state
        .settings
        .crontab
        .clone()
        .unwrap_or_else(ingest::random_minute_hourly);
    let scheduled = state.clone();
    match ingest::spawn_cron(&crontab, move || {
        let state = scheduled.clone();
        async move {
            if let Err(err) = state.run_update(false).await {
                tracing::error!(error = %err, "scheduled update failed");
            }
        }
    }) {
        Ok(_) => tracing::info!(crontab = crontab.as_str(), "update schedule active"),
        Err(err) => tracing::error!(error = %err, "cannot start update schedule"),
    }
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
