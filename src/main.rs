//! Beer Olympics backend entrypoint wiring REST, SSE, the local relay and CouchDB supervision.

use std::net::SocketAddr;

use anyhow::Context;
use beer_olympics_back::{
    app,
    config::AppConfig,
    services::{realtime_service, room_service},
    state::{AppState, SharedState},
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let port = config.port;
    let app_state = AppState::init(config)
        .await
        .context("initialising application state")?;

    spawn_storage_supervisor(&app_state);
    room_service::ensure_global_room(&app_state);
    app_state.track_task(realtime_service::spawn_room_sweeper(&app_state));

    // Build the HTTP router once the shared state is ready.
    let router = app(app_state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let served = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum");

    app_state.close().await;
    served
}

/// Start the CouchDB supervisor when a database is configured.
#[cfg(feature = "couch-store")]
fn spawn_storage_supervisor(state: &SharedState) {
    use beer_olympics_back::services::storage_supervisor;

    let Some(settings) = state.config().couch.clone() else {
        return;
    };
    info!(url = %settings.base_url, "supervising CouchDB connection");
    let task = tokio::spawn(storage_supervisor::run(state.clone(), move || {
        storage_supervisor::connect_couch(settings.clone())
    }));
    state.track_task(task);
}

#[cfg(not(feature = "couch-store"))]
fn spawn_storage_supervisor(state: &SharedState) {
    if state.config().couch.is_some() {
        warn!("CouchDB is configured but the couch-store feature is disabled");
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
