//! Mafiadon backend entrypoint wiring REST, SSE, the countdown scheduler and storage.

use std::{env, net::SocketAddr};

use anyhow::Context;
use axum::Router;
use tokio::{net::TcpListener, sync::watch};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mafiadon_back::{
    config::AppConfig,
    dao::game_store,
    routes,
    services::{countdown::CountdownScheduler, persistence, sse_service, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    info!(store = ?config.store, role = %config.role_name, "configuration loaded");
    let app_state = AppState::new(config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let connect_config = app_state.config().clone();
    tokio::spawn(storage_supervisor::run(app_state.clone(), move || {
        let config = connect_config.clone();
        async move { game_store::connect(&config).await }
    }));

    let writer = app_state
        .take_persistence_receiver()
        .map(|receiver| {
            tokio::spawn(persistence::run_writer(
                app_state.clone(),
                receiver,
                shutdown_rx.clone(),
            ))
        })
        .context("persistence queue already consumed")?;
    let scheduler =
        tokio::spawn(CountdownScheduler::from_state(&app_state).run(shutdown_rx.clone()));
    tokio::spawn(sse_service::run_status_broadcaster(
        app_state.clone(),
        shutdown_rx,
    ));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    info!("server stopped; draining background tasks");
    let _ = shutdown_tx.send(true);
    if let Err(err) = scheduler.await {
        warn!(error = %err, "countdown scheduler task failed");
    }
    if let Err(err) = writer.await {
        warn!(error = %err, "persistence writer task failed");
    }

    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
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
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
