//! Training bracket binary entrypoint wiring REST, SSE, and JSON persistence layers.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use training_bracket::{
    config::AppConfig,
    dao::session_store::{JsonFileStore, SessionStore},
    routes,
    services::{
        cleanup_supervisor,
        identity::{IdentityResolver, StaticDirectory},
        scoring::{MemoryLedger, ScoringLedger},
    },
    state::{AppState, Collaborators, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store: Arc<dyn SessionStore> = Arc::new(JsonFileStore::new(config.data_path.clone()));
    let identity: Arc<dyn IdentityResolver> =
        Arc::new(StaticDirectory::from_entries(&config.players));
    let ledger: Arc<dyn ScoringLedger> = Arc::new(MemoryLedger::new(config.scoring));

    let app_state = AppState::new(
        config,
        store,
        Collaborators {
            identity,
            ledger,
            summary: None,
        },
    )
    .await
    .context("restoring persisted sessions")?;
    info!(
        sessions = app_state.sessions().len(),
        "restored persisted sessions"
    );

    tokio::spawn(cleanup_supervisor::run(app_state.clone()));
    let app = build_router(app_state.clone());

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

    // Flush whatever the last requests changed before exiting, waiting out any running write.
    app_state.sessions().persist_settled().await;
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
