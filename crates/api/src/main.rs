use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use simfarm_api::config::ServerConfig;
use simfarm_api::router::build_app_router;
use simfarm_api::state::AppState;
use simfarm_dispatch::spawn_dispatcher;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "simfarm_api=debug,simfarm_dispatch=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        cache_capacity_bytes = config.dispatcher.cache_capacity_bytes,
        "Loaded server configuration"
    );

    // --- Dispatcher ---
    let dispatcher_cancel = CancellationToken::new();
    let (dispatcher, dispatcher_task) =
        spawn_dispatcher(config.dispatcher.clone(), dispatcher_cancel.clone());
    tracing::info!("Dispatcher started");

    // --- App state ---
    let state = AppState {
        dispatcher,
        config: Arc::new(config.clone()),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    // Stopping the dispatcher on the signal releases blocked RPC submitters,
    // which lets their connections finish.
    let shutdown = {
        let cancel = dispatcher_cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    dispatcher_cancel.cancel();
    let limit = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(limit, dispatcher_task).await.is_err() {
        tracing::warn!(timeout_secs = config.shutdown_timeout_secs, "Dispatcher did not stop in time");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
