//! `simfarm-worker` -- runs simulation jobs handed out by the dispatcher.
//!
//! # Environment variables
//!
//! | Variable                  | Default                 | Description                        |
//! |---------------------------|-------------------------|------------------------------------|
//! | `SERVER_URL`              | `http://127.0.0.1:4242` | Dispatch server base URL           |
//! | `WORKER_ID`               | random                  | 32-hex-digit worker identifier     |
//! | `POLL_INTERVAL_SECS`      | `10`                    | Wait between fetches when idle     |
//! | `HEARTBEAT_INTERVAL_SECS` | `30`                    | Seconds between heartbeats         |
//! | `WORK_DIR`                | system temp             | Parent of per-job scratch dirs     |

use simfarm_worker::{Worker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simfarm_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();
    tracing::info!(
        worker_id = %config.worker_id,
        server_url = %config.server_url,
        poll_interval_secs = config.poll_interval.as_secs(),
        "Starting simfarm-worker",
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            cancel.cancel();
        }
    });

    Worker::new(&config).run(cancel).await;
}

/// Wait for SIGINT or SIGTERM.
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
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), finishing current job"),
        () = terminate => tracing::info!("Received SIGTERM, finishing current job"),
    }
}
