//! # Lynix Worker
//!
//! Runs the housekeeping sweep against the portal database.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/lynix cargo run -p lynix-worker
//! ```

use anyhow::Context;
use lynix_shared::db::pool::{close_pool, create_pool, DatabaseConfig};
use lynix_worker::{
    config::WorkerConfig,
    sweeper::{SweepPolicy, Sweeper},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lynix_worker=debug,lynix_shared=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Lynix Worker v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = WorkerConfig::from_env().context("invalid configuration")?;

    let pool = create_pool(DatabaseConfig {
        url: config.database_url.clone(),
        max_connections: config.max_connections,
        min_connections: 1,
        ..Default::default()
    })
    .await
    .context("failed to connect to the database")?;

    let policy = SweepPolicy::new(config.sweep_interval, config.ring_timeout)?;
    let sweeper = Sweeper::new(pool.clone(), policy);

    let token = sweeper.shutdown_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });

    sweeper.run().await;

    close_pool(pool).await;
    tracing::info!("Worker stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finishing current sweep...");
}
