//! # Lynix API Server
//!
//! Serves the JSON API behind the Lynix portal.
//!
//! ## Startup
//!
//! 1. Load configuration from the environment (and `.env`)
//! 2. Connect to PostgreSQL and apply migrations, when a database is configured
//! 3. Create the bootstrap admin if no admin account exists
//! 4. Serve until Ctrl-C or SIGTERM
//!
//! ## Usage
//!
//! ```bash
//! JWT_SECRET=... DATABASE_URL=postgresql://localhost/lynix cargo run -p lynix-api
//! ```

use anyhow::Context;
use lynix_api::{
    app::{build_router, AppState},
    config::{BootstrapAdmin, Config},
};
use lynix_shared::{
    auth::password::hash_password,
    db::{
        migrations::run_migrations,
        pool::{create_pool, DatabaseConfig},
    },
    models::user::{CreateUser, Plan, User, UserRole},
};
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lynix_api=debug,lynix_shared=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Lynix API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env().context("invalid configuration")?;

    let pool = match &config.database {
        Some(database) => {
            let pool = create_pool(DatabaseConfig {
                url: database.url.clone(),
                max_connections: database.max_connections,
                ..Default::default()
            })
            .await
            .context("failed to connect to the database")?;

            run_migrations(&pool)
                .await
                .context("failed to apply migrations")?;

            if let Some(admin) = &config.bootstrap_admin {
                ensure_admin(&pool, admin).await?;
            }

            Some(pool)
        }
        None => {
            tracing::warn!("No DATABASE_URL set; data endpoints will answer 503");
            None
        }
    };

    let bind_address = config.bind_address();
    let state = AppState::from_config(pool.clone(), config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {}", bind_address))?;

    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        lynix_shared::db::pool::close_pool(pool).await;
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Creates the configured admin account when the database has none
async fn ensure_admin(pool: &PgPool, admin: &BootstrapAdmin) -> anyhow::Result<()> {
    if User::admin_exists(pool).await? {
        tracing::debug!("Admin account present; skipping bootstrap");
        return Ok(());
    }

    let password_hash = hash_password(&admin.password)?;

    let user = User::create(
        pool,
        CreateUser {
            username: admin.username.clone(),
            email: admin.email.clone(),
            password_hash,
            role: UserRole::Admin,
            plan: Plan {
                name: "Administrator".to_string(),
                cost: "N/A".to_string(),
                details: "Full access".to_string(),
            },
            ..Default::default()
        },
    )
    .await
    .context("failed to create bootstrap admin")?;

    tracing::info!(user_id = %user.id, "Bootstrap admin created");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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

    tracing::info!("Shutdown signal received, draining connections...");
}
