use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mealplan::auth::throttle::spawn_cleanup_task;
use mealplan::cli::{run_command, Cli};
use mealplan::config::Config;
use mealplan::notifications::mailer_from_config;
use mealplan::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if cli.is_serve() {
        serve(config).await
    } else {
        run_command(&cli).await
    }
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("Starting mealplan v{}", env!("CARGO_PKG_VERSION"));

    if config
        .auth
        .jwt_secret
        .as_deref()
        .map_or(true, |s| s.trim().is_empty())
    {
        anyhow::bail!(
            "No token signing key configured. Set MEALPLAN_JWT_SECRET or auth.jwt_secret."
        );
    }

    // Initialize database
    let db = mealplan::db::init(&config.database).await?;

    if !config.email.is_configured() {
        tracing::warn!("SMTP is not configured; recovery emails will only be logged");
    }
    let mailer = mailer_from_config(&config.email);

    let state = Arc::new(
        AppState::new(config.clone(), db, mailer).context("Invalid auth configuration")?,
    );

    if config.auth.server_lockout.enabled {
        spawn_cleanup_task(
            state.throttle.clone(),
            config.auth.server_lockout.cleanup_interval_secs,
        );
    }

    let app = mealplan::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received");
}
