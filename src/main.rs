use tokio_util::sync::CancellationToken;

mod app;
mod auth;
mod clock;
mod config;
mod db;
mod error;
#[cfg(test)]
mod memory;
mod rate_limit;
mod snippets;
mod state;
mod sweeper;

use crate::config::AppConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "snipvault=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let (host, port) = (config.host.clone(), config.port);
    let state = AppState::init(config).await?;

    let shutdown = CancellationToken::new();
    let sweeper = sweeper::start(state.clone(), shutdown.clone());

    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
        tracing::info!("shutdown requested");
        on_signal.cancel();
    });

    let result = app::serve(app::build_app(state), &host, port, shutdown.clone()).await;
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "expiry sweeper did not stop cleanly");
    }
    result
}
