use anyhow::{anyhow, Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::cli::ServeArgs;
use crate::config::Config;
use crate::native::{build_router, init_tracing, AppState};

pub async fn execute_serve(args: ServeArgs) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_tracing(config.log_format);

    let state = AppState::from_config(&config).map_err(|e| anyhow!(e))?;
    let app = build_router(state);

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;
    info!(listen = %config.listen, targets = ?config.targets, "injector running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("injector stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until killed.
        std::future::pending::<()>().await;
    }
}
