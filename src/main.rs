use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use storefront_api::{app, config::AppConfig, db, events, notifications::LogNotifier, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let pool = db::connect(&config)
        .await
        .context("failed to connect to database")?;
    let db = Arc::new(pool);

    let (event_sender, event_rx) = events::channel(1024);
    tokio::spawn(events::process_events(event_rx, Arc::new(LogNotifier)));

    let state = AppState::build(db, config.clone(), event_sender);
    let router = app(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "storefront-api listening");

    axum::serve(listener, router)
        .await
        .context("server error")?;
    Ok(())
}
