//! Inkroom relay server binary.

use inkroom_server::{AppState, ServerConfig, ServerError, app};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkroom_server=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let state = Arc::new(AppState::new(config.history_capacity));

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!("Inkroom relay server listening on {}", config.addr);
    info!("WebSocket endpoint: ws://{}/ws", config.addr);

    axum::serve(listener, app(state)).await?;
    Ok(())
}
