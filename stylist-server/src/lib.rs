pub mod config;
pub mod editor;
pub mod recommender;
pub mod telemetry;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;

/// Binds `host:port` and serves `app` until the process exits.
pub async fn serve(app: Router, host: &str, port: u16) -> Result<()> {
    let bind_address = format!("{host}:{port}");
    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "started server");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
