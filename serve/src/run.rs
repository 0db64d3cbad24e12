//! Bind, serve, and shut down cleanly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lectern::Service;
use tracing::info;

/// Interval of the session TTL sweeper.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Runs the HTTP server until ctrl-c. Spawns the session sweeper alongside.
pub async fn run(addr: SocketAddr, service: Arc<Service>) -> std::io::Result<()> {
    let sweeper = service.sessions.spawn_sweeper(SWEEP_INTERVAL);
    let app = super::router(service);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "lectern serving");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    sweeper.abort();
    Ok(())
}
